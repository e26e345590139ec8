use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version string written into every posts backup document.
pub const BACKUP_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub thumbnail_url: String,
    #[serde(default)]
    pub additional_images: Vec<String>,
    #[serde(default)]
    pub video_links: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The caller-controlled part of a post. Slug, id and timestamps are owned by the store.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PostDraft {
    pub title: String,
    pub thumbnail_url: String,
    #[serde(default)]
    pub additional_images: Vec<String>,
    #[serde(default)]
    pub video_links: Vec<String>,
}

/// One page of the newest-first post listing.
#[derive(Debug, Serialize, Clone)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl PostPage {
    pub fn total_pages(&self) -> u32 {
        total_pages(self.total, self.page_size)
    }
}

/// Number of pages needed for `total` rows; zero rows still count as one (empty) page.
pub fn total_pages(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 1;
    }
    let pages = (total + page_size as u64 - 1) / page_size as u64;
    pages.max(1) as u32
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SocialLink {
    pub id: String,
    pub platform: String,
    pub url: String,
    pub image_url: String,
    pub is_active: bool,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SocialLinkDraft {
    pub platform: String,
    pub url: String,
    pub image_url: String,
    pub display_order: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Subadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Subadmin => "subadmin",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "subadmin" => Some(Role::Subadmin),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct UserAccount {
    pub id: String,
    pub email: String,
    pub username: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RoleAssignment {
    pub id: i64,
    pub user_id: String,
    pub role: Role,
    pub created_by: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct AccessToken {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub message: String,
    pub r#type: String, // 'success' or 'error'
}

/// The downloadable posts backup.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackupDocument {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub posts: Vec<Post>,
}

pub mod db_operations;
