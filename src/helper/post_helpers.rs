use crate::helper::{form_helpers, sanitization_helpers, ActionError};
use crate::models::db_operations::posts_db_operations;
use crate::models::{BackupDocument, Post, PostDraft, PostPage, BACKUP_FORMAT_VERSION};
use crate::DbPool;
use chrono::Utc;
use rand::Rng;
use redb::Database;
use serde_json::Value;

pub const FEED_PAGE_SIZE: u32 = 12;
pub const SIDEBAR_SIZE: u32 = 3;

/// One page of posts, newest first. Page 0 is read as page 1.
pub fn list_posts(db: &Database, page: u32, page_size: u32) -> Result<PostPage, ActionError> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let offset = (page as u64 - 1) * page_size as u64;
    let total = posts_db_operations::count_posts(db)?;
    let posts = if offset >= total {
        Vec::new()
    } else {
        posts_db_operations::read_latest_posts(db, page_size, offset)?
    };
    Ok(PostPage { posts, total, page, page_size })
}

pub fn count_posts(db: &Database) -> Result<u64, ActionError> {
    Ok(posts_db_operations::count_posts(db)?)
}

pub fn get_post_by_slug(db: &Database, slug: &str) -> Result<Post, ActionError> {
    posts_db_operations::read_post_by_slug(db, slug)?
        .ok_or_else(|| ActionError::NotFound("Post not found".to_string()))
}

pub fn get_post_by_id(db: &Database, post_id: &str) -> Result<Post, ActionError> {
    posts_db_operations::read_post_by_id(db, post_id)?
        .ok_or_else(|| ActionError::NotFound("Post not found".to_string()))
}

/// Checks title then video links, returning the cleaned values.
pub fn validate_post_fields(title: &str, video_links: &[String]) -> Result<(String, Vec<String>), ActionError> {
    let title = form_helpers::clean_title(title).map_err(ActionError::Validation)?;
    let video_links = form_helpers::clean_video_links(video_links).map_err(ActionError::Validation)?;
    Ok((title, video_links))
}

fn clean_draft(draft: PostDraft) -> Result<PostDraft, ActionError> {
    let (title, video_links) = validate_post_fields(&draft.title, &draft.video_links)?;
    Ok(PostDraft {
        title,
        video_links,
        thumbnail_url: draft.thumbnail_url.trim().to_string(),
        additional_images: draft
            .additional_images
            .into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect(),
    })
}

pub fn create_post(db: &Database, pool: &DbPool, actor_id: &str, draft: PostDraft) -> Result<Post, ActionError> {
    let draft = clean_draft(draft)?;
    let conn = pool.get()?;
    Ok(posts_db_operations::create_post(db, &conn, actor_id, draft)?)
}

pub fn update_post(
    db: &Database,
    pool: &DbPool,
    actor_id: &str,
    post_id: &str,
    draft: PostDraft,
) -> Result<Post, ActionError> {
    let draft = clean_draft(draft)?;
    let conn = pool.get()?;
    Ok(posts_db_operations::update_post(db, &conn, actor_id, post_id, draft)?)
}

pub fn delete_post(db: &Database, pool: &DbPool, actor_id: &str, post_id: &str) -> Result<(), ActionError> {
    let conn = pool.get()?;
    Ok(posts_db_operations::delete_post(db, &conn, actor_id, post_id)?)
}

pub fn export_all(db: &Database) -> Result<BackupDocument, ActionError> {
    Ok(BackupDocument {
        version: BACKUP_FORMAT_VERSION.to_string(),
        exported_at: Utc::now(),
        posts: posts_db_operations::read_all_posts(db)?,
    })
}

fn string_field(entry: &Value, key: &str) -> String {
    entry.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn string_list(entry: &Value, key: &str) -> Vec<String> {
    entry
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Parses a backup document into drafts. Ids, slugs and timestamps in the file are ignored.
pub fn parse_backup(raw: &[u8]) -> Result<Vec<PostDraft>, ActionError> {
    let invalid = || ActionError::Validation("Invalid backup file format".to_string());
    let document: Value = serde_json::from_slice(raw).map_err(|_| invalid())?;
    let entries = document.get("posts").and_then(Value::as_array).ok_or_else(invalid)?;

    Ok(entries
        .iter()
        .map(|entry| PostDraft {
            title: sanitization_helpers::strip_all_html(&string_field(entry, "title")).trim().to_string(),
            thumbnail_url: string_field(entry, "thumbnail_url"),
            additional_images: string_list(entry, "additional_images"),
            video_links: string_list(entry, "video_links"),
        })
        .collect())
}

/// Inserts every post of the backup in one store transaction; returns how many were imported.
pub fn import_all(db: &Database, pool: &DbPool, actor_id: &str, raw: &[u8]) -> Result<usize, ActionError> {
    let drafts = parse_backup(raw)?;
    let conn = pool.get()?;
    Ok(posts_db_operations::import_posts(db, &conn, actor_id, drafts)?)
}

/// Up to `n` other posts from a random starting point, for the detail page sidebar.
pub fn sidebar(db: &Database, slug: &str, n: u32) -> Result<Vec<Post>, ActionError> {
    let mut others = posts_db_operations::count_posts(db)?;
    if posts_db_operations::read_post_by_slug(db, slug)?.is_some() {
        others = others.saturating_sub(1);
    }
    let span = others.saturating_sub(n as u64);
    let offset = if span == 0 { 0 } else { rand::thread_rng().gen_range(0..span) };
    Ok(posts_db_operations::read_posts_excluding_slug(db, slug, offset, n)?)
}

/// The page to show after a delete: the current one, or the new last page if it vanished.
pub fn clamp_page(current_page: u32, total_pages: u32) -> u32 {
    if current_page > total_pages {
        total_pages.max(1)
    } else {
        current_page.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_without_posts_array_is_rejected() {
        let samples: [&[u8]; 3] = [b"{}", b"{\"posts\": {}}", b"not json"];
        for raw in samples {
            assert_eq!(parse_backup(raw).unwrap_err().notice("x"), "Invalid backup file format");
        }
    }

    #[test]
    fn backup_entries_drop_store_owned_fields() {
        let raw = br#"{"version":"1.0","posts":[{"id":"x","slug":"old","title":"<b>A</b>","thumbnail_url":"t.png","video_links":["https://youtu.be/a","https://youtu.be/b"]}]}"#;
        let drafts = parse_backup(raw).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "A");
        assert_eq!(drafts[0].video_links, vec!["https://youtu.be/a", "https://youtu.be/b"]);
        assert!(drafts[0].additional_images.is_empty());
    }

    #[test]
    fn page_clamps_to_last_valid_page() {
        assert_eq!(clamp_page(3, 2), 2);
        assert_eq!(clamp_page(2, 2), 2);
        assert_eq!(clamp_page(1, 0), 1);
        assert_eq!(clamp_page(0, 5), 1);
    }
}
