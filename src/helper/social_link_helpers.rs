use crate::helper::{form_helpers, sanitization_helpers, ActionError};
use crate::models::db_operations::social_links_db_operations;
use crate::models::{SocialLink, SocialLinkDraft};
use crate::DbPool;
use redb::Database;

pub fn list_social_links(db: &Database) -> Result<Vec<SocialLink>, ActionError> {
    Ok(social_links_db_operations::read_social_links(db)?)
}

pub fn list_active_social_links(db: &Database) -> Result<Vec<SocialLink>, ActionError> {
    Ok(social_links_db_operations::read_active_social_links(db)?)
}

pub fn get_social_link(db: &Database, link_id: &str) -> Result<SocialLink, ActionError> {
    social_links_db_operations::read_social_link(db, link_id)?
        .ok_or_else(|| ActionError::NotFound("Social link not found".to_string()))
}

/// Plain-text platform label and trimmed destination, or the first failing field.
pub fn validate_link_fields(platform: &str, url: &str) -> Result<(String, String), ActionError> {
    let platform = sanitization_helpers::strip_all_html(platform).trim().to_string();
    if platform.is_empty() {
        return Err(ActionError::Validation("Platform is required".to_string()));
    }
    let url = url.trim().to_string();
    if !form_helpers::is_valid_url(&url) {
        return Err(ActionError::Validation("Invalid URL".to_string()));
    }
    Ok((platform, url))
}

fn clean_draft(draft: SocialLinkDraft) -> Result<SocialLinkDraft, ActionError> {
    let (platform, url) = validate_link_fields(&draft.platform, &draft.url)?;
    let image_url = draft.image_url.trim().to_string();
    if image_url.is_empty() {
        return Err(ActionError::Validation("Please provide an image".to_string()));
    }
    Ok(SocialLinkDraft { platform, url, image_url, display_order: draft.display_order })
}

pub fn create_social_link(
    db: &Database,
    pool: &DbPool,
    actor_id: &str,
    draft: SocialLinkDraft,
) -> Result<SocialLink, ActionError> {
    let draft = clean_draft(draft)?;
    let conn = pool.get()?;
    Ok(social_links_db_operations::create_social_link(db, &conn, actor_id, draft)?)
}

pub fn update_social_link(
    db: &Database,
    pool: &DbPool,
    actor_id: &str,
    link_id: &str,
    draft: SocialLinkDraft,
) -> Result<SocialLink, ActionError> {
    let draft = clean_draft(draft)?;
    let conn = pool.get()?;
    Ok(social_links_db_operations::update_social_link(db, &conn, actor_id, link_id, draft)?)
}

pub fn toggle_active(db: &Database, pool: &DbPool, actor_id: &str, link_id: &str) -> Result<SocialLink, ActionError> {
    let conn = pool.get()?;
    Ok(social_links_db_operations::toggle_social_link(db, &conn, actor_id, link_id)?)
}

pub fn delete_social_link(db: &Database, pool: &DbPool, actor_id: &str, link_id: &str) -> Result<(), ActionError> {
    let conn = pool.get()?;
    Ok(social_links_db_operations::delete_social_link(db, &conn, actor_id, link_id)?)
}
