use crate::models::db_operations::{users_db_operations, DbError};
use crate::models::{Role, SocialLink, SocialLinkDraft};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use rusqlite::Connection;
use uuid::Uuid;

pub const SOCIAL_LINKS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("social_links");
// (display_order, created_at micros, id): equal orders fall back to creation time.
pub const DISPLAY_ORDER_INDEX: TableDefinition<(i64, i64, &[u8; 16]), ()> =
    TableDefinition::new("social_link_display_order");

fn order_key<'a>(display_order: i64, created_at: &DateTime<Utc>, id: &'a [u8; 16]) -> (i64, i64, &'a [u8; 16]) {
    (display_order, created_at.timestamp_micros(), id)
}

fn parse_link_id(link_id: &str) -> Result<[u8; 16], DbError> {
    Uuid::parse_str(link_id)
        .map(|uuid| uuid.into_bytes())
        .map_err(|_| DbError::NotFound(format!("Social link '{}' not found", link_id)))
}

fn check_link_constraints(draft: &SocialLinkDraft) -> Result<(), DbError> {
    if draft.platform.trim().is_empty() {
        return Err(DbError::Constraint("social link platform must not be empty".to_string()));
    }
    if draft.image_url.trim().is_empty() {
        return Err(DbError::Constraint("social link image must not be empty".to_string()));
    }
    Ok(())
}

pub fn create_social_link(
    db: &Database,
    conn: &Connection,
    actor_id: &str,
    draft: SocialLinkDraft,
) -> Result<SocialLink, DbError> {
    users_db_operations::require_role(conn, actor_id, &[Role::Admin])?;
    check_link_constraints(&draft)?;

    let link_uuid = Uuid::new_v4();
    let link_id_bytes = link_uuid.into_bytes();
    let link = SocialLink {
        id: link_uuid.to_string(),
        platform: draft.platform,
        url: draft.url,
        image_url: draft.image_url,
        is_active: true,
        display_order: draft.display_order,
        created_at: Utc::now(),
    };
    let link_json = serde_json::to_string(&link)?;

    let write_txn = db.begin_write()?;
    {
        let mut links_table = write_txn.open_table(SOCIAL_LINKS)?;
        let mut order_index = write_txn.open_table(DISPLAY_ORDER_INDEX)?;
        links_table.insert(&link_id_bytes, link_json.as_str())?;
        order_index.insert(order_key(link.display_order, &link.created_at, &link_id_bytes), ())?;
    }
    write_txn.commit()?;
    Ok(link)
}

/// Loads a link inside a write transaction, lets `change` edit it, then rewrites row and index.
fn modify_social_link(
    db: &Database,
    link_id: &str,
    change: impl FnOnce(&mut SocialLink),
) -> Result<SocialLink, DbError> {
    let link_id_bytes = parse_link_id(link_id)?;

    let write_txn = db.begin_write()?;
    let link = {
        let mut links_table = write_txn.open_table(SOCIAL_LINKS)?;
        let mut order_index = write_txn.open_table(DISPLAY_ORDER_INDEX)?;

        let mut link: SocialLink = {
            let guard = links_table
                .get(&link_id_bytes)?
                .ok_or_else(|| DbError::NotFound(format!("Social link '{}' not found", link_id)))?;
            serde_json::from_str(guard.value())?
        };
        let old_order = link.display_order;
        change(&mut link);

        if old_order != link.display_order {
            order_index.remove(order_key(old_order, &link.created_at, &link_id_bytes))?;
            order_index.insert(order_key(link.display_order, &link.created_at, &link_id_bytes), ())?;
        }
        let link_json = serde_json::to_string(&link)?;
        links_table.insert(&link_id_bytes, link_json.as_str())?;
        link
    };
    write_txn.commit()?;
    Ok(link)
}

pub fn update_social_link(
    db: &Database,
    conn: &Connection,
    actor_id: &str,
    link_id: &str,
    draft: SocialLinkDraft,
) -> Result<SocialLink, DbError> {
    users_db_operations::require_role(conn, actor_id, &[Role::Admin])?;
    check_link_constraints(&draft)?;
    modify_social_link(db, link_id, |link| {
        link.platform = draft.platform;
        link.url = draft.url;
        link.image_url = draft.image_url;
        link.display_order = draft.display_order;
    })
}

pub fn toggle_social_link(db: &Database, conn: &Connection, actor_id: &str, link_id: &str) -> Result<SocialLink, DbError> {
    users_db_operations::require_role(conn, actor_id, &[Role::Admin])?;
    modify_social_link(db, link_id, |link| link.is_active = !link.is_active)
}

pub fn delete_social_link(db: &Database, conn: &Connection, actor_id: &str, link_id: &str) -> Result<(), DbError> {
    users_db_operations::require_role(conn, actor_id, &[Role::Admin])?;
    let link_id_bytes = parse_link_id(link_id)?;

    let write_txn = db.begin_write()?;
    {
        let mut links_table = write_txn.open_table(SOCIAL_LINKS)?;
        let mut order_index = write_txn.open_table(DISPLAY_ORDER_INDEX)?;

        let link: SocialLink = {
            let guard = links_table
                .remove(&link_id_bytes)?
                .ok_or_else(|| DbError::NotFound(format!("Social link '{}' not found", link_id)))?;
            serde_json::from_str(guard.value())?
        };
        order_index.remove(order_key(link.display_order, &link.created_at, &link_id_bytes))?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn read_social_link(db: &Database, link_id: &str) -> Result<Option<SocialLink>, DbError> {
    let link_id_bytes = match Uuid::parse_str(link_id) {
        Ok(uuid) => uuid.into_bytes(),
        Err(_) => return Ok(None),
    };
    let read_txn = db.begin_read()?;
    let links_table = read_txn.open_table(SOCIAL_LINKS)?;
    let maybe_guard = links_table.get(&link_id_bytes)?;
    match maybe_guard {
        Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
        None => Ok(None),
    }
}

/// Every link by display order ascending.
pub fn read_social_links(db: &Database) -> Result<Vec<SocialLink>, DbError> {
    let read_txn = db.begin_read()?;
    let order_index = read_txn.open_table(DISPLAY_ORDER_INDEX)?;
    let links_table = read_txn.open_table(SOCIAL_LINKS)?;

    let mut links = Vec::new();
    for item in order_index.iter()? {
        let (key, _) = item?;
        if let Some(guard) = links_table.get(key.value().2)? {
            links.push(serde_json::from_str(guard.value())?);
        }
    }
    Ok(links)
}

pub fn read_active_social_links(db: &Database) -> Result<Vec<SocialLink>, DbError> {
    Ok(read_social_links(db)?.into_iter().filter(|link| link.is_active).collect())
}
