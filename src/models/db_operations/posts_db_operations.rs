use crate::models::db_operations::{users_db_operations, DbError};
use crate::models::{Post, PostDraft, Role};
use chrono::{DateTime, Duration, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use rusqlite::Connection;
use uuid::Uuid;

pub const POSTS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("posts");
// Keyed by negated creation time so a forward scan yields newest first.
pub const CHRONOLOGICAL_INDEX: TableDefinition<(i64, &[u8; 16]), ()> = TableDefinition::new("chronological_index");
pub const SLUG_INDEX: TableDefinition<&str, &[u8; 16]> = TableDefinition::new("slug_index");

pub const MAX_TITLE_CHARS: usize = 200;

fn chrono_key(created_at: &DateTime<Utc>) -> i64 {
    -created_at.timestamp_micros()
}

fn parse_post_id(post_id: &str) -> Result<[u8; 16], DbError> {
    Uuid::parse_str(post_id)
        .map(|uuid| uuid.into_bytes())
        .map_err(|_| DbError::NotFound(format!("Post '{}' not found", post_id)))
}

/// Lowercase ASCII alphanumeric runs joined by `-`; `post` when nothing survives.
pub fn slugify(title: &str) -> String {
    let slug = title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "post".to_string()
    } else {
        slug
    }
}

fn next_free_slug(
    base: &str,
    mut taken: impl FnMut(&str) -> Result<bool, DbError>,
) -> Result<String, DbError> {
    if !taken(base)? {
        return Ok(base.to_string());
    }
    let mut suffix = 2u32;
    loop {
        let candidate = format!("{}-{}", base, suffix);
        if !taken(&candidate)? {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

fn check_post_constraints(draft: &PostDraft) -> Result<(), DbError> {
    let title_len = draft.title.trim().chars().count();
    if title_len == 0 || title_len > MAX_TITLE_CHARS {
        return Err(DbError::Constraint(format!(
            "post title must be 1-{} characters",
            MAX_TITLE_CHARS
        )));
    }
    if draft.thumbnail_url.trim().is_empty() {
        return Err(DbError::Constraint("post thumbnail must not be empty".to_string()));
    }
    Ok(())
}

/// Inserts every draft in a single write transaction. The first draft gets `now`,
/// each following one a microsecond earlier, so listing order matches input order.
fn insert_posts(db: &Database, drafts: Vec<PostDraft>, now: DateTime<Utc>) -> Result<Vec<Post>, DbError> {
    for draft in &drafts {
        check_post_constraints(draft)?;
    }

    let write_txn = db.begin_write()?;
    let mut created = Vec::with_capacity(drafts.len());
    {
        let mut posts_table = write_txn.open_table(POSTS)?;
        let mut chrono_index = write_txn.open_table(CHRONOLOGICAL_INDEX)?;
        let mut slug_index = write_txn.open_table(SLUG_INDEX)?;

        for (i, draft) in drafts.into_iter().enumerate() {
            let post_uuid = Uuid::new_v4();
            let post_id_bytes = post_uuid.into_bytes();
            let created_at = now - Duration::microseconds(i as i64);

            let slug = next_free_slug(&slugify(&draft.title), |candidate| {
                Ok(slug_index.get(candidate)?.is_some())
            })?;

            let post = Post {
                id: post_uuid.to_string(),
                title: draft.title,
                slug,
                thumbnail_url: draft.thumbnail_url,
                additional_images: draft.additional_images,
                video_links: draft.video_links,
                created_at,
                updated_at: None,
            };
            let post_json = serde_json::to_string(&post)?;

            posts_table.insert(&post_id_bytes, post_json.as_str())?;
            chrono_index.insert((chrono_key(&created_at), &post_id_bytes), ())?;
            slug_index.insert(post.slug.as_str(), &post_id_bytes)?;
            created.push(post);
        }
    }
    write_txn.commit()?;
    Ok(created)
}

pub fn create_post(db: &Database, conn: &Connection, actor_id: &str, draft: PostDraft) -> Result<Post, DbError> {
    users_db_operations::require_role(conn, actor_id, &[Role::Admin, Role::Subadmin])?;
    insert_posts(db, vec![draft], Utc::now())?
        .pop()
        .ok_or_else(|| DbError::NotFound("Created post missing from insert result".to_string()))
}

/// All-or-nothing insert of many posts. Admin only.
pub fn import_posts(db: &Database, conn: &Connection, actor_id: &str, drafts: Vec<PostDraft>) -> Result<usize, DbError> {
    users_db_operations::require_role(conn, actor_id, &[Role::Admin])?;
    Ok(insert_posts(db, drafts, Utc::now())?.len())
}

/// Replaces the caller-controlled fields. Slug and creation time never change.
pub fn update_post(
    db: &Database,
    conn: &Connection,
    actor_id: &str,
    post_id: &str,
    draft: PostDraft,
) -> Result<Post, DbError> {
    users_db_operations::require_role(conn, actor_id, &[Role::Admin, Role::Subadmin])?;
    check_post_constraints(&draft)?;
    let post_id_bytes = parse_post_id(post_id)?;

    let write_txn = db.begin_write()?;
    let updated = {
        let mut posts_table = write_txn.open_table(POSTS)?;

        let mut post: Post = {
            let guard = posts_table
                .get(&post_id_bytes)?
                .ok_or_else(|| DbError::NotFound(format!("Post '{}' not found", post_id)))?;
            serde_json::from_str(guard.value())?
        };

        post.title = draft.title;
        post.thumbnail_url = draft.thumbnail_url;
        post.additional_images = draft.additional_images;
        post.video_links = draft.video_links;
        post.updated_at = Some(Utc::now());

        let post_json = serde_json::to_string(&post)?;
        posts_table.insert(&post_id_bytes, post_json.as_str())?;
        post
    };
    write_txn.commit()?;
    Ok(updated)
}

/// Admin only. A missing post is reported as `NotFound`.
pub fn delete_post(db: &Database, conn: &Connection, actor_id: &str, post_id: &str) -> Result<(), DbError> {
    users_db_operations::require_role(conn, actor_id, &[Role::Admin])?;
    let post_id_bytes = parse_post_id(post_id)?;

    let write_txn = db.begin_write()?;
    {
        let mut posts_table = write_txn.open_table(POSTS)?;
        let mut chrono_index = write_txn.open_table(CHRONOLOGICAL_INDEX)?;
        let mut slug_index = write_txn.open_table(SLUG_INDEX)?;

        let post: Post = {
            let guard = posts_table
                .remove(&post_id_bytes)?
                .ok_or_else(|| DbError::NotFound(format!("Post '{}' not found", post_id)))?;
            serde_json::from_str(guard.value())?
        };

        chrono_index.remove((chrono_key(&post.created_at), &post_id_bytes))?;
        slug_index.remove(post.slug.as_str())?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn count_posts(db: &Database) -> Result<u64, DbError> {
    let read_txn = db.begin_read()?;
    let chrono_index = read_txn.open_table(CHRONOLOGICAL_INDEX)?;
    Ok(chrono_index.len()?)
}

/// Newest first, `offset` rows skipped.
pub fn read_latest_posts(db: &Database, limit: u32, offset: u64) -> Result<Vec<Post>, DbError> {
    let read_txn = db.begin_read()?;
    let chrono_index = read_txn.open_table(CHRONOLOGICAL_INDEX)?;
    let posts_table = read_txn.open_table(POSTS)?;

    let mut posts = Vec::new();
    for item in chrono_index.iter()?.skip(offset as usize).take(limit as usize) {
        let (key, _) = item?;
        let post_id_bytes = key.value().1;
        if let Some(guard) = posts_table.get(post_id_bytes)? {
            posts.push(serde_json::from_str(guard.value())?);
        }
    }
    Ok(posts)
}

pub fn read_all_posts(db: &Database) -> Result<Vec<Post>, DbError> {
    read_latest_posts(db, u32::MAX, 0)
}

pub fn read_post_by_id(db: &Database, post_id: &str) -> Result<Option<Post>, DbError> {
    let post_id_bytes = match Uuid::parse_str(post_id) {
        Ok(uuid) => uuid.into_bytes(),
        Err(_) => return Ok(None),
    };

    let read_txn = db.begin_read()?;
    let posts_table = read_txn.open_table(POSTS)?;
    let maybe_guard = posts_table.get(&post_id_bytes)?;
    match maybe_guard {
        Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
        None => Ok(None),
    }
}

pub fn read_post_by_slug(db: &Database, slug: &str) -> Result<Option<Post>, DbError> {
    let read_txn = db.begin_read()?;
    let slug_index = read_txn.open_table(SLUG_INDEX)?;
    let posts_table = read_txn.open_table(POSTS)?;

    let post_id_bytes = match slug_index.get(slug)? {
        Some(guard) => *guard.value(),
        None => return Ok(None),
    };
    let maybe_guard = posts_table.get(&post_id_bytes)?;
    match maybe_guard {
        Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
        None => {
            log::warn!("Slug '{}' points at a missing post", slug);
            Ok(None)
        }
    }
}

/// Up to `limit` posts other than `exclude_slug`, starting `offset` rows into the listing.
pub fn read_posts_excluding_slug(
    db: &Database,
    exclude_slug: &str,
    offset: u64,
    limit: u32,
) -> Result<Vec<Post>, DbError> {
    let read_txn = db.begin_read()?;
    let chrono_index = read_txn.open_table(CHRONOLOGICAL_INDEX)?;
    let posts_table = read_txn.open_table(POSTS)?;

    let mut posts = Vec::new();
    let mut skipped = 0u64;
    for item in chrono_index.iter()? {
        if posts.len() >= limit as usize {
            break;
        }
        let (key, _) = item?;
        let post: Post = match posts_table.get(key.value().1)? {
            Some(guard) => serde_json::from_str(guard.value())?,
            None => continue,
        };
        if post.slug == exclude_slug {
            continue;
        }
        if skipped < offset {
            skipped += 1;
            continue;
        }
        posts.push(post);
    }
    Ok(posts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::users_db_operations::create_user_with_role;
    use crate::setup::db_setup::{create_content_tables, create_identity_schema};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        db: Database,
        conn: Connection,
        admin_id: String,
        subadmin_id: String,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Database::create(dir.path().join("content.db")).unwrap();
        create_content_tables(&db).unwrap();
        let mut conn = Connection::open_in_memory().unwrap();
        create_identity_schema(&conn).unwrap();
        let admin = create_user_with_role(&mut conn, "a@example.com", "secret1", None, Role::Admin, None).unwrap();
        let sub = create_user_with_role(&mut conn, "s@example.com", "secret1", None, Role::Subadmin, None).unwrap();
        Fixture { _dir: dir, db, conn, admin_id: admin.id, subadmin_id: sub.id }
    }

    fn draft(title: &str) -> PostDraft {
        PostDraft {
            title: title.to_string(),
            thumbnail_url: "https://img.example.com/t.jpg".to_string(),
            additional_images: vec![],
            video_links: vec!["https://youtu.be/abc".to_string()],
        }
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust -- 2024  "), "rust-2024");
        assert_eq!(slugify("!!!"), "post");
    }

    #[test]
    fn duplicate_titles_get_suffixed_slugs() {
        let f = fixture();
        let a = create_post(&f.db, &f.conn, &f.admin_id, draft("Same Title")).unwrap();
        let b = create_post(&f.db, &f.conn, &f.admin_id, draft("Same Title")).unwrap();
        let c = create_post(&f.db, &f.conn, &f.subadmin_id, draft("Same Title")).unwrap();
        assert_eq!(a.slug, "same-title");
        assert_eq!(b.slug, "same-title-2");
        assert_eq!(c.slug, "same-title-3");
    }

    #[test]
    fn latest_posts_are_newest_first() {
        let f = fixture();
        for title in ["one", "two", "three"] {
            create_post(&f.db, &f.conn, &f.admin_id, draft(title)).unwrap();
        }
        let titles: Vec<String> = read_latest_posts(&f.db, 10, 0).unwrap().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["three", "two", "one"]);
        assert_eq!(read_latest_posts(&f.db, 10, 3).unwrap().len(), 0);
        assert_eq!(count_posts(&f.db).unwrap(), 3);
    }

    #[test]
    fn update_keeps_slug_and_creation_time() {
        let f = fixture();
        let post = create_post(&f.db, &f.conn, &f.admin_id, draft("Original")).unwrap();
        let updated = update_post(&f.db, &f.conn, &f.subadmin_id, &post.id, draft("Renamed")).unwrap();
        assert_eq!(updated.slug, "original");
        assert_eq!(updated.created_at, post.created_at);
        assert!(updated.updated_at.is_some());
        assert_eq!(read_post_by_slug(&f.db, "original").unwrap().unwrap().title, "Renamed");
    }

    #[test]
    fn subadmin_cannot_delete() {
        let f = fixture();
        let post = create_post(&f.db, &f.conn, &f.admin_id, draft("Keep me")).unwrap();
        assert!(matches!(
            delete_post(&f.db, &f.conn, &f.subadmin_id, &post.id),
            Err(DbError::PermissionDenied(_))
        ));
        assert_eq!(count_posts(&f.db).unwrap(), 1);
    }

    #[test]
    fn delete_clears_indexes_and_reports_missing() {
        let f = fixture();
        let post = create_post(&f.db, &f.conn, &f.admin_id, draft("Gone soon")).unwrap();
        delete_post(&f.db, &f.conn, &f.admin_id, &post.id).unwrap();
        assert!(read_post_by_slug(&f.db, "gone-soon").unwrap().is_none());
        assert_eq!(count_posts(&f.db).unwrap(), 0);
        assert!(matches!(
            delete_post(&f.db, &f.conn, &f.admin_id, &post.id),
            Err(DbError::NotFound(_))
        ));
        assert!(matches!(
            delete_post(&f.db, &f.conn, &f.admin_id, "not-a-uuid"),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn empty_thumbnail_is_rejected() {
        let f = fixture();
        let mut bad = draft("No thumb");
        bad.thumbnail_url = "  ".to_string();
        assert!(matches!(
            create_post(&f.db, &f.conn, &f.admin_id, bad),
            Err(DbError::Constraint(_))
        ));
        assert_eq!(count_posts(&f.db).unwrap(), 0);
    }

    #[test]
    fn import_is_all_or_nothing() {
        let f = fixture();
        let mut bad = draft("second");
        bad.title = String::new();
        assert!(import_posts(&f.db, &f.conn, &f.admin_id, vec![draft("first"), bad]).is_err());
        assert_eq!(count_posts(&f.db).unwrap(), 0);

        assert_eq!(import_posts(&f.db, &f.conn, &f.admin_id, vec![draft("a"), draft("b")]).unwrap(), 2);
        let titles: Vec<String> = read_all_posts(&f.db).unwrap().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["a", "b"]);
    }

    #[test]
    fn excluding_slug_skips_current_post() {
        let f = fixture();
        for title in ["a", "b", "c", "d"] {
            create_post(&f.db, &f.conn, &f.admin_id, draft(title)).unwrap();
        }
        let others = read_posts_excluding_slug(&f.db, "c", 0, 3).unwrap();
        assert_eq!(others.len(), 3);
        assert!(others.iter().all(|p| p.slug != "c"));
        assert_eq!(read_posts_excluding_slug(&f.db, "c", 2, 3).unwrap().len(), 1);
    }
}
