use crate::models::db_operations::posts_db_operations::{CHRONOLOGICAL_INDEX, POSTS, SLUG_INDEX};
use crate::models::db_operations::social_links_db_operations::{DISPLAY_ORDER_INDEX, SOCIAL_LINKS};
use redb::{CommitError, Database, StorageError, TableError, TransactionError};
use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
}

const USERS_TABLE: &str = "CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    username TEXT,
    created_at TEXT NOT NULL
)";

const USER_ROLES_TABLE: &str = "CREATE TABLE IF NOT EXISTS user_roles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL CHECK(role IN ('admin', 'subadmin')),
    created_by TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
)";

const ACCESS_TOKENS_TABLE: &str = "CREATE TABLE IF NOT EXISTS access_tokens (
    token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
)";

/// Creates the identity tables on an open connection. Safe to run twice.
pub fn create_identity_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(USERS_TABLE, [])?;
    conn.execute(USER_ROLES_TABLE, [])?;
    conn.execute(ACCESS_TOKENS_TABLE, [])?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_access_tokens_user ON access_tokens(user_id)",
        [],
    )?;
    Ok(())
}

pub fn setup_identity_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    println!("- Creating 'users', 'user_roles' and 'access_tokens' tables...");
    create_identity_schema(&tx)?;
    tx.commit()?;
    Ok(())
}

/// Opens every content table once so later read transactions find them.
pub fn create_content_tables(db: &Database) -> Result<(), SetupError> {
    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(POSTS)?;
        write_txn.open_table(CHRONOLOGICAL_INDEX)?;
        write_txn.open_table(SLUG_INDEX)?;
        write_txn.open_table(SOCIAL_LINKS)?;
        write_txn.open_table(DISPLAY_ORDER_INDEX)?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn setup_content_db(db: &Database) -> Result<(), SetupError> {
    println!("- Creating 'posts', 'chronological_index', 'slug_index' tables in Redb...");
    println!("- Creating 'social_links', 'social_link_display_order' tables in Redb...");
    create_content_tables(db)
}
