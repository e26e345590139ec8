use crate::models::db_operations::DbError;
use crate::models::{AccessToken, Role, RoleAssignment, UserAccount};
use bcrypt::{hash, verify, BcryptError};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::RngCore;
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row};
use uuid::Uuid;

fn bcrypt_to_rusqlite_error(e: BcryptError) -> RusqliteError {
    RusqliteError::ToSqlConversionFailure(Box::new(e))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn user_from_row(row: &Row) -> rusqlite::Result<UserAccount> {
    Ok(UserAccount {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn role_from_column(value: String) -> rusqlite::Result<Role> {
    Role::parse(&value).ok_or_else(|| {
        RusqliteError::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown role '{}'", value).into(),
        )
    })
}

// --- Users ---

pub fn create_user(
    conn: &Connection,
    email: &str,
    password: &str,
    username: Option<&str>,
) -> Result<UserAccount, RusqliteError> {
    let hashed_password = hash(password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    let user = UserAccount {
        id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        username: username.map(str::to_string),
        created_at: now_rfc3339(),
    };
    conn.execute(
        "INSERT INTO users (id, email, password_hash, username, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user.id, user.email, hashed_password, user.username, user.created_at],
    )?;
    Ok(user)
}

/// Creates a user and its role row in one transaction; neither exists if either insert fails.
pub fn create_user_with_role(
    conn: &mut Connection,
    email: &str,
    password: &str,
    username: Option<&str>,
    role: Role,
    created_by: Option<&str>,
) -> Result<UserAccount, RusqliteError> {
    let tx = conn.transaction()?;
    let user = create_user(&tx, email, password, username)?;
    insert_role(&tx, &user.id, role, created_by)?;
    tx.commit()?;
    Ok(user)
}

pub fn read_user_by_id(conn: &Connection, user_id: &str) -> Result<Option<UserAccount>, RusqliteError> {
    conn.query_row(
        "SELECT id, email, username, created_at FROM users WHERE id = ?1",
        [user_id],
        user_from_row,
    )
    .optional()
}

pub fn read_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserAccount>, RusqliteError> {
    conn.query_row(
        "SELECT id, email, username, created_at FROM users WHERE email = ?1",
        [email],
        user_from_row,
    )
    .optional()
}

pub fn read_all_users(conn: &Connection) -> Result<Vec<(UserAccount, Option<Role>)>, RusqliteError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.email, u.username, u.created_at, r.role FROM users u \
         LEFT JOIN user_roles r ON r.user_id = u.id ORDER BY u.created_at",
    )?;
    let rows = stmt.query_map([], |row| {
        let role: Option<String> = row.get(4)?;
        Ok((user_from_row(row)?, role.as_deref().and_then(Role::parse)))
    })?;

    let mut users = Vec::new();
    for user in rows {
        users.push(user?);
    }
    Ok(users)
}

pub fn verify_credentials(conn: &Connection, email: &str, password: &str) -> Option<UserAccount> {
    let res: rusqlite::Result<(String, String, Option<String>, String, String)> = conn.query_row(
        "SELECT id, email, username, created_at, password_hash FROM users WHERE email = ?1",
        [email],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
    );

    if let Ok((id, email, username, created_at, hash)) = res {
        if verify(password, &hash).unwrap_or(false) {
            return Some(UserAccount { id, email, username, created_at });
        }
    }
    None
}

/// Replaces the password hash of the account with `email`; returns the number of rows changed.
pub fn update_password(conn: &Connection, email: &str, new_password: &str) -> Result<usize, RusqliteError> {
    let hashed_password = hash(new_password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE email = ?2",
        params![hashed_password, email],
    )
}

// --- Roles ---

pub fn insert_role(
    conn: &Connection,
    user_id: &str,
    role: Role,
    created_by: Option<&str>,
) -> Result<(), RusqliteError> {
    conn.execute(
        "INSERT INTO user_roles (user_id, role, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, role.as_str(), created_by, now_rfc3339()],
    )?;
    Ok(())
}

pub fn read_role(conn: &Connection, user_id: &str) -> Result<Option<Role>, RusqliteError> {
    let role: Option<String> = conn
        .query_row("SELECT role FROM user_roles WHERE user_id = ?1", [user_id], |row| row.get(0))
        .optional()?;
    role.map(role_from_column).transpose()
}

pub fn admin_exists(conn: &Connection) -> Result<bool, RusqliteError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM user_roles WHERE role = 'admin')",
        [],
        |row| row.get(0),
    )
}

/// Role rows of one kind, newest first.
pub fn read_role_assignments(conn: &Connection, role: Role) -> Result<Vec<RoleAssignment>, RusqliteError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, role, created_by, created_at FROM user_roles \
         WHERE role = ?1 ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([role.as_str()], |row| {
        Ok(RoleAssignment {
            id: row.get(0)?,
            user_id: row.get(1)?,
            role: role_from_column(row.get(2)?)?,
            created_by: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;

    let mut assignments = Vec::new();
    for assignment in rows {
        assignments.push(assignment?);
    }
    Ok(assignments)
}

/// Removes a subadmin role row. Admin rows never match.
pub fn delete_subadmin_role(conn: &Connection, actor_id: &str, user_id: &str) -> Result<usize, DbError> {
    require_role(conn, actor_id, &[Role::Admin])?;
    Ok(conn.execute(
        "DELETE FROM user_roles WHERE user_id = ?1 AND role = 'subadmin'",
        [user_id],
    )?)
}

/// Fresh role lookup for `user_id`, rejected unless the role is one of `allowed`.
pub fn require_role(conn: &Connection, user_id: &str, allowed: &[Role]) -> Result<Role, DbError> {
    match read_role(conn, user_id)? {
        Some(role) if allowed.contains(&role) => Ok(role),
        Some(role) => Err(DbError::PermissionDenied(format!(
            "role '{}' may not perform this action",
            role.as_str()
        ))),
        None => Err(DbError::PermissionDenied("user has no role".to_string())),
    }
}

// --- Access tokens ---

pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn insert_access_token(conn: &Connection, user_id: &str, ttl: Duration) -> Result<AccessToken, RusqliteError> {
    let created_at = Utc::now();
    let token = AccessToken {
        token: generate_token(),
        user_id: user_id.to_string(),
        created_at,
        expires_at: created_at + ttl,
    };
    conn.execute(
        "INSERT INTO access_tokens (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            token.token,
            token.user_id,
            token.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            token.expires_at.to_rfc3339_opts(SecondsFormat::Micros, true)
        ],
    )?;
    Ok(token)
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RusqliteError::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

/// Returns the token only while it has not expired.
pub fn read_access_token(conn: &Connection, token: &str) -> Result<Option<AccessToken>, RusqliteError> {
    let found = conn
        .query_row(
            "SELECT token, user_id, created_at, expires_at FROM access_tokens WHERE token = ?1",
            [token],
            |row| {
                Ok(AccessToken {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    created_at: parse_timestamp(2, row.get(2)?)?,
                    expires_at: parse_timestamp(3, row.get(3)?)?,
                })
            },
        )
        .optional()?;
    Ok(found.filter(|t| t.expires_at > Utc::now()))
}

pub fn set_token_expiry(conn: &Connection, token: &str, expires_at: DateTime<Utc>) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE access_tokens SET expires_at = ?2 WHERE token = ?1",
        params![token, expires_at.to_rfc3339_opts(SecondsFormat::Micros, true)],
    )
}

pub fn delete_access_token(conn: &Connection, token: &str) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM access_tokens WHERE token = ?1", [token])
}

pub fn delete_user_tokens(conn: &Connection, user_id: &str) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM access_tokens WHERE user_id = ?1", [user_id])
}

pub fn delete_expired_tokens(conn: &Connection) -> Result<usize, RusqliteError> {
    conn.execute(
        "DELETE FROM access_tokens WHERE expires_at <= ?1",
        [now_rfc3339()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::create_identity_schema;

    fn identity_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_identity_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn first_admin_is_detected() {
        let mut conn = identity_db();
        assert!(!admin_exists(&conn).unwrap());
        create_user_with_role(&mut conn, "root@example.com", "secret1", None, Role::Admin, None).unwrap();
        assert!(admin_exists(&conn).unwrap());
    }

    #[test]
    fn credentials_are_checked_against_the_hash() {
        let conn = identity_db();
        create_user(&conn, "a@example.com", "hunter22", Some("alice")).unwrap();
        assert!(verify_credentials(&conn, "a@example.com", "hunter22").is_some());
        assert!(verify_credentials(&conn, "a@example.com", "wrong").is_none());
        assert!(verify_credentials(&conn, "nobody@example.com", "hunter22").is_none());
    }

    #[test]
    fn require_role_rejects_subadmin_for_admin_actions() {
        let mut conn = identity_db();
        let sub = create_user_with_role(&mut conn, "s@example.com", "secret1", None, Role::Subadmin, None).unwrap();
        assert!(matches!(
            require_role(&conn, &sub.id, &[Role::Admin]),
            Err(DbError::PermissionDenied(_))
        ));
        assert_eq!(require_role(&conn, &sub.id, &[Role::Admin, Role::Subadmin]).unwrap(), Role::Subadmin);
    }

    #[test]
    fn deleting_subadmin_role_leaves_admin_rows_alone() {
        let mut conn = identity_db();
        let admin = create_user_with_role(&mut conn, "a@example.com", "secret1", None, Role::Admin, None).unwrap();
        let sub = create_user_with_role(&mut conn, "s@example.com", "secret1", None, Role::Subadmin, Some(&admin.id))
            .unwrap();

        assert_eq!(delete_subadmin_role(&conn, &admin.id, &admin.id).unwrap(), 0);
        assert_eq!(delete_subadmin_role(&conn, &admin.id, &sub.id).unwrap(), 1);
        assert_eq!(read_role(&conn, &sub.id).unwrap(), None);
        assert_eq!(read_role(&conn, &admin.id).unwrap(), Some(Role::Admin));
    }

    #[test]
    fn expired_tokens_are_not_returned() {
        let conn = identity_db();
        let user = create_user(&conn, "t@example.com", "secret1", None).unwrap();
        let live = insert_access_token(&conn, &user.id, Duration::hours(1)).unwrap();
        let dead = insert_access_token(&conn, &user.id, Duration::seconds(-5)).unwrap();

        assert!(read_access_token(&conn, &live.token).unwrap().is_some());
        assert!(read_access_token(&conn, &dead.token).unwrap().is_none());
        assert_eq!(delete_expired_tokens(&conn).unwrap(), 1);
    }
}
