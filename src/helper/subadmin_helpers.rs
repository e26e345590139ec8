use crate::helper::{auth_helpers, form_helpers, ActionError};
use crate::models::db_operations::{users_db_operations, DbError};
use crate::models::Role;
use crate::DbPool;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors of the privileged JSON endpoints; every one is answered with HTTP 400 `{error}`.
#[derive(Error, Debug)]
pub enum FunctionError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("Store error: {0}")]
    Store(#[from] DbError),
    #[error("R2D2 pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl From<rusqlite::Error> for FunctionError {
    fn from(e: rusqlite::Error) -> Self {
        FunctionError::Store(DbError::Rusqlite(e))
    }
}

impl FunctionError {
    pub fn public_message(&self) -> String {
        match self {
            FunctionError::Store(_) | FunctionError::Pool(_) => {
                log::error!("Privileged endpoint failed: {}", self);
                "Internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateSubadminRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CreatedUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SubAdminEntry {
    pub id: i64,
    pub user_id: String,
    pub role: Role,
    pub created_at: String,
    pub email: String,
}

/// Resolves the bearer token to its user and requires the admin role.
fn require_admin(conn: &Connection, bearer: Option<&str>, refusal: &'static str) -> Result<String, FunctionError> {
    let token = bearer.ok_or(FunctionError::Unauthorized)?;
    let gate = auth_helpers::gate_for_token(conn, token)?;
    let user = gate.user().ok_or(FunctionError::Unauthorized)?;
    if !gate.access().is_admin() {
        return Err(FunctionError::Forbidden(refusal));
    }
    Ok(user.id.clone())
}

pub fn create_subadmin(
    pool: &DbPool,
    bearer: Option<&str>,
    request: CreateSubadminRequest,
) -> Result<CreatedUser, FunctionError> {
    let mut conn = pool.get()?;
    let admin_id = require_admin(&conn, bearer, "Only admins can create sub-admins")?;

    let email = request.email.trim();
    if email.is_empty() || request.password.is_empty() {
        return Err(FunctionError::BadRequest("Email and password are required".to_string()));
    }
    form_helpers::validate_email(email).map_err(FunctionError::BadRequest)?;
    form_helpers::validate_password(&request.password).map_err(FunctionError::BadRequest)?;
    if users_db_operations::read_user_by_email(&conn, email)?.is_some() {
        return Err(FunctionError::BadRequest(
            "A user with this email address has already been registered".to_string(),
        ));
    }

    let user = users_db_operations::create_user_with_role(
        &mut conn,
        email,
        &request.password,
        None,
        Role::Subadmin,
        Some(&admin_id),
    )?;
    log::info!("Sub-admin {} created by {}", user.email, admin_id);
    Ok(CreatedUser { id: user.id, email: user.email })
}

/// Subadmin role rows newest first, each with its account email.
pub fn list_subadmins(pool: &DbPool, bearer: Option<&str>) -> Result<Vec<SubAdminEntry>, FunctionError> {
    let conn = pool.get()?;
    require_admin(&conn, bearer, "Only admins can view sub-admins")?;

    let assignments = users_db_operations::read_role_assignments(&conn, Role::Subadmin)?;
    Ok(assignments
        .into_iter()
        .map(|assignment| {
            let email = match users_db_operations::read_user_by_id(&conn, &assignment.user_id) {
                Ok(Some(user)) => user.email,
                Ok(None) => "Unknown".to_string(),
                Err(e) => {
                    log::warn!("Email lookup failed for {}: {}", assignment.user_id, e);
                    "Unknown".to_string()
                }
            };
            SubAdminEntry {
                id: assignment.id,
                user_id: assignment.user_id,
                role: assignment.role,
                created_at: assignment.created_at,
                email,
            }
        })
        .collect())
}

/// Removes the subadmin role row of `user_id`; the account itself stays.
pub fn remove_subadmin(pool: &DbPool, actor_id: &str, user_id: &str) -> Result<(), ActionError> {
    let conn = pool.get()?;
    match users_db_operations::delete_subadmin_role(&conn, actor_id, user_id)? {
        0 => Err(ActionError::NotFound("Sub-admin not found".to_string())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::create_identity_schema;
    use chrono::Duration;
    use r2d2_sqlite::SqliteConnectionManager;
    use tempfile::TempDir;

    fn pool_with_admin() -> (TempDir, DbPool, String) {
        let dir = TempDir::new().unwrap();
        let manager = SqliteConnectionManager::file(dir.path().join("identity.db"));
        let pool = r2d2::Pool::builder().max_size(2).build(manager).unwrap();
        create_identity_schema(&pool.get().unwrap()).unwrap();
        let session = auth_helpers::sign_up(&pool, "root@example.com", "secret1", None, Duration::hours(1)).unwrap();
        (dir, pool, session.access_token)
    }

    fn request(email: &str, password: &str) -> CreateSubadminRequest {
        CreateSubadminRequest { email: email.to_string(), password: password.to_string() }
    }

    #[test]
    fn admin_creates_and_lists_subadmins() {
        let (_dir, pool, token) = pool_with_admin();
        let first = create_subadmin(&pool, Some(&token), request("one@example.com", "secret1")).unwrap();
        let second = create_subadmin(&pool, Some(&token), request("two@example.com", "secret1")).unwrap();

        let listed = list_subadmins(&pool, Some(&token)).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].user_id, second.id);
        assert_eq!(listed[1].email, first.email);
        assert!(listed.iter().all(|entry| entry.role == Role::Subadmin));
    }

    #[test]
    fn subadmin_token_is_refused() {
        let (_dir, pool, token) = pool_with_admin();
        create_subadmin(&pool, Some(&token), request("sub@example.com", "secret1")).unwrap();
        let sub = auth_helpers::sign_in(&pool, "sub@example.com", "secret1", Duration::hours(1)).unwrap();

        let err = create_subadmin(&pool, Some(&sub.access_token), request("x@example.com", "secret1")).unwrap_err();
        assert_eq!(err.public_message(), "Only admins can create sub-admins");
        let err = list_subadmins(&pool, Some(&sub.access_token)).unwrap_err();
        assert_eq!(err.public_message(), "Only admins can view sub-admins");
    }

    #[test]
    fn missing_token_or_fields_are_rejected() {
        let (_dir, pool, token) = pool_with_admin();
        assert_eq!(
            create_subadmin(&pool, None, request("a@example.com", "secret1")).unwrap_err().public_message(),
            "Unauthorized"
        );
        assert_eq!(
            create_subadmin(&pool, Some("bogus"), request("a@example.com", "secret1")).unwrap_err().public_message(),
            "Unauthorized"
        );
        assert_eq!(
            create_subadmin(&pool, Some(&token), request("", "")).unwrap_err().public_message(),
            "Email and password are required"
        );
    }

    #[test]
    fn removing_a_subadmin_drops_the_role() {
        let (_dir, pool, token) = pool_with_admin();
        let created = create_subadmin(&pool, Some(&token), request("sub@example.com", "secret1")).unwrap();
        let admin_id = auth_helpers::user_for_token(&pool.get().unwrap(), &token).unwrap().unwrap().user.id;

        remove_subadmin(&pool, &admin_id, &created.id).unwrap();
        assert!(list_subadmins(&pool, Some(&token)).unwrap().is_empty());
        assert!(matches!(remove_subadmin(&pool, &admin_id, &created.id), Err(ActionError::NotFound(_))));
    }
}
