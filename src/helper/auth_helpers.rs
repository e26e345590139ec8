use crate::helper::{form_helpers, ActionError};
use crate::models::db_operations::users_db_operations;
use crate::models::{Role, UserAccount};
use crate::DbPool;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::Serialize;

/// Session key holding the opaque access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const TOKEN_ROTATION_GRACE_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Anonymous,
    Unprivileged,
    SubAdmin,
    Admin,
}

impl Access {
    fn from_role(role: Option<Role>) -> Self {
        match role {
            Some(Role::Admin) => Access::Admin,
            Some(Role::Subadmin) => Access::SubAdmin,
            None => Access::Unprivileged,
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, Access::Admin | Access::SubAdmin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Access::Admin)
    }
}

/// An authenticated session as issued by the auth collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserAccount,
}

pub enum AuthEvent {
    SignedIn(AuthSession),
    TokenRefreshed(AuthSession),
    SignedOut,
}

/// Who is asking, and with which privileges. Built fresh for every request.
#[derive(Debug, Clone, Serialize)]
pub struct SessionGate {
    user: Option<UserAccount>,
    access: Access,
}

impl Default for SessionGate {
    fn default() -> Self {
        SessionGate { user: None, access: Access::Anonymous }
    }
}

impl SessionGate {
    /// Sign-in and refresh re-read the role; a failed lookup leaves the user unprivileged.
    pub fn handle(&mut self, conn: &Connection, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                let role = users_db_operations::read_role(conn, &session.user.id).unwrap_or_else(|e| {
                    log::error!("Role lookup failed for user {}: {}", session.user.id, e);
                    None
                });
                self.access = Access::from_role(role);
                self.user = Some(session.user);
            }
            AuthEvent::SignedOut => {
                self.user = None;
                self.access = Access::Anonymous;
            }
        }
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn user(&self) -> Option<&UserAccount> {
        self.user.as_ref()
    }
}

fn issue_session(conn: &Connection, user: UserAccount, ttl: Duration) -> Result<AuthSession, ActionError> {
    let token = users_db_operations::insert_access_token(conn, &user.id, ttl)?;
    Ok(AuthSession { access_token: token.token, expires_at: token.expires_at, user })
}

pub fn sign_in(pool: &DbPool, email: &str, password: &str, ttl: Duration) -> Result<AuthSession, ActionError> {
    let email = email.trim();
    form_helpers::validate_email(email).map_err(ActionError::Validation)?;
    form_helpers::validate_password(password).map_err(ActionError::Validation)?;

    let conn = pool.get()?;
    let user = users_db_operations::verify_credentials(&conn, email, password)
        .ok_or_else(|| ActionError::Validation("Invalid email or password".to_string()))?;

    if let Err(e) = users_db_operations::delete_expired_tokens(&conn) {
        log::warn!("Could not purge expired access tokens: {}", e);
    }
    issue_session(&conn, user, ttl)
}

/// Creates the first admin account and signs it in. Refused once any admin exists.
pub fn sign_up(
    pool: &DbPool,
    email: &str,
    password: &str,
    username: Option<&str>,
    ttl: Duration,
) -> Result<AuthSession, ActionError> {
    let email = email.trim();
    let username = username.map(str::trim).filter(|u| !u.is_empty());
    form_helpers::validate_email(email).map_err(ActionError::Validation)?;
    form_helpers::validate_password(password).map_err(ActionError::Validation)?;
    if let Some(username) = username {
        form_helpers::validate_username(username).map_err(ActionError::Validation)?;
    }

    let mut conn = pool.get()?;
    if users_db_operations::admin_exists(&conn)? {
        return Err(ActionError::Validation("Admin already exists. Please login instead.".to_string()));
    }
    if users_db_operations::read_user_by_email(&conn, email)?.is_some() {
        return Err(ActionError::Validation("This email is already registered. Please login.".to_string()));
    }

    let user = users_db_operations::create_user_with_role(&mut conn, email, password, username, Role::Admin, None)?;
    log::info!("First admin account created for {}", user.email);
    issue_session(&conn, user, ttl)
}

pub fn sign_out(pool: &DbPool, access_token: &str) -> Result<(), ActionError> {
    let conn = pool.get()?;
    users_db_operations::delete_access_token(&conn, access_token)?;
    Ok(())
}

/// The session behind a live token, if any.
pub fn user_for_token(conn: &Connection, access_token: &str) -> Result<Option<AuthSession>, rusqlite::Error> {
    let token = match users_db_operations::read_access_token(conn, access_token)? {
        Some(token) => token,
        None => return Ok(None),
    };
    Ok(users_db_operations::read_user_by_id(conn, &token.user_id)?.map(|user| AuthSession {
        access_token: token.token,
        expires_at: token.expires_at,
        user,
    }))
}

/// Rotates the token once less than half of `ttl` remains. `None` means no rotation was due.
/// The replaced token stays valid for `TOKEN_ROTATION_GRACE_MINUTES` so requests already
/// carrying it do not sign the user out.
pub fn refresh(conn: &Connection, session: &AuthSession, ttl: Duration) -> Result<Option<AuthSession>, rusqlite::Error> {
    if session.expires_at - Utc::now() > ttl / 2 {
        return Ok(None);
    }
    let token = users_db_operations::insert_access_token(conn, &session.user.id, ttl)?;
    let grace_end = (Utc::now() + Duration::minutes(TOKEN_ROTATION_GRACE_MINUTES)).min(session.expires_at);
    users_db_operations::set_token_expiry(conn, &session.access_token, grace_end)?;
    Ok(Some(AuthSession { access_token: token.token, expires_at: token.expires_at, user: session.user.clone() }))
}

pub fn admin_exists(pool: &DbPool) -> Result<bool, ActionError> {
    let conn = pool.get()?;
    Ok(users_db_operations::admin_exists(&conn)?)
}

/// Resolves a bearer token straight to a gate, for the JSON endpoints.
pub fn gate_for_token(conn: &Connection, access_token: &str) -> Result<SessionGate, rusqlite::Error> {
    let mut gate = SessionGate::default();
    if let Some(session) = user_for_token(conn, access_token)? {
        gate.handle(conn, AuthEvent::SignedIn(session));
    }
    Ok(gate)
}
