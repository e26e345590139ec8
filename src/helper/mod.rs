use crate::helper::media_helpers::MediaError;
use crate::models::db_operations::DbError;
use crate::models::Notification;
use actix_session::Session;
use thiserror::Error;

pub mod admin_helpers;
pub mod auth_helpers;
pub mod embed_helpers;
pub mod form_helpers;
pub mod media_helpers;
pub mod post_helpers;
pub mod public_helpers;
pub mod sanitization_helpers;
pub mod social_link_helpers;
pub mod subadmin_helpers;

pub const PERMISSION_DENIED_NOTICE: &str = "You do not have permission to perform this action.";
const NOTIFICATION_KEY: &str = "notification";

/// Queues a flash message for the next rendered page.
pub fn set_notification(session: &Session, message: &str, r#type: &str) {
    let notification = Notification { message: message.to_string(), r#type: r#type.to_string() };
    if let Err(e) = session.insert(NOTIFICATION_KEY, &notification) {
        log::error!("Could not store notification in session: {}", e);
    }
}

/// Reads and clears the pending flash message.
pub fn take_notification(session: &Session) -> Option<Notification> {
    let notification = session.get::<Notification>(NOTIFICATION_KEY).ok().flatten();
    if notification.is_some() {
        session.remove(NOTIFICATION_KEY);
    }
    notification
}

/// Failure of a dashboard or page action.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(#[source] DbError),
    #[error("Storage error: {0}")]
    Storage(#[from] MediaError),
    #[error("R2D2 pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl From<DbError> for ActionError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::PermissionDenied(reason) => {
                log::warn!("Store refused a privileged write: {}", reason);
                ActionError::Forbidden(PERMISSION_DENIED_NOTICE.to_string())
            }
            DbError::NotFound(what) => ActionError::NotFound(what),
            DbError::Constraint(what) => ActionError::Validation(what),
            other => ActionError::Store(other),
        }
    }
}

impl From<rusqlite::Error> for ActionError {
    fn from(e: rusqlite::Error) -> Self {
        ActionError::Store(DbError::Rusqlite(e))
    }
}

impl ActionError {
    /// The text shown to the user. Collaborator failures collapse into `failure`
    /// and the underlying error goes to the log.
    pub fn notice(&self, failure: &str) -> String {
        match self {
            ActionError::Validation(msg) | ActionError::Forbidden(msg) | ActionError::NotFound(msg) => msg.clone(),
            ActionError::Store(_) | ActionError::Storage(_) | ActionError::Pool(_) => {
                log::error!("{}: {}", failure, self);
                failure.to_string()
            }
        }
    }
}
