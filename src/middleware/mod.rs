use crate::config::Config;
use crate::helper::auth_helpers::{self, Access, AuthEvent, SessionGate, ACCESS_TOKEN_KEY};
use crate::helper::{set_notification, PERMISSION_DENIED_NOTICE};
use crate::models::UserAccount;
use crate::DbPool;
use actix_session::SessionExt;
use actix_web::{dev, error::InternalError, http::header, web, FromRequest, HttpRequest, HttpResponse};
use serde::Serialize;
use std::future::{ready, Ready};

/// The requester as seen by this request: a gate replayed from the session's token.
pub struct CurrentIdentity {
    pub gate: SessionGate,
    pub access_token: Option<String>,
}

fn resolve_identity(req: &HttpRequest) -> CurrentIdentity {
    let mut identity = CurrentIdentity { gate: SessionGate::default(), access_token: None };
    let session = req.get_session();

    let token = match session.get::<String>(ACCESS_TOKEN_KEY) {
        Ok(Some(token)) => token,
        Ok(None) => return identity,
        Err(e) => {
            log::warn!("Unreadable session state: {}", e);
            return identity;
        }
    };

    let (pool, config) = match (req.app_data::<web::Data<DbPool>>(), req.app_data::<web::Data<Config>>()) {
        (Some(pool), Some(config)) => (pool, config),
        _ => {
            log::error!("Identity lookup needs the connection pool and config in app data.");
            return identity;
        }
    };
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for session lookup: {}", e);
            return identity;
        }
    };

    match auth_helpers::user_for_token(&conn, &token) {
        Ok(Some(auth)) => match auth_helpers::refresh(&conn, &auth, config.session_ttl()) {
            Ok(Some(rotated)) => {
                if let Err(e) = session.insert(ACCESS_TOKEN_KEY, &rotated.access_token) {
                    log::error!("Could not store refreshed token in session: {}", e);
                }
                identity.access_token = Some(rotated.access_token.clone());
                identity.gate.handle(&conn, AuthEvent::TokenRefreshed(rotated));
            }
            Ok(None) => {
                identity.access_token = Some(auth.access_token.clone());
                identity.gate.handle(&conn, AuthEvent::SignedIn(auth));
            }
            Err(e) => {
                log::warn!("Token refresh failed, keeping the current token: {}", e);
                identity.access_token = Some(auth.access_token.clone());
                identity.gate.handle(&conn, AuthEvent::SignedIn(auth));
            }
        },
        Ok(None) => {
            // Expired or revoked.
            session.remove(ACCESS_TOKEN_KEY);
        }
        Err(e) => log::error!("Session token lookup failed: {}", e),
    }
    identity
}

impl FromRequest for CurrentIdentity {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        ready(Ok(resolve_identity(req)))
    }
}

fn redirect_with_notice(req: &HttpRequest, location: String, message: &str) -> actix_web::Error {
    set_notification(&req.get_session(), message, "error");
    let response = HttpResponse::Found().append_header((header::LOCATION, location)).finish();
    InternalError::from_response(message.to_string(), response).into()
}

/// An admin or sub-admin. Anyone else is redirected away.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardUser {
    pub user: UserAccount,
    pub access: Access,
    #[serde(skip)]
    pub access_token: String,
}

impl DashboardUser {
    pub fn is_admin(&self) -> bool {
        self.access.is_admin()
    }
}

fn dashboard_user(req: &HttpRequest) -> Result<DashboardUser, actix_web::Error> {
    let identity = resolve_identity(req);
    let login_url = req
        .app_data::<web::Data<Config>>()
        .map(|config| config.login_url())
        .unwrap_or_else(|| "/".to_string());

    match identity.gate.access() {
        Access::Anonymous => Err(redirect_with_notice(req, login_url, "Please login first")),
        Access::Unprivileged => Err(redirect_with_notice(
            req,
            "/".to_string(),
            "Access denied. Admin or Sub-Admin access required.",
        )),
        access => match (identity.gate.user(), identity.access_token) {
            (Some(user), Some(access_token)) => Ok(DashboardUser { user: user.clone(), access, access_token }),
            _ => Err(redirect_with_notice(req, login_url, "Please login first")),
        },
    }
}

impl FromRequest for DashboardUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        ready(dashboard_user(req))
    }
}

/// A dashboard user holding the admin role. Sub-admins go back to the dashboard.
pub struct AdminUser(pub DashboardUser);

impl FromRequest for AdminUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let result = dashboard_user(req).and_then(|user| {
            if user.is_admin() {
                Ok(AdminUser(user))
            } else {
                let dashboard_url = req
                    .app_data::<web::Data<Config>>()
                    .map(|config| config.dashboard_url())
                    .unwrap_or_else(|| "/".to_string());
                Err(redirect_with_notice(req, dashboard_url, PERMISSION_DENIED_NOTICE))
            }
        });
        ready(result)
    }
}

/// The token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer ")))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}
