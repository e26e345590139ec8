use crate::config::Config;
use crate::helper::auth_helpers::{self, ACCESS_TOKEN_KEY};
use crate::helper::{set_notification, take_notification, ActionError};
use crate::middleware::CurrentIdentity;
use crate::routes::{redirect, render};
use crate::DbPool;
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tera::{Context, Tera};

#[derive(Deserialize)]
struct LoginForm {
    csrf_token: CsrfToken,
    email: String,
    password: String,
}

impl CsrfGuarded for LoginForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct SignupForm {
    csrf_token: CsrfToken,
    #[serde(default)]
    username: String,
    email: String,
    password: String,
}

impl CsrfGuarded for SignupForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
pub struct AuthPageQuery {
    mode: Option<String>,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct TokenUser {
    id: String,
    email: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    expires_in: i64,
    user: TokenUser,
}

/// Login, first-admin signup and logout, mounted under the auth URL prefix.
pub fn config_auth_pages(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(show_auth_page))
        .route("/login", web::post().to(handle_login))
        .route("/signup", web::post().to(handle_signup))
        .route("/logout", web::post().to(handle_logout));
}

pub fn config_auth_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/auth/v1/token", web::post().to(issue_token))
        .route("/rest/v1/rpc/admin_exists", web::get().to(admin_exists))
        .route("/rest/v1/rpc/admin_exists", web::post().to(admin_exists));
}

async fn show_auth_page(
    identity: CurrentIdentity,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    token: CsrfToken,
    query: web::Query<AuthPageQuery>,
    config: web::Data<Config>,
) -> impl Responder {
    if identity.gate.access().is_privileged() {
        return redirect(config.dashboard_url());
    }

    let can_signup = match auth_helpers::admin_exists(&pool) {
        Ok(exists) => !exists,
        Err(e) => {
            log::error!("Could not check for an existing admin: {}", e);
            false
        }
    };
    let is_login = !(can_signup && query.mode.as_deref() == Some("signup"));

    let mut ctx = Context::new();
    ctx.insert("auth_url_prefix", &config.auth_url_prefix);
    ctx.insert("csrf_token", token.get());
    ctx.insert("can_signup", &can_signup);
    ctx.insert("is_login", &is_login);
    if let Some(notification) = take_notification(&session) {
        ctx.insert("notification", &notification);
    }
    render(&tera, "auth/login.html", &ctx)
}

fn start_session(session: &Session, access_token: &str) -> Result<(), actix_session::SessionInsertError> {
    session.renew();
    session.insert(ACCESS_TOKEN_KEY, access_token)
}

async fn handle_login(
    session: Session,
    pool: web::Data<DbPool>,
    form: Csrf<web::Form<LoginForm>>,
    config: web::Data<Config>,
) -> impl Responder {
    let login_data = form.into_inner();
    let email = login_data.email.clone();
    let password = login_data.password.clone();
    let ttl = config.session_ttl();

    let result = web::block(move || auth_helpers::sign_in(&pool, &email, &password, ttl)).await;
    match result {
        Ok(Ok(auth)) => {
            if let Err(e) = start_session(&session, &auth.access_token) {
                log::error!("Could not store access token in session: {}", e);
                set_notification(&session, "Login failed", "error");
                return redirect(config.login_url());
            }
            log::info!("User {} signed in", auth.user.email);
            set_notification(&session, "Logged in successfully!", "success");
            redirect("/")
        }
        Ok(Err(e)) => {
            set_notification(&session, &e.notice("Login failed"), "error");
            redirect(config.login_url())
        }
        Err(e) => {
            log::error!("Sign-in task failed: {}", e);
            set_notification(&session, "An unexpected error occurred", "error");
            redirect(config.login_url())
        }
    }
}

async fn handle_signup(
    session: Session,
    pool: web::Data<DbPool>,
    form: Csrf<web::Form<SignupForm>>,
    config: web::Data<Config>,
) -> impl Responder {
    let signup_data = form.into_inner();
    let email = signup_data.email.clone();
    let password = signup_data.password.clone();
    let username = signup_data.username.clone();
    let ttl = config.session_ttl();
    let signup_url = format!("{}?mode=signup", config.login_url());

    let result =
        web::block(move || auth_helpers::sign_up(&pool, &email, &password, Some(username.as_str()), ttl)).await;
    match result {
        Ok(Ok(auth)) => {
            if let Err(e) = start_session(&session, &auth.access_token) {
                log::error!("Could not store access token in session: {}", e);
                set_notification(&session, "Signup failed", "error");
                return redirect(config.login_url());
            }
            set_notification(&session, "Admin account created! Logging you in...", "success");
            redirect("/")
        }
        Ok(Err(e)) => {
            // "Admin already exists" sends the visitor back to the login form.
            let target = match &e {
                ActionError::Validation(msg) if msg.starts_with("Admin already exists") => config.login_url(),
                _ => signup_url,
            };
            set_notification(&session, &e.notice("Signup failed"), "error");
            redirect(target)
        }
        Err(e) => {
            log::error!("Sign-up task failed: {}", e);
            set_notification(&session, "An unexpected error occurred", "error");
            redirect(signup_url)
        }
    }
}

async fn handle_logout(session: Session, pool: web::Data<DbPool>) -> impl Responder {
    if let Ok(Some(token)) = session.get::<String>(ACCESS_TOKEN_KEY) {
        if let Err(e) = auth_helpers::sign_out(&pool, &token) {
            log::error!("Failed to revoke access token on logout: {}", e);
        }
    }
    session.purge();
    redirect("/")
}

async fn issue_token(
    pool: web::Data<DbPool>,
    body: web::Json<TokenRequest>,
    config: web::Data<Config>,
) -> impl Responder {
    let request = body.into_inner();
    let ttl = config.session_ttl();

    let result = web::block(move || auth_helpers::sign_in(&pool, &request.email, &request.password, ttl)).await;
    match result {
        Ok(Ok(auth)) => HttpResponse::Ok().json(TokenResponse {
            access_token: auth.access_token,
            token_type: "bearer",
            expires_in: ttl.num_seconds(),
            user: TokenUser { id: auth.user.id, email: auth.user.email },
        }),
        Ok(Err(e)) => HttpResponse::BadRequest().json(json!({ "error": e.notice("Login failed") })),
        Err(e) => {
            log::error!("Token task failed: {}", e);
            HttpResponse::InternalServerError().json(json!({ "error": "Internal error" }))
        }
    }
}

async fn admin_exists(pool: web::Data<DbPool>) -> impl Responder {
    match auth_helpers::admin_exists(&pool) {
        Ok(exists) => HttpResponse::Ok().json(exists),
        Err(e) => {
            log::error!("admin_exists lookup failed: {}", e);
            HttpResponse::InternalServerError().json(json!({ "error": "Internal error" }))
        }
    }
}
