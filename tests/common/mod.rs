#![allow(dead_code)]

use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::{body::MessageBody, test, web};
use chrono::Duration;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use redb::Database;
use std::fs;
use tempfile::TempDir;
use tera::Tera;
use vidfeed_backend::config::{Config, WebConfig};
use vidfeed_backend::helper::{auth_helpers, post_helpers};
use vidfeed_backend::models::{Post, PostDraft};
use vidfeed_backend::setup::db_setup;
use vidfeed_backend::DbPool;

pub const ADMIN_EMAIL: &str = "root@example.com";
pub const PASSWORD: &str = "secret1";

pub struct TestEnv {
    pub dir: TempDir,
    pub config: Config,
    pub db: web::Data<Database>,
    pub pool: DbPool,
    pub tera: Tera,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config {
            web: WebConfig { host: "127.0.0.1".to_string(), port: 8080 },
            database_path: dir.path().join("db").to_string_lossy().into_owned(),
            media_path: dir.path().join("media").to_string_lossy().into_owned(),
            allowed_origins: "*".to_string(),
            log_level: "warn".to_string(),
            session_secret_key: "ab".repeat(64),
            admin_url_prefix: "king".to_string(),
            auth_url_prefix: "dasi".to_string(),
            use_secure_cookies: false,
            session_ttl_hours: 24,
        };

        let content_path = config.content_db_path();
        fs::create_dir_all(content_path.parent().unwrap()).unwrap();
        let db = Database::create(&content_path).unwrap();
        db_setup::create_content_tables(&db).unwrap();

        let identity_path = config.identity_db_path();
        fs::create_dir_all(identity_path.parent().unwrap()).unwrap();
        let manager = SqliteConnectionManager::file(&identity_path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder().max_size(4).build(manager).unwrap();
        db_setup::create_identity_schema(&pool.get().unwrap()).unwrap();

        let tera = Tera::new("templates/**/*.html").unwrap();

        TestEnv { dir, config, db: web::Data::new(db), pool, tera }
    }

    /// Creates the first admin and returns its bearer token and id.
    pub fn admin(&self) -> (String, String) {
        let session = auth_helpers::sign_up(&self.pool, ADMIN_EMAIL, PASSWORD, None, Duration::hours(1)).unwrap();
        (session.access_token, session.user.id)
    }

    pub fn post(&self, actor_id: &str, title: &str, links: &[&str]) -> Post {
        let draft = PostDraft {
            title: title.to_string(),
            thumbnail_url: format!("https://img.example.com/{}.png", title.len()),
            additional_images: Vec::new(),
            video_links: links.iter().map(|l| l.to_string()).collect(),
        };
        post_helpers::create_post(&self.db, &self.pool, actor_id, draft).unwrap()
    }
}

/// Builds the service with the same route table and session setup as the server binary.
#[macro_export]
macro_rules! test_app {
    ($env:expr) => {{
        let env = &$env;
        let route_config = env.config.clone();
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(
                    actix_session::SessionMiddleware::builder(
                        actix_session::storage::CookieSessionStore::default(),
                        actix_web::cookie::Key::from(&[7u8; 64][..]),
                    )
                    .cookie_secure(false)
                    .build(),
                )
                .app_data(actix_web::web::Data::new(env.config.clone()))
                .app_data(actix_web::web::Data::new(env.tera.clone()))
                .app_data(env.db.clone())
                .app_data(actix_web::web::Data::new(env.pool.clone()))
                .configure(move |cfg| vidfeed_backend::routes::config_routes(cfg, &route_config)),
        )
        .await
    }};
}

pub async fn body_text<B: MessageBody>(resp: ServiceResponse<B>) -> String {
    String::from_utf8(test::read_body(resp).await.to_vec()).unwrap()
}

pub fn location<B>(resp: &ServiceResponse<B>) -> String {
    resp.headers()
        .get(actix_web::http::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn response_cookies<B>(resp: &ServiceResponse<B>) -> Vec<Cookie<'static>> {
    resp.response().cookies().map(|c| c.into_owned()).collect()
}

pub fn hidden_csrf_token(page: &str) -> String {
    let marker = "name=\"csrf_token\" value=\"";
    let start = page.find(marker).expect("login page carries a csrf token") + marker.len();
    let end = start + page[start..].find('"').unwrap();
    page[start..end].replace("&#x2F;", "/").replace("&#x3D;", "=").replace("&amp;", "&")
}

/// Signs in through the login form and evaluates to the session cookies.
#[macro_export]
macro_rules! login {
    ($app:expr, $email:expr, $password:expr) => {{
        let app = &$app;
        let resp =
            actix_web::test::call_service(app, actix_web::test::TestRequest::get().uri("/dasi").to_request()).await;
        assert!(resp.status().is_success(), "login page status {}", resp.status());
        let csrf_cookies = $crate::common::response_cookies(&resp);
        let token = $crate::common::hidden_csrf_token(&$crate::common::body_text(resp).await);

        let req = actix_web::test::TestRequest::post().uri("/dasi/login").set_form([
            ("csrf_token", token.as_str()),
            ("email", $email),
            ("password", $password),
        ]);
        let resp = actix_web::test::call_service(app, $crate::common::with_cookies(req, &csrf_cookies).to_request()).await;
        assert_eq!(resp.status(), 302);
        assert_eq!($crate::common::location(&resp), "/");
        let cookies = $crate::common::response_cookies(&resp);
        assert!(!cookies.is_empty(), "login sets the session cookie");
        cookies
    }};
}

pub fn with_cookies(mut req: test::TestRequest, cookies: &[Cookie<'static>]) -> test::TestRequest {
    for cookie in cookies {
        req = req.cookie(cookie.clone());
    }
    req
}

/// A hand-built multipart body with the given text fields and optional file part.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &str, &[u8])>) -> (String, Vec<u8>) {
    let boundary = "vidfeedtestboundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n", boundary, name, value)
                .as_bytes(),
        );
    }
    if let Some((name, filename, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                boundary, name, filename, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}
