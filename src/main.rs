use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    cookie::{Key, SameSite},
    middleware::{DefaultHeaders, Logger},
    web, App, HttpServer,
};
use clap::Parser;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use redb::Database;
use std::convert::TryFrom;
use std::fs;
use std::path::PathBuf;
use tera::Tera;
use vidfeed_backend::{config::Config, routes};

#[derive(Parser, Debug)]
#[command(name = "vidfeed_server", author, version, about = "Starts the video feed web server.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    let tera = Tera::new("templates/**/*.html").expect("Tera initialization failed");

    fs::create_dir_all(&config.media_path).expect("Failed to create media directory");

    let content_db = web::Data::new(Database::open(config.content_db_path()).expect(
        "FATAL: content.db not found. Run 'cargo run --bin setup_cli -- --env-file <path> db setup'",
    ));

    let identity_db_path = config.identity_db_path();
    if !identity_db_path.exists() {
        panic!(
            "FATAL: identity.db not found at '{}'. Run 'cargo run --bin setup_cli -- --env-file <path> db setup'",
            identity_db_path.display()
        );
    }
    let manager = SqliteConnectionManager::file(identity_db_path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = Pool::builder().build(manager).expect("FATAL: Failed to create Rusqlite connection pool.");

    let session_key_bytes = hex::decode(&config.session_secret_key)
        .expect("FATAL: SESSION_SECRET_KEY in .env is not a valid hex string.");
    let session_key = Key::try_from(session_key_bytes.as_slice())
        .expect("FATAL: The decoded SESSION_SECRET_KEY is not long enough (minimum 64 bytes required).");

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Admin dashboard mounted at {}", config.dashboard_url());
    println!("🚀 Server starting at http://{}", server_address);

    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
            .cookie_secure(config.use_secure_cookies)
            .cookie_http_only(true)
            .cookie_same_site(SameSite::Lax)
            .build();
        let route_config = config.clone();

        App::new()
            .wrap(session_mw)
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(tera.clone()))
            .app_data(content_db.clone())
            .app_data(web::Data::new(pool.clone()))
            .configure(move |cfg| routes::config_routes(cfg, &route_config))
    })
    .bind(server_address)?
    .run()
    .await
}
