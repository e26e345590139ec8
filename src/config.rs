use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    // Populated from the .env file
    pub database_path: String,
    pub media_path: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub admin_url_prefix: String,
    pub auth_url_prefix: String,
    pub use_secure_cookies: bool,
    pub session_ttl_hours: i64,
}

// Path segments already taken by public routes.
const RESERVED_PREFIXES: [&str; 7] = ["api", "post", "media", "functions", "auth", "rest", "static"];

fn fatal(message: impl Into<String>) -> config::ConfigError {
    config::ConfigError::Message(format!("FATAL: {}", message.into()))
}

fn required_var(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| fatal(format!("Environment variable '{}' is not set in your .env file.", name)))
}

fn url_prefix_var(name: &str, default: &str) -> Result<String, config::ConfigError> {
    let prefix = env::var(name).unwrap_or_else(|_| default.to_string());
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(fatal(format!(
            "'{}' must not be empty and can only contain letters, numbers, underscores, and hyphens.",
            name
        )));
    }
    if prefix.chars().all(|c| c.is_ascii_digit()) || RESERVED_PREFIXES.contains(&prefix.as_str()) {
        return Err(fatal(format!("'{}' value '{}' collides with a public route.", name, prefix)));
    }
    Ok(prefix)
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path).map_err(|e| {
            fatal(format!("Failed to load .env file from '{}'. Error: {}", env_path.display(), e))
        })?;

        let database_path = required_var("DATABASE_PATH")?;
        let media_path = required_var("MEDIA_PATH")?;
        let session_secret_key = required_var("SESSION_SECRET_KEY")?;

        // 128 hex characters decode to the 64 byte cookie key.
        if session_secret_key.len() != 128 || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(fatal("'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes)."));
        }

        let admin_url_prefix = url_prefix_var("ADMIN_URL_PREFIX", "king")?;
        let auth_url_prefix = url_prefix_var("AUTH_URL_PREFIX", "dasi")?;
        if admin_url_prefix == auth_url_prefix {
            return Err(fatal("'ADMIN_URL_PREFIX' and 'AUTH_URL_PREFIX' must differ."));
        }

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_default();
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);
        let session_ttl_hours = env::var("SESSION_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|hours| *hours > 0)
            .unwrap_or(24);

        for (name, path) in [("DATABASE_PATH", &database_path), ("MEDIA_PATH", &media_path)] {
            if Path::new(path).is_relative() {
                return Err(fatal(format!(
                    "The '{}' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                    name, path
                )));
            }
        }

        let builder = config::Config::builder()
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("media_path", media_path)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("admin_url_prefix", admin_url_prefix)?
            .set_override("auth_url_prefix", auth_url_prefix)?
            .set_override("session_ttl_hours", session_ttl_hours)?
            .build()?;

        builder.try_deserialize()
    }

    /// The redb file holding posts and social links.
    pub fn content_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("content").join("content.db")
    }

    /// The SQLite file holding users, roles and access tokens.
    pub fn identity_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("identity").join("identity.db")
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }

    pub fn login_url(&self) -> String {
        format!("/{}", self.auth_url_prefix)
    }

    pub fn dashboard_url(&self) -> String {
        format!("/{}", self.admin_url_prefix)
    }
}
