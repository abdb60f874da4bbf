use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use config;

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub database_path: String,
    /// Absolute public URL of this instance, used to build verification links.
    pub base_url: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub use_secure_cookies: bool,
    pub mail_from: String,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path)
            .map_err(|e| config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}", env_path.display(), e
            )))?;

        let database_path = env::var("DATABASE_PATH")
            .map_err(|_| config::ConfigError::Message(
                "FATAL: Environment variable 'DATABASE_PATH' is not set in your .env file.".to_string()
            ))?;

        if Path::new(&database_path).is_relative() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: The 'DATABASE_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                database_path
            )));
        }

        let session_secret_key = env::var("SESSION_SECRET_KEY")
            .map_err(|_| config::ConfigError::Message(
                "FATAL: Environment variable 'SESSION_SECRET_KEY' is not set in your .env file.".to_string()
            ))?;

        // The cookie key must decode to at least 64 bytes, i.e. 128 hex characters.
        if session_secret_key.len() != 128 || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string()
            ));
        }

        let base_url = env::var("BASE_URL")
            .map_err(|_| config::ConfigError::Message(
                "FATAL: Environment variable 'BASE_URL' is not set in your .env file.".to_string()
            ))?;

        if url::Url::parse(&base_url).is_err() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: 'BASE_URL' ('{}') is not a valid absolute URL.", base_url
            )));
        }

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "".to_string());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let mail_from = env::var("MAIL_FROM")
            .unwrap_or_else(|_| "noreply@event-manager.local".to_string());

        let smtp_port = env::var("SMTP_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(587);

        let mut builder = config::Config::builder()
            // Base settings (web host/port) come from the TOML file.
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("base_url", base_url)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("mail_from", mail_from)?
            .set_override("smtp_port", i64::from(smtp_port))?;

        // SMTP delivery is optional; without a host the server logs mail instead.
        if let Ok(host) = env::var("SMTP_HOST") {
            builder = builder.set_override("smtp_host", host)?;
        }
        if let Ok(username) = env::var("SMTP_USERNAME") {
            builder = builder.set_override("smtp_username", username)?;
        }
        if let Ok(password) = env::var("SMTP_PASSWORD") {
            builder = builder.set_override("smtp_password", password)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Returns the full path to the application database file.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("event_manager.db")
    }
}
