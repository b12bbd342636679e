use std::time::Duration;

use actix_web::cookie::Key;

use crate::errors::AppError;

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub max_connections: u32,
    pub session_key: Option<String>,
    /// Roster views untouched for this long are dropped.
    pub view_idle: Duration,
    pub max_views: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::InvalidInput("DATABASE_URL must be set".to_string()))?;
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let max_connections = env_number("DB_MAX_CONNECTIONS", 8)?;
        let session_key = std::env::var("SESSION_KEY").ok();
        let view_idle = Duration::from_secs(60 * env_number("VIEW_IDLE_MINUTES", 120)?);
        let max_views = env_number("MAX_VIEWS", 1024)?;

        Ok(Self { database_url, bind_addr, max_connections, session_key, view_idle, max_views })
    }

    /// Cookie signing key. Falls back to a random key (views are lost on restart).
    pub fn cookie_key(&self) -> Key {
        match &self.session_key {
            Some(val) if val.len() >= 64 => {
                log::info!("Using SESSION_KEY from environment");
                Key::from(val.as_bytes())
            }
            Some(val) => {
                log::warn!("SESSION_KEY too short ({} bytes, need 64+), generating random key", val.len());
                Key::generate()
            }
            None => {
                log::warn!("No SESSION_KEY set, generating random key (sessions lost on restart)");
                Key::generate()
            }
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .map_err(|_| AppError::InvalidInput(format!("{name} is not a number: {v}"))),
        Err(_) => Ok(default),
    }
}
