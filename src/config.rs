use std::{env, fmt::Display, net::SocketAddr, path::PathBuf, str::FromStr};

use crate::error::ApiError;

const DEVELOPMENT_SECRET: &str = "foodgram-development-secret";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub addr: SocketAddr,
    pub secret: String,
    pub session_hours: i64,
    pub media_root: PathBuf,
    pub media_url: String,
    pub ingredients_file: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self, ApiError> {
        let secret = var("FOODGRAM_SECRET").unwrap_or_else(|_| {
            log::warn!("FOODGRAM_SECRET not set, sessions are signed with the development secret");
            DEVELOPMENT_SECRET.to_string()
        });

        Ok(Self {
            database_url: try_load("FOODGRAM_DATABASE_URL", "sqlite://foodgram.sqlite")?,
            addr: try_load("FOODGRAM_ADDR", "127.0.0.1:8000")?,
            secret,
            session_hours: try_load("FOODGRAM_SESSION_HOURS", "24")?,
            media_root: try_load("FOODGRAM_MEDIA_ROOT", "media")?,
            media_url: try_load("FOODGRAM_MEDIA_URL", "/media/")?,
            ingredients_file: var("FOODGRAM_INGREDIENTS").ok().map(PathBuf::from),
        })
    }
}

fn var(key: &str) -> Result<String, env::VarError> {
    env::var(key)
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ApiError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            log::info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid {key} value: {e}")))
}
