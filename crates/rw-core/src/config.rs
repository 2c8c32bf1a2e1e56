use std::{env, path::PathBuf, time::Duration};

use crate::{errors::Error, Result};

const DEFAULT_CHECK_INTERVAL_SECS: u64 = 600;
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Typed configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    pub database: DatabaseConfig,
    pub check_interval: Duration,
    pub log_file: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Existing environment wins over `.env`.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process environment in `load`).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| get(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN")
            .or_else(|| get("bot_token"))
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;

        let url = match get("DATABASE_URL") {
            Some(url) => url,
            None => database_url_from_parts(&get)?,
        };
        let max_connections = get("DB_MAX_CONNECTIONS")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .max(1);

        let check_interval = Duration::from_secs(
            get("CHECK_INTERVAL_SECS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS)
                .max(1),
        );

        let log_file = get("LOG_FILE").map(PathBuf::from);

        Ok(Self {
            telegram_bot_token,
            database: DatabaseConfig {
                url,
                max_connections,
            },
            check_interval,
            log_file,
        })
    }
}

fn database_url_from_parts(get: &impl Fn(&str) -> Option<String>) -> Result<String> {
    let require = |key: &str| {
        get(key).ok_or_else(|| {
            Error::Config(format!(
                "{key} environment variable is required when DATABASE_URL is not set"
            ))
        })
    };

    let host = require("DB_HOST")?;
    let user = require("DB_USER")?;
    let name = require("DB_NAME")?;
    let password = get("DB_PASSWORD").unwrap_or_default();
    let port = match get("DB_PORT") {
        Some(p) => p
            .trim()
            .parse::<u16>()
            .map_err(|_| Error::Config(format!("invalid DB_PORT: {p}")))?,
        None => DEFAULT_DB_PORT,
    };

    let auth = if password.is_empty() {
        user
    } else {
        format!("{user}:{password}")
    };
    Ok(format!("postgres://{auth}@{host}:{port}/{name}"))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
