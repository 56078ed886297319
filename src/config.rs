//! Environment-driven configuration

use crate::providers::{DEFAULT_LINKS_COUNT, DEFAULT_QUERY_SUFFIX};
use crate::runtime::IDLE_TIMEOUT;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DB_PATH: &str = "stats.db";
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub kinopoisk_token: String,
    pub db_path: PathBuf,
    /// Maximum number of watch links per movie
    pub links_count: usize,
    /// Appended to the movie title when searching for watch links
    pub link_query_suffix: String,
    /// Long-polling timeout for `getUpdates`
    pub poll_timeout: Duration,
    /// Quiet time after which a chat with no open session drops its actor
    pub idle_timeout: Duration,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let links_count = parse_or(&lookup, "CINEMABOT_LINKS_COUNT", DEFAULT_LINKS_COUNT)?;
        if links_count == 0 {
            return Err(ConfigError::Invalid {
                name: "CINEMABOT_LINKS_COUNT",
                value: "0".to_string(),
            });
        }
        let poll_timeout_secs =
            parse_or(&lookup, "CINEMABOT_POLL_TIMEOUT_SECS", DEFAULT_POLL_TIMEOUT_SECS)?;
        let idle_timeout_secs =
            parse_or(&lookup, "CINEMABOT_IDLE_TIMEOUT_SECS", IDLE_TIMEOUT.as_secs())?;

        Ok(Self {
            bot_token: required("BOT_API_TOKEN")?,
            kinopoisk_token: required("KINOPOISK_API_TOKEN")?,
            db_path: lookup("CINEMABOT_DB_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_DB_PATH), PathBuf::from),
            links_count,
            link_query_suffix: lookup("CINEMABOT_LINK_QUERY_SUFFIX")
                .unwrap_or_else(|| DEFAULT_QUERY_SUFFIX.to_string()),
            poll_timeout: Duration::from_secs(poll_timeout_secs),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
