//! Configuration management
//!
//! Configuration is loaded from `calbot.toml` when present, otherwise from
//! environment variables. `${VAR_NAME}` references inside the file are
//! expanded from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// CalDAV endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaldavConfig {
    /// Base URL of the CalDAV server
    pub server_url: String,
}

/// Chat host API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Base URL of the chat host API
    pub base_url: String,
    /// Bot token used for authentication
    pub bot_token: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "calbot.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Main configuration for the calendar bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub caldav: CaldavConfig,
    pub chat: ChatConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load from a TOML file, expanding `${VAR}` environment references
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&content);
        toml::from_str(&expanded).map_err(|e| Error::Config(e.to_string()))
    }

    /// Build entirely from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            caldav: CaldavConfig {
                server_url: require_env("CALBOT_CALDAV_URL")?,
            },
            chat: ChatConfig {
                base_url: require_env("CALBOT_CHAT_URL")?,
                bot_token: require_env("CALBOT_CHAT_TOKEN")?,
            },
            storage: StorageConfig {
                db_path: std::env::var("CALBOT_DB_PATH").unwrap_or_else(|_| default_db_path()),
            },
        })
    }

    /// Prefer the config file when it exists, fall back to the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Self::from_env()
        }
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::Config(format!("{name} is not set")))
}

fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let mut search_from = 0;
    while let Some(start) = result[search_from..].find("${") {
        let start = search_from + start;
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let end = start + end;
        let var_name = &result[start + 2..end];
        match std::env::var(var_name) {
            Ok(value) => {
                result.replace_range(start..=end, &value);
                search_from = start;
            }
            Err(_) => search_from = end + 1,
        }
    }
    result
}
