//! Application configuration

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// Filter used when neither `RUST_LOG` nor `ZUKUS_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "zukus_engine=debug,zukus_domain=info";

/// Application configuration loaded from environment
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Directory holding one JSON file per character
    pub data_dir: PathBuf,
    /// Tracing filter override, used when `RUST_LOG` is unset
    pub log_filter: Option<String>,
    /// Pretty-print saved records and command output
    pub pretty_json: bool,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let pretty_json = match lookup("ZUKUS_PRETTY_JSON") {
            Some(raw) => parse_bool(&raw).context("ZUKUS_PRETTY_JSON must be a boolean")?,
            None => true,
        };

        Ok(Self {
            data_dir: lookup("ZUKUS_DATA_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .unwrap_or_else(|| "./data/characters".to_string())
                .into(),
            log_filter: lookup("ZUKUS_LOG").filter(|filter| !filter.trim().is_empty()),
            pretty_json,
        })
    }

    /// `ZUKUS_LOG` when set, the default filter otherwise.
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => bail!("expected true or false, got {other:?}"),
    }
}
