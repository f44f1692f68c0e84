//! Ghost configuration and its TOML loading
//!
//! Shells read it from a TOML file; a missing or unreadable file yields
//! `GhostConfig::default()`.

use crate::error::{Error, Result};
use crate::url::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostConfig {
    /// Think every new process starts from.
    pub root_url: Url,
    /// GC keeps at most this many tasks per process (root, current and depended-on tasks excepted).
    pub process_max_tasks: usize,
    /// Process blob TTL in seconds when the root task does not set its own overdue.
    pub process_default_overdue: u64,
    /// Process lock lease in seconds.
    pub process_lock_overdue: u64,
    /// Operators allowed per turn before the kernel raises stackoverflow.
    pub max_operators: usize,
    /// Text shown to the user when a turn fails with a recoverable error.
    pub on_error: String,
    /// Text shown to the user when the process is locked by another turn.
    pub on_busy: String,
    /// Max chars of operator trace attached to error outputs.
    pub stack_info_limit: usize,
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            root_url: Url::new("helloworld"),
            process_max_tasks: 20,
            process_default_overdue: 1800,
            process_lock_overdue: 30,
            max_operators: 100,
            on_error: "Sorry, something went wrong.".into(),
            on_busy: "I am still working on your last message, please wait.".into(),
            stack_info_limit: 2000,
        }
    }
}

impl GhostConfig {
    /// Read `path`; a missing or invalid file leaves every field at its default.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "ghost config not readable, defaults apply");
                return Self::default();
            }
        };
        Self::from_toml_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "invalid ghost config, defaults apply");
            Self::default()
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Render the config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.process_lock_overdue)
    }

    pub fn default_process_ttl(&self) -> Duration {
        Duration::from_secs(self.process_default_overdue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = GhostConfig::from_toml_str("process_max_tasks = 5").unwrap();
        assert_eq!(config.process_max_tasks, 5);
        assert_eq!(config.max_operators, 100);
        assert_eq!(config.root_url.think, "helloworld");
    }

    #[test]
    fn root_url_table() {
        let config = GhostConfig::from_toml_str(
            "[root_url]\nthink = \"weather\"\nstage = \"ask\"\n",
        )
        .unwrap();
        assert_eq!(config.root_url, Url::new("weather").with_stage("ask"));
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("ghost-{}.toml", uuid::Uuid::new_v4()));
        assert_eq!(GhostConfig::load(&path).max_operators, 100);

        std::fs::write(&path, "max_operators = 7").unwrap();
        assert_eq!(GhostConfig::load(&path).max_operators, 7);

        std::fs::write(&path, "max_operators = [").unwrap();
        assert_eq!(GhostConfig::load(&path).max_operators, 100);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = GhostConfig::from_toml_str("process_max_tasks = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
