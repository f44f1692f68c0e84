//! Ghost Thinks — reference thinks and commands
//!
//! Each think lives in src/thinks/; commands in src/commands.rs.
//! To add a think: create the file, register it in `default_mindset()`.

pub mod commands;
pub mod thinks;

pub use commands::{CancelCommand, HelpCommand, QuitCommand};
pub use thinks::scripted::{ScriptConfig, ScriptedDriver, Step};

use ghost_core::{Error, Result};
use ghost_kernel::{Focus, Mindset, ThinkMeta};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Mindset with the built-in thinks and drivers.
pub fn default_mindset() -> Mindset {
    let mut mindset = Mindset::new();
    mindset.register(thinks::helloworld::think());
    mindset.register_driver(ScriptedDriver);
    mindset
}

/// Focus with the built-in intention drivers and the slash commands.
pub fn default_focus() -> Focus {
    let mut focus = Focus::new();
    for command in commands::builtin() {
        focus.register_global(command);
    }
    focus
}

/// `[[thinks]]` entries of a config file.
#[derive(Debug, Default, Deserialize)]
pub struct ThinkCatalog {
    #[serde(default)]
    pub thinks: Vec<ThinkMeta>,
}

impl ThinkCatalog {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Register every meta. Fails on the first unknown kind.
    pub fn register(self, mindset: &mut Mindset) -> Result<usize> {
        let count = self.thinks.len();
        for meta in self.thinks {
            info!(think = %meta.id, kind = %meta.kind, "registering think");
            mindset.register_meta(meta)?;
        }
        Ok(count)
    }
}
