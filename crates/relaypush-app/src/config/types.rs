//! Configuration types for relaypush
//!
//! Defines:
//! - `Settings` - contents of `config.toml`
//! - `TransportSettings`, `FetchSettings`, `HookSettings`, `StoreSettings`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetch::FetchPolicy;

/// Global daemon settings from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub transport: TransportSettings,

    #[serde(default)]
    pub fetch: FetchSettings,

    #[serde(default)]
    pub hooks: HookSettings,

    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TransportSettings {
    /// Master switch for the alternate transport delivery path
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FetchSettings {
    /// Fetch in the foreground for every message
    #[serde(default)]
    pub foreground_mandatory: bool,

    /// Periodic foreground fetches are needed for reliable delivery
    #[serde(default = "default_true")]
    pub platform_requires_foreground: bool,

    /// Seconds between cooldown-driven foreground fetches
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            foreground_mandatory: false,
            platform_requires_foreground: true,
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl FetchSettings {
    pub fn policy(&self) -> FetchPolicy {
        FetchPolicy {
            foreground_mandatory: self.foreground_mandatory,
            platform_requires_foreground: self.platform_requires_foreground,
            cooldown: Duration::from_secs(self.cooldown_secs),
        }
    }
}

/// External commands, as argv arrays; empty means not configured
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HookSettings {
    #[serde(default)]
    pub register: Vec<String>,

    #[serde(default)]
    pub enqueue_fetch: Vec<String>,

    #[serde(default)]
    pub legacy_pull: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreSettings {
    /// State file; relative paths resolve against the config dir
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl StoreSettings {
    pub fn resolve(&self, config_dir: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            config_dir.join(&self.path)
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cooldown_secs() -> u64 {
    180
}

fn default_store_path() -> PathBuf {
    PathBuf::from("state.json")
}
