//! Loading and initializing `config.toml`

use std::path::Path;

use relaypush_core::prelude::*;

use super::types::Settings;

/// Default config directory, relative to the working directory
pub const DEFAULT_CONFIG_DIR: &str = ".relaypush";

pub const CONFIG_FILENAME: &str = "config.toml";

const DEFAULT_CONFIG: &str = r#"# relaypush configuration

[transport]
enabled = true                  # Deliver through the alternate transport

[fetch]
foreground_mandatory = false    # Foreground fetch for every message
platform_requires_foreground = true
cooldown_secs = 180             # Minimum spacing of cooldown foreground fetches

[hooks]
# Commands as argv arrays. Exit codes:
#   register:      0 = registered, 2 = relay rejected the endpoint, else error
#   enqueue_fetch: 0 = accepted, anything else = refused (legacy pull follows)
# The endpoint is passed in $RELAYPUSH_ENDPOINT, the fetch strategy in
# $RELAYPUSH_FETCH (foreground|background).
register = []
enqueue_fetch = []
legacy_pull = []

[store]
path = "state.json"             # Relative to this directory
"#;

/// Load settings from `<config_dir>/config.toml`
///
/// A missing or unreadable file yields the defaults.
pub fn load_settings(config_dir: &Path) -> Settings {
    let config_path = config_dir.join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Create `config_dir` and write a commented default `config.toml`
///
/// An existing config file is left untouched. Returns whether a file was
/// written.
pub fn init_config_dir(config_dir: &Path) -> Result<bool> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).map_err(|e| {
            Error::config(format!("Failed to create {}: {}", config_dir.display(), e))
        })?;
    }

    let config_path = config_dir.join(CONFIG_FILENAME);
    if config_path.exists() {
        debug!("Keeping existing {:?}", config_path);
        return Ok(false);
    }

    std::fs::write(&config_path, DEFAULT_CONFIG)
        .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
    info!("Wrote default config to {:?}", config_path);
    Ok(true)
}
