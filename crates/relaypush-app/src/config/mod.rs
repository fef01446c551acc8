//! Configuration file parsing for relaypush
//!
//! Supports `<config-dir>/config.toml` (default `.relaypush/config.toml`).

pub mod settings;
pub mod types;

pub use settings::{init_config_dir, load_settings, CONFIG_FILENAME, DEFAULT_CONFIG_DIR};
pub use types::*;
