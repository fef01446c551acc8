//! relaypush - push-registration and message-fetch daemon
//!
//! The `relaypushd` binary is a thin wrapper around [`run_headless`]. All
//! registration and fetch logic lives in `relaypush-app`; the commands that
//! talk to the relay and the fetch service come from `relaypush-hooks`.

pub mod headless;
pub mod signals;

pub use headless::runner::{apply_input, open_store, run_headless, MEMORY_STATE};
pub use headless::{HeadlessAlerter, HeadlessEvent, HeadlessInput};
