//! relaypush-hooks - Child-process collaborators
//!
//! Implements [`relaypush_app::RelayRegistrar`] and
//! [`relaypush_app::FetchManager`] by running the commands configured in the
//! `[hooks]` section of `config.toml`. This keeps the HTTP relay client and
//! the fetch service outside relaypush.
//!
//! Hooks are started with stdin closed and their output captured. There is
//! no timeout: a hook that never exits stalls the shared worker.

pub mod command;
pub mod fetcher;
pub mod registrar;

pub use command::{HookCommand, HookOutput};
pub use fetcher::{CommandFetchManager, FETCH_ENV};
pub use registrar::{CommandRegistrar, ENDPOINT_ENV, EXIT_REJECTED};
