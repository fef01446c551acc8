//! # relaypush-core - Core Domain Types
//!
//! Foundation crate for relaypush. Provides domain types, error handling,
//! event definitions and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing, dirs).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`Endpoint`] - Opaque relay-facing address of this device
//! - [`RegistrationStatus`] - Closed set of registration states
//! - [`RelayError`] - Failure taxonomy of a relay registration attempt
//! - [`AlertKind`] - User-visible notifications
//! - [`FetchStrategy`] - Foreground vs background message fetch
//! - [`RegistrationSnapshot`] - Endpoint and status read together
//!
//! ### Events (`events`)
//! - [`TransportEvent`] - Inbound callbacks from the push transport
//! - [`RegistrationEvent`] - Outbound registration-changed notifications
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use relaypush_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all relaypush crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use events::{RegistrationEvent, TransportEvent};
pub use types::{
    AlertKind, Endpoint, FetchStrategy, RegistrationSnapshot, RegistrationStatus, RelayError,
};
