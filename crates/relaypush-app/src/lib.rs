//! relaypush-app - Registration state and message fetching for relaypush
//!
//! This crate implements the latest-wins executor, the persisted key-value
//! state, the registration state machine, the message-fetch dispatcher, the
//! receiver facade that ties them together, collaborator traits and
//! configuration loading.

pub mod config;
pub mod delivery;
pub mod executor;
pub mod fetch;
pub mod receiver;
pub mod registration;
pub mod services;
pub mod store;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Re-export primary types
pub use delivery::StoreDeliveryPath;
pub use executor::LatestWinsExecutor;
pub use fetch::{FetchDispatcher, FetchJob, FetchOutcome, FetchPolicy, DEFAULT_FOREGROUND_COOLDOWN};
pub use receiver::{PushReceiver, ReceiverServices};
pub use registration::RegistrationMachine;
pub use services::{
    Alerter, Clock, DeliveryPath, EventBus, FetchManager, LocalFetchManager, LocalRelayRegistrar,
    RelayRegistrar, SystemClock,
};
pub use store::{FileStore, InMemoryStore, KeyValueStore, PushValues};
