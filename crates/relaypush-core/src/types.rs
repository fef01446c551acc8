//! Domain types for relay registration and message fetching

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Address the relay uses to reach this device over the alternate transport
///
/// Opaque to this crate: it is compared and stored, never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Endpoint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Registration state of the alternate transport
///
/// The variant order is the persisted ordinal; append new variants at the
/// end only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Nothing set up yet
    #[default]
    Unconfigured,
    /// User runs without a relay; endpoint changes are only reported
    AirGapped,
    /// Relay accepted the current endpoint
    Registered,
    /// Last registration did not reach the relay
    InternalError,
    /// Relay rejected the endpoint (invalid or missing)
    MissingEndpoint,
}

impl RegistrationStatus {
    /// All statuses in ordinal order
    pub const ALL: [RegistrationStatus; 5] = [
        RegistrationStatus::Unconfigured,
        RegistrationStatus::AirGapped,
        RegistrationStatus::Registered,
        RegistrationStatus::InternalError,
        RegistrationStatus::MissingEndpoint,
    ];

    /// Persisted ordinal of this status
    pub fn ordinal(self) -> u8 {
        match self {
            RegistrationStatus::Unconfigured => 0,
            RegistrationStatus::AirGapped => 1,
            RegistrationStatus::Registered => 2,
            RegistrationStatus::InternalError => 3,
            RegistrationStatus::MissingEndpoint => 4,
        }
    }

    /// Status for a persisted ordinal; unknown ordinals read as `Unconfigured`
    pub fn from_ordinal(ordinal: u8) -> Self {
        Self::ALL
            .get(usize::from(ordinal))
            .copied()
            .unwrap_or_default()
    }

    /// Map the outcome of a relay round-trip to the status to persist
    pub fn from_relay_result(result: Result<(), RelayError>) -> Self {
        match result {
            Ok(()) => RegistrationStatus::Registered,
            Err(err) => err.into(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RegistrationStatus::Unconfigured => "unconfigured",
            RegistrationStatus::AirGapped => "air_gapped",
            RegistrationStatus::Registered => "registered",
            RegistrationStatus::InternalError => "internal_error",
            RegistrationStatus::MissingEndpoint => "missing_endpoint",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a relay registration attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The request never reached the relay (DNS, TLS, timeout, 5xx)
    #[error("relay unreachable: {0}")]
    TransientNetwork(String),

    /// The relay refused the endpoint
    #[error("relay rejected endpoint: {0}")]
    Rejected(String),
}

impl From<RelayError> for RegistrationStatus {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::TransientNetwork(_) => RegistrationStatus::InternalError,
            RelayError::Rejected(_) => RegistrationStatus::MissingEndpoint,
        }
    }
}

/// User-visible notifications raised by the registration state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Endpoint changed while air-gapped; the user must forward it by hand
    EndpointChangedAirGapped,
    /// Endpoint changed and re-registering with the relay failed
    EndpointChangedError,
    /// The transport could not register at all (e.g. no network)
    RegistrationFailed,
}

/// How a message fetch is requested from the fetch manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// OS-visible foreground service fetch
    Foreground,
    /// Plain background enqueue
    Background,
}

impl FetchStrategy {
    pub fn is_foreground(self) -> bool {
        matches!(self, FetchStrategy::Foreground)
    }

    pub fn label(self) -> &'static str {
        match self {
            FetchStrategy::Foreground => "foreground",
            FetchStrategy::Background => "background",
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Point-in-time view of the persisted registration state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistrationSnapshot {
    pub endpoint: Option<Endpoint>,
    pub status: RegistrationStatus,
}
