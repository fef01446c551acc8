//! Inbound transport events and outbound registration notifications

use crate::types::{Endpoint, RegistrationSnapshot};

/// Callbacks delivered by the push-transport library, as one enum
///
/// `instance` is the transport's registration instance tag. It is carried
/// for logging only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport handed out a (possibly unchanged) endpoint
    NewEndpoint { endpoint: Endpoint, instance: String },

    /// Registration with the transport was not possible (e.g. no network)
    RegistrationFailed { instance: String },

    /// The transport revoked our registration; fall back to the primary transport
    Unregistered { instance: String },

    /// A push message arrived. The payload is opaque and decrypted downstream.
    Message { payload: Vec<u8>, instance: String },
}

impl TransportEvent {
    /// Returns a short string label for this event type (for logging/debugging).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::NewEndpoint { .. } => "new_endpoint",
            Self::RegistrationFailed { .. } => "registration_failed",
            Self::Unregistered { .. } => "unregistered",
            Self::Message { .. } => "message",
        }
    }

    pub fn instance(&self) -> &str {
        match self {
            Self::NewEndpoint { instance, .. }
            | Self::RegistrationFailed { instance }
            | Self::Unregistered { instance }
            | Self::Message { instance, .. } => instance,
        }
    }
}

/// Notifications broadcast to observers of the registration state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// Endpoint or status changed; carries the state right after the change
    RegistrationChanged(RegistrationSnapshot),
}

impl RegistrationEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RegistrationChanged(_) => "registration_changed",
        }
    }
}
