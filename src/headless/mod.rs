//! Headless mode - NDJSON on stdin and stdout
//!
//! `relaypushd` is driven by a host process that owns the real push
//! transport. The host writes transport callbacks and control requests to
//! stdin, one JSON object per line, and reads registration changes and user
//! alerts from stdout.
//!
//! # Input
//!
//! ```json
//! {"event":"new_endpoint","endpoint":"https://push.example/abc","instance":"default"}
//! {"event":"registration_failed"}
//! {"event":"unregistered","instance":"work"}
//! {"event":"message","payload":"b64...","instance":"default"}
//! {"event":"retry"}
//! {"event":"air_gapped","enabled":true}
//! {"event":"quit"}
//! ```
//!
//! # Output
//!
//! ```json
//! {"event":"ready","endpoint":null,"status":"unconfigured","timestamp":1704700001000}
//! {"event":"registration_changed","endpoint":"https://push.example/abc","status":"registered","timestamp":1704700002000}
//! {"event":"alert","kind":"endpoint_changed_error","timestamp":1704700003000}
//! ```

pub mod runner;

use std::io::{self, Write};

use chrono::Utc;
use relaypush_app::Alerter;
use relaypush_core::prelude::*;
use relaypush_core::{AlertKind, Endpoint, RegistrationSnapshot, RegistrationStatus, TransportEvent};
use serde::{Deserialize, Serialize};

/// Events emitted on stdout
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// State loaded, accepting input
    Ready {
        endpoint: Option<Endpoint>,
        status: RegistrationStatus,
        timestamp: i64,
    },

    /// Endpoint or status changed
    RegistrationChanged {
        endpoint: Option<Endpoint>,
        status: RegistrationStatus,
        timestamp: i64,
    },

    /// Something the user should be told about
    Alert { kind: AlertKind, timestamp: i64 },

    /// Error occurred
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },

    /// Shutting down; all queued work has finished
    Stopped { dropped_tasks: u64, timestamp: i64 },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn ready(snapshot: RegistrationSnapshot) -> Self {
        Self::Ready {
            endpoint: snapshot.endpoint,
            status: snapshot.status,
            timestamp: Self::now(),
        }
    }

    pub fn registration_changed(snapshot: RegistrationSnapshot) -> Self {
        Self::RegistrationChanged {
            endpoint: snapshot.endpoint,
            status: snapshot.status,
            timestamp: Self::now(),
        }
    }

    pub fn alert(kind: AlertKind) -> Self {
        Self::Alert {
            kind,
            timestamp: Self::now(),
        }
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            fatal,
            timestamp: Self::now(),
        }
    }

    pub fn stopped(dropped_tasks: u64) -> Self {
        Self::Stopped {
            dropped_tasks,
            timestamp: Self::now(),
        }
    }
}

fn default_instance() -> String {
    "default".to_string()
}

/// Requests read from stdin
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessInput {
    NewEndpoint {
        endpoint: Endpoint,
        #[serde(default = "default_instance")]
        instance: String,
    },
    RegistrationFailed {
        #[serde(default = "default_instance")]
        instance: String,
    },
    Unregistered {
        #[serde(default = "default_instance")]
        instance: String,
    },
    /// Payload is opaque text (typically base64) and is not interpreted
    Message {
        #[serde(default)]
        payload: String,
        #[serde(default = "default_instance")]
        instance: String,
    },
    Retry,
    AirGapped {
        enabled: bool,
    },
    Quit,
}

impl HeadlessInput {
    /// Parse one stdin line; blank lines yield `None`
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(trimmed)?))
    }

    /// The transport callback this input stands for, if it is one
    pub fn into_transport_event(self) -> Option<TransportEvent> {
        match self {
            Self::NewEndpoint { endpoint, instance } => {
                Some(TransportEvent::NewEndpoint { endpoint, instance })
            }
            Self::RegistrationFailed { instance } => {
                Some(TransportEvent::RegistrationFailed { instance })
            }
            Self::Unregistered { instance } => Some(TransportEvent::Unregistered { instance }),
            Self::Message { payload, instance } => Some(TransportEvent::Message {
                payload: payload.into_bytes(),
                instance,
            }),
            Self::Retry | Self::AirGapped { .. } | Self::Quit => None,
        }
    }
}

/// Alerts become a warning in the log and an `alert` line on stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessAlerter;

impl Alerter for HeadlessAlerter {
    fn alert(&self, kind: AlertKind) {
        warn!(?kind, "User alert");
        HeadlessEvent::alert(kind).emit();
    }
}
