//! Relay registration through an external command

use relaypush_app::config::HookSettings;
use relaypush_app::RelayRegistrar;
use relaypush_core::prelude::*;
use relaypush_core::{Endpoint, RegistrationStatus, RelayError};

use crate::command::HookCommand;

/// Environment variable carrying the endpoint to register
pub const ENDPOINT_ENV: &str = "RELAYPUSH_ENDPOINT";

/// Exit code a register hook uses to say the relay rejected the endpoint
pub const EXIT_REJECTED: i32 = 2;

/// Runs the `register` hook once per registration attempt
///
/// Exit 0 is `Registered`, [`EXIT_REJECTED`] is `MissingEndpoint`, every
/// other outcome (including a hook that cannot be started) is
/// `InternalError`.
#[derive(Debug, Clone)]
pub struct CommandRegistrar {
    command: HookCommand,
}

impl CommandRegistrar {
    pub fn new(command: HookCommand) -> Self {
        Self { command }
    }

    pub fn from_settings(hooks: &HookSettings) -> Result<Self> {
        Ok(Self::new(HookCommand::from_argv("register", &hooks.register)?))
    }

    async fn attempt(&self, endpoint: &Endpoint) -> std::result::Result<(), RelayError> {
        let output = self
            .command
            .run(&[(ENDPOINT_ENV, endpoint.as_str())])
            .await
            .map_err(|e| RelayError::TransientNetwork(e.to_string()))?;

        match output.code {
            Some(0) => Ok(()),
            Some(EXIT_REJECTED) => Err(RelayError::Rejected(output.stderr)),
            code => Err(RelayError::TransientNetwork(format!(
                "register hook exited with {:?}: {}",
                code, output.stderr
            ))),
        }
    }
}

impl RelayRegistrar for CommandRegistrar {
    async fn register(&self, endpoint: Option<Endpoint>) -> RegistrationStatus {
        let Some(endpoint) = endpoint else {
            warn!("No endpoint stored, nothing to register");
            return RegistrationStatus::MissingEndpoint;
        };

        let result = self.attempt(&endpoint).await;
        if let Err(e) = &result {
            warn!(%endpoint, "Relay registration failed: {}", e);
        }
        RegistrationStatus::from_relay_result(result)
    }
}
