//! Message fetching through external commands

use relaypush_app::config::HookSettings;
use relaypush_app::FetchManager;
use relaypush_core::prelude::*;
use relaypush_core::FetchStrategy;

use crate::command::HookCommand;

/// Environment variable carrying the fetch strategy
pub const FETCH_ENV: &str = "RELAYPUSH_FETCH";

/// Runs the `enqueue_fetch` and `legacy_pull` hooks
#[derive(Debug, Clone)]
pub struct CommandFetchManager {
    enqueue: HookCommand,
    legacy_pull: HookCommand,
}

impl CommandFetchManager {
    pub fn new(enqueue: HookCommand, legacy_pull: HookCommand) -> Self {
        Self {
            enqueue,
            legacy_pull,
        }
    }

    pub fn from_settings(hooks: &HookSettings) -> Result<Self> {
        Ok(Self::new(
            HookCommand::from_argv("enqueue_fetch", &hooks.enqueue_fetch)?,
            HookCommand::from_argv("legacy_pull", &hooks.legacy_pull)?,
        ))
    }
}

impl FetchManager for CommandFetchManager {
    /// Exit 0 is accepted, any other exit is a refusal
    async fn enqueue(&self, strategy: FetchStrategy) -> Result<bool> {
        let output = self.enqueue.run(&[(FETCH_ENV, strategy.label())]).await?;
        if !output.success() {
            debug!(%strategy, code = ?output.code, "Enqueue hook refused fetch");
        }
        Ok(output.success())
    }

    async fn legacy_pull(&self) -> Result<()> {
        let output = self.legacy_pull.run(&[]).await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::hook(format!(
                "legacy pull exited with {:?}: {}",
                output.code, output.stderr
            )))
        }
    }
}
