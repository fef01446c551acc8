//! Termination signals
//!
//! SIGINT and SIGTERM (Ctrl+C on Windows) become a [`HeadlessInput::Quit`]
//! on the same channel stdin feeds. The runner therefore shuts down the same
//! way for a signal as for `{"event":"quit"}`: it waits for the worker to go
//! idle and emits `stopped`.

use std::future::Future;

use relaypush_core::prelude::*;
use tokio::sync::mpsc;

use crate::headless::HeadlessInput;

/// Listen for termination signals in the background
pub fn spawn_signal_handler(tx: mpsc::Sender<HeadlessInput>) {
    tokio::spawn(forward_quit(wait_for_signal(), tx));
}

/// Send `Quit` once `signal` resolves; a failed listener sends nothing
async fn forward_quit<S>(signal: S, tx: mpsc::Sender<HeadlessInput>)
where
    S: Future<Output = Result<()>>,
{
    if let Err(e) = signal.await {
        error!("Signal handler error: {}", e);
        return;
    }

    info!("Shutdown signal received");
    if tx.send(HeadlessInput::Quit).await.is_err() {
        debug!("Runner already gone, dropping quit request");
    }
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
        Ok(())
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C");
        Ok(())
    }
}
