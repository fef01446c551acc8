//! Headless mode runner - main event loop
//!
//! Wires settings, the state file and the hook commands into a
//! [`PushReceiver`], then feeds it stdin lines until `quit`, end of input or
//! a termination signal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use relaypush_app::config::load_settings;
use relaypush_app::{
    FetchManager, FileStore, InMemoryStore, KeyValueStore, PushReceiver, PushValues,
    ReceiverServices, RelayRegistrar, StoreDeliveryPath,
};
use relaypush_core::prelude::*;
use relaypush_core::RegistrationEvent;
use relaypush_hooks::{CommandFetchManager, CommandRegistrar};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use super::{HeadlessAlerter, HeadlessEvent, HeadlessInput};
use crate::signals::spawn_signal_handler;

/// `--state` value that keeps state in memory only
pub const MEMORY_STATE: &str = ":memory:";

/// Run the daemon until asked to stop
pub async fn run_headless(config_dir: &Path, state_override: Option<PathBuf>) -> Result<()> {
    info!("Config dir: {}", config_dir.display());

    let settings = load_settings(config_dir);
    let state_path = state_override.unwrap_or_else(|| settings.store.resolve(config_dir));
    let values = Arc::new(PushValues::new(open_store(&state_path)?));

    let registrar = Arc::new(CommandRegistrar::from_settings(&settings.hooks)?);
    let fetcher = Arc::new(CommandFetchManager::from_settings(&settings.hooks)?);
    let delivery = Arc::new(StoreDeliveryPath::new(
        Arc::clone(&values),
        settings.transport.enabled,
    ));
    let services = ReceiverServices::new(registrar, fetcher, Arc::new(HeadlessAlerter), delivery);

    let receiver = PushReceiver::new(values, services, settings.fetch.policy());
    let mut events = receiver.subscribe();
    HeadlessEvent::ready(receiver.snapshot()?).emit();

    let (input_tx, mut input_rx) = mpsc::channel::<HeadlessInput>(32);
    spawn_signal_handler(input_tx.clone());
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(input_tx);
    });

    loop {
        tokio::select! {
            input = input_rx.recv() => match input {
                Some(HeadlessInput::Quit) | None => {
                    info!("Quit requested");
                    break;
                }
                Some(input) => apply_input(&receiver, input),
            },
            event = events.recv() => match event {
                Ok(event) => emit_registration_event(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Missed {} registration events", missed);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    receiver.wait_idle().await;
    while let Ok(event) = events.try_recv() {
        emit_registration_event(event);
    }

    HeadlessEvent::stopped(receiver.dropped_tasks()).emit();
    info!("relaypushd headless mode exiting");
    Ok(())
}

/// Open the state store at `path`, or a volatile one for [`MEMORY_STATE`]
pub fn open_store(path: &Path) -> Result<Arc<dyn KeyValueStore>> {
    if path.as_os_str() == MEMORY_STATE {
        info!("Keeping state in memory");
        return Ok(Arc::new(InMemoryStore::new()));
    }

    let store = FileStore::open(path).with_context(|| format!("Opening {}", path.display()))?;
    info!("State file: {}", store.path().display());
    Ok(Arc::new(store))
}

/// Route one stdin request to the receiver
pub fn apply_input<R, F>(receiver: &PushReceiver<R, F>, input: HeadlessInput)
where
    R: RelayRegistrar + Send + Sync + 'static,
    F: FetchManager + Send + Sync + 'static,
{
    match input {
        HeadlessInput::Retry => receiver.retry_registration(),
        HeadlessInput::AirGapped { enabled } => {
            if let Err(e) = receiver.set_air_gapped(enabled) {
                warn!("Failed to switch air-gapped mode: {}", e);
                HeadlessEvent::error(format!("Air-gapped switch failed: {}", e), false).emit();
            }
        }
        HeadlessInput::Quit => {}
        transport => {
            if let Some(event) = transport.into_transport_event() {
                receiver.handle(event);
            }
        }
    }
}

fn emit_registration_event(event: RegistrationEvent) {
    match event {
        RegistrationEvent::RegistrationChanged(snapshot) => {
            HeadlessEvent::registration_changed(snapshot).emit()
        }
    }
}

/// Read NDJSON requests from stdin until EOF (blocking, run on its own thread)
fn spawn_stdin_reader_blocking(tx: mpsc::Sender<HeadlessInput>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        match line {
            Ok(line) => match HeadlessInput::parse_line(&line) {
                Ok(Some(input)) => {
                    let quit = input == HeadlessInput::Quit;
                    if tx.blocking_send(input).is_err() || quit {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Ignoring stdin line {:?}: {}", line, e);
                    HeadlessEvent::error(format!("Invalid input: {}", e), false).emit();
                }
            },
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    info!("Stdin closed");
    let _ = tx.blocking_send(HeadlessInput::Quit);
}
