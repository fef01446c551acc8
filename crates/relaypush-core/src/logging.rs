//! File logging for the daemon
//!
//! stdout belongs to the NDJSON event stream, so every log line goes to a
//! daily rolling file instead.

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable that overrides the log filter
pub const LOG_ENV_VAR: &str = "RELAYPUSH_LOG";

/// Filter used when `RELAYPUSH_LOG` is unset or unparsable
pub const DEFAULT_FILTER: &str = "relaypush=info,relaypush_app=info,relaypush_hooks=info,warn";

const LOG_FILE_PREFIX: &str = "relaypushd.log";

/// Install the global subscriber writing to [`log_directory`]
///
/// ```bash
/// RELAYPUSH_LOG=debug relaypushd
/// RELAYPUSH_LOG=relaypush_app::executor=trace relaypushd
/// ```
pub fn init() -> Result<()> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
    let env_filter = filter_from(std::env::var(LOG_ENV_VAR).ok().as_deref());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_dir = %log_dir.display(),
        "relaypushd starting"
    );

    Ok(())
}

/// `<data_local_dir>/relaypush/logs`, or `./relaypush/logs` without a home
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("relaypush")
        .join("logs")
}

/// Parse an override, keeping [`DEFAULT_FILTER`] when it is absent or bad
fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
