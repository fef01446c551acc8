//! relaypushd - alternate push-transport registration daemon
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use relaypush::HeadlessEvent;
use relaypush_app::config::{init_config_dir, CONFIG_FILENAME, DEFAULT_CONFIG_DIR};
use tracing::{error, info};

/// relaypushd - keeps the relay registration current and dispatches message fetches
#[derive(Parser, Debug)]
#[command(name = "relaypushd")]
#[command(about = "Alternate push-transport registration and fetch daemon", long_about = None)]
struct Args {
    /// Directory holding config.toml
    #[arg(long, value_name = "DIR", default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    /// State file, overriding [store].path (":memory:" keeps state in memory)
    #[arg(long, value_name = "FILE")]
    state: Option<PathBuf>,

    /// Write a default config.toml into the config dir and exit
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    if args.init {
        let path = args.config_dir.join(CONFIG_FILENAME);
        if init_config_dir(&args.config_dir)? {
            eprintln!("Wrote {}", path.display());
        } else {
            eprintln!("{} already exists, left unchanged", path.display());
        }
        return Ok(());
    }

    // Logs go to a file; stdout carries the NDJSON stream.
    if let Err(e) = relaypush_core::logging::init() {
        eprintln!("Logging disabled: {}", e);
    }

    let result = relaypush::run_headless(&args.config_dir, args.state).await;

    if let Err(ref e) = result {
        error!("relaypushd failed: {:?}", e);
        HeadlessEvent::error(e.to_string(), e.is_fatal()).emit();
    }

    info!("relaypushd exiting");
    Ok(result?)
}
