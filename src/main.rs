//! # Remapper
//!
//! Remap keyboard, mouse and gamepad input on Linux.
//!
//! Grabs the configured input devices, applies the mappings from the
//! configuration file and writes the result to virtual uinput devices.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Parse arguments and set up logging
//!    - Load configuration
//!    - Create the virtual output devices and spawn the output multiplexer
//!
//! 2. **Injection**
//!    - One task per source device, each with its own handler graph
//!    - A lost device ends its task; the others keep running
//!
//! 3. **Graceful Shutdown**
//!    - Ctrl+C signals every injection task to stop
//!    - Each task releases held keys and stops motion before it returns
//!
//! # Examples
//!
//! ```bash
//! remapper --config remapper.toml
//! RUST_LOG=debug remapper --config remapper.toml --device /dev/input/event5
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use remapper::config::{Config, DeviceConfig};
use remapper::injection::source::EvdevSource;
use remapper::injection::Injector;
use remapper::output::{device, OutputMultiplexer};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "remapper", version, about = "Remap input devices through evdev and uinput")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "/etc/remapper/remapper.toml")]
    config: PathBuf,

    /// Input device path, overrides the devices listed in the configuration
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// Also write logs to a daily rotated file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// Log file name prefix inside `--log-dir`
const LOG_FILE_PREFIX: &str = "remapper.log";

/// Initialize logging; the returned guard flushes the log file on drop
fn init_logging(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let stdout = fmt::layer();

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stdout).init();
            None
        }
    }
}

/// Devices to grab: the `--device` override, or the configured list
fn source_devices(args: &Args, config: &Config) -> Vec<DeviceConfig> {
    match &args.device {
        Some(path) => vec![DeviceConfig {
            path: path.to_string_lossy().into_owned(),
            name: String::new(),
        }],
        None => config.devices.clone(),
    }
}

fn open_source(device: &DeviceConfig) -> remapper::error::Result<EvdevSource> {
    if device.path.is_empty() {
        EvdevSource::find(&device.name)
    } else {
        EvdevSource::open(&device.path)
    }
}

/// Signals every injection task to stop. Returns whether any task was
/// still listening.
fn request_stop(stop: &watch::Sender<bool>) -> bool {
    match stop.send(true) {
        Ok(()) => true,
        Err(e) => {
            debug!("No injection task left to stop: {}", e);
            false
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.log_dir.as_ref());

    info!("Remapper v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    // Motion loops and device loops are cooperative tasks on one thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(run(args, config))
}

async fn run(args: Args, config: Config) -> Result<()> {
    let devices = source_devices(&args, &config);
    if devices.is_empty() {
        bail!("No input devices configured, use [[devices]] or --device");
    }

    let outputs = device::create_default_outputs().context("Failed to create virtual devices (is /dev/uinput writable?)")?;
    let (output, multiplexer) = OutputMultiplexer::spawn(outputs);

    let mappings: Vec<_> = config.mappings.into_iter().map(Arc::new).collect();
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    for device in &devices {
        let mut source = match open_source(device) {
            Ok(source) => source,
            Err(e) => {
                error!("Cannot open input device {:?}: {}", device, e);
                continue;
            }
        };

        let name = if device.path.is_empty() { device.name.clone() } else { device.path.clone() };
        let injector = Injector::new(
            name,
            mappings.clone(),
            output.clone(),
            config.injection.forward_target.clone(),
        )?;
        let stop = stop_rx.clone();

        tasks.spawn(async move {
            let result = injector.run(&mut source, stop).await;
            (injector.device().to_string(), result)
        });
    }

    if tasks.is_empty() {
        bail!("None of the configured input devices could be opened");
    }
    drop(output);

    info!("Remapping {} device(s), press Ctrl+C to exit", tasks.len());

    loop {
        tokio::select! {
            finished = tasks.join_next() => match finished {
                Some(Ok((device, Ok(())))) => info!("Injection for {} finished", device),
                Some(Ok((device, Err(e)))) => error!("Injection for {} failed: {}", device, e),
                Some(Err(e)) => error!("Injection task panicked: {}", e),
                None => {
                    warn!("All input devices are gone");
                    break;
                }
            },

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                request_stop(&stop_tx);
                while let Some(finished) = tasks.join_next().await {
                    if let Ok((device, Err(e))) = finished {
                        error!("Injection for {} failed: {}", device, e);
                    }
                }
                break;
            }
        }
    }

    // handles are gone once every injector is, the multiplexer then drains and exits
    if let Err(e) = multiplexer.await {
        warn!("Output multiplexer ended abnormally: {}", e);
    }

    Ok(())
}
