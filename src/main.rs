//! reactive-mod - MIDI and audio driven modulation for real-time visuals
//!
//! Connects a MIDI controller, runs the frame loop and serves a small REPL
//! for MIDI learn and inspection.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod sniffer;

use reactive_mod::config::{AppConfig, ConfigWatcher};
use reactive_mod::midi::MidiInputDevice;
use reactive_mod::Session;

/// Reactive modulation engine - drive visual parameters from MIDI and audio
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// MIDI input port (index or name substring), overrides the config
    #[arg(short, long, env = "MIDI_INPUT_PORT")]
    port: Option<String>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Print every incoming MIDI event
    #[arg(long)]
    monitor: bool,

    /// Run without the interactive prompt
    #[arg(long)]
    no_repl: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    if args.list_ports {
        sniffer::list_ports_formatted();
        return Ok(());
    }

    info!("Starting reactive-mod v{}...", env!("CARGO_PKG_VERSION"));

    // Hot reload only when there is a file to watch
    let (config_watcher, config) = if Path::new(&args.config).exists() {
        let (watcher, config) = ConfigWatcher::new(args.config.clone()).await?;
        info!("Configuration loaded from {} with hot-reload enabled", args.config);
        (Some(watcher), (*config).clone())
    } else {
        warn!("⚠️  {} not found, running with defaults", args.config);
        (None, AppConfig::default())
    };

    let session = Arc::new(Session::from_config(&config));
    info!(
        "Session ready: {} layer(s), {} LFO(s), input mode {}",
        session.store().layers().len(),
        session.store().lfos().len(),
        session.aggregator().mode()
    );

    if args.monitor {
        sniffer::attach_monitor(session.decoder());
    }

    // A missing or failing device leaves MIDI unavailable; the rest keeps running
    let mut device = MidiInputDevice::new(session.decoder().clone());
    match args.port.as_deref().or(config.midi.input_port.as_deref()) {
        Some(pattern) => match device.select_input(pattern) {
            Ok(port) => info!("✅ MIDI input connected: {}", port.name),
            Err(e) => warn!("MIDI input unavailable: {}", e),
        },
        None => info!("No MIDI input configured (use --port or midi.input_port)"),
    }

    run_app(
        session,
        &config,
        config_watcher,
        !args.no_repl,
        shutdown_signal(),
    )
    .await?;

    device.disconnect();
    info!("reactive-mod shutdown complete");
    Ok(())
}

async fn run_app(
    session: Arc<Session>,
    config: &AppConfig,
    mut config_watcher: Option<ConfigWatcher>,
    repl: bool,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let mut frames = tokio::time::interval(config.frame_interval());
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut repl_task = if repl {
        let session = session.clone();
        Some(tokio::task::spawn_blocking(move || cli::run_repl(&session)))
    } else {
        None
    };

    info!("Frame loop running at {} fps", config.frame.fps);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = frames.tick() => {
                let frame = session.frame(session.elapsed(), session.reactivity());
                debug!(
                    "t={:.3} intensity={:.3} bass={:.3} mid={:.3} treble={:.3} notes={} lfos={:?}",
                    frame.time,
                    frame.intensity.intensity,
                    frame.intensity.bass,
                    frame.intensity.mid,
                    frame.intensity.treble,
                    frame.held_notes,
                    frame.lfos
                );
            }

            Some(new_config) = next_config(&mut config_watcher) => {
                info!("📝 Configuration file changed, applying input settings");
                session.apply_config(&new_config);
            }

            result = join_repl(&mut repl_task) => {
                match result {
                    Ok(Ok(())) => info!("REPL closed"),
                    Ok(Err(e)) => warn!("REPL failed: {:#}", e),
                    Err(e) => warn!("REPL task panicked: {}", e),
                }
                break;
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping frame loop");
                break;
            }
        }
    }

    Ok(())
}

async fn next_config(watcher: &mut Option<ConfigWatcher>) -> Option<AppConfig> {
    match watcher {
        Some(watcher) => watcher.next_config().await,
        None => std::future::pending().await,
    }
}

async fn join_repl(
    task: &mut Option<tokio::task::JoinHandle<Result<()>>>,
) -> std::result::Result<Result<()>, tokio::task::JoinError> {
    match task {
        Some(handle) => {
            let result = handle.await;
            *task = None;
            result
        }
        None => std::future::pending().await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
