//! Config file hot reload
//!
//! File events are coalesced and the file is re-read after a short settle
//! delay. Only reloads that touch live settings (input mode, reactivity)
//! reach the session; edits to settings fixed at startup are reported and
//! otherwise ignored.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use super::AppConfig;

/// Wait after the first file event before reading, so multi-step editor
/// saves land as one reload
const SETTLE: Duration = Duration::from_millis(100);

/// Watches the config file and yields configs with live changes
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load `config_path` and start watching it
    pub async fn new(config_path: String) -> Result<(Self, Arc<AppConfig>)> {
        let initial_config = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        let (touch_tx, touch_rx) = mpsc::unbounded_channel::<()>();
        let (tx, rx) = mpsc::channel(10);

        // Runs on notify's own thread; only signals the reload task
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                    trace!("Config file event: {:?}", event.paths);
                    let _ = touch_tx.send(());
                }
                Ok(_) => {}
                Err(e) => error!("Watch error: {}", e),
            }
        })?;

        watcher
            .watch(Path::new(&config_path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", config_path))?;

        tokio::spawn(reload_loop(
            config_path.clone(),
            initial_config.clone(),
            touch_rx,
            tx,
        ));

        info!("Config file watcher started for: {}", config_path);

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            Arc::new(initial_config),
        ))
    }

    /// Wait for the next config with live changes.
    /// Returns None once the watcher is gone.
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

/// Re-read the file on every burst of events.
///
/// `running` is the startup config: restart-only fields are always compared
/// against it, since the session never picks them up. Live fields are
/// compared against the last config sent.
async fn reload_loop(
    path: String,
    running: AppConfig,
    mut touches: mpsc::UnboundedReceiver<()>,
    tx: mpsc::Sender<AppConfig>,
) {
    let mut applied = running.clone();

    while touches.recv().await.is_some() {
        tokio::time::sleep(SETTLE).await;
        while touches.try_recv().is_ok() {}

        let new_config = match AppConfig::load(&path).await {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to reload config (keeping old config): {:#}", e);
                continue;
            }
        };

        let restart = new_config.restart_required_changes(&running);
        if !restart.is_empty() {
            warn!(
                "⚠️  {} changed in {}; restart to apply",
                restart.join(", "),
                path
            );
        }

        if !new_config.has_live_changes(&applied) {
            debug!("Config reload has no live changes");
            continue;
        }

        info!(
            "Configuration reloaded: mode {} → {}, reactivity {} → {}",
            applied.input.mode,
            new_config.input.mode,
            applied.input.reactivity,
            new_config.input.reactivity
        );
        applied = new_config.clone();

        if tx.send(new_config).await.is_err() {
            break;
        }
    }

    debug!("Config reload task stopped");
}
