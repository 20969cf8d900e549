//! Settings file hot reload.
//!
//! Watches the settings file's parent directory (the file may be replaced
//! rather than edited in place), debounces bursts of events, reloads, and
//! publishes the new snapshot through a `watch` channel when it differs from
//! the previous one. Reload failures keep the last good snapshot.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::loader::load_settings_from_path;
use crate::types::OvercastSettings;

/// Quiet period before a burst of file events triggers one reload.
const DEBOUNCE: Duration = Duration::from_millis(200);

/// Live view of the settings file. Dropping it stops watching.
pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
    rx: watch::Receiver<OvercastSettings>,
}

impl SettingsWatcher {
    /// Start watching `path`, seeded with `initial`.
    ///
    /// Creates the parent directory if missing. Must be called inside a
    /// tokio runtime.
    pub fn spawn(path: PathBuf, initial: OvercastSettings) -> Result<Self> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        std::fs::create_dir_all(&dir)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel::<()>();
        let file_name = path.file_name().map(std::ffi::OsStr::to_os_string);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let relevant = (event.kind.is_modify() || event.kind.is_create())
                    && event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(std::ffi::OsStr::to_os_string) == file_name);
                if relevant {
                    let _ = event_tx.send(());
                }
            }
            Err(e) => warn!(error = %e, "settings watch error"),
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let (tx, rx) = watch::channel(initial);
        let task = tokio::spawn(reload_loop(path.clone(), event_rx, tx));
        info!(?path, "watching settings file");

        Ok(Self {
            _watcher: watcher,
            task,
            rx,
        })
    }

    /// Receiver that yields every changed snapshot.
    pub fn subscribe(&self) -> watch::Receiver<OvercastSettings> {
        self.rx.clone()
    }

    /// Latest snapshot.
    pub fn current(&self) -> OvercastSettings {
        self.rx.borrow().clone()
    }
}

impl Drop for SettingsWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn reload_loop(
    path: PathBuf,
    mut events: mpsc::UnboundedReceiver<()>,
    tx: watch::Sender<OvercastSettings>,
) {
    while events.recv().await.is_some() {
        tokio::time::sleep(DEBOUNCE).await;
        while events.try_recv().is_ok() {}

        match load_settings_from_path(&path) {
            Ok(next) => {
                let changed = tx.send_if_modified(|current| {
                    if *current == next {
                        false
                    } else {
                        *current = next;
                        true
                    }
                });
                if changed {
                    info!(?path, "settings reloaded");
                } else {
                    debug!(?path, "settings file touched, no change");
                }
            }
            Err(e) => warn!(?path, error = %e, "settings reload failed, keeping previous"),
        }
    }
}
