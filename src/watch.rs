//! Generic debounced re-run harness.
//!
//! [`run_and_watch`] runs a unit of work once, then re-runs it whenever the
//! watched paths change. Change notifications are coalesced with a
//! trailing-edge debounce: every notification inside the window resets it,
//! and one re-run fires after the burst quiets down.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, error, info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Error running watch command: {0}")]
    Watch(#[from] notify::Error),
    #[error("Invalid watch pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Options for a watch session. `watch_paths` are glob patterns; everything
/// they expand to at session start is handed to the watch primitive.
pub struct WatchOptions {
    pub watch_paths: Vec<String>,
    pub debounce: Duration,
    pub recursive: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            watch_paths: Vec::new(),
            debounce: Duration::from_millis(500),
            recursive: true,
        }
    }
}

/// Run `work` once immediately, then re-run it (debounced) on every change
/// notification under the watched paths.
///
/// Under normal operation the returned future never resolves: watch mode is
/// designed to run until the process receives an external termination
/// signal. Callers wanting a stop path should select against one (the
/// `node-watch` command selects against Ctrl-C).
///
/// # Errors
///
/// Returns `WatchError` if a watch pattern is invalid or the watcher cannot
/// be registered. Errors after startup are logged, not returned.
pub async fn run_and_watch<F>(mut work: F, opts: WatchOptions) -> Result<(), WatchError>
where
    F: FnMut(),
{
    // Initial execution, before any notification can arrive.
    work();

    let (tx, rx) = mpsc::channel(100);
    let _watcher = start_notify_watcher(&opts, tx)?;

    debounce_loop(rx, opts.debounce, work).await;
    Ok(())
}

/// Register a notify watcher for every path the patterns expand to. The
/// returned watcher must be kept alive for the session.
fn start_notify_watcher(
    opts: &WatchOptions,
    tx: mpsc::Sender<PathBuf>,
) -> Result<RecommendedWatcher, WatchError> {
    info!("Starting file watcher");
    let mut watcher =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if !(event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove()) {
                    return;
                }
                for path in event.paths {
                    debug!("Change notification: {}", path.display());
                    if let Err(e) = tx.blocking_send(path) {
                        error!("Failed to forward watch event: {e}");
                    }
                }
            }
            Err(e) => error!("Watch error: {e:?}"),
        })?;

    let mode = if opts.recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };

    for pattern in &opts.watch_paths {
        for entry in glob::glob(pattern)? {
            match entry {
                Ok(path) => {
                    info!("Watching path: {}", path.display());
                    watcher.watch(&path, mode).map_err(|e| {
                        error!("Failed to watch path {}: {e}", path.display());
                        WatchError::Watch(e)
                    })?;
                }
                Err(e) => warn!("Skipping unreadable watch entry: {e}"),
            }
        }
    }

    Ok(watcher)
}

/// Trailing-edge debounce: the first notification opens a window, every
/// further notification before `debounce` elapses resets it, and `work`
/// runs exactly once when the window goes quiet. Returns when the sender
/// side is dropped.
pub(crate) async fn debounce_loop<F>(
    mut rx: mpsc::Receiver<PathBuf>,
    debounce: Duration,
    mut work: F,
) where
    F: FnMut(),
{
    while let Some(path) = rx.recv().await {
        debug!("Debounce window opened by {}", path.display());
        loop {
            match tokio::time::timeout(debounce, rx.recv()).await {
                // Another notification inside the window resets it.
                Ok(Some(_)) => {}
                // Channel closed; run the pending work and stop.
                Ok(None) => {
                    work();
                    return;
                }
                // Window went quiet: one coalesced re-run.
                Err(_) => {
                    work();
                    break;
                }
            }
        }
    }
}
