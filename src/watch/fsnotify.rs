//! Push-based watching over kernel change notification (the `notify`
//! crate). Low latency; a single logical file replacement may fan out
//! into several raw `Changed` signals, which the supervisor's debounce
//! absorbs.

use std::path::Path;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

use super::{PathWatcher, WatchError, WatchSignal, WatcherParts};

/// Kernel-notification watcher. Dropping (or closing) it stops the
/// backend thread, which in turn closes the signal channel.
pub struct NotifyWatcher {
    inner: Option<RecommendedWatcher>,
}

impl NotifyWatcher {
    /// Create the backend and the signal channel it feeds.
    pub fn create() -> Result<WatcherParts, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel::<WatchSignal>();

        let inner = notify::recommended_watcher(
            move |res: Result<notify::Event, notify::Error>| {
                let signal = match res {
                    // Access events fire on every read of the binary;
                    // only content-level events count as a change.
                    Ok(event) if matches!(event.kind, EventKind::Access(_)) => return,
                    Ok(_) => WatchSignal::Changed,
                    Err(source) => WatchSignal::Error(WatchError::Backend { source }),
                };
                // Receiver gone means the supervisor already tore down.
                let _ = tx.send(signal);
            },
        )
        .map_err(|source| WatchError::Init { source })?;

        Ok((Box::new(NotifyWatcher { inner: Some(inner) }), rx))
    }
}

impl PathWatcher for NotifyWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        let Some(watcher) = self.inner.as_mut() else {
            return Err(WatchError::Register {
                path: path.to_path_buf(),
                source: notify::Error::generic("watcher is closed"),
            });
        };
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Register {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "watching via kernel notification");
        Ok(())
    }

    fn close(&mut self) {
        self.inner = None;
    }
}
