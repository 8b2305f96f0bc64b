//! Pull-based watching: a tokio task stats the path on a fixed
//! interval and compares mtime + length snapshots. Detection latency is
//! bounded by the interval. A path that briefly vanishes mid-replace is
//! reported as a transient error, and its reappearance as a change.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::{PathWatcher, WatchError, WatchSignal, WatcherParts};

/// What we remember about the file between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    modified: Option<SystemTime>,
    len: u64,
}

impl Snapshot {
    fn of(meta: &std::fs::Metadata) -> Self {
        Snapshot {
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }
}

/// Interval-polling watcher.
pub struct PollWatcher {
    interval: Duration,
    tx: UnboundedSender<WatchSignal>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl PollWatcher {
    /// Create the watcher and the signal channel it feeds. The poll
    /// task itself starts on [`PathWatcher::watch`].
    pub fn create(interval: Duration) -> WatcherParts {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = PollWatcher {
            interval,
            tx,
            shutdown: None,
        };
        (Box::new(watcher), rx)
    }
}

impl PathWatcher for PollWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        let meta = std::fs::metadata(path).map_err(|source| WatchError::Stat {
            path: path.to_path_buf(),
            source,
        })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown = Some(shutdown_tx);

        debug!(path = %path.display(), interval_ms = self.interval.as_millis() as u64, "watching via polling");
        tokio::spawn(poll_loop(
            path.to_path_buf(),
            Snapshot::of(&meta),
            self.interval,
            self.tx.clone(),
            shutdown_rx,
        ));
        Ok(())
    }

    fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The task may already be gone; nothing to do then.
            let _ = shutdown.send(());
        }
    }
}

async fn poll_loop(
    path: PathBuf,
    initial: Snapshot,
    interval: Duration,
    tx: UnboundedSender<WatchSignal>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // None while the path is missing, so reappearance reads as a change.
    let mut last: Option<Snapshot> = Some(initial);

    loop {
        let signal = tokio::select! {
            // Fires on close() and when the handle is dropped.
            _ = &mut shutdown => {
                let _ = tx.send(WatchSignal::Closed);
                return;
            }
            _ = ticker.tick() => match std::fs::metadata(&path) {
                Ok(meta) => {
                    let snapshot = Snapshot::of(&meta);
                    let changed = last.map_or(true, |prev| prev != snapshot);
                    last = Some(snapshot);
                    if changed {
                        Some(WatchSignal::Changed)
                    } else {
                        None
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // Report the disappearance once, then wait for the
                    // replacement file to land.
                    let missing_now = last.take().is_some();
                    missing_now.then(|| {
                        WatchSignal::Error(WatchError::PathMissing { path: path.clone() })
                    })
                }
                Err(source) => Some(WatchSignal::Error(WatchError::Stat {
                    path: path.clone(),
                    source,
                })),
            },
        };

        if let Some(signal) = signal {
            if tx.send(signal).is_err() {
                // Consumer is gone; stop polling.
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tokio::sync::mpsc::UnboundedReceiver;

    const TICK: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_secs(5);

    async fn next_signal(rx: &mut UnboundedReceiver<WatchSignal>) -> WatchSignal {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for a signal")
            .expect("signal channel closed")
    }

    fn watched_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("binary");
        std::fs::write(&path, b"build-1").unwrap();
        path
    }

    #[tokio::test]
    async fn test_watch_missing_path_fails() {
        let (mut watcher, _rx) = PollWatcher::create(TICK);
        let err = watcher
            .watch(Path::new("/nonexistent-dir/no-such-binary"))
            .unwrap_err();
        assert!(matches!(err, WatchError::Stat { .. }));
    }

    #[tokio::test]
    async fn test_content_change_emits_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = watched_file(&dir);

        let (mut watcher, mut rx) = PollWatcher::create(TICK);
        watcher.watch(&path).unwrap();

        // Different length guarantees a snapshot difference even with
        // coarse mtime granularity.
        std::fs::write(&path, b"build-2 with extra bytes").unwrap();
        assert!(matches!(next_signal(&mut rx).await, WatchSignal::Changed));
    }

    #[tokio::test]
    async fn test_mtime_only_change_emits_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = watched_file(&dir);

        let (mut watcher, mut rx) = PollWatcher::create(TICK);
        watcher.watch(&path).unwrap();

        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
        assert!(matches!(next_signal(&mut rx).await, WatchSignal::Changed));
    }

    #[tokio::test]
    async fn test_unchanged_file_stays_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let path = watched_file(&dir);

        let (mut watcher, mut rx) = PollWatcher::create(TICK);
        watcher.watch(&path).unwrap();

        let got = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(got.is_err(), "expected no signal, got {got:?}");
    }

    #[tokio::test]
    async fn test_missing_then_reappear() {
        let dir = tempfile::tempdir().unwrap();
        let path = watched_file(&dir);

        let (mut watcher, mut rx) = PollWatcher::create(TICK);
        watcher.watch(&path).unwrap();

        std::fs::remove_file(&path).unwrap();
        match next_signal(&mut rx).await {
            WatchSignal::Error(e) => assert!(e.is_transient()),
            other => panic!("unexpected signal: {other:?}"),
        }

        // The replacement file landing reads as a change.
        std::fs::write(&path, b"build-2").unwrap();
        assert!(matches!(next_signal(&mut rx).await, WatchSignal::Changed));
    }

    #[tokio::test]
    async fn test_close_emits_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = watched_file(&dir);

        let (mut watcher, mut rx) = PollWatcher::create(TICK);
        watcher.watch(&path).unwrap();
        watcher.close();
        watcher.close(); // idempotent

        assert!(matches!(next_signal(&mut rx).await, WatchSignal::Closed));
    }

    #[tokio::test]
    async fn test_drop_emits_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = watched_file(&dir);

        let (watcher, mut rx) = {
            let (mut watcher, rx) = PollWatcher::create(TICK);
            watcher.watch(&path).unwrap();
            (watcher, rx)
        };
        drop(watcher);

        assert!(matches!(next_signal(&mut rx).await, WatchSignal::Closed));
    }
}
