//! Path watching: one watched file, one stream of change signals.
//!
//! Two interchangeable strategies sit behind [`PathWatcher`]: kernel
//! change notification ([`fsnotify::NotifyWatcher`]) and periodic
//! polling ([`poll::PollWatcher`]). Both deliver [`WatchSignal`]s over
//! an unbounded channel that the supervisor consumes.

pub mod fsnotify;
pub mod poll;

use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedReceiver;

/// One observation from a path watcher, consumed exactly once by the
/// supervisor loop.
#[derive(Debug)]
pub enum WatchSignal {
    /// The watched path was modified (possibly one of several raw
    /// signals for a single logical replacement).
    Changed,
    /// The watcher hit an internal error. May be transient; see
    /// [`WatchError::is_transient`].
    Error(WatchError),
    /// The watcher was torn down (polling strategy only).
    Closed,
}

/// Errors produced while setting up or running a path watcher.
#[derive(Debug)]
pub enum WatchError {
    /// The underlying notification backend could not be created.
    Init { source: notify::Error },
    /// The path could not be registered with the notification backend.
    Register {
        path: PathBuf,
        source: notify::Error,
    },
    /// The path could not be stat'ed (polling strategy).
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The watched path briefly disappeared, as happens mid-way through
    /// an atomic file replace. Transient.
    PathMissing { path: PathBuf },
    /// The notification backend reported a runtime failure.
    Backend { source: notify::Error },
}

impl WatchError {
    /// Whether the supervisor should swallow this error and keep going.
    pub fn is_transient(&self) -> bool {
        matches!(self, WatchError::PathMissing { .. })
    }
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchError::Init { source } => {
                write!(f, "failed to create watcher: {source}")
            }
            WatchError::Register { path, source } => {
                write!(f, "failed to watch {}: {source}", path.display())
            }
            WatchError::Stat { path, source } => {
                write!(f, "failed to stat {}: {source}", path.display())
            }
            WatchError::PathMissing { path } => {
                write!(f, "watched path {} is missing", path.display())
            }
            WatchError::Backend { source } => {
                write!(f, "watch backend error: {source}")
            }
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatchError::Init { source }
            | WatchError::Register { source, .. }
            | WatchError::Backend { source } => Some(source),
            WatchError::Stat { source, .. } => Some(source),
            WatchError::PathMissing { .. } => None,
        }
    }
}

/// Capability interface over the two watching strategies.
///
/// A watcher observes exactly one path for this tool's purposes. Signal
/// delivery happens on the channel returned at construction time, so the
/// trait only covers registration and teardown.
pub trait PathWatcher: Send {
    /// Begin observing `path`. Fails if the path does not exist or
    /// cannot be registered with the underlying mechanism.
    fn watch(&mut self, path: &Path) -> Result<(), WatchError>;

    /// Release underlying resources. Idempotent; must not block on
    /// in-flight signals.
    fn close(&mut self);
}

/// A watcher handle paired with its signal stream.
pub type WatcherParts = (Box<dyn PathWatcher>, UnboundedReceiver<WatchSignal>);
