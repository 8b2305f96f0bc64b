//! Child process supervision: launch the executable, then block on a
//! select over {watch signal, child exit} and reduce each wake to one
//! decision — relaunch after a debounce window, keep waiting, or
//! terminate with a host exit code.
//!
//! All handle mutation (child, watcher) happens on this loop; the
//! watcher and the exit waiter only feed signals in.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::watch::{PathWatcher, WatchError, WatchSignal};

/// Classification of one child termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited with code 0.
    Success,
    /// Exited with a non-zero code.
    Failure(i32),
    /// Terminated by a signal.
    Signaled(i32),
    /// The wait itself failed, or the status fit no known shape.
    LaunchError,
}

impl ExitOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        match status.code() {
            Some(0) => ExitOutcome::Success,
            Some(code) => ExitOutcome::Failure(code),
            None => match status.signal() {
                Some(signal) => ExitOutcome::Signaled(signal),
                None => ExitOutcome::LaunchError,
            },
        }
    }

    /// Bus faults show up when the child's binary lives on a mounted
    /// volume that is mid-replacement; they get retried, not reported.
    pub fn is_bus_error(self) -> bool {
        matches!(self, ExitOutcome::Signaled(signal) if signal == Signal::SIGBUS as i32)
    }

    /// Host exit code when this outcome is propagated. Signaled and
    /// unclassifiable statuses map to 1.
    pub fn host_exit_code(self) -> i32 {
        match self {
            ExitOutcome::Success => 0,
            ExitOutcome::Failure(code) => code,
            ExitOutcome::Signaled(_) | ExitOutcome::LaunchError => 1,
        }
    }
}

/// Errors that end a supervision session with host exit code 1.
#[derive(Debug)]
pub enum SuperviseError {
    /// The child could not be started at all. Not restart-recoverable.
    Launch {
        program: PathBuf,
        source: std::io::Error,
    },
    /// The watcher reported a non-transient failure.
    Watch(WatchError),
}

impl std::fmt::Display for SuperviseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuperviseError::Launch { program, source } => {
                write!(f, "failed to launch {}: {source}", program.display())
            }
            SuperviseError::Watch(e) => write!(f, "error while watching files: {e}"),
        }
    }
}

impl std::error::Error for SuperviseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SuperviseError::Launch { source, .. } => Some(source),
            SuperviseError::Watch(e) => Some(e),
        }
    }
}

impl From<WatchError> for SuperviseError {
    fn from(e: WatchError) -> Self {
        SuperviseError::Watch(e)
    }
}

/// Static parameters of one supervision session.
#[derive(Debug)]
pub struct SessionConfig {
    /// Resolved absolute path of the executable.
    pub program: PathBuf,
    /// Arguments passed through unmodified.
    pub args: Vec<String>,
    /// Relaunch on any exit, not just on file change.
    pub autorestart: bool,
    /// Debounce window after a restart trigger.
    pub debounce: Duration,
}

/// What one wake of the decision loop resolved to.
#[derive(Debug, PartialEq, Eq)]
enum Decision {
    Relaunch,
    Exit(i32),
}

/// One live supervision session. Owns the child handle and the watcher
/// handle exclusively; both are released on every way out of [`run`].
///
/// [`run`]: Supervisor::run
pub struct Supervisor {
    cfg: SessionConfig,
    watcher: Box<dyn PathWatcher>,
    signals: UnboundedReceiver<WatchSignal>,
}

impl Supervisor {
    pub fn new(
        cfg: SessionConfig,
        watcher: Box<dyn PathWatcher>,
        signals: UnboundedReceiver<WatchSignal>,
    ) -> Self {
        Supervisor {
            cfg,
            watcher,
            signals,
        }
    }

    /// Drive the session to a terminal decision and return the host
    /// exit code. The watcher is closed on every path out, fatal ones
    /// included; the live child is killed before any return.
    pub async fn run(mut self) -> Result<i32, SuperviseError> {
        let result = self.supervise().await;
        self.watcher.close();
        result
    }

    async fn supervise(&mut self) -> Result<i32, SuperviseError> {
        loop {
            let mut child = self.launch()?;
            match self.next_decision(&mut child).await? {
                Decision::Relaunch => continue,
                Decision::Exit(code) => return Ok(code),
            }
        }
    }

    /// Start the child with inherited standard streams.
    fn launch(&self) -> Result<Child, SuperviseError> {
        let child = Command::new(&self.cfg.program)
            .args(&self.cfg.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| SuperviseError::Launch {
                program: self.cfg.program.clone(),
                source,
            })?;
        info!(
            pid = child.id().unwrap_or(0),
            program = %self.cfg.program.display(),
            "child started"
        );
        Ok(child)
    }

    /// Block until a watch signal or the child's exit picks a branch.
    /// Exactly one branch fires per iteration; when signal and exit
    /// race, whichever loses stays queued for the next iteration.
    async fn next_decision(&mut self, child: &mut Child) -> Result<Decision, SuperviseError> {
        loop {
            tokio::select! {
                signal = self.signals.recv() => match signal {
                    Some(WatchSignal::Changed) => {
                        println!("executable changed; reloading...");
                        kill_child(child).await;
                        self.debounce().await;
                        return Ok(Decision::Relaunch);
                    }
                    Some(WatchSignal::Error(e)) if e.is_transient() => {
                        debug!(error = %e, "transient watch error; ignoring");
                    }
                    Some(WatchSignal::Error(e)) => {
                        kill_child(child).await;
                        return Err(SuperviseError::Watch(e));
                    }
                    // A closed channel means the producer is gone;
                    // same treatment as an explicit teardown.
                    Some(WatchSignal::Closed) | None => {
                        kill_child(child).await;
                        return Ok(Decision::Exit(0));
                    }
                },
                status = child.wait() => {
                    let outcome = match status {
                        Ok(status) => ExitOutcome::from_status(status),
                        Err(e) => {
                            warn!(error = %e, "failed to wait for child");
                            ExitOutcome::LaunchError
                        }
                    };
                    return Ok(self.exit_decision(outcome).await);
                }
            }
        }
    }

    /// Decision table for a child that exited on its own.
    async fn exit_decision(&mut self, outcome: ExitOutcome) -> Decision {
        if outcome.is_bus_error() {
            println!("retrying on bus error...");
            self.debounce().await;
            return Decision::Relaunch;
        }
        if self.cfg.autorestart {
            println!("executable quit; reloading...");
            self.debounce().await;
            return Decision::Relaunch;
        }
        info!(?outcome, "child exited; propagating exit code");
        Decision::Exit(outcome.host_exit_code())
    }

    /// Absorb every signal arriving within one debounce window, so a
    /// burst of raw signals for one logical file replacement produces a
    /// single relaunch.
    async fn debounce(&mut self) {
        let window = tokio::time::sleep(self.cfg.debounce);
        tokio::pin!(window);
        loop {
            tokio::select! {
                _ = &mut window => return,
                signal = self.signals.recv() => {
                    if signal.is_none() {
                        return;
                    }
                    debug!("discarded signal inside debounce window");
                }
            }
        }
    }
}

/// Best-effort kill: the child may have exited in the same instant, in
/// which case the failure is logged and the loop moves on.
async fn kill_child(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill child");
    }
}
