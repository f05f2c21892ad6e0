//! Session supervision.
//!
//! The supervisor is the only component aware of every loop of a session.
//! It owns their handles, publishes the session state, and turns the first
//! failure into a session-wide cancellation:
//!
//! ```text
//!            all loops Ok
//!  Running ─────────────────▶ Completed
//!     │
//!     │ any loop Err / cancel()
//!     ▼
//!  Failed(reason) ── cancel token ──▶ remaining loops unwind (or are aborted)
//! ```
//!
//! The `Failed` state is published the moment the first error is seen;
//! [`SessionSupervisor::wait`] returns once every loop has stopped, so no
//! task outlives the session.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    LoopHandle,
    LoopKind,
    LoopOutcome,
    RpcError,
    SessionId,
};

/// Lifecycle state of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// At least one loop is still active.
    Running,
    /// Every loop reached its natural end.
    Completed,
    /// A loop failed or the session was cancelled.
    Failed(RpcError),
}

impl SessionState {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Running)
    }
}

/// Coordinates the loops of one session.
///
/// Loops are registered with [`supervise`](Self::supervise); the supervisor
/// then decides the terminal state:
///
/// - `Completed` when every supervised loop completed;
/// - `Failed(reason)` as soon as one loop fails, after which the session
///   token is cancelled and every other loop is unwound.
pub struct SessionSupervisor {
    // ---
    session_id: SessionId,
    cancel: CancellationToken,
    tasks: JoinSet<(LoopKind, LoopOutcome)>,
    state_tx: watch::Sender<SessionState>,
    unwind_grace: Duration,
}

impl SessionSupervisor {
    /// Create a supervisor for the session whose channels derive their
    /// tokens from `cancel`.
    pub fn new(session_id: SessionId, cancel: CancellationToken, unwind_grace: Duration) -> Self {
        // ---
        let (state_tx, _) = watch::channel(SessionState::Running);

        Self {
            session_id,
            cancel,
            tasks: JoinSet::new(),
            state_tx,
            unwind_grace,
        }
    }

    /// Session being supervised.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Take ownership of a loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn supervise(&mut self, handle: LoopHandle) {
        // ---
        self.tasks.spawn(async move {
            let kind = handle.kind();
            (kind, handle.join().await)
        });
    }

    /// Subscribe to state changes.
    ///
    /// The receiver observes `Failed` as soon as the first loop fails, before
    /// the remaining loops have unwound.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Token cancelling every channel of the session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the session from outside.
    ///
    /// Suspended loops return [`RpcError::Cancelled`] and [`wait`](Self::wait)
    /// reports `Failed(Cancelled)` unless another loop already failed.
    pub fn cancel(&self) {
        // ---
        log_info!("{}: session cancelled", self.session_id);
        self.cancel.cancel();
    }

    /// Wait for the session to reach its terminal state.
    ///
    /// Returns after every supervised loop has stopped.
    pub async fn wait(mut self) -> SessionState {
        // ---
        let mut failure: Option<RpcError> = None;

        while let Some(joined) = self.tasks.join_next().await {
            let (kind, outcome) = match joined {
                Ok(pair) => pair,
                Err(join_err) => {
                    // The wrapper task only awaits the loop; it cannot fail
                    // unless the runtime is shutting down.
                    log_error!("{}: supervision task lost: {join_err}", self.session_id);
                    continue;
                }
            };

            match outcome {
                LoopOutcome::Completed => {
                    log_debug!("{}: {kind} loop completed", self.session_id);
                }
                LoopOutcome::Failed(err) => {
                    log_debug!("{}: {kind} loop failed: {err}", self.session_id);
                    failure = Some(err.clone());
                    self.fail_fast(err);
                    break;
                }
            }
        }

        if let Some(first) = failure {
            let reason = self.unwind(first).await;
            log_warn!("{}: session failed: {reason}", self.session_id);
            self.state_tx.send_replace(SessionState::Failed(reason.clone()));
            return SessionState::Failed(reason);
        }

        log_info!("{}: session completed", self.session_id);
        self.state_tx.send_replace(SessionState::Completed);
        SessionState::Completed
    }

    /// Publish the failure and cancel every channel of the session.
    fn fail_fast(&self, err: RpcError) {
        // ---
        self.state_tx.send_replace(SessionState::Failed(err));
        self.cancel.cancel();
    }

    /// Drain the remaining loops after a failure and pick the root cause.
    ///
    /// A loop that does not stop within the grace period is aborted. Errors
    /// that merely follow the failure (cancellation, a vanished peer) only
    /// become the reason when nothing else went wrong.
    async fn unwind(&mut self, first: RpcError) -> RpcError {
        // ---
        let mut later = Vec::new();
        let deadline = tokio::time::Instant::now() + self.unwind_grace;

        loop {
            match tokio::time::timeout_at(deadline, self.tasks.join_next()).await {
                Ok(Some(Ok((_kind, LoopOutcome::Failed(err))))) => later.push(err),
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_elapsed) => {
                    log_warn!(
                        "{}: {} loops still running after {:?}, aborting",
                        self.session_id,
                        self.tasks.len(),
                        self.unwind_grace
                    );
                    self.tasks.shutdown().await;
                    break;
                }
            }
        }

        if first.is_consequential() {
            if let Some(primary) = later.into_iter().find(|err| !err.is_consequential()) {
                return primary;
            }
        }
        first
    }
}
