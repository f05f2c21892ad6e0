//! Handles to the concurrent loops of a session.

use std::fmt;
use std::future::Future;

use tokio::task::JoinHandle;

use crate::{Result, RpcError};

/// Which loop of a session a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    /// Initiator loop emitting requests.
    InitiatorSend,
    /// Initiator loop observing responses.
    InitiatorRecv,
    /// Responder loop applying the policy.
    Responder,
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopKind::InitiatorSend => "initiator-send",
            LoopKind::InitiatorRecv => "initiator-recv",
            LoopKind::Responder => "responder",
        })
    }
}

/// How a loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// The loop reached its natural end.
    Completed,
    /// The loop stopped on an error.
    Failed(RpcError),
}

impl LoopOutcome {
    /// Convert into a `Result`, mapping `Failed` to its error.
    pub fn into_result(self) -> Result<()> {
        // ---
        match self {
            LoopOutcome::Completed => Ok(()),
            LoopOutcome::Failed(err) => Err(err),
        }
    }
}

/// Handle to one spawned session loop.
///
/// Dropping the handle aborts the loop, so a handle that is never joined
/// cannot leave a task suspended on a channel.
pub struct LoopHandle {
    // ---
    kind: LoopKind,
    task: JoinHandle<Result<()>>,
}

impl LoopHandle {
    /// Spawn `fut` on the current tokio runtime.
    pub(crate) fn spawn<F>(kind: LoopKind, fut: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        // ---
        Self {
            kind,
            task: tokio::spawn(fut),
        }
    }

    /// Which loop this handle refers to.
    pub fn kind(&self) -> LoopKind {
        self.kind
    }

    /// Returns `true` once the loop has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Abort the loop at its next suspension point.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the loop to end.
    ///
    /// An aborted loop is reported as [`RpcError::Cancelled`], a panicking
    /// one as [`RpcError::TaskPanicked`].
    pub async fn join(mut self) -> LoopOutcome {
        // ---
        match (&mut self.task).await {
            Ok(Ok(())) => LoopOutcome::Completed,
            Ok(Err(err)) => LoopOutcome::Failed(err),
            Err(join_err) if join_err.is_cancelled() => LoopOutcome::Failed(RpcError::Cancelled),
            Err(join_err) => LoopOutcome::Failed(RpcError::TaskPanicked(format!(
                "{} loop: {join_err}",
                self.kind
            ))),
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        // ---
        self.task.abort();
    }
}
