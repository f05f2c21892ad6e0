//! One-call session wiring.
//!
//! [`Session::start`] is the usual entry point: it builds a connected pair of
//! in-memory channel endpoints, starts the initiator on one end and the
//! responder on the other, and returns the supervisor watching all three
//! loops.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    // ---
    log_debug,
    DuplexChannel,
    Initiator,
    Policy,
    Responder,
    Result,
    SessionConfig,
    SessionId,
    SessionState,
    SessionSupervisor,
};

/// Entry point for running a complete session in-process.
///
/// # Example
///
/// ```
/// use duplex_rpc::{Policy, RunningMaximum, Session, SessionConfig, SessionState};
/// use std::sync::{Arc, Mutex};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> duplex_rpc::Result<()> {
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
///
/// let supervisor = Session::start(
///     &SessionConfig::new("find-maximum"),
///     vec![1, 5, 3, 6, 2, 20],
///     Policy::echo_each(RunningMaximum::default()),
///     move |max: i32| sink.lock().unwrap().push(max),
/// )?;
///
/// assert_eq!(supervisor.wait().await, SessionState::Completed);
/// assert_eq!(*seen.lock().unwrap(), vec![1, 5, 6, 20]);
/// # Ok(())
/// # }
/// ```
pub struct Session;

impl Session {
    /// Start a session and return its supervisor.
    ///
    /// `messages` are sent by the initiator, paced by
    /// `config.inter_message_delay`; `policy` runs on the responder;
    /// `observer` receives every response in order.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidConfig`](crate::RpcError::InvalidConfig) if
    /// the configuration is invalid. Session failures are reported by the
    /// supervisor, not here.
    pub fn start<Req, Resp, F>(
        config: &SessionConfig,
        messages: Vec<Req>,
        policy: Policy<Req, Resp>,
        observer: F,
    ) -> Result<SessionSupervisor>
    where
        Req: Serialize + DeserializeOwned + Send + Sync + 'static,
        Resp: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnMut(Resp) + Send + 'static,
    {
        // ---
        let session_id = SessionId::generate();
        let cancel = CancellationToken::new();

        let (client, server) =
            DuplexChannel::<Req, Resp>::pair(config, session_id.clone(), &cancel)?;

        log_debug!(
            "{}: starting session {session_id} ({} messages, {} policy)",
            config.transport_id,
            messages.len(),
            policy.kind()
        );

        let mut supervisor = SessionSupervisor::new(session_id, cancel, config.unwind_grace);

        let responder = Responder::new(Arc::new(server)).run(policy);
        let initiator = Initiator::new(Arc::new(client))
            .with_delay(config.inter_message_delay)
            .run(messages, observer);

        supervisor.supervise(initiator.send);
        supervisor.supervise(initiator.recv);
        supervisor.supervise(responder);

        Ok(supervisor)
    }

    /// Start a session and wait for its terminal state.
    pub async fn run<Req, Resp, F>(
        config: &SessionConfig,
        messages: Vec<Req>,
        policy: Policy<Req, Resp>,
        observer: F,
    ) -> Result<SessionState>
    where
        Req: Serialize + DeserializeOwned + Send + Sync + 'static,
        Resp: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnMut(Resp) + Send + 'static,
    {
        // ---
        Ok(Self::start(config, messages, policy, observer)?.wait().await)
    }
}
