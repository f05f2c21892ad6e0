//! Initiator side of a duplex session.
//!
//! The initiator owns two independent loops over the same channel endpoint:
//!
//! - the **send loop** emits a finite sequence of requests, paced by a fixed
//!   delay, then half-closes its send direction;
//! - the **receive loop** hands every response to an observer until the
//!   responder half-closes or the direction fails.
//!
//! Neither loop waits for, or stops, the other. A failure ends only the loop
//! that hit it; tearing down the sibling is the supervisor's job.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{
    // ---
    log_debug,
    ChannelPtr,
    LoopHandle,
    LoopKind,
    Result,
    RpcError,
};

/// The two loops started by [`Initiator::run`].
pub struct InitiatorHandles {
    /// Loop emitting requests.
    pub send: LoopHandle,
    /// Loop observing responses.
    pub recv: LoopHandle,
}

/// Drives the requesting side of a session.
///
/// # Example
///
/// ```no_run
/// # use duplex_rpc::{DuplexChannel, Initiator, SessionConfig, SessionId};
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # use tokio_util::sync::CancellationToken;
/// # async fn example() -> duplex_rpc::Result<()> {
/// let cancel = CancellationToken::new();
/// let (client, _server) = DuplexChannel::<i32, i32>::pair(
///     &SessionConfig::default(),
///     SessionId::generate(),
///     &cancel,
/// )?;
///
/// let handles = Initiator::new(Arc::new(client))
///     .with_delay(Duration::from_millis(100))
///     .run(vec![1, 5, 3], |max: i32| println!("received: {max}"));
///
/// handles.send.join().await.into_result()?;
/// handles.recv.join().await.into_result()?;
/// # Ok(())
/// # }
/// ```
pub struct Initiator<Out, In> {
    // ---
    channel: ChannelPtr<Out, In>,
    delay: Duration,
}

impl<Out, In> Initiator<Out, In>
where
    Out: Serialize + Send + Sync + 'static,
    In: DeserializeOwned + Send + 'static,
{
    /// Create an initiator over a channel endpoint, without pacing.
    pub fn new(channel: ChannelPtr<Out, In>) -> Self {
        Self {
            channel,
            delay: Duration::ZERO,
        }
    }

    /// Wait `delay` between two outbound messages.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Start the send and receive loops.
    ///
    /// `messages` are sent in order; `observer` is called with every response
    /// in the order the responder produced it.
    pub fn run<F>(self, messages: Vec<Out>, observer: F) -> InitiatorHandles
    where
        F: FnMut(In) + Send + 'static,
    {
        // ---
        let send = LoopHandle::spawn(
            LoopKind::InitiatorSend,
            send_loop(self.channel.clone(), messages, self.delay),
        );
        let recv = LoopHandle::spawn(LoopKind::InitiatorRecv, recv_loop(self.channel, observer));

        InitiatorHandles { send, recv }
    }
}

async fn send_loop<Out, In>(
    channel: ChannelPtr<Out, In>,
    messages: Vec<Out>,
    delay: Duration,
) -> Result<()>
where
    Out: Serialize,
    In: DeserializeOwned,
{
    // ---
    let total = messages.len();

    for (idx, msg) in messages.iter().enumerate() {
        if idx > 0 && !delay.is_zero() {
            pace(&channel, delay).await?;
        }

        log_debug!("{}: sending message {}/{total}", channel.transport_id(), idx + 1);
        channel.send(msg).await?;
    }

    channel.close_send().await
}

/// Sleep between two sends, giving up as soon as the channel is cancelled.
async fn pace<Out, In>(channel: &ChannelPtr<Out, In>, delay: Duration) -> Result<()>
where
    Out: Serialize,
    In: DeserializeOwned,
{
    // ---
    tokio::select! {
        _ = channel.cancellation_token().cancelled() => Err(RpcError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

async fn recv_loop<Out, In, F>(channel: ChannelPtr<Out, In>, mut observer: F) -> Result<()>
where
    Out: Serialize,
    In: DeserializeOwned,
    F: FnMut(In),
{
    // ---
    let mut received = 0usize;

    while let Some(msg) = channel.receive().await? {
        received += 1;
        observer(msg);
    }

    log_debug!("{}: response stream ended after {received} messages", channel.transport_id());
    Ok(())
}
