//! Typed duplex channel endpoint.
//!
//! A [`DuplexChannel`] is one end of an ordered, bidirectional message pipe.
//! It turns the opaque envelopes of a [`Transport`](crate::Transport) into typed messages and
//! keeps the state of each direction:
//!
//! - the send direction is `Open` until [`close_send`](DuplexChannel::close_send)
//!   makes it `HalfClosed`; no message can be enqueued after that;
//! - the receive direction is `Open` until the peer's half-close marker
//!   arrives (`Ended`) or a fault is observed (`Errored`).
//!
//! Every outbound frame carries the next sequence number of its direction.
//! The receiving endpoint checks it, so a gap or duplicate introduced below
//! the channel surfaces as a transport error instead of silently corrupting
//! the stream.
//!
//! All suspension points observe the endpoint's cancellation token: once it
//! fires, a pending or future `send`/`receive` returns
//! [`RpcError::Cancelled`].

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    // ---
    create_memory_pair,
    log_debug,
    log_warn,
    Envelope,
    Frame,
    Result,
    RpcError,
    SessionConfig,
    SessionId,
    TransportPtr,
};

/// State of the outbound direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// Messages may still be sent.
    Open,
    /// The endpoint announced it will send nothing more.
    HalfClosed,
}

/// State of the inbound direction.
#[derive(Debug, Clone, PartialEq)]
pub enum RecvState {
    /// Messages may still arrive.
    Open,
    /// The peer half-closed and every message it sent has been delivered.
    Ended,
    /// The direction failed; the error is returned by every later `receive`.
    Errored(RpcError),
}

struct SendSide {
    next_sequence: u64,
}

struct RecvSide {
    expected_sequence: u64,
}

/// One endpoint of a duplex session.
///
/// `Out` is the type this endpoint sends, `In` the type it receives. The
/// peer endpoint is a `DuplexChannel<In, Out>`.
///
/// The endpoint is meant to be shared (`Arc`) between an independent send
/// loop and receive loop. Concurrent senders are serialized, as are
/// concurrent receivers. Direction states live outside those locks and can
/// be read at any time, even while a loop is suspended on the transport.
pub struct DuplexChannel<Out, In> {
    // ---
    transport: TransportPtr,
    session_id: SessionId,
    send: Mutex<SendSide>,
    recv: Mutex<RecvSide>,
    send_state: watch::Sender<SendState>,
    recv_state: watch::Sender<RecvState>,
    cancel: CancellationToken,
    _messages: PhantomData<fn(Out) -> In>,
}

impl<Out, In> DuplexChannel<Out, In>
where
    Out: Serialize,
    In: DeserializeOwned,
{
    /// Wrap a transport endpoint.
    ///
    /// Both endpoints of a session must be created with the same
    /// `session_id`; envelopes from a different session are rejected.
    pub fn new(transport: TransportPtr, session_id: SessionId, cancel: CancellationToken) -> Self {
        // ---
        Self {
            transport,
            session_id,
            send: Mutex::new(SendSide { next_sequence: 0 }),
            recv: Mutex::new(RecvSide { expected_sequence: 0 }),
            send_state: watch::Sender::new(SendState::Open),
            recv_state: watch::Sender::new(RecvState::Open),
            cancel,
            _messages: PhantomData,
        }
    }

    /// Create two connected endpoints over the in-memory transport.
    ///
    /// Returns `(initiator, responder)`. Each endpoint gets a child of
    /// `session_cancel`: cancelling the session cancels both, cancelling one
    /// endpoint leaves the other untouched.
    pub fn pair(
        config: &SessionConfig,
        session_id: SessionId,
        session_cancel: &CancellationToken,
    ) -> Result<(DuplexChannel<Out, In>, DuplexChannel<In, Out>)>
    where
        In: Serialize,
        Out: DeserializeOwned,
    {
        // ---
        let (initiator, responder) = create_memory_pair(config)?;

        Ok((
            DuplexChannel::new(initiator, session_id.clone(), session_cancel.child_token()),
            DuplexChannel::new(responder, session_id, session_cancel.child_token()),
        ))
    }

    /// Session this endpoint belongs to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Identifier of the underlying transport endpoint.
    pub fn transport_id(&self) -> &str {
        self.transport.transport_id()
    }

    /// Token that cancels this endpoint.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel the endpoint, unblocking any suspended `send` or `receive`.
    pub fn cancel(&self) {
        // ---
        log_debug!("{}: channel cancelled", self.transport_id());
        self.cancel.cancel();
    }

    /// Current state of the outbound direction.
    ///
    /// Never waits on a concurrent `send` or `close_send`.
    pub fn send_state(&self) -> SendState {
        *self.send_state.borrow()
    }

    /// Current state of the inbound direction.
    ///
    /// Never waits on a concurrent `receive`.
    pub fn recv_state(&self) -> RecvState {
        self.recv_state.borrow().clone()
    }

    /// Enqueue a message for the peer.
    ///
    /// Suspends while the transport applies backpressure.
    ///
    /// # Errors
    ///
    /// - [`RpcError::ChannelClosed`] once the send direction is half-closed
    /// - [`RpcError::Cancelled`] if the endpoint is cancelled
    /// - [`RpcError::Serialization`] if the message cannot be encoded
    /// - transport errors from the underlying link
    pub async fn send(&self, msg: &Out) -> Result<()> {
        // ---
        if self.cancel.is_cancelled() {
            return Err(RpcError::Cancelled);
        }

        let payload = Bytes::from(serde_json::to_vec(msg)?);

        let mut side = self.lock_send().await?;

        if self.send_state() == SendState::HalfClosed {
            return Err(RpcError::ChannelClosed);
        }

        let env = Envelope::data(self.session_id.clone(), side.next_sequence, payload);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RpcError::Cancelled),
            res = self.transport.send(env) => {
                res?;
                side.next_sequence += 1;
                Ok(())
            }
        }
    }

    /// Wait for the next message from the peer.
    ///
    /// Returns `Ok(Some(msg))` for a message and `Ok(None)` once the peer has
    /// half-closed and all of its earlier messages were delivered. After
    /// end-of-stream every call returns `Ok(None)`; after an error every call
    /// returns that error.
    pub async fn receive(&self) -> Result<Option<In>> {
        // ---
        let mut side = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(RpcError::Cancelled),
            side = self.recv.lock() => side,
        };

        match self.recv_state() {
            RecvState::Open => {}
            RecvState::Ended => return Ok(None),
            RecvState::Errored(err) => return Err(err),
        }

        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RpcError::Cancelled),
            env = self.transport.recv() => env,
        };

        match self.accept(&mut side, next) {
            Ok(msg) => {
                if msg.is_none() {
                    self.recv_state.send_replace(RecvState::Ended);
                    log_debug!("{}: end of stream", self.transport_id());
                }
                Ok(msg)
            }
            Err(err) => {
                log_warn!("{}: receive failed: {err}", self.transport_id());
                self.recv_state.send_replace(RecvState::Errored(err.clone()));
                Err(err)
            }
        }
    }

    /// Half-close the send direction. Idempotent.
    ///
    /// The peer observes end-of-stream after every message sent before this
    /// call has been delivered.
    pub async fn close_send(&self) -> Result<()> {
        // ---
        let side = self.lock_send().await?;

        if self.send_state() == SendState::HalfClosed {
            return Ok(());
        }
        self.send_state.send_replace(SendState::HalfClosed);

        let end = Envelope::end(self.session_id.clone(), side.next_sequence);

        let res = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RpcError::Cancelled),
            res = self.transport.send(end) => res,
        };

        // The send side is released even when the marker could not be queued;
        // the peer then sees a disconnect rather than a clean end.
        let released = self.transport.close_send().await;

        log_debug!(
            "{}: send half-closed after {} messages",
            self.transport_id(),
            side.next_sequence
        );

        res.and(released)
    }

    async fn lock_send(&self) -> Result<tokio::sync::MutexGuard<'_, SendSide>> {
        // ---
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RpcError::Cancelled),
            side = self.send.lock() => Ok(side),
        }
    }

    /// Interpret one transport result against the direction's state.
    fn accept(
        &self,
        side: &mut RecvSide,
        next: Result<Option<Envelope>>,
    ) -> Result<Option<In>> {
        // ---
        let Some(env) = next? else {
            // The peer's send side vanished without an end marker.
            return Err(RpcError::Disconnected);
        };

        if env.session_id != self.session_id {
            return Err(RpcError::Transport(format!(
                "envelope for session {} arrived on session {}",
                env.session_id, self.session_id
            )));
        }

        if env.sequence != side.expected_sequence {
            return Err(RpcError::Transport(format!(
                "expected sequence {}, got {}",
                side.expected_sequence, env.sequence
            )));
        }
        side.expected_sequence += 1;

        match env.frame {
            Frame::Data(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
            Frame::End => Ok(None),
            Frame::Fault(reason) => Err(RpcError::Transport(reason.to_string())),
        }
    }
}

/// Shared endpoint pointer, as handed to the initiator and responder loops.
pub type ChannelPtr<Out, In> = Arc<DuplexChannel<Out, In>>;

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::time::Duration;

    fn pair() -> (DuplexChannel<i32, String>, DuplexChannel<String, i32>) {
        let cancel = CancellationToken::new();
        DuplexChannel::pair(
            &SessionConfig::new("channel-test"),
            SessionId::generate(),
            &cancel,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_receive_in_order() {
        // ---
        let (a, b) = pair();

        for n in [3, 1, 2] {
            a.send(&n).await.unwrap();
        }
        a.close_send().await.unwrap();

        assert_eq!(b.receive().await.unwrap(), Some(3));
        assert_eq!(b.receive().await.unwrap(), Some(1));
        assert_eq!(b.receive().await.unwrap(), Some(2));
        assert_eq!(b.receive().await.unwrap(), None);
        assert_eq!(b.receive().await.unwrap(), None);
        assert_eq!(b.recv_state(), RecvState::Ended);
    }

    #[tokio::test]
    async fn test_close_send_is_idempotent_and_blocks_sends() {
        // ---
        let (a, b) = pair();

        a.close_send().await.unwrap();
        a.close_send().await.unwrap();
        assert_eq!(a.send_state(), SendState::HalfClosed);
        assert_eq!(a.send(&9).await.unwrap_err(), RpcError::ChannelClosed);

        assert_eq!(b.receive().await.unwrap(), None);

        // The other direction stays usable.
        b.send(&"still open".to_string()).await.unwrap();
        assert_eq!(a.receive().await.unwrap().as_deref(), Some("still open"));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_receive() {
        // ---
        let (a, _b) = pair();
        let a = Arc::new(a);

        let waiter = {
            let a = a.clone();
            tokio::spawn(async move { a.receive().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        a.cancel();

        let res = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("receive did not unblock")
            .unwrap();
        assert_eq!(res.unwrap_err(), RpcError::Cancelled);
    }

    #[tokio::test]
    async fn test_dropped_peer_is_disconnect() {
        // ---
        let (a, b) = pair();
        drop(b);

        assert_eq!(a.receive().await.unwrap_err(), RpcError::Disconnected);
        assert!(matches!(
            a.recv_state(),
            RecvState::Errored(RpcError::Disconnected)
        ));
        // The error sticks.
        assert_eq!(a.receive().await.unwrap_err(), RpcError::Disconnected);
    }

    #[tokio::test]
    async fn test_recv_state_readable_while_receiving() {
        // ---
        let (a, b) = pair();
        let a = Arc::new(a);

        let waiter = {
            let a = a.clone();
            tokio::spawn(async move { a.receive().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(a.recv_state(), RecvState::Open);

        b.close_send().await.unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), None);
        assert_eq!(a.recv_state(), RecvState::Ended);
    }

    #[tokio::test]
    async fn test_send_state_readable_under_backpressure() {
        // ---
        let cancel = CancellationToken::new();
        let (a, b) = DuplexChannel::<i32, i32>::pair(
            &SessionConfig::new("backpressure").with_channel_capacity(1),
            SessionId::generate(),
            &cancel,
        )
        .unwrap();
        let a = Arc::new(a);

        a.send(&1).await.unwrap();
        let blocked = {
            let a = a.clone();
            tokio::spawn(async move { a.send(&2).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        assert_eq!(a.send_state(), SendState::Open);

        assert_eq!(b.receive().await.unwrap(), Some(1));
        blocked.await.unwrap().unwrap();
        assert_eq!(b.receive().await.unwrap(), Some(2));
    }

    fn raw_pair() -> (DuplexChannel<String, i32>, TransportPtr, SessionId) {
        // ---
        let id = SessionId::generate();
        let (local, remote) = create_memory_pair(&SessionConfig::new("raw")).unwrap();
        let channel = DuplexChannel::new(local, id.clone(), CancellationToken::new());
        (channel, remote, id)
    }

    #[tokio::test]
    async fn test_fault_frame_is_transport_error() {
        // ---
        let (channel, remote, id) = raw_pair();

        remote.send(Envelope::fault(id, 0, "link reset")).await.unwrap();

        assert_eq!(
            channel.receive().await.unwrap_err(),
            RpcError::Transport("link reset".into())
        );
    }

    #[tokio::test]
    async fn test_sequence_gap_detected() {
        // ---
        let (channel, remote, id) = raw_pair();

        remote
            .send(Envelope::data(id.clone(), 0, Bytes::from_static(b"1")))
            .await
            .unwrap();
        remote
            .send(Envelope::data(id, 2, Bytes::from_static(b"3")))
            .await
            .unwrap();

        assert_eq!(channel.receive().await.unwrap(), Some(1));
        assert!(matches!(
            channel.receive().await.unwrap_err(),
            RpcError::Transport(_)
        ));
    }

    #[tokio::test]
    async fn test_foreign_session_rejected() {
        // ---
        let (channel, remote, _id) = raw_pair();

        remote
            .send(Envelope::data(SessionId::from("other"), 0, Bytes::from_static(b"1")))
            .await
            .unwrap();

        assert!(matches!(
            channel.receive().await.unwrap_err(),
            RpcError::Transport(_)
        ));
    }

    #[tokio::test]
    async fn test_undecodable_payload() {
        // ---
        let (channel, remote, id) = raw_pair();

        remote
            .send(Envelope::data(id, 0, Bytes::from_static(b"\"not a number\"")))
            .await
            .unwrap();

        assert!(matches!(
            channel.receive().await.unwrap_err(),
            RpcError::Serialization(_)
        ));
    }
}
