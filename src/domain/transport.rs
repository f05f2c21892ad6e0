// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the boundary between a [`DuplexChannel`] and whatever
//! moves its bytes. It intentionally avoids any reference to concrete
//! protocols, sockets, or client libraries.
//!
//! A transport is one endpoint of an ordered, reliable, bidirectional link.
//! It delivers opaque [`Envelope`]s to its peer in the order they were sent,
//! and lets the local side release its send direction while it keeps
//! receiving. Typed messages, sequence checking and half-close semantics are
//! layered on top by the channel.
//!
//! Concrete implementations of this interface live under `src/transport/`.
//!
//! [`DuplexChannel`]: crate::DuplexChannel
use crate::{Result, SessionId};
use std::sync::Arc;

use bytes::Bytes;

/// Which end of a session a transport endpoint sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    // ---
    /// The side that opens the session and sends requests.
    Initiator,

    /// The side that answers requests according to a policy.
    Responder,
}

/// Shared base state for all transport implementations.
///
/// Each concrete transport embeds this as a field named `base` and returns
/// it from [`Transport::base`]; the default trait methods delegate here.
pub struct TransportBase {
    /// Identifier used as a log prefix.
    pub transport_id: String,
    /// Side of the session this endpoint belongs to.
    pub role: Role,
}

impl TransportBase {
    /// Create a new TransportBase.
    pub fn new(transport_id: impl Into<String>, role: Role) -> Self {
        Self {
            transport_id: transport_id.into(),
            role,
        }
    }
}

/// Contents of one envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    // ---
    /// An encoded application message.
    Data(Bytes),

    /// The sender half-closed its direction; nothing follows on this
    /// direction.
    End,

    /// The sender's side of the transport failed; the reason is carried
    /// in-band so the receiver can surface it.
    Fault(Arc<str>),
}

/// The unit of transport between two session endpoints.
///
/// The transport does not interpret any field; it is responsible only for
/// delivering envelopes in order.
///
/// # Example
///
/// ```
/// # use duplex_rpc::{Envelope, Frame, SessionId};
/// # use bytes::Bytes;
/// let envelope = Envelope::data(SessionId::from("s-1"), 0, Bytes::from_static(b"5"));
/// assert_eq!(envelope.sequence, 0);
/// assert!(matches!(envelope.frame, Frame::Data(_)));
/// ```
#[derive(Clone, Debug)]
pub struct Envelope {
    // ---
    /// Session the envelope belongs to.
    pub session_id: SessionId,

    /// Position in the sending direction, starting at 0.
    ///
    /// Every frame of a direction, including the final `End`, takes the next
    /// sequence number.
    pub sequence: u64,

    /// Payload or control signal.
    pub frame: Frame,
}

impl Envelope {
    // ---
    /// Create an envelope carrying an encoded message.
    pub fn data(session_id: SessionId, sequence: u64, payload: Bytes) -> Self {
        Self {
            session_id,
            sequence,
            frame: Frame::Data(payload),
        }
    }

    /// Create the half-close marker of a direction.
    pub fn end(session_id: SessionId, sequence: u64) -> Self {
        Self {
            session_id,
            sequence,
            frame: Frame::End,
        }
    }

    /// Create an in-band fault notification.
    pub fn fault(session_id: SessionId, sequence: u64, reason: impl Into<Arc<str>>) -> Self {
        Self {
            session_id,
            sequence,
            frame: Frame::Fault(reason.into()),
        }
    }
}

/// Transport abstraction.
///
/// One endpoint of an ordered, reliable, bidirectional link. Implementations
/// must ensure that:
/// - envelopes are delivered to the peer in `send` order, without loss or
///   duplication, while both sides are alive;
/// - after `close_send()` no further envelope leaves this endpoint, while
///   `recv()` keeps working;
/// - `recv()` returns `Ok(None)` once the peer has released its send side and
///   every envelope it sent has been delivered;
/// - `send`, `recv` and `close_send` may be called concurrently from
///   different tasks.
///
/// The in-memory transport serves as the reference implementation of these
/// semantics.
///
/// # Notes
///
/// This trait uses `async_trait`; consumers should treat its methods as
/// normal `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Returns the transport_id of the endpoint.
    fn transport_id(&self) -> &str {
        &self.base().transport_id
    }

    /// Returns the session role of the endpoint.
    fn role(&self) -> Role {
        self.base().role
    }

    /// Deliver an envelope to the peer, suspending under backpressure.
    async fn send(&self, env: Envelope) -> Result<()>;

    /// Wait for the next envelope from the peer.
    ///
    /// `Ok(None)` means the peer's send side is gone and nothing more will
    /// arrive.
    async fn recv(&self) -> Result<Option<Envelope>>;

    /// Release the local send direction. Idempotent.
    async fn close_send(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// `.clone()` only increments a reference count; the concrete transport type
/// is erased behind a stable domain interface.
pub type TransportPtr = Arc<dyn Transport>;
