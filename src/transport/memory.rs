//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait. It is intended for tests, local execution, and as the
//! reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! The in-memory transport defines the **reference behavior** for the
//! transport layer:
//!
//! - Each direction is a bounded FIFO queue; `send` suspends while the queue
//!   is full.
//! - Envelopes are never dropped, duplicated or reordered.
//! - Releasing the send side lets the peer drain every queued envelope before
//!   its `recv` returns `Ok(None)`.
//! - Dropping an endpoint releases its send side as well, which is how a
//!   vanished peer becomes visible.
//!
//! ## Non-Goals
//!
//! This transport does not emulate network failure modes. Faults can be
//! injected by sending a [`Frame::Fault`](crate::Frame::Fault) envelope.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::{
    // ---
    log_debug,
    Envelope,
    Result,
    Role,
    RpcError,
    SessionConfig,
    Transport,
    TransportBase,
    TransportPtr,
};

/// One end of an in-memory duplex link.
struct MemoryTransport {
    // ---
    base: TransportBase,
    outbox: Mutex<Option<mpsc::Sender<Envelope>>>,
    inbox: Mutex<mpsc::Receiver<Envelope>>,
}

impl MemoryTransport {
    fn new(
        transport_id: &str,
        role: Role,
        outbox: mpsc::Sender<Envelope>,
        inbox: mpsc::Receiver<Envelope>,
    ) -> Self {
        // ---
        let role_tag = match role {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        };

        Self {
            base: TransportBase::new(format!("{transport_id}/{role_tag}"), role),
            outbox: Mutex::new(Some(outbox)),
            inbox: Mutex::new(inbox),
        }
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    /// Queue an envelope for the peer.
    ///
    /// Concurrent senders are serialized by the outbox lock, so each send
    /// completes before the next one starts.
    async fn send(&self, env: Envelope) -> Result<()> {
        // ---
        let outbox = self.outbox.lock().await;

        let Some(tx) = outbox.as_ref() else {
            return Err(RpcError::ChannelClosed);
        };

        tx.send(env).await.map_err(|_err| {
            log_debug!("{}: peer inbox dropped", self.transport_id());
            RpcError::Disconnected
        })
    }

    /// Receive the next queued envelope from the peer.
    ///
    /// Cancel safe: dropping the returned future never loses an envelope.
    async fn recv(&self) -> Result<Option<Envelope>> {
        // ---
        let mut inbox = self.inbox.lock().await;
        Ok(inbox.recv().await)
    }

    /// Drop the outbound queue sender.
    ///
    /// The peer still drains everything queued before this call.
    async fn close_send(&self) -> Result<()> {
        // ---
        let mut outbox = self.outbox.lock().await;
        if outbox.take().is_some() {
            log_debug!("{}: send side released", self.transport_id());
        }
        Ok(())
    }
}

/// Create two connected in-memory transport endpoints.
///
/// Returns `(initiator, responder)`. Each direction is bounded by
/// `config.channel_capacity`.
///
/// # Errors
///
/// Returns [`RpcError::InvalidConfig`] if the configuration is invalid.
pub fn create_memory_pair(config: &SessionConfig) -> Result<(TransportPtr, TransportPtr)> {
    // ---
    config.validate()?;

    let (to_responder, responder_inbox) = mpsc::channel(config.channel_capacity);
    let (to_initiator, initiator_inbox) = mpsc::channel(config.channel_capacity);

    let initiator = MemoryTransport::new(
        &config.transport_id,
        Role::Initiator,
        to_responder,
        initiator_inbox,
    );
    let responder = MemoryTransport::new(
        &config.transport_id,
        Role::Responder,
        to_initiator,
        responder_inbox,
    );

    log_debug!("{}: created memory transport pair", config.transport_id);

    Ok((Arc::new(initiator), Arc::new(responder)))
}
