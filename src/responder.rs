//! Responder side of a duplex session.
//!
//! The responder reads the inbound stream until the initiator half-closes,
//! applies its [`Policy`] and writes results back on the same channel. It
//! always half-closes its own send direction when it is done, which is what
//! ends the initiator's receive loop.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{
    // ---
    log_debug,
    log_warn,
    ChannelPtr,
    LoopHandle,
    LoopKind,
    Policy,
    Result,
};

/// Drives the answering side of a session.
///
/// `Out` is the response type, `In` the request type: the channel endpoint
/// is the responder's own view of the link.
pub struct Responder<Out, In> {
    // ---
    channel: ChannelPtr<Out, In>,
}

impl<Out, In> Responder<Out, In>
where
    Out: Serialize + Send + Sync + 'static,
    In: DeserializeOwned + Send + 'static,
{
    /// Create a responder over a channel endpoint.
    pub fn new(channel: ChannelPtr<Out, In>) -> Self {
        Self { channel }
    }

    /// Start the responder loop.
    ///
    /// The loop ends with `Ok` after answering a half-closed inbound stream,
    /// or with the first error from the channel or the policy.
    pub fn run(self, policy: Policy<In, Out>) -> LoopHandle {
        // ---
        LoopHandle::spawn(LoopKind::Responder, respond(self.channel, policy))
    }
}

async fn respond<Out, In>(channel: ChannelPtr<Out, In>, policy: Policy<In, Out>) -> Result<()>
where
    Out: Serialize,
    In: DeserializeOwned,
{
    // ---
    log_debug!("{}: responding with {} policy", channel.transport_id(), policy.kind());

    let res = serve(&channel, policy).await;

    if let Err(ref _err) = res {
        log_warn!("{}: responder stopped: {_err}", channel.transport_id());
    }
    res
}

async fn serve<Out, In>(channel: &ChannelPtr<Out, In>, policy: Policy<In, Out>) -> Result<()>
where
    Out: Serialize,
    In: DeserializeOwned,
{
    // ---
    match policy {
        Policy::EchoEach(mut each) => {
            let mut inbound = 0usize;
            let mut outbound = 0usize;

            while let Some(msg) = channel.receive().await? {
                inbound += 1;
                for out in each.on_message(msg)? {
                    channel.send(&out).await?;
                    outbound += 1;
                }
            }

            log_debug!(
                "{}: answered {inbound} messages with {outbound} responses",
                channel.transport_id()
            );
            channel.close_send().await
        }
        Policy::ReduceToOne(mut reduce) => {
            while let Some(msg) = channel.receive().await? {
                reduce.accumulate(msg)?;
            }

            let result = reduce.finish()?;
            channel.send(&result).await?;
            channel.close_send().await
        }
    }
}
