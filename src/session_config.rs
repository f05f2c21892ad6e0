//! Session configuration.
//!
//! Transport-agnostic knobs shared by the channel, the initiator and the
//! supervisor. Transports interpret `channel_capacity` as their per-direction
//! queue bound.

use std::time::Duration;

use crate::{Result, RpcError};

/// Configuration of one duplex session.
///
/// # Example
///
/// ```
/// use duplex_rpc::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::new("calculator")
///     .with_channel_capacity(8)
///     .with_inter_message_delay(Duration::from_millis(10));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    // ---
    /// Identifier used as a prefix in log output.
    pub transport_id: String,

    /// Number of in-flight messages each direction buffers before `send`
    /// suspends.
    ///
    /// Default: 16
    pub channel_capacity: usize,

    /// Pause the initiator takes between two outbound messages.
    ///
    /// Default: zero (no pacing)
    pub inter_message_delay: Duration,

    /// How long a failed session waits for its remaining loops to unwind
    /// after cancellation before aborting them.
    ///
    /// Default: 1 second
    pub unwind_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        // ---
        Self::new("session")
    }
}

impl SessionConfig {
    /// Create a configuration with default settings and the given log id.
    pub fn new(transport_id: impl Into<String>) -> Self {
        Self {
            transport_id: transport_id.into(),
            channel_capacity: 16,
            inter_message_delay: Duration::ZERO,
            unwind_grace: Duration::from_secs(1),
        }
    }

    /// Set the per-direction queue bound.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the pause between two outbound initiator messages.
    pub fn with_inter_message_delay(mut self, delay: Duration) -> Self {
        self.inter_message_delay = delay;
        self
    }

    /// Set how long a failed session waits for its loops to unwind.
    pub fn with_unwind_grace(mut self, grace: Duration) -> Self {
        self.unwind_grace = grace;
        self
    }

    /// Check the configuration for values the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        // ---
        if self.channel_capacity == 0 {
            return Err(RpcError::InvalidConfig(
                "channel_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
