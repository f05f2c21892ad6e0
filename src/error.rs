use thiserror::Error;

/// Errors that can occur on a duplex session.
///
/// The type is `Clone` so a failure can be published to every observer of a
/// session's state, not just the first one to see it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    /// A message was sent after the send direction was half-closed
    #[error("send direction is half-closed")]
    ChannelClosed,

    /// The underlying transport reported a fault
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer endpoint went away without half-closing its send direction
    #[error("peer disconnected without half-closing")]
    Disconnected,

    /// A reduce policy reached end-of-stream without receiving any input
    #[error("stream ended before any message was received")]
    EmptyStream,

    /// The session or the endpoint was cancelled
    #[error("session cancelled")]
    Cancelled,

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Session configuration was rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A supervised loop panicked
    #[error("session task panicked: {0}")]
    TaskPanicked(String),
}

impl RpcError {
    /// Returns `true` for errors that only ever follow another failure.
    ///
    /// A cancelled loop or a vanished peer is what the rest of a session sees
    /// once one side has already failed; supervisors prefer reporting the
    /// error that started it.
    pub fn is_consequential(&self) -> bool {
        // ---
        matches!(self, RpcError::Cancelled | RpcError::Disconnected)
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        // ---
        RpcError::Serialization(err.to_string())
    }
}

/// Result type alias for duplex session operations
pub type Result<T> = std::result::Result<T, RpcError>;
