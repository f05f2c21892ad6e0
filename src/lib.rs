//! Duplex streaming sessions for RPC-style interactions.
//!
//! This library models one session between two endpoints, an initiator and a
//! responder, exchanging ordered messages over a [`DuplexChannel`]. Each
//! endpoint sends and receives independently, and each direction ends with an
//! explicit half-close. The four classic RPC shapes fall out of the responder
//! [`Policy`]:
//!
//! | shape              | requests | responses per request | policy        |
//! |--------------------|----------|-----------------------|---------------|
//! | unary              | 1        | 1                     | `EchoEach`    |
//! | server-streaming   | 1        | many                  | `EchoEach`    |
//! | client-streaming   | many     | 1 at end-of-stream    | `ReduceToOne` |
//! | bidi-streaming     | many     | 0..n, as they arrive  | `EchoEach`    |
//!
//! A [`SessionSupervisor`] watches the initiator's send and receive loops
//! and the responder loop, reports `Completed` once all of them finished, and
//! fails the whole session fast, with cancellation of the survivors, as soon
//! as one of them fails.

// Import all sub modules once...
mod channel;
mod domain;
mod handle;
mod initiator;
mod macros;
mod policy;
mod responder;
mod session;
mod supervisor;
mod transport;

mod session_config;

mod error;
mod session_id;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use channel::{ChannelPtr, DuplexChannel, RecvState, SendState};
pub use handle::{LoopHandle, LoopKind, LoopOutcome};
pub use initiator::{Initiator, InitiatorHandles};
pub use responder::Responder;
pub use session::Session;
pub use supervisor::{SessionState, SessionSupervisor};

pub use policy::{
    //
    Average,
    EachPolicy,
    Greet,
    GreetEveryone,
    GreetManyTimes,
    Greeting,
    LongGreet,
    Policy,
    PrimeFactors,
    ReducePolicy,
    RunningMaximum,
    Sum,
    SumRequest,
};

pub use session_config::SessionConfig;

pub use error::{Result, RpcError};
pub use session_id::SessionId;

pub use transport::create_memory_pair;

// --- public re-exports
pub use domain::{
    //
    Envelope,
    Frame,
    Role,
    Transport,
    TransportBase,
    TransportPtr,
};
