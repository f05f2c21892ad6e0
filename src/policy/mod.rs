//! Responder policies.
//!
//! A policy decides what a responder does with each inbound message. The set
//! of shapes is closed ([`Policy`]); the computation inside each shape is
//! supplied through [`EachPolicy`] or [`ReducePolicy`].
//!
//! Policies own their accumulator. A fresh policy value is created per
//! session and dropped with the responder loop, so no state leaks between
//! sessions.

mod calculator;
mod greet;

pub use calculator::{Average, PrimeFactors, RunningMaximum, Sum, SumRequest};
pub use greet::{Greet, GreetEveryone, GreetManyTimes, Greeting, LongGreet};

use crate::Result;

/// Per-message transform: every inbound message yields zero or more
/// outbound messages, sent before the next inbound message is read.
pub trait EachPolicy<In, Out>: Send {
    /// Handle one inbound message.
    fn on_message(&mut self, msg: In) -> Result<Vec<Out>>;
}

/// Aggregation: every inbound message is folded into the policy's state and
/// a single result is produced at end-of-stream.
pub trait ReducePolicy<In, Out>: Send {
    /// Fold one inbound message into the accumulator.
    fn accumulate(&mut self, msg: In) -> Result<()>;

    /// Produce the final result once the peer has half-closed.
    fn finish(&mut self) -> Result<Out>;
}

/// Responder behavior for one session.
pub enum Policy<In, Out> {
    /// Answer each inbound message as it arrives.
    EchoEach(Box<dyn EachPolicy<In, Out>>),

    /// Answer once, after the inbound stream ended.
    ReduceToOne(Box<dyn ReducePolicy<In, Out>>),
}

impl<In, Out> Policy<In, Out> {
    /// Wrap a per-message policy.
    pub fn echo_each(policy: impl EachPolicy<In, Out> + 'static) -> Self {
        Policy::EchoEach(Box::new(policy))
    }

    /// Wrap an aggregating policy.
    pub fn reduce_to_one(policy: impl ReducePolicy<In, Out> + 'static) -> Self {
        Policy::ReduceToOne(Box::new(policy))
    }

    /// Short name used in log output.
    pub fn kind(&self) -> &'static str {
        match self {
            Policy::EchoEach(_) => "echo-each",
            Policy::ReduceToOne(_) => "reduce-to-one",
        }
    }
}
