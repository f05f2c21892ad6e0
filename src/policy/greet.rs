//! Greet policies.

use serde::{Deserialize, Serialize};

use super::{EachPolicy, ReducePolicy};
use crate::Result;

/// A person to greet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    pub first_name: String,
    pub last_name: String,
}

impl Greeting {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

/// Unary shape: `"Hello {first_name}"`.
#[derive(Debug, Default)]
pub struct Greet;

impl EachPolicy<Greeting, String> for Greet {
    fn on_message(&mut self, msg: Greeting) -> Result<Vec<String>> {
        Ok(vec![format!("Hello {}", msg.first_name)])
    }
}

/// Server-streaming shape: `times` numbered greetings per request.
#[derive(Debug)]
pub struct GreetManyTimes {
    times: usize,
}

impl GreetManyTimes {
    pub fn new(times: usize) -> Self {
        Self { times }
    }
}

impl Default for GreetManyTimes {
    fn default() -> Self {
        Self::new(10)
    }
}

impl EachPolicy<Greeting, String> for GreetManyTimes {
    fn on_message(&mut self, msg: Greeting) -> Result<Vec<String>> {
        // ---
        Ok((0..self.times)
            .map(|i| format!("Hello {} number {i}", msg.first_name))
            .collect())
    }
}

/// Client-streaming shape: one concatenated greeting for everyone received.
///
/// An empty stream yields the empty string.
#[derive(Debug, Default)]
pub struct LongGreet {
    result: String,
}

impl ReducePolicy<Greeting, String> for LongGreet {
    fn accumulate(&mut self, msg: Greeting) -> Result<()> {
        self.result.push_str(&format!("Hello {}! ", msg.first_name));
        Ok(())
    }

    fn finish(&mut self) -> Result<String> {
        Ok(std::mem::take(&mut self.result))
    }
}

/// Bidirectional shape: greets each person as they arrive.
#[derive(Debug, Default)]
pub struct GreetEveryone;

impl EachPolicy<Greeting, String> for GreetEveryone {
    fn on_message(&mut self, msg: Greeting) -> Result<Vec<String>> {
        Ok(vec![format!("Hello {}! ", msg.first_name)])
    }
}
