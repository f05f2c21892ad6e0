//! Calculator policies: sum, prime decomposition, average, running maximum.

use serde::{Deserialize, Serialize};

use super::{EachPolicy, ReducePolicy};
use crate::{Result, RpcError};

/// Operands of a [`Sum`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumRequest {
    pub a: i64,
    pub b: i64,
}

/// Unary shape: one `a + b` per request.
#[derive(Debug, Default)]
pub struct Sum;

impl EachPolicy<SumRequest, i64> for Sum {
    fn on_message(&mut self, msg: SumRequest) -> Result<Vec<i64>> {
        Ok(vec![msg.a.wrapping_add(msg.b)])
    }
}

/// Server-streaming shape: the prime factors of each number, smallest first,
/// one message per factor.
#[derive(Debug, Default)]
pub struct PrimeFactors;

impl EachPolicy<u64, u64> for PrimeFactors {
    fn on_message(&mut self, mut number: u64) -> Result<Vec<u64>> {
        // ---
        let mut factors = Vec::new();
        let mut divisor = 2u64;

        while number > 1 {
            if divisor.saturating_mul(divisor) > number {
                // What is left has no divisor up to its square root.
                factors.push(number);
                break;
            }
            if number % divisor == 0 {
                factors.push(divisor);
                number /= divisor;
            } else {
                divisor += 1;
            }
        }

        Ok(factors)
    }
}

/// Client-streaming shape: the mean of every number received.
///
/// Fails with [`RpcError::EmptyStream`] if the stream ended empty.
#[derive(Debug, Default)]
pub struct Average {
    sum: i64,
    count: u64,
}

impl ReducePolicy<i32, f64> for Average {
    fn accumulate(&mut self, msg: i32) -> Result<()> {
        // ---
        self.sum += i64::from(msg);
        self.count += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<f64> {
        // ---
        if self.count == 0 {
            return Err(RpcError::EmptyStream);
        }
        Ok(self.sum as f64 / self.count as f64)
    }
}

/// Bidirectional shape: emits a number only when it is strictly greater than
/// every number seen before it. The first number always emits.
#[derive(Debug, Default)]
pub struct RunningMaximum {
    best: Option<i32>,
}

impl EachPolicy<i32, i32> for RunningMaximum {
    fn on_message(&mut self, msg: i32) -> Result<Vec<i32>> {
        // ---
        match self.best {
            Some(best) if msg <= best => Ok(Vec::new()),
            _ => {
                self.best = Some(msg);
                Ok(vec![msg])
            }
        }
    }
}
