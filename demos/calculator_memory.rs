//! Calculator sessions over the in-memory transport.
//!
//! Runs one session per RPC shape in a single process: unary sum,
//! server-streaming prime decomposition, client-streaming average and
//! bidirectional running maximum. The last session is paced so the
//! interleaving of requests and responses is visible in the logs.
//!
//! Run with: RUST_LOG=debug cargo run --example calculator_memory

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::panic_in_result_fn
)]

use std::time::Duration;

use duplex_rpc::{
    // ---
    Average,
    Policy,
    PrimeFactors,
    Result,
    RunningMaximum,
    Session,
    SessionConfig,
    SessionState,
    Sum,
    SumRequest,
};
use tracing_subscriber::{fmt as tracing_format, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_line_number(true)
        .init();

    let state = Session::run(
        &SessionConfig::new("sum"),
        vec![SumRequest { a: 3, b: 10 }],
        Policy::echo_each(Sum),
        |sum: i64| println!("Sum:              {sum}"),
    )
    .await?;
    report("sum", &state);

    let state = Session::run(
        &SessionConfig::new("prime-decomposition"),
        vec![120u64],
        Policy::echo_each(PrimeFactors),
        |factor: u64| println!("Prime factor:     {factor}"),
    )
    .await?;
    report("prime-decomposition", &state);

    let state = Session::run(
        &SessionConfig::new("compute-average"),
        vec![3, 5, 9, 54, 23],
        Policy::reduce_to_one(Average::default()),
        |avg: f64| println!("Average:          {avg}"),
    )
    .await?;
    report("compute-average", &state);

    let config = SessionConfig::new("find-maximum")
        .with_inter_message_delay(Duration::from_millis(250));

    let state = Session::run(
        &config,
        vec![1, 5, 3, 6, 2, 20],
        Policy::echo_each(RunningMaximum::default()),
        |max: i32| println!("Running maximum:  {max}"),
    )
    .await?;
    report("find-maximum", &state);

    // An empty client stream has no average.
    let state = Session::run(
        &SessionConfig::new("empty-average"),
        Vec::<i32>::new(),
        Policy::reduce_to_one(Average::default()),
        |avg: f64| println!("Average:          {avg}"),
    )
    .await?;
    report("empty-average", &state);

    Ok(())
}

fn report(name: &str, state: &SessionState) {
    // ---
    match state {
        SessionState::Failed(err) => println!("-- {name}: failed: {err}"),
        other => println!("-- {name}: {other:?}"),
    }
}
