// tests/session.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use duplex_rpc::{
    //
    create_memory_pair,
    Average,
    DuplexChannel,
    Envelope,
    Greet,
    GreetEveryone,
    Greeting,
    Initiator,
    LongGreet,
    Policy,
    PrimeFactors,
    Result,
    RpcError,
    RunningMaximum,
    Session,
    SessionConfig,
    SessionId,
    SessionState,
    SessionSupervisor,
    Sum,
    SumRequest,
};

/// Collects everything the initiator's observer sees.
fn collector<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl FnMut(T) + Send + 'static) {
    // ---
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |msg| sink.lock().unwrap().push(msg))
}

fn taken<T>(seen: &Arc<Mutex<Vec<T>>>) -> Vec<T> {
    std::mem::take(&mut *seen.lock().unwrap())
}

#[tokio::test]
async fn test_find_maximum_emits_running_maximum() -> Result<()> {
    // ---
    init_logging();

    let (seen, observer) = collector();
    let state = Session::run(
        &SessionConfig::new("find-maximum"),
        vec![1, 5, 3, 6, 2, 20],
        Policy::echo_each(RunningMaximum::default()),
        observer,
    )
    .await?;

    assert_eq!(state, SessionState::Completed);
    assert_eq!(taken(&seen), vec![1, 5, 6, 20]);
    Ok(())
}

#[tokio::test]
async fn test_compute_average_yields_one_result() -> Result<()> {
    // ---
    init_logging();

    let (seen, observer) = collector::<f64>();
    let state = Session::run(
        &SessionConfig::new("compute-average"),
        vec![3, 5, 9, 54, 23],
        Policy::reduce_to_one(Average::default()),
        observer,
    )
    .await?;

    assert_eq!(state, SessionState::Completed);
    assert_eq!(taken(&seen), vec![18.8]);
    Ok(())
}

#[tokio::test]
async fn test_average_of_empty_stream_fails() -> Result<()> {
    // ---
    init_logging();

    let (seen, observer) = collector::<f64>();
    let state = tokio::time::timeout(
        Duration::from_secs(2),
        Session::run(
            &SessionConfig::new("empty-average"),
            Vec::<i32>::new(),
            Policy::reduce_to_one(Average::default()),
            observer,
        ),
    )
    .await
    .expect("session hung")?;

    assert_eq!(state, SessionState::Failed(RpcError::EmptyStream));
    assert!(taken(&seen).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_echo_each_preserves_production_order() -> Result<()> {
    // ---
    init_logging();

    let people: Vec<Greeting> = ["Ada", "Grace", "Barbara", "Frances"]
        .into_iter()
        .map(|name| Greeting::new(name, "Doe"))
        .collect();
    let expected: Vec<String> = people
        .iter()
        .map(|p| format!("Hello {}! ", p.first_name))
        .collect();

    let (seen, observer) = collector();
    let state = Session::run(
        &SessionConfig::new("greet-everyone").with_channel_capacity(1),
        people,
        Policy::echo_each(GreetEveryone),
        observer,
    )
    .await?;

    assert_eq!(state, SessionState::Completed);
    assert_eq!(taken(&seen), expected);
    Ok(())
}

#[tokio::test]
async fn test_many_messages_through_small_queue() -> Result<()> {
    // ---
    init_logging();

    let input: Vec<i32> = (0..500).map(|n| (n * 7919) % 1000).collect();

    let mut best = i32::MIN;
    let expected: Vec<i32> = input
        .iter()
        .copied()
        .filter(|&n| {
            let emit = n > best;
            best = best.max(n);
            emit
        })
        .collect();

    let (seen, observer) = collector();
    let state = Session::run(
        &SessionConfig::new("many").with_channel_capacity(2),
        input,
        Policy::echo_each(RunningMaximum::default()),
        observer,
    )
    .await?;

    assert_eq!(state, SessionState::Completed);
    assert_eq!(taken(&seen), expected);
    Ok(())
}

#[tokio::test]
async fn test_unary_and_server_streaming_shapes() -> Result<()> {
    // ---
    init_logging();

    let (sums, observer) = collector();
    let state = Session::run(
        &SessionConfig::new("sum"),
        vec![SumRequest { a: 3, b: 10 }],
        Policy::echo_each(Sum),
        observer,
    )
    .await?;
    assert_eq!(state, SessionState::Completed);
    assert_eq!(taken(&sums), vec![13]);

    let (factors, observer) = collector();
    let state = Session::run(
        &SessionConfig::new("prime-decomposition"),
        vec![12u64],
        Policy::echo_each(PrimeFactors),
        observer,
    )
    .await?;
    assert_eq!(state, SessionState::Completed);
    assert_eq!(taken(&factors), vec![2, 2, 3]);

    let (greetings, observer) = collector();
    let state = Session::run(
        &SessionConfig::new("greet"),
        vec![Greeting::new("Alan", "Turing")],
        Policy::echo_each(Greet),
        observer,
    )
    .await?;
    assert_eq!(state, SessionState::Completed);
    assert_eq!(taken(&greetings), vec!["Hello Alan".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_long_greet_with_pacing() -> Result<()> {
    // ---
    init_logging();

    let config = SessionConfig::new("long-greet").with_inter_message_delay(Duration::from_millis(5));

    let (seen, observer) = collector();
    let state = Session::run(
        &config,
        vec![Greeting::new("Ada", "Lovelace"), Greeting::new("Grace", "Hopper")],
        Policy::reduce_to_one(LongGreet::default()),
        observer,
    )
    .await?;

    assert_eq!(state, SessionState::Completed);
    assert_eq!(taken(&seen), vec!["Hello Ada! Hello Grace! ".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_half_close_ordering() {
    // ---
    init_logging();

    let cancel = CancellationToken::new();
    let (client, server) =
        DuplexChannel::<u32, u32>::pair(&SessionConfig::default(), SessionId::generate(), &cancel)
            .unwrap();

    for n in 0..5 {
        client.send(&n).await.unwrap();
    }
    client.close_send().await.unwrap();
    assert_eq!(client.send(&99).await.unwrap_err(), RpcError::ChannelClosed);

    let mut received = Vec::new();
    while let Some(n) = server.receive().await.unwrap() {
        received.push(n);
    }
    assert_eq!(received, vec![0, 1, 2, 3, 4]);
    assert_eq!(server.receive().await.unwrap(), None);
}

#[tokio::test]
async fn test_cancel_unblocks_suspended_session() -> Result<()> {
    // ---
    init_logging();

    // The initiator waits a minute between messages, so every loop ends up
    // suspended: the responder and the initiator's receive loop on
    // `receive`, the send loop on its pacing sleep.
    let config = SessionConfig::new("stalled").with_inter_message_delay(Duration::from_secs(60));

    let (seen, observer) = collector::<i32>();
    let supervisor = Session::start(
        &config,
        vec![1, 2, 3],
        Policy::echo_each(RunningMaximum::default()),
        observer,
    )?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    supervisor.cancel();

    let state = tokio::time::timeout(Duration::from_secs(1), supervisor.wait())
        .await
        .expect("cancelled session did not unwind");

    assert_eq!(state, SessionState::Failed(RpcError::Cancelled));
    assert_eq!(taken(&seen), vec![1]);
    Ok(())
}

#[tokio::test]
async fn test_transport_fault_fails_session_fast() {
    // ---
    init_logging();

    // Wire the initiator by hand and play the responder on the raw transport.
    let config = SessionConfig::new("faulty").with_inter_message_delay(Duration::from_secs(60));
    let session_id = SessionId::generate();
    let cancel = CancellationToken::new();

    let (local, remote) = create_memory_pair(&config).unwrap();
    let client: DuplexChannel<i32, i32> =
        DuplexChannel::new(local, session_id.clone(), cancel.child_token());

    let (_seen, observer) = collector::<i32>();
    let handles = Initiator::new(Arc::new(client))
        .with_delay(config.inter_message_delay)
        .run(vec![1, 2, 3], observer);

    let mut supervisor = SessionSupervisor::new(session_id.clone(), cancel, config.unwind_grace);
    let mut state_rx = supervisor.state();
    supervisor.supervise(handles.send);
    supervisor.supervise(handles.recv);

    // First request arrives, then the link reports a fault.
    let first = remote.recv().await.unwrap().unwrap();
    assert_eq!(first.sequence, 0);
    remote
        .send(Envelope::data(session_id.clone(), 0, Bytes::from_static(b"1")))
        .await
        .unwrap();
    remote
        .send(Envelope::fault(session_id, 1, "connection reset by peer"))
        .await
        .unwrap();

    let state = tokio::time::timeout(Duration::from_secs(1), supervisor.wait())
        .await
        .expect("supervisor did not fail fast");

    let expected = RpcError::Transport("connection reset by peer".into());
    assert_eq!(state, SessionState::Failed(expected.clone()));

    state_rx.changed().await.unwrap();
    assert_eq!(*state_rx.borrow(), SessionState::Failed(expected));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    // ---
    let (_seen, observer) = collector::<i32>();
    let res = Session::start(
        &SessionConfig::new("bad").with_channel_capacity(0),
        vec![1],
        Policy::echo_each(RunningMaximum::default()),
        observer,
    );
    assert!(matches!(res, Err(RpcError::InvalidConfig(_))));
}

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}
