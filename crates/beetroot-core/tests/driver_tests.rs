//! End-to-end tests for the session driver.
//!
//! Two drivers in one process connect over loopback TCP, with signal text
//! handed across exactly as a user would paste it, and transfer real files.

mod common;

use std::path::PathBuf;
use std::time::Duration;

use beetroot_core::config::Config;
use beetroot_core::driver::{SessionDriver, SessionHandle};
use beetroot_core::error::Error;
use beetroot_core::session::{SessionEvent, SessionState};
use beetroot_core::signaling::SdpKind;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use common::{create_temp_dir, create_test_file, random_bytes};

type Events = broadcast::Receiver<SessionEvent>;

fn loopback_config(name: &str) -> Config {
    let mut config = Config::default();
    config.general.device_name = name.to_string();
    config.connection.bind_address = "127.0.0.1:0".to_string();
    config.connection.advertise = Some(vec!["127.0.0.1".to_string()]);
    config
}

fn spawn_driver(name: &str, output_dir: PathBuf) -> (JoinHandle<()>, SessionHandle, Events) {
    let (task, handle) =
        SessionDriver::spawn(&loopback_config(name), output_dir).expect("spawn driver");
    let events = handle.subscribe();
    (task, handle, events)
}

/// Wait for the first event matching `pred`.
async fn wait_for(events: &mut Events, pred: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

async fn wait_for_signal(events: &mut Events, expected: SdpKind) -> String {
    match wait_for(events, |e| matches!(e, SessionEvent::SignalReady { .. })).await {
        SessionEvent::SignalReady { kind, text } => {
            assert_eq!(kind, expected);
            text
        }
        _ => unreachable!(),
    }
}

fn is_status(event: &SessionEvent, prefix: &str) -> bool {
    matches!(event, SessionEvent::Status(text) if text.starts_with(prefix))
}

/// Connect two drivers through the copy/paste exchange.
async fn connect(
    initiator: &SessionHandle,
    initiator_events: &mut Events,
    responder: &SessionHandle,
    responder_events: &mut Events,
) {
    initiator.start_connection().await.unwrap();
    let offer = wait_for_signal(initiator_events, SdpKind::Offer).await;

    responder.connect_peer(offer).await.unwrap();
    let answer = wait_for_signal(responder_events, SdpKind::Answer).await;

    initiator.connect_peer(answer).await.unwrap();

    for events in [initiator_events, responder_events] {
        wait_for(events, |e| {
            matches!(e, SessionEvent::StateChanged(SessionState::Connected))
        })
        .await;
        wait_for(events, |e| is_status(e, "Connected!")).await;
    }
}

/// Two files go across and land intact in the receiver's output directory.
#[tokio::test]
async fn test_end_to_end_file_transfer() {
    let source = create_temp_dir();
    let sender_out = create_temp_dir();
    let receiver_out = create_temp_dir();

    let big = random_bytes(100_000);
    let big_path = create_test_file(source.path(), "big.bin", &big);
    let small_path = create_test_file(source.path(), "small.txt", b"hello");

    let (sender_task, sender, mut sender_events) =
        spawn_driver("sender", sender_out.path().to_path_buf());
    let (receiver_task, receiver, mut receiver_events) =
        spawn_driver("receiver", receiver_out.path().to_path_buf());

    connect(&sender, &mut sender_events, &receiver, &mut receiver_events).await;
    assert!(sender.check_status().await.unwrap());

    sender
        .queue_files(vec![big_path, small_path])
        .await
        .unwrap();
    sender.start_transfer().await.unwrap();

    wait_for(&mut sender_events, |e| matches!(e, SessionEvent::AllFilesSent)).await;
    wait_for(&mut receiver_events, |e| is_status(e, "Saved big.bin")).await;
    wait_for(&mut receiver_events, |e| is_status(e, "Saved small.txt")).await;

    assert_eq!(
        std::fs::read(receiver_out.path().join("big.bin")).unwrap(),
        big
    );
    assert_eq!(
        std::fs::read(receiver_out.path().join("small.txt")).unwrap(),
        b"hello"
    );

    sender.shutdown().await;
    receiver.shutdown().await;
    sender_task.await.unwrap();
    receiver_task.await.unwrap();
}

/// The receiver notices when the sender goes away.
#[tokio::test]
async fn test_peer_shutdown_is_reported() {
    let out = create_temp_dir();
    let (initiator_task, initiator, mut initiator_events) =
        spawn_driver("a", out.path().join("a"));
    let (responder_task, responder, mut responder_events) =
        spawn_driver("b", out.path().join("b"));

    connect(
        &initiator,
        &mut initiator_events,
        &responder,
        &mut responder_events,
    )
    .await;

    initiator.shutdown().await;
    initiator_task.await.unwrap();

    wait_for(&mut responder_events, |e| is_status(e, "Connection closed.")).await;
    wait_for(&mut responder_events, |e| {
        is_status(e, "Connection lost. Attempting to reconnect...")
    })
    .await;

    responder.shutdown().await;
    responder_task.await.unwrap();
}

/// Queueing a missing file fails without touching the session.
#[tokio::test]
async fn test_queue_missing_file() {
    let out = create_temp_dir();
    let (task, handle, _events) = spawn_driver("a", out.path().to_path_buf());

    let result = handle
        .queue_files(vec![out.path().join("does-not-exist")])
        .await;
    assert!(matches!(result, Err(Error::FileRead { .. })));
    assert!(!handle.cancel_transfer().await.unwrap());

    handle.shutdown().await;
    task.await.unwrap();
}

/// Pasted junk is rejected and cleanup always succeeds.
#[tokio::test]
async fn test_bad_signal_then_cleanup() {
    let out = create_temp_dir();
    let (task, handle, mut events) = spawn_driver("a", out.path().to_path_buf());

    assert!(matches!(
        handle.connect_peer("not json").await,
        Err(Error::SignalingParse(_))
    ));
    wait_for(&mut events, |e| {
        is_status(e, "Invalid signal data format.")
    })
    .await;

    handle.cleanup().await.unwrap();
    handle.cleanup().await.unwrap();
    wait_for(&mut events, |e| is_status(e, "Connection cleaned up.")).await;

    handle.shutdown().await;
    task.await.unwrap();
}
