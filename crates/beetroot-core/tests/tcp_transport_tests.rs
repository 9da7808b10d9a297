//! Integration tests for the TCP transport.
//!
//! Two transports in one process exchange an offer and an answer the way two
//! users would by copy/paste, then talk over loopback.

use std::time::Duration;

use beetroot_core::config::ConnectionConfig;
use beetroot_core::signaling::{encode_signal, parse_signal, SdpKind, SessionDescriptor};
use beetroot_core::transport::tcp::TcpTransport;
use beetroot_core::transport::{
    ChannelMessage, ChannelState, ConnectionState, PeerTransport, TransportEvent, TransportNotice,
};
use beetroot_core::DEFAULT_STRIP_MARKER;
use tokio::sync::mpsc;

type Events = mpsc::UnboundedReceiver<TransportNotice>;

fn loopback_config() -> ConnectionConfig {
    ConnectionConfig {
        bind_address: "127.0.0.1:0".to_string(),
        advertise: Some(vec!["127.0.0.1".to_string()]),
        hello_timeout: Duration::from_secs(5),
        ..ConnectionConfig::default()
    }
}

fn new_transport(name: &str) -> (TcpTransport, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TcpTransport::new(loopback_config(), name.to_string(), 1, tx), rx)
}

/// Wait for the first event matching `pred`, skipping others.
async fn wait_for(events: &mut Events, pred: impl Fn(&TransportEvent) -> bool) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let notice = events.recv().await.expect("event channel closed");
            assert_eq!(notice.generation, 1);
            if pred(&notice.event) {
                return notice.event;
            }
        }
    })
    .await
    .expect("timed out waiting for transport event")
}

/// Copy a local description through the signal text format.
fn through_clipboard(descriptor: &SessionDescriptor) -> SessionDescriptor {
    let text = encode_signal(descriptor, DEFAULT_STRIP_MARKER).expect("encode signal");
    assert!(!text.contains("max-message-size"));
    parse_signal(&text).expect("parse signal")
}

/// Run the offer/answer exchange and wait for both channels to open.
async fn connected_pair() -> ((TcpTransport, Events), (TcpTransport, Events)) {
    let (mut initiator, mut initiator_events) = new_transport("alice");
    let (mut responder, mut responder_events) = new_transport("bob");

    initiator.open_channel("fileTransfer").unwrap();
    initiator.create_offer().unwrap();
    wait_for(&mut initiator_events, |e| {
        matches!(e, TransportEvent::GatheringComplete)
    })
    .await;
    let offer = through_clipboard(&initiator.local_description().unwrap());
    assert_eq!(offer.kind, SdpKind::Offer);

    responder.accept_offer(&offer).unwrap();
    wait_for(&mut responder_events, |e| {
        matches!(e, TransportEvent::GatheringComplete)
    })
    .await;
    let answer = through_clipboard(&responder.local_description().unwrap());
    assert_eq!(answer.kind, SdpKind::Answer);

    initiator.accept_answer(&answer).unwrap();

    wait_for(&mut initiator_events, |e| matches!(e, TransportEvent::ChannelOpen)).await;
    wait_for(&mut responder_events, |e| matches!(e, TransportEvent::ChannelOpen)).await;

    (
        (initiator, initiator_events),
        (responder, responder_events),
    )
}

/// Both sides reach an open channel and carry text and binary both ways.
#[tokio::test]
async fn test_exchange_and_message_flow() {
    let ((mut initiator, mut initiator_events), (mut responder, mut responder_events)) =
        connected_pair().await;

    assert_eq!(initiator.connection_state(), ConnectionState::Connected);
    assert_eq!(initiator.channel_state(), ChannelState::Open);
    assert_eq!(responder.connection_state(), ConnectionState::Connected);
    assert_eq!(responder.channel_state(), ChannelState::Open);

    initiator
        .send(ChannelMessage::Text(r#"{"name":"a.txt","size":3}"#.to_string()))
        .unwrap();
    initiator
        .send(ChannelMessage::Binary(vec![1, 2, 3]))
        .unwrap();

    let first = wait_for(&mut responder_events, |e| {
        matches!(e, TransportEvent::Message(_))
    })
    .await;
    assert_eq!(
        first,
        TransportEvent::Message(ChannelMessage::Text(
            r#"{"name":"a.txt","size":3}"#.to_string()
        ))
    );
    let second = wait_for(&mut responder_events, |e| {
        matches!(e, TransportEvent::Message(_))
    })
    .await;
    assert_eq!(
        second,
        TransportEvent::Message(ChannelMessage::Binary(vec![1, 2, 3]))
    );

    let payload = vec![9u8; 65_536];
    responder
        .send(ChannelMessage::Binary(payload.clone()))
        .unwrap();
    let back = wait_for(&mut initiator_events, |e| {
        matches!(e, TransportEvent::Message(_))
    })
    .await;
    assert_eq!(back, TransportEvent::Message(ChannelMessage::Binary(payload)));
}

/// Buffered amount drains back to zero once the writer catches up.
#[tokio::test]
async fn test_buffered_amount_drains() {
    let ((mut initiator, _initiator_events), (_responder, mut responder_events)) =
        connected_pair().await;

    for _ in 0..8 {
        initiator
            .send(ChannelMessage::Binary(vec![0u8; 65_536]))
            .unwrap();
    }

    for _ in 0..8 {
        wait_for(&mut responder_events, |e| {
            matches!(e, TransportEvent::Message(_))
        })
        .await;
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while initiator.buffered_amount() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("buffered amount never drained");
}

/// Closing one side is seen by the other as a channel close and disconnect.
#[tokio::test]
async fn test_close_reaches_peer() {
    let ((mut initiator, _initiator_events), (responder, mut responder_events)) =
        connected_pair().await;

    initiator.close();
    initiator.close();
    assert_eq!(initiator.channel_state(), ChannelState::Closed);
    assert!(initiator.send(ChannelMessage::Text("late".into())).is_err());

    wait_for(&mut responder_events, |e| matches!(e, TransportEvent::ChannelClose)).await;
    wait_for(&mut responder_events, |e| {
        matches!(
            e,
            TransportEvent::ConnectionStateChanged(ConnectionState::Disconnected)
        )
    })
    .await;
    assert_eq!(responder.channel_state(), ChannelState::Closed);
}

/// A responder presenting a different token is turned away.
#[tokio::test]
async fn test_wrong_token_rejected() {
    let (mut initiator, mut initiator_events) = new_transport("alice");
    let (mut responder, mut responder_events) = new_transport("bob");

    initiator.open_channel("fileTransfer").unwrap();
    initiator.create_offer().unwrap();
    let offer = through_clipboard(&initiator.local_description().unwrap());
    responder.accept_offer(&offer).unwrap();

    let forged = SessionDescriptor::new(SdpKind::Answer, "v=0\r\na=token:deadbeef\r\n");
    initiator.accept_answer(&forged).unwrap();

    wait_for(&mut responder_events, |e| {
        matches!(
            e,
            TransportEvent::ConnectionStateChanged(ConnectionState::Failed)
        )
    })
    .await;

    assert_ne!(initiator.channel_state(), ChannelState::Open);
    while let Ok(notice) = initiator_events.try_recv() {
        assert_ne!(notice.event, TransportEvent::ChannelOpen);
    }
}

/// Answers without a token, and mismatched kinds, are refused.
#[tokio::test]
async fn test_invalid_descriptions_rejected() {
    let (mut initiator, _events) = new_transport("alice");
    let answer = SessionDescriptor::new(SdpKind::Answer, "v=0\r\n");

    // No offer yet.
    assert!(initiator.accept_answer(&answer).is_err());

    initiator.create_offer().unwrap();
    assert!(initiator.accept_answer(&answer).is_err());
    assert!(initiator.create_offer().is_err());

    let (mut responder, _events) = new_transport("bob");
    let no_candidates = SessionDescriptor::new(SdpKind::Offer, "v=0\r\n");
    assert!(responder.accept_offer(&no_candidates).is_err());
    assert!(responder.accept_offer(&answer).is_err());
}
