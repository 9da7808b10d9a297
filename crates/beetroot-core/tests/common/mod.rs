//! Common test utilities for `Beetroot` integration tests.
//!
//! Provides an in-memory transport whose state the test can inspect and
//! steer, plus helpers to walk a session through the handshake and to pump
//! a send to completion against in-memory file contents.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use beetroot_core::error::{Error, Result};
use beetroot_core::session::{SendAction, SessionEvent, SessionSettings, TransferSession};
use beetroot_core::signaling::{SdpKind, SessionDescriptor};
use beetroot_core::transfer::QueuedFile;
use beetroot_core::transport::{
    ChannelMessage, ChannelState, ConnectionState, Connector, PeerTransport, TransportEvent,
};

/// Offer body produced by the fake transport.
pub const OFFER_BODY: &str =
    "v=0\r\no=fake 1\r\na=candidate:10.0.0.1:4000\r\na=max-message-size:262144\r\n";

/// Answer body produced by the fake transport.
pub const ANSWER_BODY: &str = "v=0\r\no=fake 2\r\na=token:abcd\r\na=max-message-size:262144\r\n";

/// Observable state of the fake transport.
#[derive(Debug)]
pub struct FakeState {
    pub transports_created: usize,
    pub generation: u64,
    pub channel_label: Option<String>,
    pub local: Option<SessionDescriptor>,
    pub remote: Option<SessionDescriptor>,
    pub connection: ConnectionState,
    pub channel: ChannelState,
    pub sent: Vec<ChannelMessage>,
    pub buffered: u64,
    pub fail_send: bool,
    pub closed: bool,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            transports_created: 0,
            generation: 0,
            channel_label: None,
            local: None,
            remote: None,
            connection: ConnectionState::New,
            channel: ChannelState::Closed,
            sent: Vec::new(),
            buffered: 0,
            fail_send: false,
            closed: false,
        }
    }
}

impl FakeState {
    /// Text messages sent so far.
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .iter()
            .filter_map(|m| match m {
                ChannelMessage::Text(text) => Some(text.clone()),
                ChannelMessage::Binary(_) => None,
            })
            .collect()
    }

    /// Lengths of binary messages sent so far.
    pub fn binary_lens(&self) -> Vec<usize> {
        self.sent
            .iter()
            .filter_map(|m| match m {
                ChannelMessage::Binary(data) => Some(data.len()),
                ChannelMessage::Text(_) => None,
            })
            .collect()
    }
}

/// Shared handle onto the fake transport's state.
pub type Shared = Rc<RefCell<FakeState>>;

/// Connector handing out transports that all report into one [`FakeState`].
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    pub state: Shared,
}

impl Connector for FakeConnector {
    type Transport = FakeTransport;

    fn connect(&mut self, generation: u64) -> Result<FakeTransport> {
        let mut state = self.state.borrow_mut();
        let created = state.transports_created + 1;
        *state = FakeState {
            transports_created: created,
            generation,
            ..FakeState::default()
        };
        Ok(FakeTransport {
            state: Rc::clone(&self.state),
        })
    }
}

/// In-memory transport.
#[derive(Debug)]
pub struct FakeTransport {
    state: Shared,
}

impl PeerTransport for FakeTransport {
    fn open_channel(&mut self, label: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.channel_label = Some(label.to_string());
        state.channel = ChannelState::Connecting;
        Ok(())
    }

    fn create_offer(&mut self) -> Result<()> {
        self.state.borrow_mut().local = Some(SessionDescriptor::new(SdpKind::Offer, OFFER_BODY));
        Ok(())
    }

    fn accept_offer(&mut self, offer: &SessionDescriptor) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.remote = Some(offer.clone());
        state.local = Some(SessionDescriptor::new(SdpKind::Answer, ANSWER_BODY));
        Ok(())
    }

    fn accept_answer(&mut self, answer: &SessionDescriptor) -> Result<()> {
        self.state.borrow_mut().remote = Some(answer.clone());
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescriptor> {
        self.state.borrow().local.clone()
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.borrow().connection
    }

    fn channel_state(&self) -> ChannelState {
        self.state.borrow().channel
    }

    fn send(&mut self, message: ChannelMessage) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_send {
            return Err(Error::ChannelError("send buffer full".to_string()));
        }
        if state.channel != ChannelState::Open {
            return Err(Error::NotConnected);
        }
        state.sent.push(message);
        Ok(())
    }

    fn buffered_amount(&self) -> u64 {
        self.state.borrow().buffered
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.closed = true;
        state.channel = ChannelState::Closed;
        state.connection = ConnectionState::Closed;
    }
}

/// A session over the fake transport with default settings.
pub fn new_session() -> (TransferSession<FakeConnector>, Shared) {
    new_session_with(SessionSettings::default())
}

/// A session over the fake transport with the given settings.
pub fn new_session_with(settings: SessionSettings) -> (TransferSession<FakeConnector>, Shared) {
    let connector = FakeConnector::default();
    let shared = Rc::clone(&connector.state);
    (TransferSession::new(connector, settings), shared)
}

/// Signal text as the peer would paste it.
pub fn signal_text(kind: SdpKind, body: &str) -> String {
    serde_json::json!({ "type": kind.as_str(), "sdp": body }).to_string()
}

/// Mark the fake connected with an open channel and tell the session.
pub fn open_channel(session: &mut TransferSession<FakeConnector>, shared: &Shared, now: Instant) {
    {
        let mut state = shared.borrow_mut();
        state.connection = ConnectionState::Connected;
        state.channel = ChannelState::Open;
    }
    session.handle_transport_event(
        TransportEvent::ConnectionStateChanged(ConnectionState::Connected),
        now,
    );
    session.handle_transport_event(TransportEvent::ChannelOpen, now);
}

/// Walk a session through the initiator handshake up to an open channel.
pub fn connect_initiator(session: &mut TransferSession<FakeConnector>, shared: &Shared) {
    let now = Instant::now();
    session.start_connection().expect("start connection");
    session.handle_transport_event(TransportEvent::GatheringComplete, now);
    session
        .connect_peer(&signal_text(SdpKind::Answer, ANSWER_BODY))
        .expect("apply answer");
    open_channel(session, shared, now);
    session.drain_events();
}

/// Walk a session through the responder handshake up to an open channel.
pub fn connect_responder(session: &mut TransferSession<FakeConnector>, shared: &Shared) {
    let now = Instant::now();
    session
        .connect_peer(&signal_text(SdpKind::Offer, OFFER_BODY))
        .expect("apply offer");
    session.handle_transport_event(TransportEvent::GatheringComplete, now);
    open_channel(session, shared, now);
    session.drain_events();
}

/// In-memory files keyed by the path used in their queue entries.
pub type Disk = HashMap<PathBuf, Vec<u8>>;

/// Queue entries plus backing contents for `(name, contents)` pairs.
pub fn memory_files(files: &[(&str, Vec<u8>)]) -> (Vec<QueuedFile>, Disk) {
    let mut disk = Disk::new();
    let queued = files
        .iter()
        .map(|(name, data)| {
            let path = PathBuf::from(format!("/mem/{name}"));
            disk.insert(path.clone(), data.clone());
            QueuedFile::new(*name, data.len() as u64, path)
        })
        .collect();
    (queued, disk)
}

/// Serve reads from `disk` until the session stops asking.
///
/// Returns the number of reads served. Panics if the session throttles.
pub fn pump_to_completion(session: &mut TransferSession<FakeConnector>, disk: &Disk) -> usize {
    let mut reads = 0;
    loop {
        match session.poll_send() {
            SendAction::Idle => return reads,
            SendAction::Read(request) => {
                reads += 1;
                let data = read_range(disk, &request.path, request.offset, request.len);
                session
                    .complete_read(request.ticket, Ok(data))
                    .expect("complete read");
            }
            SendAction::Throttled(delay) => panic!("unexpected throttle for {delay:?}"),
        }
    }
}

/// Byte range of an in-memory file.
pub fn read_range(disk: &Disk, path: &Path, offset: u64, len: usize) -> Vec<u8> {
    let data = &disk[path];
    let start = usize::try_from(offset).expect("offset fits usize");
    data[start..start + len].to_vec()
}

/// Feed messages to a session as if they arrived from the peer.
pub fn deliver(session: &mut TransferSession<FakeConnector>, messages: &[ChannelMessage]) {
    let now = Instant::now();
    for message in messages {
        session.handle_transport_event(TransportEvent::Message(message.clone()), now);
    }
}

/// Status lines among the events.
pub fn statuses(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Status(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Create a temporary directory for test files.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}
