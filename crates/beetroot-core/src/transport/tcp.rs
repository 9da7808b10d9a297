//! Plain TCP transport.
//!
//! The initiator listens and lists its reachable addresses in the offer as
//! `a=candidate:` lines. The responder answers with a random token, dials
//! the candidates in order and introduces itself with a `Hello` frame. The
//! initiator keeps that connection on hold until the pasted answer reveals
//! which token to expect, then confirms with `HelloAck`.
//!
//! Description bodies look like SDP so the signal filter applies unchanged:
//!
//! ```text
//! v=0
//! o=beetroot 7b1c...
//! s=laptop
//! a=candidate:192.168.1.20:40321
//! a=max-message-size:16777216
//! ```

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use uuid::Uuid;

use super::frame::{
    self, encode_payload, frame_to_message, message_to_frame, read_frame, read_frame_with_timeout,
    write_frame, FrameType, HelloPayload,
};
use super::{
    ChannelMessage, ChannelState, ConnectionState, Connector, PeerTransport, TransportEvent,
    TransportNotice,
};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::signaling::{SdpKind, SessionDescriptor};

const CANDIDATE_PREFIX: &str = "a=candidate:";
const TOKEN_PREFIX: &str = "a=token:";
const MAX_MESSAGE_PREFIX: &str = "a=max-message-size:";

/// Creates [`TcpTransport`]s that report into one event channel.
#[derive(Debug)]
pub struct TcpConnector {
    config: ConnectionConfig,
    device_name: String,
    events: mpsc::UnboundedSender<TransportNotice>,
}

impl TcpConnector {
    /// Create a connector.
    #[must_use]
    pub fn new(
        config: ConnectionConfig,
        device_name: impl Into<String>,
        events: mpsc::UnboundedSender<TransportNotice>,
    ) -> Self {
        Self {
            config,
            device_name: device_name.into(),
            events,
        }
    }
}

impl Connector for TcpConnector {
    type Transport = TcpTransport;

    fn connect(&mut self, generation: u64) -> Result<TcpTransport> {
        Ok(TcpTransport::new(
            self.config.clone(),
            self.device_name.clone(),
            generation,
            self.events.clone(),
        ))
    }
}

/// State shared between the transport handle and its background tasks.
#[derive(Debug)]
struct Shared {
    connection_state: RwLock<ConnectionState>,
    channel_state: RwLock<ChannelState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ChannelMessage>>>,
    buffered: AtomicU64,
    closed: AtomicBool,
    generation: u64,
    events: mpsc::UnboundedSender<TransportNotice>,
}

impl Shared {
    fn emit(&self, event: TransportEvent) {
        if !self.closed.load(Ordering::Acquire) {
            let _ = self.events.send(TransportNotice {
                generation: self.generation,
                event,
            });
        }
    }

    fn connection_state(&self) -> ConnectionState {
        *self
            .connection_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn channel_state(&self) -> ChannelState {
        *self
            .channel_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_connection_state(&self, state: ConnectionState) {
        {
            let mut current = self
                .connection_state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if *current == state {
                return;
            }
            *current = state;
        }
        tracing::debug!("TCP connection state: {state}");
        self.emit(TransportEvent::ConnectionStateChanged(state));
    }

    fn set_channel_state(&self, state: ChannelState) {
        *self
            .channel_state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn outbound(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<ChannelMessage>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A single TCP peer connection carrying one framed message channel.
#[derive(Debug)]
pub struct TcpTransport {
    config: ConnectionConfig,
    device_name: String,
    session_id: Uuid,
    shared: Arc<Shared>,
    local_description: Option<SessionDescriptor>,
    remote_max_message_size: usize,
    expected_token: Option<watch::Sender<Option<String>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl TcpTransport {
    /// Create an unconnected transport.
    #[must_use]
    pub fn new(
        config: ConnectionConfig,
        device_name: String,
        generation: u64,
        events: mpsc::UnboundedSender<TransportNotice>,
    ) -> Self {
        Self {
            config,
            device_name,
            session_id: Uuid::new_v4(),
            shared: Arc::new(Shared {
                connection_state: RwLock::new(ConnectionState::New),
                channel_state: RwLock::new(ChannelState::Closed),
                outbound: Mutex::new(None),
                buffered: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                generation,
                events,
            }),
            local_description: None,
            remote_max_message_size: frame::MAX_PAYLOAD_SIZE,
            expected_token: None,
            tasks: Vec::new(),
        }
    }

    fn ensure_fresh(&self) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(Error::TransportError("transport is closed".to_string()));
        }
        if self.local_description.is_some() {
            return Err(Error::TransportError(
                "local description already created".to_string(),
            ));
        }
        Ok(())
    }

    fn header_lines(&self) -> String {
        format!(
            "v=0\r\no=beetroot {}\r\ns={}\r\n",
            self.session_id, self.device_name
        )
    }
}

impl PeerTransport for TcpTransport {
    fn open_channel(&mut self, label: &str) -> Result<()> {
        tracing::debug!("Opening data channel '{label}'");
        self.shared.set_channel_state(ChannelState::Connecting);
        Ok(())
    }

    fn create_offer(&mut self) -> Result<()> {
        self.ensure_fresh()?;
        let handle = runtime_handle()?;

        let std_listener = std::net::TcpListener::bind(&self.config.bind_address)?;
        std_listener.set_nonblocking(true)?;
        let bound = std_listener.local_addr()?;
        let listener = {
            let _guard = handle.enter();
            TcpListener::from_std(std_listener)?
        };

        let candidates = candidate_addresses(self.config.advertise.as_deref(), bound)?;
        tracing::info!(
            "Listening on {bound}, advertising {} candidate(s)",
            candidates.len()
        );

        let mut body = self.header_lines();
        for candidate in &candidates {
            body.push_str(&format!("{CANDIDATE_PREFIX}{candidate}\r\n"));
        }
        body.push_str(&format!("{MAX_MESSAGE_PREFIX}{}\r\n", frame::MAX_PAYLOAD_SIZE));
        self.local_description = Some(SessionDescriptor::new(SdpKind::Offer, body));

        let (token_tx, token_rx) = watch::channel(None);
        self.expected_token = Some(token_tx);

        let shared = Arc::clone(&self.shared);
        let hello_timeout = self.config.hello_timeout;
        self.tasks
            .push(handle.spawn(accept_loop(listener, token_rx, hello_timeout, shared)));

        self.shared.emit(TransportEvent::GatheringComplete);
        Ok(())
    }

    fn accept_offer(&mut self, offer: &SessionDescriptor) -> Result<()> {
        if offer.kind != SdpKind::Offer {
            return Err(Error::SignalingState(format!(
                "expected an offer, got an {}",
                offer.kind
            )));
        }
        self.ensure_fresh()?;

        let remote = RemoteDescription::parse(&offer.body)?;
        if remote.candidates.is_empty() {
            return Err(Error::SignalingParse(
                "offer does not list any candidates".to_string(),
            ));
        }
        let handle = runtime_handle()?;
        self.remote_max_message_size = remote.max_message_size;

        let token = generate_token();
        let mut body = self.header_lines();
        body.push_str(&format!("{TOKEN_PREFIX}{token}\r\n"));
        body.push_str(&format!("{MAX_MESSAGE_PREFIX}{}\r\n", frame::MAX_PAYLOAD_SIZE));
        self.local_description = Some(SessionDescriptor::new(SdpKind::Answer, body));
        self.shared.emit(TransportEvent::GatheringComplete);

        self.shared.set_connection_state(ConnectionState::Connecting);
        let hello = HelloPayload {
            token,
            device_name: self.device_name.clone(),
        };
        let shared = Arc::clone(&self.shared);
        let connect_timeout = self.config.hello_timeout;
        self.tasks.push(handle.spawn(dial_loop(
            remote.candidates,
            hello,
            connect_timeout,
            shared,
        )));
        Ok(())
    }

    fn accept_answer(&mut self, answer: &SessionDescriptor) -> Result<()> {
        if answer.kind != SdpKind::Answer {
            return Err(Error::SignalingState(format!(
                "expected an answer, got an {}",
                answer.kind
            )));
        }
        let sender = self
            .expected_token
            .as_ref()
            .ok_or_else(|| Error::SignalingState("no offer has been created".to_string()))?;

        let remote = RemoteDescription::parse(&answer.body)?;
        let token = remote
            .token
            .ok_or_else(|| Error::SignalingParse("answer does not carry a token".to_string()))?;
        self.remote_max_message_size = remote.max_message_size;

        sender.send_replace(Some(token));
        self.shared.set_connection_state(ConnectionState::Connecting);
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescriptor> {
        self.local_description.clone()
    }

    fn connection_state(&self) -> ConnectionState {
        self.shared.connection_state()
    }

    fn channel_state(&self) -> ChannelState {
        self.shared.channel_state()
    }

    fn send(&mut self, message: ChannelMessage) -> Result<()> {
        if self.shared.channel_state() != ChannelState::Open {
            return Err(Error::NotConnected);
        }
        if message.len() > self.remote_max_message_size {
            return Err(Error::ChannelError(format!(
                "message of {} bytes exceeds the peer limit of {} bytes",
                message.len(),
                self.remote_max_message_size
            )));
        }

        let len = message.len() as u64;
        let outbound = self.shared.outbound();
        let sender = outbound.as_ref().ok_or(Error::NotConnected)?;
        self.shared.buffered.fetch_add(len, Ordering::AcqRel);
        sender.send(message).map_err(|_| {
            self.shared.buffered.fetch_sub(len, Ordering::AcqRel);
            Error::ChannelError("channel writer has stopped".to_string())
        })
    }

    fn buffered_amount(&self) -> u64 {
        self.shared.buffered.load(Ordering::Acquire)
    }

    fn close(&mut self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        // Dropping the sender lets the writer flush a Close frame and exit.
        self.shared.outbound().take();
        self.expected_token = None;
        self.shared.set_channel_state(ChannelState::Closed);
        *self
            .shared
            .connection_state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = ConnectionState::Closed;
        tracing::debug!("TCP transport {} closed", self.session_id);
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Fields of a remote description this transport understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDescription {
    /// Addresses to dial, in order
    pub candidates: Vec<SocketAddr>,
    /// Token the responder will present
    pub token: Option<String>,
    /// Largest message the peer accepts
    pub max_message_size: usize,
}

impl RemoteDescription {
    /// Parse a description body.
    ///
    /// A missing `a=max-message-size` line falls back to the frame limit,
    /// since signal compression strips it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SignalingParse`] for a malformed candidate or size.
    pub fn parse(body: &str) -> Result<Self> {
        let mut remote = Self {
            candidates: Vec::new(),
            token: None,
            max_message_size: frame::MAX_PAYLOAD_SIZE,
        };

        for line in body.lines().map(str::trim) {
            if let Some(addr) = line.strip_prefix(CANDIDATE_PREFIX) {
                let addr = addr.parse().map_err(|e| {
                    Error::SignalingParse(format!("invalid candidate '{addr}': {e}"))
                })?;
                remote.candidates.push(addr);
            } else if let Some(token) = line.strip_prefix(TOKEN_PREFIX) {
                remote.token = Some(token.to_string());
            } else if let Some(size) = line.strip_prefix(MAX_MESSAGE_PREFIX) {
                let size: usize = size.parse().map_err(|e| {
                    Error::SignalingParse(format!("invalid max message size '{size}': {e}"))
                })?;
                remote.max_message_size = size.min(frame::MAX_PAYLOAD_SIZE);
            }
        }

        Ok(remote)
    }
}

async fn accept_loop(
    listener: TcpListener,
    mut token_rx: watch::Receiver<Option<String>>,
    hello_timeout: Duration,
    shared: Arc<Shared>,
) {
    loop {
        let (mut stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Failed to accept connection: {e}");
                shared.set_connection_state(ConnectionState::Failed);
                return;
            }
        };
        tracing::debug!("Incoming connection from {peer}");

        let hello: HelloPayload = match read_hello(&mut stream, hello_timeout).await {
            Ok(hello) => hello,
            Err(e) => {
                tracing::warn!("Rejected connection from {peer}: {e}");
                continue;
            }
        };

        let Some(expected) = wait_for_token(&mut token_rx).await else {
            return;
        };
        if hello.token != expected {
            tracing::warn!("Connection from {peer} presented an unknown token");
            continue;
        }

        if let Err(e) = write_frame(&mut stream, FrameType::HelloAck, &[]).await {
            tracing::warn!("Failed to acknowledge {peer}: {e}");
            continue;
        }

        tracing::info!("Peer '{}' connected from {peer}", hello.device_name);
        run_channel(stream, shared).await;
        return;
    }
}

async fn read_hello(stream: &mut TcpStream, hello_timeout: Duration) -> Result<HelloPayload> {
    let (header, payload) = read_frame_with_timeout(stream, hello_timeout).await?;
    if header.frame_type != FrameType::Hello {
        return Err(Error::ProtocolError(format!(
            "expected Hello, got {:?}",
            header.frame_type
        )));
    }
    frame::decode_payload(&payload)
}

async fn wait_for_token(token_rx: &mut watch::Receiver<Option<String>>) -> Option<String> {
    loop {
        if let Some(token) = token_rx.borrow_and_update().clone() {
            return Some(token);
        }
        if token_rx.changed().await.is_err() {
            return None;
        }
    }
}

async fn dial_loop(
    candidates: Vec<SocketAddr>,
    hello: HelloPayload,
    connect_timeout: Duration,
    shared: Arc<Shared>,
) {
    let payload = match encode_payload(&hello) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Failed to encode hello: {e}");
            shared.set_connection_state(ConnectionState::Failed);
            return;
        }
    };

    for addr in candidates {
        match try_candidate(addr, &payload, connect_timeout).await {
            Ok(stream) => {
                tracing::info!("Connected to peer at {addr}");
                run_channel(stream, shared).await;
                return;
            }
            Err(e) => tracing::debug!("Candidate {addr} failed: {e}"),
        }
    }

    tracing::warn!("No candidate in the offer was reachable");
    shared.set_connection_state(ConnectionState::Failed);
}

async fn try_candidate(
    addr: SocketAddr,
    hello: &[u8],
    connect_timeout: Duration,
) -> Result<TcpStream> {
    let mut stream = timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout(connect_timeout.as_secs()))??;

    write_frame(&mut stream, FrameType::Hello, hello).await?;

    // The initiator holds the connection until its user pastes our answer.
    let (header, _) = read_frame(&mut stream).await?;
    if header.frame_type != FrameType::HelloAck {
        return Err(Error::ProtocolError(format!(
            "expected HelloAck, got {:?}",
            header.frame_type
        )));
    }
    Ok(stream)
}

async fn run_channel(stream: TcpStream, shared: Arc<Shared>) {
    if let Err(e) = configure_tcp_keepalive(&stream) {
        tracing::warn!("Failed to enable TCP keep-alive: {e}");
    }

    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    *shared.outbound() = Some(tx);
    tokio::spawn(write_loop(writer, rx, Arc::clone(&shared)));

    shared.set_channel_state(ChannelState::Open);
    shared.set_connection_state(ConnectionState::Connected);
    shared.emit(TransportEvent::ChannelOpen);

    let failure = loop {
        match read_frame(&mut reader).await {
            Ok((header, _)) if header.frame_type == FrameType::Close => break None,
            Ok((header, payload)) => match frame_to_message(header.frame_type, payload) {
                Ok(Some(message)) => shared.emit(TransportEvent::Message(message)),
                Ok(None) => tracing::debug!("Ignoring {:?} frame", header.frame_type),
                Err(e) => break Some(e.to_string()),
            },
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break None,
            Err(e) => break Some(e.to_string()),
        }
    };

    shared.outbound().take();
    shared.set_channel_state(ChannelState::Closed);
    match failure {
        Some(detail) => {
            tracing::warn!("Data channel failed: {detail}");
            shared.emit(TransportEvent::ChannelError(detail));
        }
        None => {
            tracing::info!("Peer closed the data channel");
            shared.emit(TransportEvent::ChannelClose);
        }
    }
    shared.set_connection_state(ConnectionState::Disconnected);
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<ChannelMessage>,
    shared: Arc<Shared>,
) {
    while let Some(message) = rx.recv().await {
        let len = message.len() as u64;
        let (frame_type, payload) = message_to_frame(&message);
        let result = write_frame(&mut writer, frame_type, payload).await;
        shared.buffered.fetch_sub(len, Ordering::AcqRel);

        if let Err(e) = result {
            tracing::warn!("Failed to write to peer: {e}");
            return;
        }
    }

    let _ = write_frame(&mut writer, FrameType::Close, &[]).await;
    let _ = writer.shutdown().await;
}

fn runtime_handle() -> Result<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current()
        .map_err(|e| Error::TransportError(format!("no async runtime available: {e}")))
}

/// Configure TCP keep-alive on a stream.
fn configure_tcp_keepalive(stream: &TcpStream) -> Result<()> {
    let socket_ref = SockRef::from(stream);

    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(10))
        .with_interval(Duration::from_secs(5));

    socket_ref
        .set_tcp_keepalive(&keepalive)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    tracing::debug!("TCP keep-alive enabled on socket");
    Ok(())
}

/// Addresses to advertise for a listener bound at `bound`.
fn candidate_addresses(advertise: Option<&[String]>, bound: SocketAddr) -> Result<Vec<SocketAddr>> {
    let port = bound.port();
    if let Some(hosts) = advertise {
        return hosts
            .iter()
            .map(|host| {
                host.parse::<IpAddr>()
                    .map(|ip| SocketAddr::new(ip, port))
                    .map_err(|e| Error::InvalidConfig {
                        key: "connection.advertise".to_string(),
                        reason: format!("'{host}' is not an IP address: {e}"),
                    })
            })
            .collect();
    }

    if !bound.ip().is_unspecified() {
        return Ok(vec![bound]);
    }

    Ok(get_local_addresses()
        .into_iter()
        .map(|ip| SocketAddr::new(ip, port))
        .collect())
}

/// Local addresses worth advertising, LAN address first.
fn get_local_addresses() -> Vec<IpAddr> {
    let mut addrs = Vec::new();

    if let Ok(socket) = UdpSocket::bind("0.0.0.0:0") {
        if socket.connect("8.8.8.8:80").is_ok() {
            if let Ok(local_addr) = socket.local_addr() {
                addrs.push(local_addr.ip());
            }
        }
    }

    addrs.push(IpAddr::from([127, 0, 0, 1]));
    addrs
}

fn generate_token() -> String {
    use rand::RngCore;
    use std::fmt::Write;

    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::new(), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offer_description() {
        let body = "v=0\r\no=beetroot x\r\ns=desk\r\na=candidate:192.168.1.20:4000\r\n\
                    a=candidate:127.0.0.1:4000\r\na=max-message-size:262144\r\n";
        let remote = RemoteDescription::parse(body).unwrap();

        assert_eq!(remote.candidates.len(), 2);
        assert_eq!(remote.candidates[1], "127.0.0.1:4000".parse().unwrap());
        assert_eq!(remote.max_message_size, 262_144);
        assert!(remote.token.is_none());
    }

    #[test]
    fn test_parse_tolerates_stripped_max_message_size() {
        let body = crate::signaling::strip_lines(
            "v=0\r\na=token:abcd\r\na=max-message-size:1024\r\n",
            crate::DEFAULT_STRIP_MARKER,
        );
        let remote = RemoteDescription::parse(&body).unwrap();

        assert_eq!(remote.token.as_deref(), Some("abcd"));
        assert_eq!(remote.max_message_size, frame::MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_parse_rejects_bad_candidate() {
        assert!(matches!(
            RemoteDescription::parse("a=candidate:not-an-address\r\n"),
            Err(Error::SignalingParse(_))
        ));
    }

    #[test]
    fn test_candidate_addresses() {
        let bound: SocketAddr = "0.0.0.0:5555".parse().unwrap();
        let advertise = vec!["10.0.0.7".to_string()];
        let addrs = candidate_addresses(Some(&advertise), bound).unwrap();
        assert_eq!(addrs, vec!["10.0.0.7:5555".parse::<SocketAddr>().unwrap()]);

        let loopback: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        assert_eq!(candidate_addresses(None, loopback).unwrap(), vec![loopback]);

        let bad = vec!["example.com".to_string()];
        assert!(candidate_addresses(Some(&bad), bound).is_err());
    }

    #[test]
    fn test_generate_token_is_hex() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_create_offer_requires_runtime() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = TcpTransport::new(ConnectionConfig::default(), "t".into(), 0, tx);
        assert!(matches!(
            transport.create_offer(),
            Err(Error::TransportError(_))
        ));
    }

    #[tokio::test]
    async fn test_offer_lists_candidates() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = ConnectionConfig {
            bind_address: "127.0.0.1:0".to_string(),
            ..ConnectionConfig::default()
        };
        let mut transport = TcpTransport::new(config, "desk".into(), 7, tx);
        transport.open_channel("fileTransfer").unwrap();
        transport.create_offer().unwrap();

        assert_eq!(
            rx.recv().await,
            Some(TransportNotice {
                generation: 7,
                event: TransportEvent::GatheringComplete,
            })
        );
        let offer = transport.local_description().unwrap();
        assert_eq!(offer.kind, SdpKind::Offer);

        let remote = RemoteDescription::parse(&offer.body).unwrap();
        assert_eq!(remote.candidates.len(), 1);
        assert!(remote.candidates[0].ip().is_loopback());
        assert_eq!(transport.channel_state(), ChannelState::Connecting);

        transport.close();
        transport.close();
        assert_eq!(transport.connection_state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_send_before_open_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = TcpTransport::new(ConnectionConfig::default(), "t".into(), 0, tx);
        assert!(matches!(
            transport.send(ChannelMessage::Text("hi".into())),
            Err(Error::NotConnected)
        ));
        assert_eq!(transport.buffered_amount(), 0);
    }
}
