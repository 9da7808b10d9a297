//! Transport collaborator contract.
//!
//! The session never negotiates connections itself. It drives a
//! [`PeerTransport`], which owns connection setup, candidate discovery and
//! the single ordered, reliable data channel. Everything the transport
//! wants to tell the session arrives as a [`TransportEvent`].
//!
//! [`tcp`] provides a working implementation over plain TCP.

pub mod frame;
pub mod tcp;

use std::fmt;

use crate::error::Result;
use crate::signaling::SessionDescriptor;

/// Overall connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing attempted yet
    New,
    /// Negotiation in progress
    Connecting,
    /// Peer reachable
    Connected,
    /// Peer temporarily unreachable
    Disconnected,
    /// Negotiation or connectivity failed
    Failed,
    /// Closed locally
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Ready state of the data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Not open yet
    Connecting,
    /// Messages can be sent
    Open,
    /// Shutting down
    Closing,
    /// Closed or never created
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A message on the data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    /// UTF-8 text message
    Text(String),
    /// Binary message
    Binary(Vec<u8>),
}

impl ChannelMessage {
    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Notifications from the transport to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Candidate discovery finished; the local description is final
    GatheringComplete,
    /// Connection state changed
    ConnectionStateChanged(ConnectionState),
    /// Data channel opened
    ChannelOpen,
    /// Data channel closed
    ChannelClose,
    /// Data channel failed
    ChannelError(String),
    /// Message received on the data channel
    Message(ChannelMessage),
}

/// A [`TransportEvent`] tagged with the transport that raised it.
///
/// Events from a transport that has since been replaced may still be queued
/// when a new one starts; the generation tells them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportNotice {
    /// Generation given to [`Connector::connect`] for the raising transport
    pub generation: u64,
    /// What happened
    pub event: TransportEvent,
}

/// One peer connection with one data channel.
pub trait PeerTransport {
    /// Create the outbound ordered, reliable channel (initiator only).
    fn open_channel(&mut self, label: &str) -> Result<()>;

    /// Begin producing a local offer. Completion is signalled by
    /// [`TransportEvent::GatheringComplete`].
    fn create_offer(&mut self) -> Result<()>;

    /// Apply a remote offer and begin producing the local answer.
    fn accept_offer(&mut self, offer: &SessionDescriptor) -> Result<()>;

    /// Apply the remote answer to a previously created offer.
    fn accept_answer(&mut self, answer: &SessionDescriptor) -> Result<()>;

    /// The local description, once one exists.
    fn local_description(&self) -> Option<SessionDescriptor>;

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Current data channel state.
    fn channel_state(&self) -> ChannelState;

    /// Queue a message on the data channel.
    fn send(&mut self, message: ChannelMessage) -> Result<()>;

    /// Bytes handed to the channel but not yet written out.
    fn buffered_amount(&self) -> u64;

    /// Close the channel and the connection. Must be idempotent.
    fn close(&mut self);
}

/// Factory for fresh transports; one per session attempt.
pub trait Connector {
    /// Transport type produced by this connector
    type Transport: PeerTransport;

    /// Create a new, unconnected transport. Every event it raises carries
    /// `generation`.
    fn connect(&mut self, generation: u64) -> Result<Self::Transport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ChannelState::Open.to_string(), "open");
        assert_eq!(ChannelState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_message_len() {
        assert_eq!(ChannelMessage::Text("abc".into()).len(), 3);
        assert_eq!(ChannelMessage::Binary(vec![0; 10]).len(), 10);
        assert!(ChannelMessage::Binary(Vec::new()).is_empty());
    }
}
