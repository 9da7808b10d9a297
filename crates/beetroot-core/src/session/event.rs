//! Session states and the events a session reports to its host.

use std::fmt;

use crate::error::Error;
use crate::signaling::SdpKind;

/// Signaling state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Fresh session, nothing negotiated
    Idle,
    /// Initiator asked the transport for an offer
    OfferCreated,
    /// Initiator's offer is out; waiting for the pasted answer
    AwaitingAnswer,
    /// Responder applied a pasted offer
    OfferReceived,
    /// Responder's answer is out
    AnswerCreated,
    /// Transport reported the peer reachable
    Connected,
    /// Connection failed or did not come back; only cleanup leaves this
    Unrecoverable,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::OfferCreated => "offer created",
            Self::AwaitingAnswer => "awaiting answer",
            Self::OfferReceived => "offer received",
            Self::AnswerCreated => "answer created",
            Self::Connected => "connected",
            Self::Unrecoverable => "unrecoverable",
        };
        f.write_str(name)
    }
}

/// Something the host should show or act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Human-readable status line
    Status(String),
    /// An operation failed
    Error {
        /// Stable error code, if the error has one
        code: Option<&'static str>,
        /// Error message
        message: String,
    },
    /// Signaling state changed
    StateChanged(SessionState),
    /// Local signal text is ready to be copied to the peer
    SignalReady {
        /// Offer or answer
        kind: SdpKind,
        /// JSON text to copy
        text: String,
    },
    /// Metadata for a queued file was sent
    SendStarted {
        /// Index in the send queue
        file_index: usize,
        /// File name
        name: String,
        /// File size in bytes
        size: u64,
    },
    /// A chunk was handed to the channel
    SendProgress {
        /// Index in the send queue
        file_index: usize,
        /// Bytes sent so far
        sent: u64,
        /// File size in bytes
        size: u64,
    },
    /// A multiple of ten percent was reached while sending
    SendMilestone {
        /// File name
        name: String,
        /// Percentage reached
        percent: u8,
    },
    /// All bytes of a file were handed to the channel
    FileSent {
        /// Index in the send queue
        file_index: usize,
        /// File name
        name: String,
    },
    /// The send queue is done
    AllFilesSent,
    /// The peer announced a file
    ReceiveStarted {
        /// File name
        name: String,
        /// Declared size in bytes
        size: u64,
    },
    /// A chunk of the incoming file arrived
    ReceiveProgress {
        /// Bytes received so far
        received: u64,
        /// Declared size in bytes
        size: u64,
    },
    /// A multiple of ten percent was reached while receiving
    ReceiveMilestone {
        /// File name
        name: String,
        /// Percentage reached
        percent: u8,
    },
    /// A file was fully received; take it with `take_received`
    FileReceived {
        /// File name
        name: String,
        /// Size in bytes
        size: u64,
    },
    /// The local send was cancelled
    TransferCancelled,
    /// Completion notification, only when the host granted permission
    Notify {
        /// Notification title
        title: String,
        /// Notification body
        body: String,
    },
}

impl SessionEvent {
    /// Status line event.
    #[must_use]
    pub fn status(text: impl Into<String>) -> Self {
        Self::Status(text.into())
    }

    /// Error event for `error`.
    #[must_use]
    pub fn error(error: &Error) -> Self {
        Self::Error {
            code: error.code(),
            message: error.to_string(),
        }
    }
}
