//! Error types for Beetroot.
//!
//! This module provides a unified error type for all Beetroot operations,
//! with specific error variants for different failure modes.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Beetroot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Beetroot.
#[derive(Error, Debug)]
pub enum Error {
    /// Pasted signaling text could not be parsed (E001)
    #[error("invalid signal data format: {0}")]
    SignalingParse(String),

    /// Well-formed signal that does not fit the current role or state (E002)
    #[error("invalid signal data or wrong connection state: {0}")]
    SignalingState(String),

    /// Data channel reported a failure (E003)
    #[error("data channel error: {0}")]
    ChannelError(String),

    /// Local file could not be read while sending (E004)
    #[error("error reading file '{file}': {reason}")]
    FileRead {
        /// The file being read
        file: String,
        /// Reason reported by the reader
        reason: String,
    },

    /// Connection dropped; may come back within the grace period (E005)
    #[error("connection lost")]
    ConnectionLost,

    /// Connection is gone for good; the session must be restarted (E006)
    #[error("connection cannot be recovered, start a new session")]
    ConnectionUnrecoverable,

    /// No open data channel
    #[error("connection not ready, connect to a peer first")]
    NotConnected,

    /// Nothing in the send queue
    #[error("no files selected")]
    NoFilesQueued,

    /// A send is already running
    #[error("a transfer is already in progress")]
    TransferInProgress,

    /// Invalid message received from the peer
    #[error("invalid protocol message: {0}")]
    ProtocolError(String),

    /// Transport failure outside of the data channel
    #[error("transport error: {0}")]
    TransportError(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Operation timeout
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::SignalingParse(_) => Some("E001"),
            Self::SignalingState(_) => Some("E002"),
            Self::ChannelError(_) => Some("E003"),
            Self::FileRead { .. } => Some("E004"),
            Self::ConnectionLost => Some("E005"),
            Self::ConnectionUnrecoverable => Some("E006"),
            _ => None,
        }
    }

    /// Returns whether this error is recoverable without restarting the session.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::ConnectionLost | Self::Timeout(_))
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::SignalingParse(_) => {
                Some("Paste the complete JSON object exactly as your peer copied it.")
            }
            Self::ConnectionUnrecoverable => {
                Some("Run 'cleanup' and exchange a fresh offer and answer.")
            }
            Self::NotConnected => Some("Create an offer with 'offer' or paste your peer's offer."),
            _ => None,
        }
    }
}
