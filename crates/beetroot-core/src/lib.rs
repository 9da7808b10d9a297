//! # Beetroot Core Library
//!
//! `beetroot-core` implements manual-signaling peer-to-peer file transfer:
//! two peers exchange session descriptions by copy/paste, then stream files
//! over a single ordered, reliable message channel.
//!
//! ## Features
//!
//! - **Manual signaling**: offer/answer blobs exchanged out of band as JSON text
//! - **Transport agnostic**: the connection is a [`transport::PeerTransport`] collaborator
//! - **Chunked transfers**: 64 KiB chunks with a single buffered-amount throttle
//! - **Deterministic core**: the session is a synchronous state machine, driven
//!   by [`driver::SessionDriver`] on tokio or by a fake transport in tests
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`driver`] - Async runtime driver (file reads, timers, output saving)
//! - [`error`] - Error types
//! - [`mod@file`] - Local file helpers
//! - [`session`] - Transfer session state machine
//! - [`signaling`] - Session descriptors and the copy/paste signal format
//! - [`transfer`] - Metadata, chunk math, progress milestones, queue and accumulator
//! - [`transport`] - Transport collaborator contract and the TCP transport
//!
//! ## Example
//!
//! ```rust,ignore
//! use beetroot_core::config::Config;
//! use beetroot_core::driver::SessionDriver;
//!
//! let config = Config::load()?;
//! let (_task, handle) = SessionDriver::spawn(&config, output_dir)?;
//! handle.start_connection().await?;
//! // copy the printed offer to the peer, then paste their answer:
//! handle.connect_peer(answer_text).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod driver;
pub mod error;
pub mod file;
pub mod session;
pub mod signaling;
pub mod transfer;
pub mod transport;

pub use error::{Error, Result};
pub use session::{SessionEvent, SessionState, TransferSession};
pub use signaling::{Role, SdpKind, SessionDescriptor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Chunk size for file transfers (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 65536;

/// Buffered-amount threshold above which sending is throttled (1 MiB)
pub const DEFAULT_BUFFERED_HIGH_WATER: u64 = 1024 * 1024;

/// Delay before re-checking the buffered amount while throttled
pub const DEFAULT_THROTTLE_BACKOFF_MS: u64 = 100;

/// Grace period after a disconnect before the session is declared lost
pub const DEFAULT_DISCONNECT_GRACE_SECS: u64 = 5;

/// Label of the data channel opened by the initiator
pub const DEFAULT_CHANNEL_LABEL: &str = "fileTransfer";

/// Session-description lines containing this marker are dropped from signals
pub const DEFAULT_STRIP_MARKER: &str = "a=max-message-size:";
