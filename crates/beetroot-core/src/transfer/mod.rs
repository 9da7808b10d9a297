//! File transfer building blocks.
//!
//! A file travels as one text message carrying [`TransferMetadata`] followed
//! by its bytes in fixed-size binary chunks, strictly in order. The
//! [`sender::SendPump`] decides what to send next; the
//! [`receiver::ReceiveAccumulator`] reassembles incoming files. Neither does
//! any I/O.

pub mod receiver;
pub mod sender;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use receiver::{ReceiveAccumulator, ReceiveOutcome, ReceivedFile};
pub use sender::{ChunkRequest, PumpAction, QueuedFile, SendPump};

/// Header sent as a text message before a file's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    /// Original file name
    pub name: String,
    /// File size in bytes
    pub size: u64,
}

impl TransferMetadata {
    /// Create metadata for a file.
    #[must_use]
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }

    /// Encode as the JSON text message.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode from a received text message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolError`] if the text is not valid metadata.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::ProtocolError(format!("invalid file metadata: {e}")))
    }

    /// Size in megabytes, as shown in status lines.
    #[must_use]
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }
}

/// Number of chunks a file of `size` bytes is split into.
#[must_use]
pub fn chunk_count(size: u64, chunk_size: usize) -> u64 {
    size.div_ceil(chunk_size as u64)
}

/// Whole percent of `size` covered by `moved`. Empty files count as done.
#[must_use]
pub fn percent(moved: u64, size: u64) -> u8 {
    if size == 0 {
        return 100;
    }
    #[allow(clippy::cast_possible_truncation)]
    let pct = (u128::from(moved.min(size)) * 100 / u128::from(size)) as u8;
    pct
}

/// Emits every multiple of ten exactly once, in order.
///
/// A single chunk that jumps from 7% to 34% yields 10, 20 and 30.
#[derive(Debug, Clone)]
pub struct MilestoneTracker {
    first: u8,
    next: u8,
}

impl MilestoneTracker {
    /// Create a tracker; `include_zero` decides whether 0% is reported.
    #[must_use]
    pub const fn new(include_zero: bool) -> Self {
        let first = if include_zero { 0 } else { 10 };
        Self { first, next: first }
    }

    /// Start over for a new file.
    pub fn reset(&mut self) {
        self.next = self.first;
    }

    /// Milestones crossed on reaching `percent`.
    pub fn advance(&mut self, percent: u8) -> Vec<u8> {
        let reached = percent.min(100) / 10 * 10;
        let mut crossed = Vec::new();
        while self.next <= reached {
            crossed.push(self.next);
            self.next += 10;
        }
        crossed
    }
}
