//! Outbound file queue and chunk pacing.

use std::path::PathBuf;

use super::{percent, MilestoneTracker, TransferMetadata};

/// A file waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFile {
    /// Name announced to the peer
    pub name: String,
    /// Size in bytes at the time it was queued
    pub size: u64,
    /// Where the driver reads the bytes from
    pub path: PathBuf,
}

impl QueuedFile {
    /// Create a queued file.
    #[must_use]
    pub fn new(name: impl Into<String>, size: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            size,
            path: path.into(),
        }
    }
}

/// A request for the host to read one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    /// Index of the file in the send queue
    pub file_index: usize,
    /// File to read from
    pub path: PathBuf,
    /// Byte offset of the chunk
    pub offset: u64,
    /// Number of bytes to read
    pub len: usize,
    /// Identifies this read; completions with another ticket are stale
    pub ticket: u64,
}

/// What the pump wants done next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpAction {
    /// Nothing to do until a read completes or a transfer starts
    Idle,
    /// Send the metadata text message for this file
    Metadata {
        /// Index of the file in the queue
        file_index: usize,
        /// Metadata to send
        metadata: TransferMetadata,
    },
    /// Read the next chunk
    Read(ChunkRequest),
    /// Every byte of this file has been handed to the channel
    FileSent {
        /// Index of the file in the queue
        file_index: usize,
        /// File name
        name: String,
    },
    /// The whole queue has been sent
    AllSent,
}

/// Sequential sender state: one file at a time, one read at a time.
#[derive(Debug, Clone)]
pub struct SendPump {
    files: Vec<QueuedFile>,
    chunk_size: usize,
    running: bool,
    index: usize,
    offset: u64,
    metadata_sent: bool,
    outstanding: Option<ChunkRequest>,
    next_ticket: u64,
    milestones: MilestoneTracker,
}

impl SendPump {
    /// Create an empty pump.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            files: Vec::new(),
            chunk_size: chunk_size.max(1),
            running: false,
            index: 0,
            offset: 0,
            metadata_sent: false,
            outstanding: None,
            next_ticket: 0,
            milestones: MilestoneTracker::new(true),
        }
    }

    /// Replace the queue.
    pub fn set_files(&mut self, files: Vec<QueuedFile>) {
        self.files = files;
    }

    /// Files currently queued.
    #[must_use]
    pub fn files(&self) -> &[QueuedFile] {
        &self.files
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Whether a send is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Bytes of the current file handed to the channel.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Begin sending the queue from the first file.
    pub fn start(&mut self) {
        self.running = true;
        self.index = 0;
        self.offset = 0;
        self.metadata_sent = false;
        self.outstanding = None;
        self.milestones.reset();
    }

    /// Stop sending; any outstanding read is abandoned. The queue is kept.
    pub fn stop(&mut self) {
        self.running = false;
        self.outstanding = None;
    }

    /// Stop sending and empty the queue.
    pub fn cancel(&mut self) {
        self.stop();
        self.files.clear();
    }

    /// Whether the next action would be a chunk read.
    ///
    /// The caller checks the channel's buffered amount before letting the
    /// pump issue a read.
    #[must_use]
    pub fn wants_read(&self) -> bool {
        self.running
            && self.outstanding.is_none()
            && self.metadata_sent
            && self
                .files
                .get(self.index)
                .is_some_and(|file| self.offset < file.size)
    }

    /// Decide the next step.
    pub fn next_action(&mut self) -> PumpAction {
        if !self.running || self.outstanding.is_some() {
            return PumpAction::Idle;
        }

        let Some(file) = self.files.get(self.index) else {
            self.running = false;
            return PumpAction::AllSent;
        };

        if !self.metadata_sent {
            self.metadata_sent = true;
            self.offset = 0;
            self.milestones.reset();
            return PumpAction::Metadata {
                file_index: self.index,
                metadata: TransferMetadata::new(file.name.clone(), file.size),
            };
        }

        if self.offset >= file.size {
            let done = PumpAction::FileSent {
                file_index: self.index,
                name: file.name.clone(),
            };
            self.index += 1;
            self.offset = 0;
            self.metadata_sent = false;
            return done;
        }

        let remaining = file.size - self.offset;
        #[allow(clippy::cast_possible_truncation)]
        let len = remaining.min(self.chunk_size as u64) as usize;
        let request = ChunkRequest {
            file_index: self.index,
            path: file.path.clone(),
            offset: self.offset,
            len,
            ticket: self.next_ticket,
        };
        self.next_ticket += 1;
        self.outstanding = Some(request.clone());
        PumpAction::Read(request)
    }

    /// Claim the outstanding read matching `ticket`.
    ///
    /// Returns `None` for stale or unknown tickets.
    pub fn take_read(&mut self, ticket: u64) -> Option<ChunkRequest> {
        if self.outstanding.as_ref().is_some_and(|r| r.ticket == ticket) {
            self.outstanding.take()
        } else {
            None
        }
    }

    /// Account for bytes handed to the channel and return crossed milestones.
    ///
    /// Call with `0` right after the metadata message to report the 0% mark.
    pub fn record_sent(&mut self, bytes: u64) -> Vec<u8> {
        self.offset += bytes;
        let size = self.files.get(self.index).map_or(0, |file| file.size);
        self.milestones.advance(percent(self.offset, size))
    }
}
