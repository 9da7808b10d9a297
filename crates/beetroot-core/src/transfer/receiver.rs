//! Inbound file reassembly.

use super::{percent, MilestoneTracker, TransferMetadata};
use crate::error::{Error, Result};

/// A completely received file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Name announced by the sender
    pub name: String,
    /// File contents
    pub data: Vec<u8>,
}

impl ReceivedFile {
    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Result of feeding a message to the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Binary data arrived with no file announced; dropped
    Ignored,
    /// A new file was announced
    Started(TransferMetadata),
    /// Bytes appended to the file in flight
    Progress {
        /// File name
        name: String,
        /// Bytes received so far
        received: u64,
        /// Declared size
        size: u64,
        /// Milestones crossed by this chunk
        milestones: Vec<u8>,
    },
    /// The file in flight reached its declared size
    Completed {
        /// The assembled file
        file: ReceivedFile,
        /// Milestones crossed by the final chunk
        milestones: Vec<u8>,
    },
}

/// Collects chunks for the file in flight.
#[derive(Debug, Clone)]
pub struct ReceiveAccumulator {
    metadata: Option<TransferMetadata>,
    chunks: Vec<Vec<u8>>,
    received: u64,
    milestones: MilestoneTracker,
}

impl Default for ReceiveAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata: None,
            chunks: Vec::new(),
            received: 0,
            milestones: MilestoneTracker::new(false),
        }
    }

    /// File currently being received.
    #[must_use]
    pub fn metadata(&self) -> Option<&TransferMetadata> {
        self.metadata.as_ref()
    }

    /// Bytes received for the file in flight.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Drop any partial file.
    pub fn reset(&mut self) {
        self.metadata = None;
        self.chunks.clear();
        self.received = 0;
        self.milestones.reset();
    }

    /// Handle a text message, which always announces a new file.
    ///
    /// A partial file in flight is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolError`] if the text is not valid metadata.
    pub fn on_text(&mut self, text: &str) -> Result<ReceiveOutcome> {
        self.reset();
        let metadata = TransferMetadata::from_json(text)?;
        self.metadata = Some(metadata.clone());
        Ok(ReceiveOutcome::Started(metadata))
    }

    /// Handle a binary chunk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolError`] and discards the partial file if the
    /// chunk would exceed the declared size.
    pub fn on_binary(&mut self, data: Vec<u8>) -> Result<ReceiveOutcome> {
        let Some(metadata) = &self.metadata else {
            tracing::debug!("Ignoring {} bytes received without metadata", data.len());
            return Ok(ReceiveOutcome::Ignored);
        };

        let name = metadata.name.clone();
        let size = metadata.size;

        let received = self.received + data.len() as u64;
        if received > size {
            self.reset();
            return Err(Error::ProtocolError(format!(
                "received {received} bytes for '{name}' but only {size} were announced"
            )));
        }

        self.received = received;
        self.chunks.push(data);
        let milestones = self.milestones.advance(percent(received, size));

        if let Some(file) = self.try_complete() {
            return Ok(ReceiveOutcome::Completed { file, milestones });
        }

        Ok(ReceiveOutcome::Progress {
            name,
            received,
            size,
            milestones,
        })
    }

    /// Assemble the file if all declared bytes are present.
    ///
    /// Completion is one-shot: the accumulator is reset afterwards. An
    /// announced empty file completes as soon as this is called.
    pub fn try_complete(&mut self) -> Option<ReceivedFile> {
        let metadata = self.metadata.as_ref()?;
        if self.received != metadata.size {
            return None;
        }

        let name = metadata.name.clone();
        let data = self.chunks.concat();
        self.reset();
        Some(ReceivedFile { name, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_in_chunks() {
        let mut acc = ReceiveAccumulator::new();
        let outcome = acc.on_text(r#"{"name":"a.bin","size":6}"#).unwrap();
        assert_eq!(outcome, ReceiveOutcome::Started(TransferMetadata::new("a.bin", 6)));

        match acc.on_binary(vec![1, 2, 3, 4]).unwrap() {
            ReceiveOutcome::Progress {
                received,
                milestones,
                ..
            } => {
                assert_eq!(received, 4);
                assert_eq!(milestones, vec![10, 20, 30, 40, 50, 60]);
            }
            other => panic!("unexpected {other:?}"),
        }

        match acc.on_binary(vec![5, 6]).unwrap() {
            ReceiveOutcome::Completed { file, milestones } => {
                assert_eq!(file.name, "a.bin");
                assert_eq!(file.data, vec![1, 2, 3, 4, 5, 6]);
                assert_eq!(milestones, vec![70, 80, 90, 100]);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(acc.metadata().is_none());
        assert_eq!(acc.received(), 0);
        assert_eq!(acc.on_binary(vec![7]).unwrap(), ReceiveOutcome::Ignored);
    }

    #[test]
    fn test_binary_without_metadata_is_ignored() {
        let mut acc = ReceiveAccumulator::new();
        assert_eq!(acc.on_binary(vec![1, 2]).unwrap(), ReceiveOutcome::Ignored);
        assert!(acc.try_complete().is_none());
    }

    #[test]
    fn test_empty_file_completes_on_metadata() {
        let mut acc = ReceiveAccumulator::new();
        acc.on_text(r#"{"name":"empty","size":0}"#).unwrap();
        let file = acc.try_complete().unwrap();
        assert_eq!(file.name, "empty");
        assert!(file.data.is_empty());
        assert!(acc.try_complete().is_none());
    }

    #[test]
    fn test_overflow_discards_partial_file() {
        let mut acc = ReceiveAccumulator::new();
        acc.on_text(r#"{"name":"a","size":3}"#).unwrap();
        acc.on_binary(vec![1, 2]).unwrap();

        assert!(matches!(
            acc.on_binary(vec![3, 4]),
            Err(Error::ProtocolError(_))
        ));
        assert!(acc.metadata().is_none());
    }

    #[test]
    fn test_new_metadata_replaces_partial_file() {
        let mut acc = ReceiveAccumulator::new();
        acc.on_text(r#"{"name":"first","size":10}"#).unwrap();
        acc.on_binary(vec![0; 4]).unwrap();
        acc.on_text(r#"{"name":"second","size":2}"#).unwrap();

        assert_eq!(acc.received(), 0);
        match acc.on_binary(vec![9, 9]).unwrap() {
            ReceiveOutcome::Completed { file, .. } => assert_eq!(file.name, "second"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invalid_metadata() {
        let mut acc = ReceiveAccumulator::new();
        assert!(matches!(
            acc.on_text("not json"),
            Err(Error::ProtocolError(_))
        ));
        assert!(acc.metadata().is_none());
    }
}
