//! Wire framing for the TCP transport.
//!
//! ## Frame Format
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     Beetroot Frame                         │
//! ├────────────┬────────────┬────────────┬─────────────────────┤
//! │   Magic    │  Version   │    Type    │      Length         │
//! │  4 bytes   │  2 bytes   │   1 byte   │      4 bytes        │
//! ├────────────┴────────────┴────────────┴─────────────────────┤
//! │                        Payload                             │
//! │                    (variable length)                       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! - Magic: `0x42 0x54 0x52 0x54` ("BTRT")
//! - Version: `0x01 0x00` (1.0)
//! - Length: Payload length in bytes (big-endian)

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::transport::ChannelMessage;

/// Protocol magic bytes: "BTRT"
pub const MAGIC: [u8; 4] = [0x42, 0x54, 0x52, 0x54];

/// Protocol version written into every frame
pub const VERSION: (u8, u8) = (1, 0);

/// Frame header size in bytes
pub const HEADER_SIZE: usize = 11;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Responder introduces itself with its answer token
    Hello = 0x01,
    /// Initiator accepted the token
    HelloAck = 0x02,
    /// Text channel message
    Text = 0x10,
    /// Binary channel message
    Binary = 0x11,
    /// Orderly channel shutdown
    Close = 0x20,
}

impl FrameType {
    /// Parse a frame type from a byte.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Hello),
            0x02 => Some(Self::HelloAck),
            0x10 => Some(Self::Text),
            0x11 => Some(Self::Binary),
            0x20 => Some(Self::Close),
            _ => None,
        }
    }
}

/// A frame header.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    /// Protocol version (major, minor)
    pub version: (u8, u8),
    /// Frame type
    pub frame_type: FrameType,
    /// Payload length
    pub payload_length: u32,
}

impl FrameHeader {
    /// Encode the header to bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4] = self.version.0;
        buf[5] = self.version.1;
        buf[6] = self.frame_type as u8;
        buf[7..11].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode a header from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if buf[0..4] != MAGIC {
            return Err(Error::ProtocolError("invalid magic bytes".to_string()));
        }

        let version = (buf[4], buf[5]);
        if version.0 != VERSION.0 {
            return Err(Error::ProtocolError(format!(
                "unsupported frame version {}.{}",
                version.0, version.1
            )));
        }

        let frame_type = FrameType::from_byte(buf[6])
            .ok_or_else(|| Error::ProtocolError(format!("unknown frame type: {:#x}", buf[6])))?;

        let payload_length = u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]);

        if payload_length as usize > MAX_PAYLOAD_SIZE {
            return Err(Error::ProtocolError(format!(
                "payload too large: {payload_length} bytes"
            )));
        }

        Ok(Self {
            version,
            frame_type,
            payload_length,
        })
    }
}

/// Hello payload sent by the responder right after dialing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Token from the responder's answer
    pub token: String,
    /// Responder's device name
    pub device_name: String,
}

/// Encode a payload to JSON bytes.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a payload from JSON bytes.
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| Error::Serialization(e.to_string()))
}

/// Map a channel message to its frame type and payload.
#[must_use]
pub fn message_to_frame(message: &ChannelMessage) -> (FrameType, &[u8]) {
    match message {
        ChannelMessage::Text(text) => (FrameType::Text, text.as_bytes()),
        ChannelMessage::Binary(data) => (FrameType::Binary, data.as_slice()),
    }
}

/// Turn a received data frame back into a channel message.
///
/// Returns `Ok(None)` for frames that are not channel messages.
pub fn frame_to_message(frame_type: FrameType, payload: Vec<u8>) -> Result<Option<ChannelMessage>> {
    match frame_type {
        FrameType::Text => String::from_utf8(payload)
            .map(|text| Some(ChannelMessage::Text(text)))
            .map_err(|_| Error::ProtocolError("text frame is not valid UTF-8".to_string())),
        FrameType::Binary => Ok(Some(ChannelMessage::Binary(payload))),
        _ => Ok(None),
    }
}

/// Read a complete frame from a stream.
///
/// # Errors
///
/// Returns an error if reading fails or the frame is invalid.
pub async fn read_frame<R>(reader: &mut R) -> Result<(FrameHeader, Vec<u8>)>
where
    R: AsyncReadExt + Unpin,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_buf).await?;

    let header = FrameHeader::decode(&header_buf)?;

    let mut payload = vec![0u8; header.payload_length as usize];
    if header.payload_length > 0 {
        reader.read_exact(&mut payload).await?;
    }

    Ok((header, payload))
}

/// Write a complete frame to a stream.
///
/// # Errors
///
/// Returns an error if the payload is too large or writing fails.
pub async fn write_frame<W>(writer: &mut W, frame_type: FrameType, payload: &[u8]) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::ProtocolError(format!(
            "payload too large: {} bytes",
            payload.len()
        )));
    }

    #[allow(clippy::cast_possible_truncation)]
    let header = FrameHeader {
        version: VERSION,
        frame_type,
        payload_length: payload.len() as u32,
    };

    writer.write_all(&header.encode()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;

    Ok(())
}

/// Read a frame, failing with [`Error::Timeout`] if none arrives in time.
pub async fn read_frame_with_timeout<R>(
    reader: &mut R,
    duration: Duration,
) -> Result<(FrameHeader, Vec<u8>)>
where
    R: AsyncReadExt + Unpin,
{
    timeout(duration, read_frame(reader))
        .await
        .map_err(|_| Error::Timeout(duration.as_secs()))?
}
