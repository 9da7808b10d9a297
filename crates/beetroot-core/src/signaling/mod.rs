//! Manual signaling format.
//!
//! Peers exchange exactly one session description each by copy/paste.
//! A signal is a single JSON object:
//!
//! ```text
//! {"type":"offer","sdp":"v=0\r\no=...\r\n..."}
//! ```
//!
//! Before a local description is shown to the user, every line containing
//! the strip marker (`a=max-message-size:` by default) is removed to keep
//! the blob short. The filter is lossy; the remote transport must cope with
//! the missing line.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which half of the handshake a descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Produced by the initiator
    Offer,
    /// Produced by the responder
    Answer,
}

impl SdpKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
        }
    }
}

impl fmt::Display for SdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local role in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Created the offer
    Initiator,
    /// Answered a pasted offer
    Responder,
}

/// Opaque negotiated-endpoint description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    /// Offer or answer
    #[serde(rename = "type")]
    pub kind: SdpKind,
    /// Transport-specific description text
    #[serde(rename = "sdp")]
    pub body: String,
}

impl SessionDescriptor {
    /// Create a new descriptor.
    #[must_use]
    pub fn new(kind: SdpKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    /// Copy of this descriptor with every line containing `marker` removed.
    #[must_use]
    pub fn compressed(&self, marker: &str) -> Self {
        Self {
            kind: self.kind,
            body: strip_lines(&self.body, marker),
        }
    }
}

/// Remove every line that contains `marker`.
///
/// Lines are split on `\n`, so a trailing `\r` stays attached to the lines
/// that are kept.
#[must_use]
pub fn strip_lines(body: &str, marker: &str) -> String {
    if marker.is_empty() {
        return body.to_string();
    }
    body.split('\n')
        .filter(|line| !line.contains(marker))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Encode a local descriptor as signal text for the user to copy.
pub fn encode_signal(descriptor: &SessionDescriptor, marker: &str) -> Result<String> {
    serde_json::to_string(&descriptor.compressed(marker))
        .map_err(|e| Error::Serialization(e.to_string()))
}

/// Parse signal text pasted by the user.
///
/// # Errors
///
/// - [`Error::SignalingParse`] if the text is not a JSON object, or has no
///   non-empty `type` string, or no `sdp` string.
/// - [`Error::SignalingState`] if `type` is present but neither `offer` nor
///   `answer`.
pub fn parse_signal(text: &str) -> Result<SessionDescriptor> {
    let value: serde_json::Value = serde_json::from_str(text.trim())
        .map_err(|e| Error::SignalingParse(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| Error::SignalingParse("expected a JSON object".to_string()))?;

    let kind = match object.get("type").and_then(serde_json::Value::as_str) {
        None | Some("") => {
            return Err(Error::SignalingParse("missing signal type".to_string()));
        }
        Some("offer") => SdpKind::Offer,
        Some("answer") => SdpKind::Answer,
        Some(other) => {
            return Err(Error::SignalingState(format!(
                "unsupported signal type '{other}'"
            )));
        }
    };

    let body = object
        .get("sdp")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| Error::SignalingParse("missing session description".to_string()))?;

    Ok(SessionDescriptor::new(kind, body))
}
