//! Wire messages
//!
//! Dialogue channel frames and signaling relay frames, both JSON text.

use serde::{Deserialize, Serialize};

use crate::{InnertoneError, InnertoneResult};

/// Outbound dialogue frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Finalized user utterance
    Text { text: String },
}

impl ClientMessage {
    pub fn text(text: impl Into<String>) -> Self {
        ClientMessage::Text { text: text.into() }
    }

    pub fn to_json(&self) -> InnertoneResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Remote dialogue service state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    Idle,
    Listening,
    Thinking,
    Speaking,
}

/// Inbound dialogue frame
///
/// Both fields are optional and independent. Frames carrying neither (the
/// service's `{"type":"control"}` greeting, for example) parse to an empty
/// update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RemoteState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl DialogueUpdate {
    pub fn parse(raw: &str) -> InnertoneResult<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(InnertoneError::MalformedMessage(
                "dialogue frame is not an object".into(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.transcript.is_none()
    }

    /// Transcript with surrounding whitespace removed, `None` when blank
    pub fn spoken_text(&self) -> Option<&str> {
        self.transcript
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Local or remote session description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Connectivity candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        }
    }
}

/// Signaling relay frame; exactly one key per message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalMessage {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
}

impl SignalMessage {
    pub fn parse(raw: &str) -> InnertoneResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> InnertoneResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Offer(_) => "offer",
            SignalMessage::Answer(_) => "answer",
            SignalMessage::Candidate(_) => "candidate",
        }
    }
}
