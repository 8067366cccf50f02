//! Session data model
//!
//! A session is the lifetime of one call: from the user pressing start until
//! the transport closes or the user ends it. Only the session state machine
//! mutates these values; everything else sees snapshots.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{InnertoneError, InnertoneResult, SessionId, SessionTime};

/// What the session (and the AI behind it) is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Listening,
    Thinking,
    Speaking,
    Error,
    Disconnected,
}

impl SessionState {
    /// Transport is up and a conversation is in progress
    #[inline]
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            SessionState::Listening | SessionState::Thinking | SessionState::Speaking
        )
    }

    /// Session instance can no longer change state
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Disconnected)
    }

    /// Session holds (or is acquiring) devices and transports
    #[inline]
    pub fn is_live(self) -> bool {
        self == SessionState::Connecting || self.is_connected()
    }

    /// User-facing status line for this state
    pub fn status_label(self, mode: SessionMode) -> &'static str {
        match (mode, self) {
            (SessionMode::PeerCall, SessionState::Idle) => "Ready to Connect",
            (SessionMode::PeerCall, SessionState::Connecting) => "Calling...",
            (SessionMode::PeerCall, s) if s.is_connected() => "On Call",
            (SessionMode::PeerCall, SessionState::Disconnected) => "Call Ended",
            (_, SessionState::Idle) => "Idle",
            (_, SessionState::Connecting) => "AI Session Connecting...",
            (_, SessionState::Listening) => "AI Listening",
            (_, SessionState::Thinking) => "InnerTone Thinking",
            (_, SessionState::Speaking) => "AI Speaking",
            (_, SessionState::Disconnected) => "AI Disconnected",
            (_, _) => "Connection Error",
        }
    }
}

/// Kind of call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    AiVoice,
    AiVideo,
    PeerCall,
}

impl SessionMode {
    /// Prefix of generated session identifiers
    pub fn id_prefix(self) -> &'static str {
        match self {
            SessionMode::AiVoice => "voice",
            SessionMode::AiVideo => "video",
            SessionMode::PeerCall => "room",
        }
    }

    /// Whether the camera is acquired alongside the microphone
    #[inline]
    pub fn wants_video(self) -> bool {
        matches!(self, SessionMode::AiVideo | SessionMode::PeerCall)
    }

    /// Whether the remote party is the dialogue service
    #[inline]
    pub fn is_ai(self) -> bool {
        !matches!(self, SessionMode::PeerCall)
    }
}

/// One call's data
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub mode: SessionMode,
    pub state: SessionState,
    pub started_at: SessionTime,
    /// Time spent connected (listening, thinking or speaking)
    pub elapsed: Duration,
    /// Last AI utterance
    pub transcript: String,
    /// In-progress recognized user text
    pub user_utterance: String,
}

impl Session {
    pub fn new(id: SessionId, mode: SessionMode, started_at: SessionTime) -> Self {
        Self {
            id,
            mode,
            state: SessionState::Idle,
            started_at,
            elapsed: Duration::ZERO,
            transcript: String::new(),
            user_utterance: String::new(),
        }
    }

    #[inline]
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed.as_secs()
    }

    /// Accumulate call time; only connected states count
    pub fn accumulate(&mut self, dt: Duration) {
        if self.state.is_connected() {
            self.elapsed += dt;
        }
    }
}

/// Format whole seconds as `mm:ss`
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Post-session rating handed to the feedback collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FeedbackRecord {
    pub const MIN_RATING: u8 = 1;
    pub const MAX_RATING: u8 = 5;

    /// Validated record; blank messages are dropped
    pub fn new(rating: u8, message: Option<String>) -> InnertoneResult<Self> {
        if !(Self::MIN_RATING..=Self::MAX_RATING).contains(&rating) {
            return Err(InnertoneError::InvalidRating(rating));
        }
        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        Ok(Self { rating, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_states() {
        assert!(SessionState::Listening.is_connected());
        assert!(SessionState::Thinking.is_connected());
        assert!(SessionState::Speaking.is_connected());
        assert!(!SessionState::Connecting.is_connected());
        assert!(SessionState::Connecting.is_live());
        assert!(!SessionState::Error.is_live());
        assert!(SessionState::Disconnected.is_terminal());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(
            SessionState::Connecting.status_label(SessionMode::AiVoice),
            "AI Session Connecting..."
        );
        assert_eq!(
            SessionState::Thinking.status_label(SessionMode::AiVideo),
            "InnerTone Thinking"
        );
        assert_eq!(
            SessionState::Speaking.status_label(SessionMode::PeerCall),
            "On Call"
        );
        assert_eq!(
            SessionState::Connecting.status_label(SessionMode::PeerCall),
            "Calling..."
        );
        assert_eq!(
            SessionState::Error.status_label(SessionMode::AiVoice),
            "Connection Error"
        );
    }

    #[test]
    fn test_timer_only_counts_connected_time() {
        let mut session = Session::new(
            SessionId::new("voice-1"),
            SessionMode::AiVoice,
            SessionTime::ZERO,
        );
        session.state = SessionState::Connecting;
        session.accumulate(Duration::from_secs(3));
        assert_eq!(session.elapsed_seconds(), 0);

        session.state = SessionState::Speaking;
        session.accumulate(Duration::from_secs(65));
        assert_eq!(format_elapsed(session.elapsed_seconds()), "01:05");
    }

    #[test]
    fn test_feedback_rating_bounds() {
        assert!(FeedbackRecord::new(0, None).is_err());
        assert!(FeedbackRecord::new(6, None).is_err());

        let record = FeedbackRecord::new(5, Some("  ".into())).unwrap();
        assert_eq!(record.message, None);

        let record = FeedbackRecord::new(3, Some(" helpful ".into())).unwrap();
        assert_eq!(record.message.as_deref(), Some("helpful"));
    }

    #[test]
    fn test_mode_properties() {
        assert!(!SessionMode::AiVoice.wants_video());
        assert!(SessionMode::AiVideo.wants_video());
        assert!(SessionMode::PeerCall.wants_video());
        assert!(!SessionMode::PeerCall.is_ai());
    }

    proptest::proptest! {
        #[test]
        fn prop_elapsed_label_round_trips(secs in 0u64..360_000) {
            let label = format_elapsed(secs);
            let (mm, ss) = label.split_once(':').unwrap();
            proptest::prop_assert_eq!(ss.len(), 2);
            let total = mm.parse::<u64>().unwrap() * 60 + ss.parse::<u64>().unwrap();
            proptest::prop_assert_eq!(total, secs);
        }
    }
}
