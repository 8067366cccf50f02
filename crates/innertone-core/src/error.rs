//! Error types for InnerTone

use thiserror::Error;

use crate::SessionState;

/// Core InnerTone errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InnertoneError {
    // Device errors
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    // Speech errors
    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Synthesis failed for segment: {0}")]
    SynthesisSegment(String),

    #[error("Speech recognition already active")]
    CaptureActive,

    #[error("Speech recognition not allowed while {0:?}")]
    CaptureNotAllowed(SessionState),

    // Protocol errors
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    // Session errors
    #[error("Invalid transition from {from:?} on {action}")]
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },

    #[error("No active session")]
    NoActiveSession,

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl InnertoneError {
    /// Errors surfaced to the user; everything else is only logged
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            InnertoneError::PermissionDenied(_)
                | InnertoneError::DeviceUnavailable(_)
                | InnertoneError::Transport(_)
                | InnertoneError::ChannelClosed
                | InnertoneError::Negotiation(_)
        )
    }

    /// Errors that end the session
    pub fn is_session_fatal(&self) -> bool {
        self.is_user_visible()
    }

    /// Text shown to the user
    pub fn user_message(&self) -> String {
        match self {
            InnertoneError::PermissionDenied(_) => {
                "Microphone or camera access denied. Please allow access and try again."
                    .to_string()
            }
            InnertoneError::DeviceUnavailable(_) => {
                "No microphone or camera could be opened.".to_string()
            }
            InnertoneError::Transport(_) | InnertoneError::ChannelClosed => {
                "Connection to the consultant was lost.".to_string()
            }
            InnertoneError::Negotiation(_) => "The call could not be connected.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for InnertoneError {
    fn from(err: serde_json::Error) -> Self {
        InnertoneError::MalformedMessage(err.to_string())
    }
}

/// Result type for InnerTone operations
pub type InnertoneResult<T> = Result<T, InnertoneError>;
