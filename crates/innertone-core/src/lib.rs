//! InnerTone Core - Fundamental session types and primitives
//!
//! This crate defines the types shared by every InnerTone crate:
//! - Identifiers (SessionId, CaptureId, UtteranceId, SessionEpoch)
//! - Time primitives (SessionTime, Clock)
//! - Session data model (SessionState, SessionMode, Session, FeedbackRecord)
//! - Wire messages for the dialogue channel and signaling relay
//! - Collaborator contracts (booking, chat, feedback)
//! - Error taxonomy

pub mod id;
pub mod time;
pub mod state;
pub mod message;
pub mod event;
pub mod collaborator;
pub mod error;

pub use id::*;
pub use time::*;
pub use state::*;
pub use message::*;
pub use event::*;
pub use collaborator::*;
pub use error::*;
