//! External collaborator contracts
//!
//! The booking and chat services and the feedback destination live outside
//! this workspace. Only their message shapes and call signatures are fixed
//! here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FeedbackRecord, InnertoneResult, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Scheduled,
    Cancelled,
}

/// Booked appointment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: u64,
    pub therapist_name: String,
    /// ISO-8601 on the wire
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBooking {
    pub therapist_name: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: SessionId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    pub book: String,
    pub section: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub is_crisis: bool,
    #[serde(default)]
    pub sources: Vec<SourceReference>,
    #[serde(default)]
    pub emotions: Vec<String>,
    #[serde(default)]
    pub emotion_intensity: f32,
}

#[async_trait]
pub trait BookingApi: Send + Sync {
    async fn create(&self, booking: NewBooking) -> InnertoneResult<Booking>;
    async fn list(&self) -> InnertoneResult<Vec<Booking>>;
    async fn cancel(&self, id: u64) -> InnertoneResult<Booking>;
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send(&self, request: ChatRequest) -> InnertoneResult<ChatReply>;
}

/// Destination of post-session feedback
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn submit(&self, session: Option<SessionId>, record: FeedbackRecord) -> InnertoneResult<()>;
}
