//! Duplex text channels
//!
//! The dialogue service and the signaling relay are both reached over a
//! JSON-text duplex channel keyed by session id. Connectors open one and
//! hand back a send half; everything received arrives as [`ChannelEvent`]s.

use async_trait::async_trait;
use innertone_core::{EventSink, InnertoneResult, SessionId};

/// Lifecycle and traffic of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Channel is ready for traffic
    Opened,
    /// Text frame from the remote side
    Message(String),
    /// Closed by either side
    Closed,
    /// Connection lost or refused
    Failed(String),
}

impl ChannelEvent {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelEvent::Closed | ChannelEvent::Failed(_))
    }
}

/// Send half of an open channel
pub trait ChannelSink: Send + Sync {
    fn send(&self, frame: String) -> InnertoneResult<()>;

    /// Close the channel. Idempotent.
    fn close(&self);
}

/// Opens channels for a session
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(
        &self,
        session: &SessionId,
        events: EventSink<ChannelEvent>,
    ) -> InnertoneResult<Box<dyn ChannelSink>>;
}
