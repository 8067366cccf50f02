//! Dialogue Channel Client - duplex channel to the AI dialogue service

use innertone_core::{
    ClientMessage, DialogueUpdate, EventSink, InnertoneError, InnertoneResult, SessionId,
};
use tracing::{debug, info};

use crate::{ChannelConnector, ChannelEvent, ChannelSink};

/// Client side of the dialogue channel
pub struct DialogueChannel {
    session: SessionId,
    sink: Box<dyn ChannelSink>,
    open: bool,
    closed: bool,
}

impl DialogueChannel {
    /// Start connecting; `Opened` arrives on `events` when ready
    pub async fn connect(
        connector: &dyn ChannelConnector,
        session: SessionId,
        events: EventSink<ChannelEvent>,
    ) -> InnertoneResult<Self> {
        let sink = connector.connect(&session, events).await?;
        info!(session = %session, "dialogue channel connecting");
        Ok(Self {
            session,
            sink,
            open: false,
            closed: false,
        })
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open && !self.closed
    }

    pub fn mark_open(&mut self) {
        if !self.closed {
            self.open = true;
        }
    }

    /// Send a finalized user utterance
    pub fn send_text(&self, text: &str) -> InnertoneResult<()> {
        if !self.is_open() {
            return Err(InnertoneError::ChannelClosed);
        }
        let frame = ClientMessage::text(text).to_json()?;
        debug!(session = %self.session, %frame, "dialogue send");
        self.sink.send(frame)
    }

    /// Close once; later calls do nothing
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.open = false;
        self.sink.close();
        info!(session = %self.session, "dialogue channel closed");
    }

    /// Decode an inbound frame. Malformed and empty frames yield `None`.
    pub fn decode(raw: &str) -> Option<DialogueUpdate> {
        match DialogueUpdate::parse(raw) {
            Ok(update) if update.is_empty() => {
                debug!(frame = raw, "ignoring dialogue frame without state or transcript");
                None
            }
            Ok(update) => Some(update),
            Err(err) => {
                debug!(%err, frame = raw, "ignoring malformed dialogue frame");
                None
            }
        }
    }
}

impl Drop for DialogueChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DialogueChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueChannel")
            .field("session", &self.session)
            .field("open", &self.open)
            .field("closed", &self.closed)
            .finish()
    }
}
