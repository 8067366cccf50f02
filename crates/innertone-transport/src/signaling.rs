//! Signaling Relay - session-description and candidate exchange
//!
//! Peers join a relay room named by the shared session id; every frame a
//! member sends is delivered to every other member of the room.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use innertone_core::{EventSink, InnertoneError, InnertoneResult, SessionId, SignalMessage};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{ChannelConnector, ChannelEvent, ChannelSink};

/// Client side of the signaling relay
pub struct SignalingClient {
    room: SessionId,
    sink: Box<dyn ChannelSink>,
    closed: bool,
}

impl SignalingClient {
    pub async fn join(
        connector: &dyn ChannelConnector,
        room: SessionId,
        events: EventSink<ChannelEvent>,
    ) -> InnertoneResult<Self> {
        let sink = connector.connect(&room, events).await?;
        info!(room = %room, "joined signaling relay");
        Ok(Self {
            room,
            sink,
            closed: false,
        })
    }

    pub fn room(&self) -> &SessionId {
        &self.room
    }

    pub fn send(&self, message: &SignalMessage) -> InnertoneResult<()> {
        if self.closed {
            return Err(InnertoneError::ChannelClosed);
        }
        debug!(room = %self.room, kind = message.kind(), "signal send");
        self.sink.send(message.to_json()?)
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.sink.close();
            info!(room = %self.room, "left signaling relay");
        }
    }

    /// Decode an inbound frame; malformed frames yield `None`
    pub fn decode(raw: &str) -> Option<SignalMessage> {
        match SignalMessage::parse(raw) {
            Ok(message) => Some(message),
            Err(err) => {
                debug!(%err, frame = raw, "ignoring malformed signal frame");
                None
            }
        }
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SignalingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingClient")
            .field("room", &self.room)
            .field("closed", &self.closed)
            .finish()
    }
}

type Members = Vec<(u64, EventSink<ChannelEvent>)>;

/// In-process relay: rooms keyed by session id, broadcast to all but the sender
#[derive(Clone, Default)]
pub struct RelayHub {
    rooms: Arc<Mutex<HashMap<SessionId, Members>>>,
    next_member: Arc<AtomicU64>,
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member_count(&self, room: &SessionId) -> usize {
        self.rooms.lock().get(room).map_or(0, Vec::len)
    }

    fn broadcast(&self, room: &SessionId, sender: u64, frame: &str) {
        let recipients: Vec<EventSink<ChannelEvent>> = self
            .rooms
            .lock()
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .filter(|(id, _)| *id != sender)
                    .map(|(_, sink)| sink.clone())
                    .collect()
            })
            .unwrap_or_default();

        for sink in recipients {
            sink.emit(ChannelEvent::Message(frame.to_string()));
        }
    }

    fn leave(&self, room: &SessionId, member: u64) {
        let mut rooms = self.rooms.lock();
        if let Some(members) = rooms.get_mut(room) {
            members.retain(|(id, _)| *id != member);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }
}

#[async_trait]
impl ChannelConnector for RelayHub {
    async fn connect(
        &self,
        session: &SessionId,
        events: EventSink<ChannelEvent>,
    ) -> InnertoneResult<Box<dyn ChannelSink>> {
        let member = self.next_member.fetch_add(1, Ordering::Relaxed);
        self.rooms
            .lock()
            .entry(session.clone())
            .or_default()
            .push((member, events.clone()));
        events.emit(ChannelEvent::Opened);
        debug!(room = %session, member, "relay member joined");

        Ok(Box::new(RelayMember {
            hub: self.clone(),
            room: session.clone(),
            member,
            events,
            closed: AtomicBool::new(false),
        }))
    }
}

impl std::fmt::Debug for RelayHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHub")
            .field("rooms", &self.rooms.lock().len())
            .finish()
    }
}

struct RelayMember {
    hub: RelayHub,
    room: SessionId,
    member: u64,
    events: EventSink<ChannelEvent>,
    closed: AtomicBool,
}

impl ChannelSink for RelayMember {
    fn send(&self, frame: String) -> InnertoneResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(InnertoneError::ChannelClosed);
        }
        self.hub.broadcast(&self.room, self.member, &frame);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.hub.leave(&self.room, self.member);
            self.events.emit(ChannelEvent::Closed);
        }
    }
}

impl Drop for RelayMember {
    fn drop(&mut self) {
        self.close();
    }
}
