//! Peer Transport Negotiator - offer/answer and candidate exchange
//!
//! Candidates may arrive before the remote description; they are held in
//! receipt order and applied as soon as the remote description is set.

use std::collections::VecDeque;

use async_trait::async_trait;
use innertone_core::{
    EventSink, IceCandidate, InnertoneError, InnertoneResult, SdpKind, SessionDescription,
    SignalMessage,
};
use tracing::{debug, info, warn};

use crate::SignalingClient;

/// Public STUN server used when none is configured
pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";

/// Peer connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub ice_servers: Vec<String>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![DEFAULT_ICE_SERVER.to_string()],
        }
    }
}

/// Media path state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PeerConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    /// Media path is gone for good
    #[inline]
    pub fn is_lost(self) -> bool {
        matches!(
            self,
            PeerConnectionState::Disconnected
                | PeerConnectionState::Failed
                | PeerConnectionState::Closed
        )
    }
}

/// Asynchronous transport notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Gathered a local candidate to send to the peer
    LocalCandidate(IceCandidate),
    ConnectionState(PeerConnectionState),
    /// Remote media arrived (track id)
    RemoteTrack(String),
}

/// Real-time media transport
#[async_trait]
pub trait PeerTransport: Send {
    async fn create_offer(&mut self) -> InnertoneResult<SessionDescription>;
    async fn create_answer(&mut self) -> InnertoneResult<SessionDescription>;
    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> InnertoneResult<()>;
    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> InnertoneResult<()>;
    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> InnertoneResult<()>;

    /// Send a local media track to the peer
    fn add_track(&mut self, track_id: &str);

    fn close(&mut self);
}

/// Creates peer transports
#[async_trait]
pub trait PeerTransportFactory: Send + Sync {
    async fn create(
        &self,
        config: &PeerConfig,
        events: EventSink<PeerEvent>,
    ) -> InnertoneResult<Box<dyn PeerTransport>>;
}

/// Description exchange bookkeeping for one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaNegotiation {
    pub local_description: Option<SessionDescription>,
    pub remote_description: Option<SessionDescription>,
    pub pending_candidates: VecDeque<IceCandidate>,
    pub connection_state: PeerConnectionState,
}

/// Drives one peer transport through the signaling relay
pub struct PeerNegotiator {
    transport: Box<dyn PeerTransport>,
    signaling: SignalingClient,
    negotiation: MediaNegotiation,
    closed: bool,
}

impl PeerNegotiator {
    pub fn new(transport: Box<dyn PeerTransport>, signaling: SignalingClient) -> Self {
        Self {
            transport,
            signaling,
            negotiation: MediaNegotiation::default(),
            closed: false,
        }
    }

    pub fn negotiation(&self) -> &MediaNegotiation {
        &self.negotiation
    }

    pub fn add_track(&mut self, track_id: &str) {
        self.transport.add_track(track_id);
    }

    /// Initiator side: create, apply and send an offer
    pub async fn start_call(&mut self) -> InnertoneResult<()> {
        self.ensure_open()?;
        let offer = self.transport.create_offer().await?;
        self.transport.set_local_description(offer.clone()).await?;
        self.negotiation.local_description = Some(offer.clone());
        self.signaling.send(&SignalMessage::Offer(offer))?;
        info!(room = %self.signaling.room(), "offer sent");
        Ok(())
    }

    /// Apply a message received through the relay
    pub async fn handle_signal(&mut self, message: SignalMessage) -> InnertoneResult<()> {
        self.ensure_open()?;
        match message {
            SignalMessage::Offer(offer) => self.accept_offer(offer).await,
            SignalMessage::Answer(answer) => self.accept_answer(answer).await,
            SignalMessage::Candidate(candidate) => {
                if self.negotiation.remote_description.is_some() {
                    self.apply_candidate(candidate).await;
                } else {
                    debug!(
                        pending = self.negotiation.pending_candidates.len() + 1,
                        "buffering candidate until remote description"
                    );
                    self.negotiation.pending_candidates.push_back(candidate);
                }
                Ok(())
            }
        }
    }

    /// Forward a locally gathered candidate to the peer
    pub fn send_local_candidate(&self, candidate: IceCandidate) -> InnertoneResult<()> {
        self.ensure_open()?;
        self.signaling.send(&SignalMessage::Candidate(candidate))
    }

    /// Record a transport state change; returns it for convenience
    pub fn on_connection_state(&mut self, state: PeerConnectionState) -> PeerConnectionState {
        if self.negotiation.connection_state != state {
            info!(from = ?self.negotiation.connection_state, to = ?state, "peer connection state");
            self.negotiation.connection_state = state;
        }
        state
    }

    /// Tear down the transport and leave the relay. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.transport.close();
        self.signaling.close();
        self.negotiation = MediaNegotiation {
            connection_state: PeerConnectionState::Closed,
            ..Default::default()
        };
    }

    async fn accept_offer(&mut self, offer: SessionDescription) -> InnertoneResult<()> {
        if offer.kind != SdpKind::Offer {
            return Err(InnertoneError::Negotiation("offer frame without offer sdp".into()));
        }
        if self.negotiation.remote_description.is_some() {
            debug!("ignoring repeated offer");
            return Ok(());
        }

        self.transport.set_remote_description(offer.clone()).await?;
        self.negotiation.remote_description = Some(offer);
        self.drain_pending().await;

        let answer = self.transport.create_answer().await?;
        self.transport.set_local_description(answer.clone()).await?;
        self.negotiation.local_description = Some(answer.clone());
        self.signaling.send(&SignalMessage::Answer(answer))?;
        info!(room = %self.signaling.room(), "answer sent");
        Ok(())
    }

    async fn accept_answer(&mut self, answer: SessionDescription) -> InnertoneResult<()> {
        let awaiting = matches!(
            &self.negotiation.local_description,
            Some(local) if local.kind == SdpKind::Offer
        ) && self.negotiation.remote_description.is_none();
        if !awaiting {
            debug!("ignoring unexpected answer");
            return Ok(());
        }

        self.transport.set_remote_description(answer.clone()).await?;
        self.negotiation.remote_description = Some(answer);
        self.drain_pending().await;
        Ok(())
    }

    async fn drain_pending(&mut self) {
        while let Some(candidate) = self.negotiation.pending_candidates.pop_front() {
            self.apply_candidate(candidate).await;
        }
    }

    async fn apply_candidate(&mut self, candidate: IceCandidate) {
        if let Err(err) = self.transport.add_ice_candidate(candidate).await {
            warn!(%err, "failed to apply candidate");
        }
    }

    fn ensure_open(&self) -> InnertoneResult<()> {
        if self.closed {
            Err(InnertoneError::ChannelClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for PeerNegotiator {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PeerNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerNegotiator")
            .field("negotiation", &self.negotiation)
            .field("closed", &self.closed)
            .finish()
    }
}
