//! Session State Machine - single owner of the call lifecycle
//!
//! Every input (user action, channel traffic, bridge callback, timer tick)
//! arrives as a [`SessionEvent`] and is handled to completion before the next
//! one. Resources for a session live in one [`SessionContext`] that is
//! created on start and released exactly once. Events carry the epoch of the
//! session that produced them; anything from an older session is dropped.

use std::sync::Arc;
use std::time::Duration;

use innertone_core::{
    format_elapsed, CaptureId, Clock, DialogueUpdate, EventSink, FeedbackRecord, FeedbackSink,
    InnertoneError, InnertoneResult, RemoteState, Session, SessionEpoch, SessionId, SessionMode,
    SessionState, SessionTime, UtteranceId,
};
use innertone_transport::{
    ChannelConnector, ChannelEvent, DialogueChannel, PeerConnectionState, PeerEvent,
    PeerNegotiator, PeerTransportFactory, SignalingClient,
};
use innertone_voice::{
    CaptureAdapter, EngineEvent, MediaConstraints, MediaDevices, RecognitionEngine,
    RecognitionEvent, RecognitionFault, RecognizerBridge, SampleTap, SpeechEngine,
    SpeechEngineEvent, SynthesisEvent, SynthesizerBridge,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::SessionConfig;

/// Builds a fresh recognition engine for each session
pub type RecognitionFactory = Arc<dyn Fn() -> Box<dyn RecognitionEngine> + Send + Sync>;

/// Builds a fresh speech engine for each session
pub type SpeechFactory = Arc<dyn Fn() -> Box<dyn SpeechEngine> + Send + Sync>;

/// Host-provided collaborators
#[derive(Clone)]
pub struct SessionServices {
    pub devices: Arc<dyn MediaDevices>,
    pub dialogue: Arc<dyn ChannelConnector>,
    pub signaling: Arc<dyn ChannelConnector>,
    pub peers: Arc<dyn PeerTransportFactory>,
    pub recognition: RecognitionFactory,
    pub speech: SpeechFactory,
    pub feedback: Arc<dyn FeedbackSink>,
    pub clock: Arc<dyn Clock>,
}

/// Things the user can do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    Start(SessionMode),
    End,
    /// End, then open the feedback flow
    EndWithFeedback,
    StartListening,
    StopListening,
    ToggleMute,
    ToggleCamera,
    /// Peer calls: send the offer
    PlaceCall,
    SubmitFeedback { rating: u8, message: Option<String> },
    SkipFeedback,
}

impl UserAction {
    pub fn name(&self) -> &'static str {
        match self {
            UserAction::Start(_) => "start",
            UserAction::End => "end",
            UserAction::EndWithFeedback => "end with feedback",
            UserAction::StartListening => "start listening",
            UserAction::StopListening => "stop listening",
            UserAction::ToggleMute => "toggle mute",
            UserAction::ToggleCamera => "toggle camera",
            UserAction::PlaceCall => "place call",
            UserAction::SubmitFeedback { .. } => "submit feedback",
            UserAction::SkipFeedback => "skip feedback",
        }
    }
}

/// Every input the machine reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    User(UserAction),
    Dialogue(SessionEpoch, ChannelEvent),
    Signal(SessionEpoch, ChannelEvent),
    Peer(SessionEpoch, PeerEvent),
    Recognition(SessionEpoch, CaptureId, EngineEvent),
    Speech(SessionEpoch, UtteranceId, SpeechEngineEvent),
    Tick,
    Shutdown,
}

/// Read-only view published after every event
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: Option<SessionId>,
    pub mode: SessionMode,
    pub state: SessionState,
    pub status: String,
    pub elapsed_seconds: u64,
    pub transcript: String,
    pub user_utterance: String,
    pub recording: bool,
    pub muted: bool,
    pub video_off: bool,
    pub remote_media: bool,
    pub error: Option<String>,
    pub feedback_open: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        let mode = SessionMode::default();
        Self {
            session_id: None,
            mode,
            state: SessionState::Idle,
            status: SessionState::Idle.status_label(mode).to_string(),
            elapsed_seconds: 0,
            transcript: String::new(),
            user_utterance: String::new(),
            recording: false,
            muted: false,
            video_off: false,
            remote_media: false,
            error: None,
            feedback_open: false,
        }
    }
}

impl SessionSnapshot {
    pub fn elapsed_label(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }
}

enum SessionLink {
    Dialogue(DialogueChannel),
    Peer(PeerNegotiator),
}

/// Resources owned by one session
struct SessionContext {
    capture: CaptureAdapter,
    recognizer: RecognizerBridge,
    synthesizer: SynthesizerBridge,
    link: SessionLink,
}

impl SessionContext {
    /// Release everything. Called once per context.
    fn release(mut self) {
        self.recognizer.abort();
        self.synthesizer.cancel();
        match &mut self.link {
            SessionLink::Dialogue(channel) => channel.close(),
            SessionLink::Peer(negotiator) => negotiator.close(),
        }
        self.capture.stop();
    }
}

/// Post-session rating collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackFlow {
    pub session: Option<SessionId>,
}

/// The session state machine
pub struct SessionMachine {
    config: SessionConfig,
    services: SessionServices,
    events: EventSink<SessionEvent>,
    snapshot: watch::Sender<SessionSnapshot>,
    analyser: Option<SampleTap>,
    rng: StdRng,

    state: SessionState,
    mode: SessionMode,
    epoch: SessionEpoch,
    session: Option<Session>,
    last_session: Option<SessionId>,
    context: Option<SessionContext>,
    recording: bool,
    remote_media: bool,
    pending_speaking: bool,
    error: Option<InnertoneError>,
    feedback: Option<FeedbackFlow>,
    last_tick: Option<SessionTime>,
}

impl SessionMachine {
    pub fn new(
        config: SessionConfig,
        services: SessionServices,
        events: EventSink<SessionEvent>,
    ) -> (Self, watch::Receiver<SessionSnapshot>) {
        let (snapshot, rx) = watch::channel(SessionSnapshot::default());
        let machine = Self {
            config,
            services,
            events,
            snapshot,
            analyser: None,
            rng: StdRng::from_entropy(),
            state: SessionState::Idle,
            mode: SessionMode::default(),
            epoch: SessionEpoch::ZERO,
            session: None,
            last_session: None,
            context: None,
            recording: false,
            remote_media: false,
            pending_speaking: false,
            error: None,
            feedback: None,
            last_tick: None,
        };
        machine.publish();
        (machine, rx)
    }

    /// Feed captured audio to this visualizer tap
    pub fn with_analyser(mut self, tap: SampleTap) -> Self {
        self.analyser = Some(tap);
        self
    }

    /// Deterministic session ids
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn epoch(&self) -> SessionEpoch {
        self.epoch
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    /// Handle one event to completion. Errors are rejected user actions;
    /// the state is unchanged when one is returned.
    pub async fn handle(&mut self, event: SessionEvent) -> InnertoneResult<()> {
        let result = match event {
            SessionEvent::User(action) => self.on_user(action).await,
            SessionEvent::Tick => {
                self.on_tick();
                Ok(())
            }
            SessionEvent::Shutdown => {
                self.end();
                Ok(())
            }
            other => {
                self.on_session_event(other).await;
                Ok(())
            }
        };
        self.publish();
        result
    }

    async fn on_user(&mut self, action: UserAction) -> InnertoneResult<()> {
        debug!(action = action.name(), state = ?self.state, "user action");
        match action {
            UserAction::Start(mode) => self.start(mode).await,
            UserAction::End => {
                self.end();
                Ok(())
            }
            UserAction::EndWithFeedback => {
                let session = self.current_session_id();
                self.end();
                self.feedback = Some(FeedbackFlow { session });
                Ok(())
            }
            UserAction::StartListening => self.start_listening(),
            UserAction::StopListening => {
                if let Some(ctx) = self.context.as_mut() {
                    ctx.recognizer.stop();
                }
                Ok(())
            }
            UserAction::ToggleMute => {
                let ctx = self.live_context(&action)?;
                ctx.capture.toggle_mute();
                Ok(())
            }
            UserAction::ToggleCamera => {
                let ctx = self.live_context(&action)?;
                ctx.capture.toggle_camera();
                Ok(())
            }
            UserAction::PlaceCall => self.place_call().await,
            UserAction::SubmitFeedback { rating, message } => {
                self.submit_feedback(rating, message).await
            }
            UserAction::SkipFeedback => {
                if self.feedback.take().is_some() {
                    debug!("feedback skipped");
                }
                Ok(())
            }
        }
    }

    async fn on_session_event(&mut self, event: SessionEvent) {
        let epoch = match &event {
            SessionEvent::Dialogue(e, _)
            | SessionEvent::Signal(e, _)
            | SessionEvent::Peer(e, _)
            | SessionEvent::Recognition(e, _, _)
            | SessionEvent::Speech(e, _, _) => *e,
            _ => return,
        };
        if epoch != self.epoch || self.context.is_none() {
            debug!(?event, current = ?self.epoch, "dropping event from inactive session");
            return;
        }

        match event {
            SessionEvent::Dialogue(_, ev) => self.on_dialogue(ev),
            SessionEvent::Signal(_, ev) => self.on_signal(ev).await,
            SessionEvent::Peer(_, ev) => self.on_peer(ev),
            SessionEvent::Recognition(_, capture, ev) => self.on_recognition(capture, ev),
            SessionEvent::Speech(_, utterance, ev) => self.on_speech(utterance, ev),
            _ => {}
        }
    }

    // Lifecycle

    async fn start(&mut self, mode: SessionMode) -> InnertoneResult<()> {
        if self.state.is_live() {
            return Err(InnertoneError::InvalidTransition {
                from: self.state,
                action: "start",
            });
        }
        self.release_context();

        self.epoch = self.epoch.next();
        let id = match &self.config.session_id {
            Some(fixed) => SessionId::new(fixed.clone()),
            None => SessionId::generate(mode, &mut self.rng),
        };
        let now = self.services.clock.now();
        info!(session = %id, ?mode, epoch = self.epoch.0, "starting session");

        self.mode = mode;
        self.session = Some(Session::new(id.clone(), mode, now));
        self.last_session = Some(id.clone());
        self.error = None;
        self.feedback = None;
        self.pending_speaking = false;
        self.recording = false;
        self.remote_media = false;
        self.last_tick = Some(now);
        self.set_state(SessionState::Connecting);
        self.publish();

        if let Err(err) = self.acquire(mode, id).await {
            self.fail(err);
        }
        Ok(())
    }

    async fn acquire(&mut self, mode: SessionMode, id: SessionId) -> InnertoneResult<()> {
        let epoch = self.epoch;

        let mut capture = CaptureAdapter::new(Arc::clone(&self.services.devices));
        capture.start(MediaConstraints::for_mode(mode)).await?;
        if let Some(tap) = &self.analyser {
            capture.attach_analyser(tap.clone());
        }

        let recognizer = RecognizerBridge::new(
            (self.services.recognition)(),
            self.config.recognition.options(),
            self.events.map(move |(capture, ev): (CaptureId, EngineEvent)| {
                SessionEvent::Recognition(epoch, capture, ev)
            }),
        );
        let synthesizer = SynthesizerBridge::new(
            (self.services.speech)(),
            self.config.speech.options(),
            self.events.map(move |(utterance, ev): (UtteranceId, SpeechEngineEvent)| {
                SessionEvent::Speech(epoch, utterance, ev)
            }),
        );

        let link = if mode.is_ai() {
            let channel = DialogueChannel::connect(
                self.services.dialogue.as_ref(),
                id,
                self.events.map(move |ev| SessionEvent::Dialogue(epoch, ev)),
            )
            .await?;
            SessionLink::Dialogue(channel)
        } else {
            let signaling = SignalingClient::join(
                self.services.signaling.as_ref(),
                id,
                self.events.map(move |ev| SessionEvent::Signal(epoch, ev)),
            )
            .await?;
            let transport = self
                .services
                .peers
                .create(
                    &self.config.transport.peer_config(),
                    self.events.map(move |ev| SessionEvent::Peer(epoch, ev)),
                )
                .await?;
            let mut negotiator = PeerNegotiator::new(transport, signaling);
            for track in capture.tracks() {
                negotiator.add_track(&track.id);
            }
            if self.config.auto_offer {
                negotiator.start_call().await?;
            }
            SessionLink::Peer(negotiator)
        };

        self.context = Some(SessionContext {
            capture,
            recognizer,
            synthesizer,
            link,
        });
        Ok(())
    }

    /// Tear down to `Disconnected`. A no-op from `Idle` or once already
    /// torn down; from `Error` it only moves the state.
    fn end(&mut self) {
        let had_context = self.release_context();
        let settled = matches!(self.state, SessionState::Idle | SessionState::Disconnected);
        if !had_context && self.session.is_none() && settled {
            debug!(state = ?self.state, "end: nothing to tear down");
            return;
        }
        self.session = None;
        self.error = None;
        self.set_state(SessionState::Disconnected);
        info!(session = ?self.last_session, "session ended");
    }

    fn fail(&mut self, err: InnertoneError) {
        error!(%err, state = ?self.state, "session failed");
        self.release_context();
        self.session = None;
        self.error = Some(err);
        self.set_state(SessionState::Error);
    }

    fn release_context(&mut self) -> bool {
        self.pending_speaking = false;
        self.recording = false;
        self.remote_media = false;
        match self.context.take() {
            Some(ctx) => {
                ctx.release();
                true
            }
            None => false,
        }
    }

    // User actions

    fn start_listening(&mut self) -> InnertoneResult<()> {
        if self.state != SessionState::Listening || !self.mode.is_ai() {
            return Err(InnertoneError::CaptureNotAllowed(self.state));
        }
        let ctx = self.context.as_mut().ok_or(InnertoneError::NoActiveSession)?;
        ctx.recognizer.start()?;
        if let Some(session) = self.session.as_mut() {
            session.user_utterance.clear();
        }
        self.recording = true;
        Ok(())
    }

    async fn place_call(&mut self) -> InnertoneResult<()> {
        let rejected = InnertoneError::InvalidTransition {
            from: self.state,
            action: "place call",
        };
        if self.state != SessionState::Connecting {
            return Err(rejected);
        }
        let Some(SessionLink::Peer(negotiator)) = self.context.as_mut().map(|c| &mut c.link)
        else {
            return Err(rejected);
        };
        if let Err(err) = negotiator.start_call().await {
            self.fail(err);
        }
        Ok(())
    }

    async fn submit_feedback(&mut self, rating: u8, message: Option<String>) -> InnertoneResult<()> {
        let Some(flow) = self.feedback.as_ref() else {
            return Err(InnertoneError::InvalidTransition {
                from: self.state,
                action: "submit feedback",
            });
        };
        let record = FeedbackRecord::new(rating, message)?;
        let session = flow.session.clone();
        self.feedback = None;

        if let Err(err) = self.services.feedback.submit(session, record).await {
            warn!(%err, "feedback submission failed");
        } else {
            info!(rating, "feedback submitted");
        }
        Ok(())
    }

    fn live_context(&mut self, action: &UserAction) -> InnertoneResult<&mut SessionContext> {
        let state = self.state;
        self.context
            .as_mut()
            .ok_or(InnertoneError::InvalidTransition {
                from: state,
                action: action.name(),
            })
    }

    // Dialogue channel

    fn on_dialogue(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => {
                if let Some(SessionLink::Dialogue(channel)) =
                    self.context.as_mut().map(|c| &mut c.link)
                {
                    channel.mark_open();
                }
                if self.state == SessionState::Connecting {
                    self.set_state(SessionState::Listening);
                }
            }
            ChannelEvent::Message(raw) => {
                if let Some(update) = DialogueChannel::decode(&raw) {
                    self.apply_update(update);
                }
            }
            ChannelEvent::Closed => self.end(),
            ChannelEvent::Failed(reason) => self.fail(InnertoneError::Transport(reason)),
        }
    }

    fn apply_update(&mut self, update: DialogueUpdate) {
        if !self.state.is_connected() {
            debug!(state = ?self.state, ?update, "ignoring dialogue update while not connected");
            return;
        }
        let transcript = update.spoken_text().map(str::to_owned);

        match update.state {
            Some(RemoteState::Speaking) => match transcript {
                Some(text) => self.begin_speaking(text),
                None => self.pending_speaking = true,
            },
            Some(RemoteState::Listening) | Some(RemoteState::Idle) => {
                self.pending_speaking = false;
                self.cancel_speech();
                if let Some(text) = transcript {
                    self.set_transcript(text);
                }
                self.set_state(SessionState::Listening);
            }
            Some(RemoteState::Thinking) => {
                self.pending_speaking = false;
                self.cancel_speech();
                self.abort_capture();
                self.set_state(SessionState::Thinking);
            }
            None => {
                if let Some(text) = transcript {
                    if self.pending_speaking {
                        self.begin_speaking(text);
                    } else {
                        self.set_transcript(text);
                    }
                }
            }
        }
    }

    fn begin_speaking(&mut self, text: String) {
        self.pending_speaking = false;
        self.abort_capture();
        let now = self.services.clock.now();
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        let segments = ctx.synthesizer.speak(&text, now);
        debug!(segments, "reply queued for synthesis");
        self.set_transcript(text);
        self.set_state(SessionState::Speaking);
    }

    fn set_transcript(&mut self, text: String) {
        if let Some(session) = self.session.as_mut() {
            session.transcript = text;
        }
    }

    fn cancel_speech(&mut self) {
        if let Some(ctx) = self.context.as_mut() {
            ctx.synthesizer.cancel();
        }
    }

    fn abort_capture(&mut self) {
        if let Some(ctx) = self.context.as_mut() {
            if ctx.recognizer.abort().is_some() {
                self.recording = false;
            }
        }
    }

    // Bridges

    fn on_recognition(&mut self, capture: CaptureId, event: EngineEvent) {
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        let Some(event) = ctx.recognizer.on_engine_event(capture, event) else {
            return;
        };
        if event.is_terminal() {
            self.recording = false;
        }

        match event {
            RecognitionEvent::Started => debug!(?capture, "listening to user"),
            RecognitionEvent::Interim(text) => {
                if let Some(session) = self.session.as_mut() {
                    session.user_utterance = text;
                }
            }
            RecognitionEvent::Final(text) => self.on_final_transcript(text),
            RecognitionEvent::Failed(RecognitionFault::PermissionDenied) => {
                self.fail(RecognitionFault::PermissionDenied.into_error());
            }
            RecognitionEvent::Failed(fault) => {
                warn!(?capture, ?fault, "recognition ended with error");
            }
        }
    }

    fn on_final_transcript(&mut self, text: String) {
        if text.is_empty() {
            debug!("empty transcript, staying in listening");
            return;
        }
        if self.state != SessionState::Listening {
            debug!(state = ?self.state, "dropping transcript, no longer listening");
            return;
        }
        let sent = match self.context.as_ref().map(|c| &c.link) {
            Some(SessionLink::Dialogue(channel)) => channel.send_text(&text),
            _ => Err(InnertoneError::NoActiveSession),
        };
        if let Err(err) = sent {
            self.fail(InnertoneError::Transport(err.to_string()));
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.user_utterance = text;
        }
        self.set_state(SessionState::Thinking);
    }

    fn on_speech(&mut self, utterance: UtteranceId, event: SpeechEngineEvent) {
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        let outcome = ctx.synthesizer.on_engine_event(utterance, event);
        match outcome {
            Some(SynthesisEvent::Finished) if self.state == SessionState::Speaking => {
                self.set_state(SessionState::Listening);
            }
            Some(SynthesisEvent::SegmentFailed(reason)) => {
                debug!(?utterance, %reason, "continuing after failed segment");
            }
            _ => {}
        }
    }

    // Peer call

    async fn on_signal(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => debug!("relay joined"),
            ChannelEvent::Message(raw) => {
                let Some(message) = SignalingClient::decode(&raw) else {
                    return;
                };
                if let Some(SessionLink::Peer(negotiator)) =
                    self.context.as_mut().map(|c| &mut c.link)
                {
                    if let Err(err) = negotiator.handle_signal(message).await {
                        warn!(%err, "failed to apply signal");
                    }
                }
            }
            ChannelEvent::Closed => self.end(),
            ChannelEvent::Failed(reason) => self.fail(InnertoneError::Transport(reason)),
        }
    }

    fn on_peer(&mut self, event: PeerEvent) {
        let Some(SessionLink::Peer(negotiator)) = self.context.as_mut().map(|c| &mut c.link)
        else {
            return;
        };
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                if let Err(err) = negotiator.send_local_candidate(candidate) {
                    warn!(%err, "failed to send local candidate");
                }
            }
            PeerEvent::RemoteTrack(track) => {
                info!(%track, "remote media arrived");
                self.remote_media = true;
            }
            PeerEvent::ConnectionState(state) => {
                negotiator.on_connection_state(state);
                if state == PeerConnectionState::Connected
                    && self.state == SessionState::Connecting
                {
                    self.set_state(SessionState::Listening);
                } else if state.is_lost() {
                    self.end();
                }
            }
        }
    }

    // Timer

    fn on_tick(&mut self) {
        let now = self.services.clock.now();
        let dt = self
            .last_tick
            .map(|prev| now.saturating_since(prev))
            .unwrap_or(Duration::ZERO);
        self.last_tick = Some(now);

        if let Some(session) = self.session.as_mut() {
            session.accumulate(dt);
        }
        if let Some(ctx) = self.context.as_mut() {
            ctx.synthesizer.poll_keepalive(now);
        }
    }

    // Helpers

    fn current_session_id(&self) -> Option<SessionId> {
        self.session
            .as_ref()
            .map(|s| s.id.clone())
            .or_else(|| self.last_session.clone())
    }

    fn set_state(&mut self, to: SessionState) {
        if self.state != to {
            info!(from = ?self.state, to = ?to, "session state");
            self.state = to;
        }
        if let Some(session) = self.session.as_mut() {
            session.state = to;
        }
    }

    fn publish(&self) {
        let (muted, video_off) = self
            .context
            .as_ref()
            .map(|c| (c.capture.is_muted(), c.capture.is_video_off()))
            .unwrap_or_default();
        let status = match &self.error {
            Some(InnertoneError::PermissionDenied(_)) if self.state == SessionState::Error => {
                "Permission Denied".to_string()
            }
            _ => self.state.status_label(self.mode).to_string(),
        };

        let snapshot = SessionSnapshot {
            session_id: self.session.as_ref().map(|s| s.id.clone()),
            mode: self.mode,
            state: self.state,
            status,
            elapsed_seconds: self.session.as_ref().map_or(0, Session::elapsed_seconds),
            transcript: self
                .session
                .as_ref()
                .map(|s| s.transcript.clone())
                .unwrap_or_default(),
            user_utterance: self
                .session
                .as_ref()
                .map(|s| s.user_utterance.clone())
                .unwrap_or_default(),
            recording: self.recording,
            muted,
            video_off,
            remote_media: self.remote_media,
            error: self
                .error
                .as_ref()
                .filter(|e| e.is_user_visible())
                .map(InnertoneError::user_message),
            feedback_open: self.feedback.is_some(),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

impl Drop for SessionMachine {
    fn drop(&mut self) {
        self.release_context();
    }
}

impl std::fmt::Debug for SessionMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMachine")
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("epoch", &self.epoch)
            .field("session", &self.session.as_ref().map(|s| &s.id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use innertone_core::ManualClock;
    use innertone_transport::{ChannelSink, PeerConfig, PeerTransport};
    use innertone_voice::{MediaStream, TrackInfo, TrackKind, Utterance, Voice};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Log {
        sent: Vec<String>,
        stream_stops: usize,
        channel_closes: usize,
        feedback: Vec<(Option<SessionId>, FeedbackRecord)>,
    }

    type Shared = Arc<Mutex<Log>>;

    struct Stream(Shared);

    impl MediaStream for Stream {
        fn tracks(&self) -> Vec<TrackInfo> {
            vec![TrackInfo {
                id: "mic".into(),
                kind: TrackKind::Audio,
                enabled: true,
            }]
        }
        fn set_track_enabled(&self, _kind: TrackKind, _enabled: bool) {}
        fn stop(&self) {
            self.0.lock().stream_stops += 1;
        }
        fn attach_analyser(&self, _tap: SampleTap) {}
    }

    struct Devices {
        log: Shared,
        deny: bool,
    }

    #[async_trait]
    impl MediaDevices for Devices {
        async fn acquire(&self, _c: MediaConstraints) -> InnertoneResult<Box<dyn MediaStream>> {
            if self.deny {
                return Err(InnertoneError::PermissionDenied("NotAllowedError".into()));
            }
            Ok(Box::new(Stream(Arc::clone(&self.log))))
        }
    }

    struct Sink(Shared);

    impl ChannelSink for Sink {
        fn send(&self, frame: String) -> InnertoneResult<()> {
            self.0.lock().sent.push(frame);
            Ok(())
        }
        fn close(&self) {
            self.0.lock().channel_closes += 1;
        }
    }

    struct Connector(Shared);

    #[async_trait]
    impl ChannelConnector for Connector {
        async fn connect(
            &self,
            _session: &SessionId,
            events: EventSink<ChannelEvent>,
        ) -> InnertoneResult<Box<dyn ChannelSink>> {
            events.emit(ChannelEvent::Opened);
            Ok(Box::new(Sink(Arc::clone(&self.0))))
        }
    }

    struct NoPeers;

    #[async_trait]
    impl PeerTransportFactory for NoPeers {
        async fn create(
            &self,
            _config: &PeerConfig,
            _events: EventSink<PeerEvent>,
        ) -> InnertoneResult<Box<dyn PeerTransport>> {
            Err(InnertoneError::Negotiation("unsupported".into()))
        }
    }

    struct Recognition;

    impl RecognitionEngine for Recognition {
        fn start(
            &mut self,
            _capture: CaptureId,
            _options: &innertone_voice::RecognitionOptions,
            events: EventSink<EngineEvent>,
        ) -> InnertoneResult<()> {
            events.emit(EngineEvent::Started);
            Ok(())
        }
        fn stop(&mut self, _capture: CaptureId) {}
        fn abort(&mut self, _capture: CaptureId) {}
    }

    struct Speech;

    impl SpeechEngine for Speech {
        fn speak(&mut self, _utterance: Utterance, _events: EventSink<SpeechEngineEvent>) {}
        fn cancel(&mut self) {}
        fn resume(&mut self) {}
        fn voices(&self) -> Vec<Voice> {
            Vec::new()
        }
    }

    struct Feedback(Shared);

    #[async_trait]
    impl FeedbackSink for Feedback {
        async fn submit(
            &self,
            session: Option<SessionId>,
            record: FeedbackRecord,
        ) -> InnertoneResult<()> {
            self.0.lock().feedback.push((session, record));
            Ok(())
        }
    }

    struct Fixture {
        machine: SessionMachine,
        queue: Arc<Mutex<Vec<SessionEvent>>>,
        log: Shared,
    }

    impl Fixture {
        fn new(deny: bool) -> Self {
            let log: Shared = Arc::default();
            let services = SessionServices {
                devices: Arc::new(Devices {
                    log: Arc::clone(&log),
                    deny,
                }),
                dialogue: Arc::new(Connector(Arc::clone(&log))),
                signaling: Arc::new(Connector(Arc::clone(&log))),
                peers: Arc::new(NoPeers),
                recognition: Arc::new(|| Box::new(Recognition) as Box<dyn RecognitionEngine>),
                speech: Arc::new(|| Box::new(Speech) as Box<dyn SpeechEngine>),
                feedback: Arc::new(Feedback(Arc::clone(&log))),
                clock: Arc::new(ManualClock::new()),
            };
            let queue = Arc::new(Mutex::new(Vec::new()));
            let queue_clone = Arc::clone(&queue);
            let events = EventSink::new(move |e| queue_clone.lock().push(e));
            let (machine, _rx) = SessionMachine::new(SessionConfig::default(), services, events);
            Self {
                machine: machine.with_seed(1),
                queue,
                log,
            }
        }

        async fn user(&mut self, action: UserAction) -> InnertoneResult<()> {
            let result = self.machine.handle(SessionEvent::User(action)).await;
            self.pump().await;
            result
        }

        async fn pump(&mut self) {
            loop {
                let pending: Vec<_> = std::mem::take(&mut *self.queue.lock());
                if pending.is_empty() {
                    break;
                }
                for event in pending {
                    let _ = self.machine.handle(event).await;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_start_connects_to_listening() {
        let mut fx = Fixture::new(false);
        fx.user(UserAction::Start(SessionMode::AiVoice)).await.unwrap();

        assert_eq!(fx.machine.state(), SessionState::Listening);
        let snapshot = fx.machine.snapshot();
        assert_eq!(snapshot.status, "AI Listening");
        assert!(snapshot
            .session_id
            .as_ref()
            .is_some_and(|id| id.as_str().starts_with("voice-")));
    }

    #[tokio::test]
    async fn test_permission_denied_enters_error() {
        let mut fx = Fixture::new(true);
        fx.user(UserAction::Start(SessionMode::AiVoice)).await.unwrap();

        assert_eq!(fx.machine.state(), SessionState::Error);
        let snapshot = fx.machine.snapshot();
        assert_eq!(snapshot.status, "Permission Denied");
        assert!(snapshot.error.is_some());
        assert!(snapshot.session_id.is_none());
    }

    #[tokio::test]
    async fn test_start_rejected_while_live() {
        let mut fx = Fixture::new(false);
        fx.user(UserAction::Start(SessionMode::AiVoice)).await.unwrap();
        let epoch = fx.machine.epoch();

        let err = fx.user(UserAction::Start(SessionMode::AiVideo)).await;
        assert!(matches!(err, Err(InnertoneError::InvalidTransition { .. })));
        assert_eq!(fx.machine.epoch(), epoch);
    }

    #[tokio::test]
    async fn test_listening_rejected_outside_listening() {
        let mut fx = Fixture::new(false);
        assert_eq!(
            fx.user(UserAction::StartListening).await,
            Err(InnertoneError::CaptureNotAllowed(SessionState::Idle))
        );
    }

    #[tokio::test]
    async fn test_end_is_idempotent() {
        let mut fx = Fixture::new(false);
        fx.user(UserAction::Start(SessionMode::AiVoice)).await.unwrap();
        fx.user(UserAction::End).await.unwrap();
        fx.user(UserAction::End).await.unwrap();

        assert_eq!(fx.machine.state(), SessionState::Disconnected);
        let log = fx.log.lock();
        assert_eq!(log.stream_stops, 1);
        assert_eq!(log.channel_closes, 1);
    }

    #[tokio::test]
    async fn test_stale_events_are_dropped() {
        let mut fx = Fixture::new(false);
        fx.user(UserAction::Start(SessionMode::AiVoice)).await.unwrap();
        let old = fx.machine.epoch();
        fx.user(UserAction::End).await.unwrap();
        fx.user(UserAction::Start(SessionMode::AiVoice)).await.unwrap();

        let raw = r#"{"state":"speaking","transcript":"old reply"}"#.to_string();
        fx.machine
            .handle(SessionEvent::Dialogue(old, ChannelEvent::Message(raw)))
            .await
            .unwrap();
        assert_eq!(fx.machine.state(), SessionState::Listening);
        assert_eq!(fx.machine.snapshot().transcript, "");
    }

    #[tokio::test]
    async fn test_feedback_flow() {
        let mut fx = Fixture::new(false);
        assert!(fx
            .user(UserAction::SubmitFeedback {
                rating: 5,
                message: None
            })
            .await
            .is_err());

        fx.user(UserAction::Start(SessionMode::AiVoice)).await.unwrap();
        let id = fx.machine.snapshot().session_id;
        fx.user(UserAction::EndWithFeedback).await.unwrap();
        assert!(fx.machine.snapshot().feedback_open);

        assert_eq!(
            fx.user(UserAction::SubmitFeedback {
                rating: 0,
                message: None
            })
            .await,
            Err(InnertoneError::InvalidRating(0))
        );
        assert!(fx.machine.snapshot().feedback_open);

        fx.user(UserAction::SubmitFeedback {
            rating: 4,
            message: Some("  helpful  ".into()),
        })
        .await
        .unwrap();
        assert!(!fx.machine.snapshot().feedback_open);

        let log = fx.log.lock();
        assert_eq!(log.feedback.len(), 1);
        assert_eq!(log.feedback[0].0, id);
        assert_eq!(log.feedback[0].1.rating, 4);
    }

    #[tokio::test]
    async fn test_timer_counts_connected_time_only() {
        let clock = ManualClock::new();
        let mut fx = Fixture::new(false);
        fx.machine.services.clock = Arc::new(clock.clone());

        clock.advance(Duration::from_secs(3));
        fx.machine.handle(SessionEvent::Tick).await.unwrap();
        assert_eq!(fx.machine.snapshot().elapsed_seconds, 0);

        fx.user(UserAction::Start(SessionMode::AiVoice)).await.unwrap();
        for _ in 0..65 {
            clock.advance(Duration::from_secs(1));
            fx.machine.handle(SessionEvent::Tick).await.unwrap();
        }
        let snapshot = fx.machine.snapshot();
        assert_eq!(snapshot.elapsed_seconds, 65);
        assert_eq!(snapshot.elapsed_label(), "01:05");
    }
}
