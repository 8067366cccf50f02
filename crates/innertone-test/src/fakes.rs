//! Fake collaborators
//!
//! Each fake hands out a control handle sharing its state, so a test can
//! both inspect what the session did and inject what the outside world
//! does.

use std::sync::Arc;

use async_trait::async_trait;
use innertone_core::{
    CaptureId, EventSink, FeedbackRecord, FeedbackSink, IceCandidate, InnertoneError,
    InnertoneResult, SessionDescription, SessionId, UtteranceId,
};
use innertone_transport::{
    ChannelConnector, ChannelEvent, ChannelSink, PeerConfig, PeerConnectionState, PeerEvent,
    PeerTransport, PeerTransportFactory,
};
use innertone_voice::{
    EngineEvent, MediaConstraints, MediaDevices, MediaStream, RecognitionEngine,
    RecognitionFault, RecognitionOptions, SampleTap, SpeechEngine, SpeechEngineEvent, TrackInfo,
    TrackKind, Utterance, Voice,
};
use parking_lot::Mutex;

// ============================================================================
// CAPTURE DEVICES
// ============================================================================

#[derive(Debug, Default)]
pub struct DeviceState {
    pub deny: bool,
    pub unavailable: bool,
    pub requests: Vec<MediaConstraints>,
    pub tracks: Vec<TrackInfo>,
    pub stops: usize,
    pub analyser: Option<SampleTap>,
}

/// Microphone and camera that always work unless told otherwise
#[derive(Clone, Debug, Default)]
pub struct FakeDevices {
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next acquisitions with a permission error
    pub fn deny(&self) {
        self.state.lock().deny = true;
    }

    /// Refuse the next acquisitions as if no device were present
    pub fn unplug(&self) {
        self.state.lock().unavailable = true;
    }

    pub fn requests(&self) -> Vec<MediaConstraints> {
        self.state.lock().requests.clone()
    }

    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }

    pub fn track_enabled(&self, kind: TrackKind) -> Option<bool> {
        self.state
            .lock()
            .tracks
            .iter()
            .find(|t| t.kind == kind)
            .map(|t| t.enabled)
    }

    pub fn analyser(&self) -> Option<SampleTap> {
        self.state.lock().analyser.clone()
    }
}

struct FakeStream {
    state: Arc<Mutex<DeviceState>>,
}

impl MediaStream for FakeStream {
    fn tracks(&self) -> Vec<TrackInfo> {
        self.state.lock().tracks.clone()
    }

    fn set_track_enabled(&self, kind: TrackKind, enabled: bool) {
        for track in self.state.lock().tracks.iter_mut().filter(|t| t.kind == kind) {
            track.enabled = enabled;
        }
    }

    fn stop(&self) {
        self.state.lock().stops += 1;
    }

    fn attach_analyser(&self, tap: SampleTap) {
        self.state.lock().analyser = Some(tap);
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn acquire(
        &self,
        constraints: MediaConstraints,
    ) -> InnertoneResult<Box<dyn MediaStream>> {
        let mut state = self.state.lock();
        state.requests.push(constraints);
        if state.deny {
            return Err(InnertoneError::PermissionDenied("NotAllowedError".into()));
        }
        if state.unavailable {
            return Err(InnertoneError::DeviceUnavailable("NotFoundError".into()));
        }

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(TrackInfo {
                id: "mic-0".into(),
                kind: TrackKind::Audio,
                enabled: true,
            });
        }
        if constraints.video {
            tracks.push(TrackInfo {
                id: "cam-0".into(),
                kind: TrackKind::Video,
                enabled: true,
            });
        }
        state.tracks = tracks;
        Ok(Box::new(FakeStream {
            state: Arc::clone(&self.state),
        }))
    }
}

// ============================================================================
// RECOGNITION
// ============================================================================

#[derive(Debug, Default)]
pub struct RecognitionState {
    pub starts: Vec<CaptureId>,
    pub stops: Vec<CaptureId>,
    pub aborts: Vec<CaptureId>,
    pub refuse: Option<RecognitionFault>,
    current: Option<(CaptureId, EventSink<EngineEvent>)>,
}

/// Recognition engine whose hearing is scripted by the test
#[derive(Clone, Debug, Default)]
pub struct FakeRecognition {
    state: Arc<Mutex<RecognitionState>>,
}

impl FakeRecognition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine instance sharing this control
    pub fn engine(&self) -> Box<dyn RecognitionEngine> {
        Box::new(self.clone())
    }

    /// Make the next start fail immediately
    pub fn refuse_with(&self, fault: RecognitionFault) {
        self.state.lock().refuse = Some(fault);
    }

    pub fn starts(&self) -> usize {
        self.state.lock().starts.len()
    }

    pub fn aborts(&self) -> usize {
        self.state.lock().aborts.len()
    }

    pub fn current_capture(&self) -> Option<CaptureId> {
        self.state.lock().current.as_ref().map(|(id, _)| *id)
    }

    /// Deliver a result for the running capture
    pub fn hear(&self, transcript: &str, is_final: bool) {
        self.emit(EngineEvent::Result {
            transcript: transcript.to_string(),
            is_final,
        });
    }

    /// Engine ends the running capture
    pub fn end(&self) {
        self.emit(EngineEvent::End);
        self.state.lock().current = None;
    }

    pub fn fail(&self, fault: RecognitionFault) {
        self.emit(EngineEvent::Error(fault));
        self.state.lock().current = None;
    }

    /// Final utterance: result then end
    pub fn say(&self, transcript: &str) {
        self.hear(transcript, true);
        self.end();
    }

    fn emit(&self, event: EngineEvent) {
        let sink = self.state.lock().current.as_ref().map(|(_, s)| s.clone());
        if let Some(sink) = sink {
            sink.emit(event);
        }
    }
}

impl RecognitionEngine for FakeRecognition {
    fn start(
        &mut self,
        capture: CaptureId,
        _options: &RecognitionOptions,
        events: EventSink<EngineEvent>,
    ) -> InnertoneResult<()> {
        let mut state = self.state.lock();
        if let Some(fault) = state.refuse.take() {
            return Err(fault.into_error());
        }
        state.starts.push(capture);
        state.current = Some((capture, events.clone()));
        drop(state);

        events.emit(EngineEvent::Started);
        Ok(())
    }

    fn stop(&mut self, capture: CaptureId) {
        self.state.lock().stops.push(capture);
    }

    fn abort(&mut self, capture: CaptureId) {
        let mut state = self.state.lock();
        state.aborts.push(capture);
        if state.current.as_ref().is_some_and(|(id, _)| *id == capture) {
            state.current = None;
        }
    }
}

// ============================================================================
// SYNTHESIS
// ============================================================================

#[derive(Debug, Default)]
pub struct SpeechState {
    pub spoken: Vec<Utterance>,
    pub cancels: usize,
    pub resumes: usize,
    pub voices: Vec<Voice>,
    current: Option<(UtteranceId, EventSink<SpeechEngineEvent>)>,
}

/// Speech engine that plays nothing and finishes on request
#[derive(Clone, Debug, Default)]
pub struct FakeSpeech {
    state: Arc<Mutex<SpeechState>>,
}

impl FakeSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    /// Voices the engine reports as installed
    pub fn set_voices(&self, voices: Vec<Voice>) {
        self.state.lock().voices = voices;
    }

    pub fn engine(&self) -> Box<dyn SpeechEngine> {
        Box::new(self.clone())
    }

    /// Texts handed to the engine, in order
    pub fn spoken(&self) -> Vec<String> {
        self.state
            .lock()
            .spoken
            .iter()
            .map(|u| u.text.clone())
            .collect()
    }

    pub fn utterances(&self) -> Vec<Utterance> {
        self.state.lock().spoken.clone()
    }

    pub fn cancels(&self) -> usize {
        self.state.lock().cancels
    }

    pub fn resumes(&self) -> usize {
        self.state.lock().resumes
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().current.is_some()
    }

    /// Finish the segment playing now. Returns false when idle.
    pub fn finish_segment(&self) -> bool {
        self.complete(SpeechEngineEvent::End)
    }

    /// Fail the segment playing now
    pub fn fail_segment(&self, reason: &str) -> bool {
        self.complete(SpeechEngineEvent::Error(reason.to_string()))
    }

    fn complete(&self, event: SpeechEngineEvent) -> bool {
        let current = self.state.lock().current.take();
        match current {
            Some((_, sink)) => {
                sink.emit(event);
                true
            }
            None => false,
        }
    }
}

impl SpeechEngine for FakeSpeech {
    fn speak(&mut self, utterance: Utterance, events: EventSink<SpeechEngineEvent>) {
        let mut state = self.state.lock();
        state.current = Some((utterance.id, events));
        state.spoken.push(utterance);
    }

    fn cancel(&mut self) {
        let mut state = self.state.lock();
        state.cancels += 1;
        state.current = None;
    }

    fn resume(&mut self) {
        self.state.lock().resumes += 1;
    }

    fn voices(&self) -> Vec<Voice> {
        self.state.lock().voices.clone()
    }
}

// ============================================================================
// DIALOGUE SERVICE
// ============================================================================

#[derive(Debug, Default)]
pub struct DialogueState {
    pub refuse: bool,
    pub hold_open: bool,
    pub sessions: Vec<SessionId>,
    pub sent: Vec<String>,
    pub closes: usize,
    events: Option<EventSink<ChannelEvent>>,
}

/// Remote dialogue service played by the test
#[derive(Clone, Debug, Default)]
pub struct FakeDialogue {
    state: Arc<Mutex<DialogueState>>,
}

impl FakeDialogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next connection attempts
    pub fn refuse(&self) {
        self.state.lock().refuse = true;
    }

    /// Do not report `Opened` until [`FakeDialogue::open`]
    pub fn hold_open(&self) {
        self.state.lock().hold_open = true;
    }

    pub fn open(&self) {
        self.emit(ChannelEvent::Opened);
    }

    /// Server pushes a raw frame
    pub fn push(&self, raw: &str) {
        self.emit(ChannelEvent::Message(raw.to_string()));
    }

    /// Server closes the connection
    pub fn hang_up(&self) {
        self.emit(ChannelEvent::Closed);
    }

    pub fn break_connection(&self, reason: &str) {
        self.emit(ChannelEvent::Failed(reason.to_string()));
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    pub fn sessions(&self) -> Vec<SessionId> {
        self.state.lock().sessions.clone()
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    fn emit(&self, event: ChannelEvent) {
        let sink = self.state.lock().events.clone();
        if let Some(sink) = sink {
            sink.emit(event);
        }
    }
}

struct FakeDialogueSink {
    state: Arc<Mutex<DialogueState>>,
}

impl ChannelSink for FakeDialogueSink {
    fn send(&self, frame: String) -> InnertoneResult<()> {
        self.state.lock().sent.push(frame);
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closes += 1;
        state.events = None;
    }
}

#[async_trait]
impl ChannelConnector for FakeDialogue {
    async fn connect(
        &self,
        session: &SessionId,
        events: EventSink<ChannelEvent>,
    ) -> InnertoneResult<Box<dyn ChannelSink>> {
        let mut state = self.state.lock();
        if state.refuse {
            return Err(InnertoneError::Transport("connection refused".into()));
        }
        state.sessions.push(session.clone());
        state.events = Some(events.clone());
        let hold = state.hold_open;
        drop(state);

        if !hold {
            events.emit(ChannelEvent::Opened);
        }
        Ok(Box::new(FakeDialogueSink {
            state: Arc::clone(&self.state),
        }))
    }
}

// ============================================================================
// PEER TRANSPORT
// ============================================================================

#[derive(Debug, Default)]
pub struct PeerState {
    /// Transport calls in order, e.g. `set_remote:offer`
    pub calls: Vec<String>,
    pub tracks: Vec<String>,
    pub candidates: Vec<IceCandidate>,
    pub closes: usize,
    pub configs: Vec<PeerConfig>,
    offers: usize,
    events: Option<EventSink<PeerEvent>>,
}

/// Peer transport recording what the negotiator asked of it
#[derive(Clone, Debug, Default)]
pub struct FakePeers {
    state: Arc<Mutex<PeerState>>,
}

impl FakePeers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn tracks(&self) -> Vec<String> {
        self.state.lock().tracks.clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().candidates.clone()
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    pub fn configs(&self) -> Vec<PeerConfig> {
        self.state.lock().configs.clone()
    }

    /// Transport gathered a local candidate
    pub fn gather(&self, candidate: &str) {
        self.emit(PeerEvent::LocalCandidate(IceCandidate::new(candidate)));
    }

    pub fn set_connection(&self, state: PeerConnectionState) {
        self.emit(PeerEvent::ConnectionState(state));
    }

    pub fn remote_track(&self, id: &str) {
        self.emit(PeerEvent::RemoteTrack(id.to_string()));
    }

    fn emit(&self, event: PeerEvent) {
        let sink = self.state.lock().events.clone();
        if let Some(sink) = sink {
            sink.emit(event);
        }
    }
}

struct FakePeerTransport {
    state: Arc<Mutex<PeerState>>,
}

impl FakePeerTransport {
    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl PeerTransport for FakePeerTransport {
    async fn create_offer(&mut self) -> InnertoneResult<SessionDescription> {
        let n = {
            let mut state = self.state.lock();
            state.offers += 1;
            state.offers
        };
        self.record("create_offer".into());
        Ok(SessionDescription::offer(format!("v=0 offer {n}")))
    }

    async fn create_answer(&mut self) -> InnertoneResult<SessionDescription> {
        self.record("create_answer".into());
        Ok(SessionDescription::answer("v=0 answer"))
    }

    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> InnertoneResult<()> {
        self.record(format!("set_local:{}", sdp_kind(&description)));
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> InnertoneResult<()> {
        self.record(format!("set_remote:{}", sdp_kind(&description)));
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> InnertoneResult<()> {
        self.record(format!("add_candidate:{}", candidate.candidate));
        self.state.lock().candidates.push(candidate);
        Ok(())
    }

    fn add_track(&mut self, track_id: &str) {
        self.state.lock().tracks.push(track_id.to_string());
    }

    fn close(&mut self) {
        self.state.lock().closes += 1;
    }
}

fn sdp_kind(description: &SessionDescription) -> &'static str {
    match description.kind {
        innertone_core::SdpKind::Offer => "offer",
        innertone_core::SdpKind::Answer => "answer",
    }
}

#[async_trait]
impl PeerTransportFactory for FakePeers {
    async fn create(
        &self,
        config: &PeerConfig,
        events: EventSink<PeerEvent>,
    ) -> InnertoneResult<Box<dyn PeerTransport>> {
        let mut state = self.state.lock();
        state.configs.push(config.clone());
        state.events = Some(events);
        Ok(Box::new(FakePeerTransport {
            state: Arc::clone(&self.state),
        }))
    }
}

// ============================================================================
// FEEDBACK
// ============================================================================

/// Feedback sink keeping every submission
#[derive(Clone, Debug, Default)]
pub struct RecordingFeedback {
    records: Arc<Mutex<Vec<(Option<SessionId>, FeedbackRecord)>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject submissions from now on
    pub fn reject(&self) {
        *self.fail.lock() = true;
    }

    pub fn records(&self) -> Vec<(Option<SessionId>, FeedbackRecord)> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl FeedbackSink for RecordingFeedback {
    async fn submit(
        &self,
        session: Option<SessionId>,
        record: FeedbackRecord,
    ) -> InnertoneResult<()> {
        if *self.fail.lock() {
            return Err(InnertoneError::Transport("feedback service unavailable".into()));
        }
        self.records.lock().push((session, record));
        Ok(())
    }
}
