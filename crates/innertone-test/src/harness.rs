//! Session harness
//!
//! Owns one [`SessionMachine`] and the queue its bridges emit into. Every
//! step runs the machine until nothing is left in the queue, so a test sees
//! the settled result of each action.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use innertone_core::{
    EventSink, InnertoneResult, ManualClock, SessionEpoch, SessionMode, SessionState,
};
use innertone_runtime::{
    SessionConfig, SessionEvent, SessionMachine, SessionServices, SessionSnapshot, UserAction,
};
use innertone_transport::{ChannelConnector, RelayHub};
use innertone_voice::SampleTap;
use parking_lot::Mutex;

use crate::fakes::*;

/// Harness configuration
#[derive(Debug, Clone, Default)]
pub struct HarnessConfig {
    pub session: SessionConfig,
    pub seed: u64,
    pub analyser: Option<SampleTap>,
    /// Signaling relay shared with other harnesses
    pub relay: Option<RelayHub>,
}

impl HarnessConfig {
    /// Fixed session id, so two harnesses meet in the same room
    pub fn with_session_id(mut self, id: &str) -> Self {
        self.session.session_id = Some(id.to_string());
        self
    }

    pub fn with_relay(mut self, relay: RelayHub) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_auto_offer(mut self) -> Self {
        self.session.auto_offer = true;
        self
    }
}

type Queue = Arc<Mutex<VecDeque<SessionEvent>>>;

/// One client with every collaborator faked
pub struct SessionHarness {
    machine: SessionMachine,
    queue: Queue,
    pub clock: ManualClock,
    pub devices: FakeDevices,
    pub dialogue: FakeDialogue,
    pub recognition: FakeRecognition,
    pub speech: FakeSpeech,
    pub peers: FakePeers,
    pub feedback: RecordingFeedback,
    pub relay: RelayHub,
}

impl SessionHarness {
    pub fn new() -> Self {
        Self::with_config(HarnessConfig::default())
    }

    pub fn with_config(config: HarnessConfig) -> Self {
        let clock = ManualClock::new();
        let devices = FakeDevices::new();
        let dialogue = FakeDialogue::new();
        let recognition = FakeRecognition::new();
        let speech = FakeSpeech::new();
        let peers = FakePeers::new();
        let feedback = RecordingFeedback::new();
        let relay = config.relay.unwrap_or_default();

        let recognition_factory = recognition.clone();
        let speech_factory = speech.clone();
        let services = SessionServices {
            devices: Arc::new(devices.clone()),
            dialogue: Arc::new(dialogue.clone()),
            signaling: Arc::new(relay.clone()) as Arc<dyn ChannelConnector>,
            peers: Arc::new(peers.clone()),
            recognition: Arc::new(move || recognition_factory.engine()),
            speech: Arc::new(move || speech_factory.engine()),
            feedback: Arc::new(feedback.clone()),
            clock: Arc::new(clock.clone()),
        };

        let queue: Queue = Arc::default();
        let sink_queue = Arc::clone(&queue);
        let events = EventSink::new(move |event| sink_queue.lock().push_back(event));

        let (machine, _snapshot) = SessionMachine::new(config.session, services, events);
        let mut machine = machine.with_seed(config.seed);
        if let Some(tap) = config.analyser {
            machine = machine.with_analyser(tap);
        }

        Self {
            machine,
            queue,
            clock,
            devices,
            dialogue,
            recognition,
            speech,
            peers,
            feedback,
            relay,
        }
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.machine.snapshot()
    }

    pub fn epoch(&self) -> SessionEpoch {
        self.machine.epoch()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Perform a user action and settle
    pub async fn act(&mut self, action: UserAction) -> InnertoneResult<()> {
        let result = self.handle(SessionEvent::User(action)).await;
        self.settle().await;
        result
    }

    pub async fn start(&mut self, mode: SessionMode) -> InnertoneResult<()> {
        self.act(UserAction::Start(mode)).await
    }

    /// Inject any event and settle
    pub async fn inject(&mut self, event: SessionEvent) -> InnertoneResult<()> {
        let result = self.handle(event).await;
        self.settle().await;
        result
    }

    /// Server pushes a dialogue frame
    pub async fn server_says(&mut self, raw: &str) {
        self.dialogue.push(raw);
        self.settle().await;
    }

    /// User speaks a complete utterance into an active capture
    pub async fn user_says(&mut self, text: &str) {
        self.recognition.say(text);
        self.settle().await;
    }

    /// Play every queued segment to completion
    pub async fn finish_speech(&mut self) {
        while self.speech.finish_segment() {
            self.settle().await;
        }
    }

    /// Advance the clock in ticks of `step` until `total` has elapsed
    pub async fn advance(&mut self, total: Duration, step: Duration) {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            self.clock.advance(step);
            elapsed += step;
            let _ = self.handle(SessionEvent::Tick).await;
            self.settle().await;
        }
    }

    /// Handle queued events until the queue is empty
    pub async fn settle(&mut self) -> usize {
        let mut count = 0;
        loop {
            let next = self.queue.lock().pop_front();
            let Some(event) = next else {
                break;
            };
            let _ = self.handle(event).await;
            count += 1;
        }
        count
    }

    async fn handle(&mut self, event: SessionEvent) -> InnertoneResult<()> {
        self.machine.handle(event).await
    }
}

impl Default for SessionHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHarness")
            .field("machine", &self.machine)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Settle two harnesses that talk through a shared relay
pub async fn settle_pair(a: &mut SessionHarness, b: &mut SessionHarness) {
    loop {
        let moved = a.settle().await + b.settle().await;
        if moved == 0 {
            break;
        }
    }
}
