//! Speech Synthesizer Bridge - sentence-chunked text-to-speech
//!
//! Long replies are split into sentences and spoken one after another.
//! Engines tend to stall on long utterances, so while anything is queued the
//! bridge periodically asks the engine to resume.

use std::collections::VecDeque;
use std::time::Duration;

use innertone_core::{EventSink, SessionTime, UtteranceId};
use tracing::{debug, warn};

/// Synthesis configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechOptions {
    /// Speaking rate multiplier
    pub rate: f32,

    /// Pitch multiplier
    pub pitch: f32,

    /// Voice name fragments in preference order
    pub preferred_voices: Vec<String>,

    /// Resume interval while speaking
    pub keepalive_interval: Duration,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            rate: 0.95,
            pitch: 1.1,
            preferred_voices: vec!["Google US English".to_string(), "Female".to_string()],
            keepalive_interval: Duration::from_secs(5),
        }
    }
}

/// Installed engine voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    pub lang: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// One segment handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub voice: Option<Voice>,
}

/// Playback outcome of a single utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEngineEvent {
    End,
    Error(String),
}

/// Text-to-speech engine
pub trait SpeechEngine: Send {
    /// Queue an utterance; its outcome goes to `events`
    fn speak(&mut self, utterance: Utterance, events: EventSink<SpeechEngineEvent>);

    /// Stop playback and drop everything queued in the engine
    fn cancel(&mut self);

    /// Nudge a stalled engine
    fn resume(&mut self);

    fn voices(&self) -> Vec<Voice>;
}

/// Bridge output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    /// A segment failed and was skipped
    SegmentFailed(String),
    /// Every queued segment has been played
    Finished,
}

/// Split text into sentences ending in `.`, `!` or `?`.
///
/// Runs of terminators stay with their sentence; trailing text without a
/// terminator becomes the last segment; blank segments are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && !matches!(chars.peek(), Some('.' | '!' | '?')) {
            push_segment(&mut segments, &current);
            current.clear();
        }
    }
    push_segment(&mut segments, &current);
    segments
}

fn push_segment(segments: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
}

/// Pick the first installed voice matching a preference, else the first voice
pub fn select_voice(voices: &[Voice], preferred: &[String]) -> Option<Voice> {
    preferred
        .iter()
        .find_map(|p| voices.iter().find(|v| v.name.contains(p.as_str())))
        .or_else(|| voices.first())
        .cloned()
}

/// Sequential segment player over a [`SpeechEngine`]
pub struct SynthesizerBridge {
    engine: Box<dyn SpeechEngine>,
    options: SpeechOptions,
    events: EventSink<(UtteranceId, SpeechEngineEvent)>,
    queue: VecDeque<String>,
    current: Option<UtteranceId>,
    last_id: UtteranceId,
    keepalive_due: Option<SessionTime>,
}

impl SynthesizerBridge {
    pub fn new(
        engine: Box<dyn SpeechEngine>,
        options: SpeechOptions,
        events: EventSink<(UtteranceId, SpeechEngineEvent)>,
    ) -> Self {
        Self {
            engine,
            options,
            events,
            queue: VecDeque::new(),
            current: None,
            last_id: UtteranceId::default(),
            keepalive_due: None,
        }
    }

    /// Something is playing or queued
    #[inline]
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn current_utterance(&self) -> Option<UtteranceId> {
        self.current
    }

    /// Replace whatever is playing with `text`. Returns the number of
    /// segments scheduled.
    pub fn speak(&mut self, text: &str, now: SessionTime) -> usize {
        self.cancel();

        self.queue = split_sentences(text).into();
        let count = self.queue.len();
        if count == 0 {
            return 0;
        }

        debug!(segments = count, "speaking");
        self.keepalive_due = Some(now + self.options.keepalive_interval);
        self.play_next();
        count
    }

    /// Stop now and clear the queue
    pub fn cancel(&mut self) {
        if self.current.take().is_some() {
            debug!(dropped = self.queue.len(), "synthesis cancelled");
        }
        self.queue.clear();
        self.keepalive_due = None;
        self.engine.cancel();
    }

    /// Advance on segment completion or error
    pub fn on_engine_event(
        &mut self,
        utterance: UtteranceId,
        event: SpeechEngineEvent,
    ) -> Option<SynthesisEvent> {
        if self.current != Some(utterance) {
            debug!(?utterance, ?event, "dropping event for stale utterance");
            return None;
        }

        let failed = match event {
            SpeechEngineEvent::End => None,
            SpeechEngineEvent::Error(reason) => {
                warn!(?utterance, %reason, "segment failed, skipping");
                Some(reason)
            }
        };

        if !self.play_next() {
            self.current = None;
            self.keepalive_due = None;
            return Some(SynthesisEvent::Finished);
        }
        failed.map(SynthesisEvent::SegmentFailed)
    }

    /// Resume the engine if the keep-alive interval elapsed
    pub fn poll_keepalive(&mut self, now: SessionTime) {
        let Some(due) = self.keepalive_due else {
            return;
        };
        if now >= due {
            self.engine.resume();
            self.keepalive_due = Some(now + self.options.keepalive_interval);
        }
    }

    fn play_next(&mut self) -> bool {
        let Some(text) = self.queue.pop_front() else {
            return false;
        };
        let id = self.last_id.next();
        self.last_id = id;
        self.current = Some(id);

        let voice = select_voice(&self.engine.voices(), &self.options.preferred_voices);
        let utterance = Utterance {
            id,
            text,
            rate: self.options.rate,
            pitch: self.options.pitch,
            voice,
        };
        let sink = self.events.map(move |event| (id, event));
        self.engine.speak(utterance, sink);
        true
    }
}

impl std::fmt::Debug for SynthesizerBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesizerBridge")
            .field("current", &self.current)
            .field("queued", &self.queue.len())
            .finish()
    }
}
