//! Speech Recognizer Bridge - speech-to-text captures
//!
//! One capture at a time. The engine reports raw events tagged with the
//! capture they belong to; the bridge turns them into a clean stream of
//! superseding interim transcripts followed by exactly one terminal event.

use innertone_core::{CaptureId, EventSink, InnertoneError, InnertoneResult};
use tracing::{debug, warn};

/// Recognition engine options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// BCP-47 language tag
    pub language: String,

    /// Report partial transcripts while the user speaks
    pub interim_results: bool,

    /// Keep listening after the first pause
    pub continuous: bool,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            interim_results: true,
            continuous: false,
        }
    }
}

/// Why a capture failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionFault {
    PermissionDenied,
    NoSpeech,
    Network,
    Aborted,
    Other(String),
}

impl RecognitionFault {
    /// Map an engine error code to a fault
    pub fn from_code(code: &str) -> Self {
        match code {
            "not-allowed" | "service-not-allowed" => RecognitionFault::PermissionDenied,
            "no-speech" => RecognitionFault::NoSpeech,
            "network" => RecognitionFault::Network,
            "aborted" => RecognitionFault::Aborted,
            other => RecognitionFault::Other(other.to_string()),
        }
    }

    pub fn into_error(self) -> InnertoneError {
        match self {
            RecognitionFault::PermissionDenied => {
                InnertoneError::PermissionDenied("speech recognition".into())
            }
            other => InnertoneError::Recognition(format!("{other:?}")),
        }
    }
}

/// Raw engine event
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started,
    /// Full transcript so far; supersedes earlier results of the same capture
    Result { transcript: String, is_final: bool },
    Error(RecognitionFault),
    End,
}

/// Speech-to-text engine
pub trait RecognitionEngine: Send {
    /// Begin listening; events for this capture go to `events`
    fn start(
        &mut self,
        capture: CaptureId,
        options: &RecognitionOptions,
        events: EventSink<EngineEvent>,
    ) -> InnertoneResult<()>;

    /// Stop listening and deliver what was heard
    fn stop(&mut self, capture: CaptureId);

    /// Stop listening and discard
    fn abort(&mut self, capture: CaptureId);
}

/// Bridge output
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Started,
    Interim(String),
    /// Terminal: trimmed transcript, possibly empty
    Final(String),
    /// Terminal
    Failed(RecognitionFault),
}

impl RecognitionEvent {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecognitionEvent::Final(_) | RecognitionEvent::Failed(_))
    }
}

#[derive(Debug)]
struct ActiveCapture {
    id: CaptureId,
    transcript: String,
}

/// Single-capture wrapper around a [`RecognitionEngine`]
pub struct RecognizerBridge {
    engine: Box<dyn RecognitionEngine>,
    options: RecognitionOptions,
    events: EventSink<(CaptureId, EngineEvent)>,
    last_id: CaptureId,
    active: Option<ActiveCapture>,
}

impl RecognizerBridge {
    pub fn new(
        engine: Box<dyn RecognitionEngine>,
        options: RecognitionOptions,
        events: EventSink<(CaptureId, EngineEvent)>,
    ) -> Self {
        Self {
            engine,
            options,
            events,
            last_id: CaptureId::default(),
            active: None,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_capture(&self) -> Option<CaptureId> {
        self.active.as_ref().map(|c| c.id)
    }

    /// Begin a capture. Rejected while another capture is active.
    pub fn start(&mut self) -> InnertoneResult<CaptureId> {
        if self.active.is_some() {
            return Err(InnertoneError::CaptureActive);
        }
        let id = self.last_id.next();
        self.last_id = id;

        let sink = self.events.map(move |event| (id, event));
        self.engine.start(id, &self.options, sink)?;

        debug!(capture = ?id, "recognition started");
        self.active = Some(ActiveCapture {
            id,
            transcript: String::new(),
        });
        Ok(id)
    }

    /// Ask the engine to finish; the terminal event follows from the engine
    pub fn stop(&mut self) {
        if let Some(capture) = &self.active {
            self.engine.stop(capture.id);
        }
    }

    /// End the capture now, discarding the transcript. Returns the terminal
    /// event when a capture was active.
    pub fn abort(&mut self) -> Option<RecognitionEvent> {
        let capture = self.active.take()?;
        self.engine.abort(capture.id);
        debug!(capture = ?capture.id, "recognition aborted");
        Some(RecognitionEvent::Failed(RecognitionFault::Aborted))
    }

    /// Filter and translate an engine event
    pub fn on_engine_event(
        &mut self,
        capture: CaptureId,
        event: EngineEvent,
    ) -> Option<RecognitionEvent> {
        let Some(active) = self.active.as_mut().filter(|a| a.id == capture) else {
            debug!(?capture, ?event, "dropping recognition event for inactive capture");
            return None;
        };

        match event {
            EngineEvent::Started => Some(RecognitionEvent::Started),
            EngineEvent::Result { transcript, .. } => {
                active.transcript = transcript;
                Some(RecognitionEvent::Interim(active.transcript.clone()))
            }
            EngineEvent::Error(fault) => {
                self.active = None;
                warn!(?capture, ?fault, "recognition error");
                Some(RecognitionEvent::Failed(fault))
            }
            EngineEvent::End => {
                let transcript = active.transcript.trim().to_string();
                self.active = None;
                Some(RecognitionEvent::Final(transcript))
            }
        }
    }
}

impl std::fmt::Debug for RecognizerBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerBridge")
            .field("options", &self.options)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Calls {
        started: Vec<(CaptureId, String)>,
        stopped: Vec<CaptureId>,
        aborted: Vec<CaptureId>,
    }

    struct TestEngine(Arc<Mutex<Calls>>);

    impl RecognitionEngine for TestEngine {
        fn start(
            &mut self,
            capture: CaptureId,
            options: &RecognitionOptions,
            events: EventSink<EngineEvent>,
        ) -> InnertoneResult<()> {
            self.0.lock().started.push((capture, options.language.clone()));
            events.emit(EngineEvent::Started);
            Ok(())
        }

        fn stop(&mut self, capture: CaptureId) {
            self.0.lock().stopped.push(capture);
        }

        fn abort(&mut self, capture: CaptureId) {
            self.0.lock().aborted.push(capture);
        }
    }

    fn bridge() -> (
        RecognizerBridge,
        Arc<Mutex<Calls>>,
        Arc<Mutex<Vec<(CaptureId, EngineEvent)>>>,
    ) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_sink = Arc::clone(&seen);
        let bridge = RecognizerBridge::new(
            Box::new(TestEngine(Arc::clone(&calls))),
            RecognitionOptions::default(),
            EventSink::new(move |e| seen_sink.lock().push(e)),
        );
        (bridge, calls, seen)
    }

    #[test]
    fn test_engine_events_tagged_with_capture() {
        let (mut bridge, calls, seen) = bridge();
        let id = bridge.start().unwrap();
        assert_eq!(calls.lock().started, vec![(id, "en-US".to_string())]);
        assert_eq!(seen.lock()[0], (id, EngineEvent::Started));
    }

    #[test]
    fn test_second_start_rejected() {
        let (mut bridge, _, _) = bridge();
        bridge.start().unwrap();
        assert_eq!(bridge.start(), Err(InnertoneError::CaptureActive));
    }

    #[test]
    fn test_results_supersede_and_final_is_trimmed() {
        let (mut bridge, _, _) = bridge();
        let id = bridge.start().unwrap();

        let interim = bridge.on_engine_event(
            id,
            EngineEvent::Result {
                transcript: "I feel".into(),
                is_final: false,
            },
        );
        assert_eq!(interim, Some(RecognitionEvent::Interim("I feel".into())));

        bridge.on_engine_event(
            id,
            EngineEvent::Result {
                transcript: " I feel anxious today ".into(),
                is_final: true,
            },
        );
        let terminal = bridge.on_engine_event(id, EngineEvent::End);
        assert_eq!(
            terminal,
            Some(RecognitionEvent::Final("I feel anxious today".into()))
        );
        assert!(!bridge.is_active());
    }

    #[test]
    fn test_exactly_one_terminal_event() {
        let (mut bridge, _, _) = bridge();
        let id = bridge.start().unwrap();

        let first = bridge.on_engine_event(id, EngineEvent::Error(RecognitionFault::NoSpeech));
        assert_eq!(
            first,
            Some(RecognitionEvent::Failed(RecognitionFault::NoSpeech))
        );
        assert_eq!(bridge.on_engine_event(id, EngineEvent::End), None);
    }

    #[test]
    fn test_stale_capture_events_dropped() {
        let (mut bridge, _, _) = bridge();
        let old = bridge.start().unwrap();
        bridge.on_engine_event(old, EngineEvent::End);

        let new = bridge.start().unwrap();
        assert_ne!(old, new);
        let stale = bridge.on_engine_event(
            old,
            EngineEvent::Result {
                transcript: "late".into(),
                is_final: true,
            },
        );
        assert_eq!(stale, None);
        assert!(bridge.is_active());
    }

    #[test]
    fn test_abort_is_terminal_and_silences_engine() {
        let (mut bridge, calls, _) = bridge();
        let id = bridge.start().unwrap();

        assert_eq!(
            bridge.abort(),
            Some(RecognitionEvent::Failed(RecognitionFault::Aborted))
        );
        assert_eq!(bridge.abort(), None);
        assert_eq!(calls.lock().aborted, vec![id]);
        assert_eq!(bridge.on_engine_event(id, EngineEvent::End), None);
    }

    #[test]
    fn test_stop_delegates_to_engine() {
        let (mut bridge, calls, _) = bridge();
        let id = bridge.start().unwrap();
        bridge.stop();
        assert_eq!(calls.lock().stopped, vec![id]);
        assert!(bridge.is_active());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RecognitionFault::from_code("not-allowed"),
            RecognitionFault::PermissionDenied
        );
        assert!(matches!(
            RecognitionFault::PermissionDenied.into_error(),
            InnertoneError::PermissionDenied(_)
        ));
        assert!(matches!(
            RecognitionFault::Network.into_error(),
            InnertoneError::Recognition(_)
        ));
    }
}
