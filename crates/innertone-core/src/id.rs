//! Identity types for InnerTone sessions
//!
//! Session identifiers are opaque strings shared with the remote service;
//! everything else is a local 64-bit counter.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::SessionMode;

/// Session identity - names the remote dialogue channel or relay room
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    /// Random identifier of the form `<prefix>-<0..999>`, prefix chosen by mode.
    pub fn generate<R: Rng + ?Sized>(mode: SessionMode, rng: &mut R) -> Self {
        SessionId(format!("{}-{}", mode.id_prefix(), rng.gen_range(0..1000u32)))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session epoch - increments every time a new session starts.
///
/// Events tagged with an older epoch belong to a torn-down session and are
/// discarded by the state machine.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct SessionEpoch(pub u64);

impl SessionEpoch {
    pub const ZERO: SessionEpoch = SessionEpoch(0);

    #[inline]
    pub fn next(self) -> Self {
        SessionEpoch(self.0.wrapping_add(1))
    }
}

/// Speech-recognition capture identity
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CaptureId(pub u64);

impl CaptureId {
    #[inline]
    pub fn new(id: u64) -> Self {
        CaptureId(id)
    }

    #[inline]
    pub fn next(self) -> Self {
        CaptureId(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capture({})", self.0)
    }
}

/// Synthesized segment identity
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UtteranceId(pub u64);

impl UtteranceId {
    #[inline]
    pub fn new(id: u64) -> Self {
        UtteranceId(id)
    }

    #[inline]
    pub fn next(self) -> Self {
        UtteranceId(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Utterance({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_ids_carry_mode_prefix() {
        let mut rng = StdRng::seed_from_u64(7);

        let voice = SessionId::generate(SessionMode::AiVoice, &mut rng);
        let video = SessionId::generate(SessionMode::AiVideo, &mut rng);
        let room = SessionId::generate(SessionMode::PeerCall, &mut rng);

        assert!(voice.as_str().starts_with("voice-"));
        assert!(video.as_str().starts_with("video-"));
        assert!(room.as_str().starts_with("room-"));

        let n: u32 = voice.as_str()["voice-".len()..].parse().unwrap();
        assert!(n < 1000);
    }

    #[test]
    fn test_session_id_serializes_as_plain_string() {
        let id = SessionId::new("room-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"room-42\"");
        assert_eq!(id.to_string(), "room-42");
    }

    #[test]
    fn test_counters_advance() {
        assert_eq!(CaptureId::new(1).next(), CaptureId(2));
        assert_eq!(UtteranceId::default().next(), UtteranceId(1));
        assert!(SessionEpoch::ZERO.next() > SessionEpoch::ZERO);
    }
}
