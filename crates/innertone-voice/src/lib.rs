//! InnerTone Voice - Local audio and speech subsystems
//!
//! - Audio capture adapter over the host's media devices
//! - Frequency visualizer fed from the captured stream
//! - Speech recognizer bridge (speech-to-text)
//! - Speech synthesizer bridge (text-to-speech, sentence-chunked)
//!
//! Engines and devices are traits; the host supplies implementations.

pub mod capture;
pub mod visualizer;
pub mod recognizer;
pub mod synthesis;

pub use capture::*;
pub use visualizer::*;
pub use recognizer::*;
pub use synthesis::*;
