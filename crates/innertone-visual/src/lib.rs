//! InnerTone Visual - Procedural avatar animation
//!
//! This is NOT a renderer. It computes, once per frame, the blend targets a
//! renderer applies to a character rig:
//! - Blink and viseme (lip sync) morph influences
//! - Head micro-movement composed onto the resting head orientation
//! - Breathing scale and the idle arm pose correction
//!
//! Randomness and time are injected so every frame is reproducible.

pub mod pose;
pub mod face;
pub mod motion;
pub mod animator;

pub use pose::*;
pub use face::*;
pub use motion::*;
pub use animator::*;
