//! InnerTone Test Harness - Scenario testing without devices or network
//!
//! This crate provides:
//! - Fake capture devices, recognition and speech engines
//! - A scriptable dialogue service and peer transport
//! - A feedback recorder
//! - [`SessionHarness`], which drives a [`SessionMachine`] to quiescence
//!   after every step

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::*;

pub use innertone_runtime::SessionMachine;
