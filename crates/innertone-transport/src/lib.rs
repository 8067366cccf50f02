//! InnerTone Transport Layer - remote channels and peer media negotiation
//!
//! This crate provides:
//! - A duplex text channel abstraction and its WebSocket implementation
//! - The dialogue channel client (AI modes)
//! - The signaling relay client and an in-memory relay hub (peer calls)
//! - The peer transport negotiator (offer/answer and candidate exchange)

pub mod channel;
pub mod dialogue;
pub mod signaling;
pub mod negotiator;
pub mod ws;

pub use channel::*;
pub use dialogue::*;
pub use signaling::*;
pub use negotiator::*;
pub use ws::*;
