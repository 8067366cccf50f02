//! InnerTone Runtime - Session orchestration
//!
//! Ties the pieces of a call together:
//! - [`SessionMachine`] owns the lifecycle and every per-session resource
//! - [`SessionRuntime`] feeds it from one queue plus a periodic tick
//! - [`RenderPump`] turns the published snapshot into avatar frames
//!
//! Configuration loads from TOML and logging goes through `tracing`.

pub mod config;
pub mod machine;
pub mod render;
pub mod runtime;
pub mod telemetry;

pub use config::*;
pub use machine::*;
pub use render::*;
pub use runtime::*;
pub use telemetry::*;
