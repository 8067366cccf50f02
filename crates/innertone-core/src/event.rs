//! Event sinks
//!
//! Bridges and transports push their events into an [`EventSink`]; the
//! runtime wires each sink to the session queue.

use std::fmt;
use std::sync::Arc;

/// Callback receiving typed events
pub struct EventSink<T> {
    inner: Arc<dyn Fn(T) + Send + Sync>,
}

impl<T: 'static> EventSink<T> {
    pub fn new(f: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    /// Sink that drops everything
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    #[inline]
    pub fn emit(&self, event: T) {
        (self.inner)(event)
    }

    /// Sink accepting `U`, converted before delivery here
    pub fn map<U: 'static>(&self, f: impl Fn(U) -> T + Send + Sync + 'static) -> EventSink<U> {
        let inner = Arc::clone(&self.inner);
        EventSink::new(move |event| inner(f(event)))
    }
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for EventSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}
