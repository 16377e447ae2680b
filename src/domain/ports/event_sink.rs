//! Explicit event sink replacing the source's event-emitter pattern (§9 Design Note).
//!
//! "Listener errors must be isolated — one listener panicking never prevents others
//! from firing and never corrupts queue state." [`CallbackEventSink`] enforces this
//! with `catch_unwind` around each listener.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use crate::domain::models::Event;

/// Receives structured events emitted by the core (§6.2).
pub trait EventSink: Send + Sync {
    /// Deliver one event to every registered listener.
    fn emit(&self, event: Event);
}

/// A synchronous, in-process event sink backed by a list of callbacks.
///
/// Appropriate for the cooperative-task scheduling model described in §5: listeners
/// run synchronously on the emitting thread, and a panicking listener is isolated
/// (caught and logged) so it cannot corrupt queue state or block other listeners.
pub struct CallbackEventSink {
    listeners: Mutex<Vec<Box<dyn Fn(&Event) + Send + Sync>>>,
}

impl Default for CallbackEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackEventSink {
    /// Construct an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener. Order of registration is the order listeners are invoked.
    pub fn subscribe(&self, listener: impl Fn(&Event) + Send + Sync + 'static) {
        self.listeners.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(Box::new(listener));
    }
}

impl EventSink for CallbackEventSink {
    fn emit(&self, event: Event) {
        let listeners = self.listeners.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for listener in listeners.iter() {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                tracing::warn!("event listener panicked; isolating and continuing");
            }
        }
    }
}

/// A sink that drops every event. Useful as a default/test fixture.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn panicking_listener_does_not_stop_others() {
        let sink = CallbackEventSink::new();
        let calls = Arc::new(AtomicUsize::new(0));

        sink.subscribe(|_event| panic!("boom"));
        let calls_clone = calls.clone();
        sink.subscribe(move |_event| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        sink.emit(Event::ChainExhausted { at: chrono::Utc::now() });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
