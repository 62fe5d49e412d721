use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::event::{EventId, StreamId};

/// Owner of the monotonic `event_id` and `eventstream_index` counters.
///
/// Cloning yields another handle onto the same counters. Pipelines that must not share ids
/// use separate contexts; tests call [`EventstreamContext::reset`] to start from zero.
#[derive(Clone, Default)]
pub struct EventstreamContext {
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    event_id: AtomicU64,
    eventstream_index: AtomicU64,
}

impl EventstreamContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next event id.
    pub fn next_event_id(&self) -> EventId {
        EventId(self.counters.event_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Issue the next eventstream index.
    pub fn next_stream_id(&self) -> StreamId {
        StreamId(self.counters.eventstream_index.fetch_add(1, Ordering::SeqCst))
    }

    /// Restart both counters at zero.
    pub fn reset(&self) {
        self.counters.event_id.store(0, Ordering::SeqCst);
        self.counters.eventstream_index.store(0, Ordering::SeqCst);
    }

    /// `true` when both handles share the same counters.
    pub fn same_as(&self, other: &EventstreamContext) -> bool {
        Arc::ptr_eq(&self.counters, &other.counters)
    }
}

impl fmt::Debug for EventstreamContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventstreamContext")
            .field("next_event_id", &self.counters.event_id.load(Ordering::SeqCst))
            .field(
                "next_stream_id",
                &self.counters.eventstream_index.load(Ordering::SeqCst),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::EventstreamContext;
    use crate::eventstream::{EventId, StreamId};

    #[test]
    fn counters_are_monotonic_and_shared_between_clones() {
        let ctx = EventstreamContext::new();
        let other = ctx.clone();
        assert_eq!(ctx.next_event_id(), EventId(0));
        assert_eq!(other.next_event_id(), EventId(1));
        assert_eq!(ctx.next_stream_id(), StreamId(0));
        assert!(ctx.same_as(&other));
    }

    #[test]
    fn reset_restarts_counters_and_contexts_are_isolated() {
        let a = EventstreamContext::new();
        let b = EventstreamContext::new();
        a.next_event_id();
        a.next_event_id();
        assert_eq!(b.next_event_id(), EventId(0));
        a.reset();
        assert_eq!(a.next_event_id(), EventId(0));
        assert!(!a.same_as(&b));
    }
}
