//! Typed event fan-out.
//!
//! One bus per event kind; subscribers are registered once at pipeline build
//! and invoked synchronously, in subscription order, as events are published.
//! This replaces ad-hoc function-pointer/user-data callback pairs with a
//! single typed seam that external consumers (telemetry, tests, displays)
//! attach to.

/// Subscriber list for a single event type.
pub struct EventBus<E> {
    subscribers: Vec<Box<dyn FnMut(&E) + Send>>,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    /// Register a subscriber. Subscribers cannot be removed; the set is fixed
    /// for the pipeline's lifetime.
    pub fn subscribe<F>(&mut self, f: F)
    where
        F: FnMut(&E) + Send + 'static,
    {
        self.subscribers.push(Box::new(f));
    }

    /// Deliver an event to every subscriber in registration order.
    pub fn publish(&mut self, event: &E) {
        for sub in &mut self.subscribers {
            sub(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
