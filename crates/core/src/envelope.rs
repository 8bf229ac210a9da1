//! Single-use event carrier.

use std::fmt;

use crate::Policy;

/// An event in flight: one owned event value plus an optional one-shot
/// deletion hook.
///
/// Envelopes are owned by the queue while enqueued, transferred to the
/// dispatcher for one drain iteration, then dropped. The deletion hook
/// fires exactly once, from `Drop`, whether the event was dispatched or
/// destroyed unconsumed at teardown. Registering a second hook replaces
/// the first.
pub struct Envelope<P: Policy> {
    event: P::Event,
    on_delete: Option<Box<dyn FnOnce() + Send>>,
}

impl<P: Policy> Envelope<P> {
    /// Wrap an event value.
    pub fn new(event: P::Event) -> Self {
        Self {
            event,
            on_delete: None,
        }
    }

    /// The kind tag of the carried event.
    pub fn kind(&self) -> P::Kind {
        P::kind_of(&self.event)
    }

    /// The carried event value.
    pub fn event(&self) -> &P::Event {
        &self.event
    }

    /// Register a hook to run when the envelope is destroyed.
    ///
    /// The hook runs exactly once; the last registration wins.
    pub fn on_delete(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.on_delete = Some(Box::new(hook));
    }
}

impl<P: Policy> Drop for Envelope<P> {
    fn drop(&mut self) {
        if let Some(hook) = self.on_delete.take() {
            hook();
        }
    }
}

impl<P: Policy> fmt::Debug for Envelope<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("kind", &self.kind())
            .field("has_delete_hook", &self.on_delete.is_some())
            .finish()
    }
}
