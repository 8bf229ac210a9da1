//! Transition between two states.

use std::fmt;

use canopy_core::{HookResult, Policy};

use crate::NodeIdx;

/// Transition hook; receives the dispatched event value.
///
/// The dispatcher only invokes hooks whose transition kind equals the
/// event's kind, so a hook can match out its payload infallibly.
pub(crate) type TransitionHook<P> = Box<dyn FnMut(&<P as Policy>::Event) -> HookResult + Send>;

/// One entry of the transition table.
///
/// A `target` of `None` is an internal transition: hooks fire but no state
/// is exited or entered.
pub(crate) struct Transition<P: Policy> {
    pub(crate) source: NodeIdx,
    pub(crate) target: Option<NodeIdx>,
    pub(crate) kind: P::Kind,
    /// Fired in registration order when the transition is taken.
    pub(crate) callbacks: Vec<TransitionHook<P>>,
    /// Reserved registration surface; dispatch never fires these.
    #[allow(dead_code)]
    pub(crate) failed_callbacks: Vec<TransitionHook<P>>,
}

impl<P: Policy> Transition<P> {
    pub(crate) fn new(source: NodeIdx, target: Option<NodeIdx>, kind: P::Kind) -> Self {
        Self {
            source,
            target,
            kind,
            callbacks: Vec::new(),
            failed_callbacks: Vec::new(),
        }
    }
}

impl<P: Policy> fmt::Debug for Transition<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
