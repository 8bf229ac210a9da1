//! Deterministic inline host.

use std::sync::Arc;

use canopy_core::{FlagNotifier, Policy};

use crate::machine::{Handle, Machine};

/// Drives a machine on the current thread, deterministically.
///
/// The harness wires the machine to a [`FlagNotifier`] and replays the
/// host-loop contract inline: [`run_until_idle`](Harness::run_until_idle)
/// consumes wake edges and drains until no edge remains. Events posted
/// re-entrantly from callbacks are handled within the same drain pass,
/// exactly as under an async host.
///
/// Intended for tests and for embedders that already own a loop and want
/// to call the dispatcher at a point of their choosing.
pub struct Harness<P: Policy> {
    machine: Machine<P>,
    wake: Arc<FlagNotifier>,
}

impl<P: Policy> Harness<P> {
    /// Create a machine named `name` wired to an inline notifier.
    pub fn new(name: impl Into<String>) -> Self {
        let wake = Arc::new(FlagNotifier::new());
        let machine = Machine::new(name, wake.clone());
        Self { machine, wake }
    }

    /// The machine, for setup and inspection.
    pub fn machine(&mut self) -> &mut Machine<P> {
        &mut self.machine
    }

    /// A producer/control handle for the machine.
    pub fn handle(&self) -> Handle<P> {
        self.machine.handle()
    }

    /// Consume wake edges and drain until none remains; returns the number
    /// of events dispatched.
    pub fn run_until_idle(&mut self) -> usize {
        let mut dispatched = 0;
        while self.wake.take() {
            dispatched += self.machine.drain();
        }
        dispatched
    }

    /// Tear the harness apart, returning the machine.
    pub fn into_machine(self) -> Machine<P> {
        self.machine
    }
}

impl<P: Policy> std::fmt::Debug for Harness<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness").field("machine", &self.machine).finish()
    }
}
