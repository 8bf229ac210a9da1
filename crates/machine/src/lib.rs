//! Hierarchical state-machine engine.
//!
//! A [`Machine`] owns a tree of states (optionally nested, optionally
//! parallel), a transition table keyed by `(source state, event kind)`,
//! and the dispatch loop that applies transitions along least-common-
//! ancestor paths. Producers on any thread post events through a cloneable
//! [`Handle`]; all dispatch happens on the single thread that calls
//! [`Machine::drain`], woken by the injected
//! [`Notifier`](canopy_core::Notifier).
//!
//! # Lifecycle
//!
//! 1. **Setup**: declare states, transitions and callbacks. Wiring
//!    mistakes (duplicate transitions, unknown states) panic at the call
//!    site: they are bugs in the client's wiring, not runtime conditions.
//! 2. **Running**: [`Machine::start`] validates the wiring, freezes the
//!    topology and schedules the initial entry of the root. From then on
//!    only events move; the tree and the table are immutable.
//! 3. **Stopped**: [`Handle::stop`] disables the wake. Queued events are
//!    neither drained nor discarded until teardown.
//!
//! # Driving the machine
//!
//! Async hosts wire a real wake primitive (see `canopy-tokio`). Tests and
//! single-threaded embedders can use the deterministic [`Harness`]:
//!
//! ```
//! use canopy_machine::{Harness, Policy};
//!
//! #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
//! enum St { On, Off }
//! #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
//! enum Ev { Flip }
//!
//! struct Lamp;
//! impl Policy for Lamp {
//!     type StateId = St;
//!     type Kind = Ev;
//!     type Event = Ev;
//!     fn kind_of(ev: &Ev) -> Ev { *ev }
//!     fn state_name(id: St) -> &'static str {
//!         match id { St::On => "On", St::Off => "Off" }
//!     }
//!     fn kind_name(_: Ev) -> &'static str { "Flip" }
//! }
//!
//! let mut harness = Harness::<Lamp>::new("Lamp");
//! let machine = harness.machine();
//! machine.create_states(&[St::Off, St::On]);
//! machine.add_transition(St::Off, Ev::Flip, St::On);
//! machine.add_transition(St::On, Ev::Flip, St::Off);
//! machine.start();
//!
//! let handle = harness.handle();
//! handle.send(Ev::Flip);
//! harness.run_until_idle();
//! assert!(harness.machine().is_state_active(St::On));
//! ```

mod harness;
mod machine;
mod node;
mod transition;
mod validate;

pub use harness::Harness;
pub use machine::{DispatchStats, Handle, Machine};
pub use validate::WiringError;

// Re-exported so clients can declare policies and post events without a
// direct canopy-core dependency.
pub use canopy_core::{Envelope, FlagNotifier, HookError, HookResult, Lane, Notifier, Policy};

pub(crate) type NodeIdx = usize;

/// Arena index of the machine root.
pub(crate) const ROOT: NodeIdx = 0;
