//! Tokio host-loop integration for the canopy state-machine runtime.
//!
//! The engine is host-agnostic: it exposes a synchronous
//! [`drain`](canopy_machine::Machine::drain) and expects the host to call
//! it whenever the injected [`Notifier`](canopy_core::Notifier) is
//! signalled. This crate supplies that host for tokio applications:
//!
//! - [`NotifyWake`]: a `tokio::sync::Notify`-backed notifier. `Notify`
//!   stores at most one permit, which is exactly the edge-triggered,
//!   coalescing wake contract the engine requires.
//! - [`TokioHost`]: spawns a task that owns the machine and drains on
//!   every wake. The spawned task's executor thread is the dispatcher
//!   thread; producers keep posting through cloned
//!   [`Handle`](canopy_machine::Handle)s from anywhere.
//! - [`HostHandle`] / [`ShutdownHandle`]: graceful teardown; the machine
//!   is returned for post-mortem inspection.
//!
//! ```no_run
//! # use canopy_machine::{Machine, Policy};
//! # use canopy_tokio::TokioHost;
//! # #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)] enum St { On }
//! # #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)] enum Ev { Tick }
//! # struct Demo;
//! # impl Policy for Demo {
//! #     type StateId = St; type Kind = Ev; type Event = Ev;
//! #     fn kind_of(e: &Ev) -> Ev { *e }
//! #     fn state_name(_: St) -> &'static str { "On" }
//! #     fn kind_name(_: Ev) -> &'static str { "Tick" }
//! # }
//! # #[tokio::main] async fn main() {
//! let host = TokioHost::new();
//! let mut machine = Machine::<Demo>::new("Root", host.notifier());
//! machine.create_states(&[St::On]);
//! let handle = machine.handle();
//! machine.start();
//!
//! let running = host.spawn(machine);
//! handle.send(Ev::Tick);
//! let _machine = running.shutdown().await.unwrap();
//! # }
//! ```

mod host;
mod trace;

pub use host::{HostError, HostHandle, NotifyWake, ShutdownHandle, TokioHost};
pub use trace::init_tracing;
