//! Foundation types for the canopy hierarchical state-machine runtime.
//!
//! This crate provides the vocabulary shared by the engine and its hosts:
//!
//! - [`Policy`]: the client declaration of state ids, event kinds and the
//!   event value type
//! - [`Envelope`]: the single-use owned event carrier with a one-shot
//!   deletion hook
//! - [`EventQueue`]: the two-lane FIFO handoff between event producers and
//!   the dispatcher
//! - [`Notifier`]: the edge-triggered wake primitive injected by the host
//!
//! # Architecture
//!
//! The runtime is built on a simple producer/consumer model:
//!
//! ```text
//! producers (any thread) → EventQueue → Notifier wake → dispatcher drain
//! ```
//!
//! The dispatcher is:
//! - **Single-threaded**: all state mutation happens on one thread
//! - **Deterministic**: same queue contents + same tree = same callbacks
//! - **Synchronous**: callbacks run inline, no suspension mid-dispatch
//!
//! This crate is self-contained and depends on no other workspace crate,
//! making it the foundation layer.

mod envelope;
mod notify;
mod policy;
mod queue;

pub use envelope::Envelope;
pub use notify::{FlagNotifier, Notifier};
pub use policy::Policy;
pub use queue::{EventQueue, Lane};

/// Error type user callbacks may return.
///
/// Failures are logged by the dispatcher and dispatch continues; nothing is
/// rolled back and nothing propagates to the producer.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by entry, exit and transition callbacks.
pub type HookResult = Result<(), HookError>;
