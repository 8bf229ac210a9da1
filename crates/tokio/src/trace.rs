//! Logging bootstrap.

use tracing_subscriber::EnvFilter;

/// Install a console `tracing` subscriber.
///
/// Filter defaults to `info` and can be overridden with `RUST_LOG`.
/// Best-effort: a second call (or a subscriber installed by the embedding
/// application) wins silently, so examples and tests can all call it.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
