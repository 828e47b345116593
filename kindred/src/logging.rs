//! Logging setup for embedders and tests.
//!
//! The engine only emits `tracing` events; no subscriber is installed unless
//! the embedder opts in here or brings its own.

use tracing_subscriber::EnvFilter;

/// Install a compact stdout subscriber filtered by `RUST_LOG`, defaulting to
/// `kindred=info`. Safe to call more than once; returns whether this call
/// installed the global subscriber.
pub fn init() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kindred=info"));
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_repeated_init_does_not_panic() {
        let first = super::init();
        let second = super::init();
        // At most one call can win the global slot.
        assert!(!(first && second));
    }
}
