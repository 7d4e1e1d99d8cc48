//! Logging setup for hosts embedding the client.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "booknook=info";

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `booknook=info`).
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
