//! Tracing subscriber setup for the demo binary and for tests.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` (for example `RUST_LOG=solidify_fem=debug`)
/// and defaults to `info`.
///
/// ```no_run
/// solidify_fem::logging::init();
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();
}

/// Verbose subscriber routed through the test harness writer.
/// Safe to call from every test; only the first call installs it.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
