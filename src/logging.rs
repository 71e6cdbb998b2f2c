//! Logging initialization
//!
//! The library only emits `tracing` events. Applications, benchmarks and tests
//! that want to see them install a subscriber through these helpers.

use tracing::debug;

/// Target used for trace-hook events (emit, insert, merge).
pub const TRACE_TARGET: &str = "parfold::trace";

/// Filter directive for a verbosity level.
pub fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install a global fmt subscriber for the given verbosity.
///
/// Does nothing if a global subscriber is already set.
pub fn init_logging(verbose: u8) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(log_level(verbose))
        .with_target(verbose >= 1) // Show targets so trace-hook events stand out
        .with_thread_ids(verbose >= 2)
        .with_line_number(verbose >= 2)
        .try_init()
        .is_ok();

    if installed {
        debug!("parfold logging initialized at verbosity {}", verbose);
    }
}

/// Scoped subscriber writing through the test harness's captured output.
pub fn init_test_tracing() -> tracing::subscriber::DefaultGuard {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .finish();
    tracing::subscriber::set_default(subscriber)
}
