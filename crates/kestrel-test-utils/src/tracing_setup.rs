//! Tracing initialisation for tests.
//!
//! [`init_test_tracing`] routes events through the test-harness writer so
//! they only show up for failing tests. It installs at most one subscriber
//! per process, so every test can call it.

use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber honouring `RUST_LOG` (default `debug`
/// for kestrel crates, `warn` for everything else).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,kestrel_core=debug")),
        )
        .with_test_writer()
        .try_init();
}
