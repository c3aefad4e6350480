//! Tracing subscriber setup for the daemon and the CLI.
//!
//! The configured `logging.level` is the baseline, `-v` flags raise it, and
//! `RUST_LOG` overrides both.

use tracing_subscriber::EnvFilter;

/// Pick the filter directive for a configured level and a `-v` count.
pub fn filter_directive(level: &str, verbose: u8) -> String {
    match verbose {
        0 => level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Build the [`EnvFilter`], preferring `RUST_LOG` when it is set and valid.
pub fn env_filter(level: &str, verbose: u8) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level, verbose)))
}

/// Install the global fmt subscriber.
///
/// Does nothing if a global subscriber is already installed.
pub fn init(level: &str, verbose: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level, verbose))
        .with_target(true)
        .try_init();
}
