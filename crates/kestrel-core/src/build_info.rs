//! Build-time metadata embedded by the build script.
//!
//! Reported by the `/health` route and the CLI so an operator can tell which
//! daemon build is answering on the control socket.

/// The git commit hash at build time (short form).
pub const GIT_HASH: &str = env!("KESTREL_GIT_HASH");

/// The build timestamp as a Unix epoch string.
pub const BUILD_TIMESTAMP: &str = env!("KESTREL_BUILD_TIMESTAMP");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("KESTREL_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Formatted version string, e.g. `"0.1.0 (abc1234, debug)"`.
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}
