#![deny(unsafe_code)]

//! Shared test utilities for the kestrel workspace.
//!
//! Provides config builders, a recording compositor stub, a socket-backed
//! daemon harness, and tracing helpers so crate tests stay short.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! kestrel-test-utils = { workspace = true }
//! ```

pub mod compositor;
pub mod config;
pub mod daemon;
pub mod tracing_setup;

pub use compositor::{CompositorEvent, RecordingCompositor};
pub use config::TestConfigBuilder;
pub use daemon::TestDaemon;
pub use tracing_setup::init_test_tracing;
