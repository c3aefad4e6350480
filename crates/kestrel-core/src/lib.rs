#![deny(unsafe_code)]

//! kestrel core: the compositor lifecycle control plane.
//!
//! Exposes four operations to external clients: quit, reload config, an
//! application-level ping, and a one-shot shutdown watch. The daemon runtime
//! owns the compositor collaborator and the process-wide shutdown latch; the
//! IPC layer carries the operations over a Unix socket.

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Daemon runtime, event loop, and the compositor collaborator trait.
pub mod daemon;
/// Unix socket transport (server and client) and wire types.
pub mod ipc;
/// Tracing subscriber setup.
pub mod logging;
/// The lifecycle control service endpoint.
pub mod service;
/// One-shot shutdown broadcast to watchers.
pub mod shutdown;

pub use daemon::{Compositor, Daemon, DaemonError, DaemonHandle, LifecycleCommand};
pub use ipc::{IpcClient, IpcClientError};
pub use service::LifecycleService;
pub use shutdown::{ShutdownNotifier, Subscription};
