//! Daemon IPC: Unix domain socket transport for the control plane.
//!
//! The daemon exposes the lifecycle control service as an HTTP/JSON API over
//! a Unix socket. The CLI and config processes connect as clients to quit the
//! compositor, reload its configuration, ping it, and watch for shutdown.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐         Unix socket        ┌──────────────┐
//! │   CLI    │───────────────────────────▶│  IPC Server  │
//! │  config  │  HTTP/1.1 + JSON / SSE     │  (axum)      │
//! └──────────┘                            └──────┬───────┘
//!                                                │ LifecycleService
//!                                         ┌──────▼───────┐
//!                                         │    Daemon    │──▶ Compositor
//!                                         │  event loop  │
//!                                         └──────────────┘
//! ```

pub mod client;
pub mod server;
pub mod types;

pub use client::{IpcClient, IpcClientError, ShutdownWatchStream};
pub use server::IpcState;
pub use types::*;
