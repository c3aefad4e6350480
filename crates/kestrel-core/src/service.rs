//! Lifecycle control service: the four control-plane operations.
//!
//! Transport-agnostic: the IPC server adapts these methods onto HTTP routes.
//! None of them waits on the compositor. Quit and ReloadConfig only enqueue
//! a command for the daemon event loop, Ping answers from the calling task,
//! and ShutdownWatch hands back a subscription that resolves on its own.

use tracing::{debug, info};

use crate::daemon::{DaemonHandle, LifecycleCommand};
use crate::ipc::types::{
    Ack, PingRequest, PingResponse, QuitRequest, ReloadConfigRequest, ShutdownWatchRequest,
};
use crate::shutdown::Subscription;

/// Echo a ping payload back bit-for-bit.
///
/// Absent stays absent and empty stays empty; the bytes are never inspected.
pub fn echo(request: PingRequest) -> PingResponse {
    PingResponse {
        payload: request.payload,
    }
}

/// The control-plane endpoint.
#[derive(Debug, Clone)]
pub struct LifecycleService {
    handle: DaemonHandle,
}

impl LifecycleService {
    pub fn new(handle: DaemonHandle) -> Self {
        Self { handle }
    }

    /// Signal the intent to quit. Returns before the process exits.
    pub fn quit(&self, _request: QuitRequest) -> Ack {
        info!("Quit requested via control service");
        self.handle.dispatch(LifecycleCommand::Quit);
        Ack {}
    }

    /// Ask for an in-place config reload. Returns before the reload runs.
    ///
    /// Reload failures are logged by the daemon, never reported here.
    pub fn reload_config(&self, _request: ReloadConfigRequest) -> Ack {
        info!("Config reload requested via control service");
        self.handle.dispatch(LifecycleCommand::ReloadConfig);
        Ack {}
    }

    pub fn ping(&self, request: PingRequest) -> PingResponse {
        debug!(
            payload_len = request.payload.as_ref().map(Vec::len),
            "ping"
        );
        echo(request)
    }

    /// Open a shutdown watch.
    pub fn shutdown_watch(&self, _request: ShutdownWatchRequest) -> Subscription {
        self.handle.notifier().subscribe()
    }

    pub fn handle(&self) -> &DaemonHandle {
        &self.handle
    }
}
