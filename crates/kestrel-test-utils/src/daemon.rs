//! Daemon test harness.
//!
//! [`TestDaemon`] runs a real [`Daemon`] on a Unix socket inside a temp
//! directory, backed by a [`RecordingCompositor`] and a config file the test
//! can rewrite between reloads.

use std::path::PathBuf;
use std::time::Duration;

use kestrel_config::AppConfig;
use kestrel_core::{Daemon, DaemonError, DaemonHandle, IpcClient};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::compositor::RecordingCompositor;
use crate::tracing_setup::init_test_tracing;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// A running daemon with an owned temp directory.
///
/// The temp directory (config file and socket) is deleted when this value is
/// dropped, even on panic.
pub struct TestDaemon {
    pub handle: DaemonHandle,
    pub compositor: RecordingCompositor,
    pub config_path: PathBuf,
    pub socket_path: PathBuf,
    task: Option<JoinHandle<Result<(), DaemonError>>>,
    _temp_dir: TempDir,
}

impl TestDaemon {
    /// Start a daemon with default config and a non-blocking compositor.
    pub async fn start() -> Self {
        Self::start_with("", RecordingCompositor::new()).await
    }

    /// Start a daemon whose config file holds `toml_content`.
    pub async fn start_with(toml_content: &str, compositor: RecordingCompositor) -> Self {
        init_test_tracing();
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("kestrel.toml");
        let socket_path = temp_dir.path().join("kestrel.sock");

        tokio::fs::write(&config_path, toml_content)
            .await
            .expect("failed to write test config");
        let config = AppConfig::load(&config_path)
            .await
            .expect("failed to parse test config");

        let daemon = Daemon::with_config_path(config, config_path.clone(), compositor.clone())
            .with_socket_path(&socket_path);
        let handle = daemon.handle();
        let task = tokio::spawn(daemon.run());

        let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;
        while !socket_path.exists() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "daemon did not bind {} in time",
                socket_path.display()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Self {
            handle,
            compositor,
            config_path,
            socket_path,
            task: Some(task),
            _temp_dir: temp_dir,
        }
    }

    /// A client connected to this daemon's socket.
    pub fn client(&self) -> IpcClient {
        IpcClient::new(&self.socket_path)
    }

    /// Overwrite the config file (for reload testing).
    pub async fn write_config(&self, toml_content: &str) {
        tokio::fs::write(&self.config_path, toml_content)
            .await
            .expect("failed to write updated config");
    }

    /// Wait for the daemon's `run` to return.
    pub async fn wait_stopped(&mut self, timeout: Duration) -> Result<(), DaemonError> {
        let task = self.task.take().expect("daemon already awaited");
        tokio::time::timeout(timeout, task)
            .await
            .expect("daemon did not stop in time")
            .expect("daemon task panicked")
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.handle.shutdown();
            task.abort();
        }
    }
}
