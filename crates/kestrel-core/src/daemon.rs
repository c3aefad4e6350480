//! Core daemon process: startup, event loop, and shutdown sequence.
//!
//! The daemon owns the compositor collaborator and the shutdown latch. Control
//! requests arrive from the IPC server as [`LifecycleCommand`]s on an unbounded
//! channel, so the control service never waits on compositor work.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use kestrel_config::AppConfig;

use crate::ipc::server::{self, IpcState};
use crate::service::LifecycleService;
use crate::shutdown::ShutdownNotifier;

/// The compositor internals the control service drives.
///
/// The daemon event loop issues both calls one at a time on the blocking
/// thread pool. They may be slow; control requests keep being answered while
/// they run, whatever runtime flavor drives the daemon.
pub trait Compositor: Send + 'static {
    /// Apply a freshly loaded configuration.
    fn reload_config(&mut self, config: &AppConfig);

    /// Tear down compositor state. Shutdown watchers have already been
    /// notified when this runs.
    fn quit(&mut self);
}

/// Work queued for the daemon event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCommand {
    Quit,
    ReloadConfig,
}

/// Cloneable handle the control service uses to reach the daemon.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    commands: mpsc::UnboundedSender<LifecycleCommand>,
    notifier: ShutdownNotifier,
    config: watch::Receiver<AppConfig>,
}

impl DaemonHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<LifecycleCommand>,
        notifier: ShutdownNotifier,
        config: watch::Receiver<AppConfig>,
    ) -> Self {
        Self {
            commands,
            notifier,
            config,
        }
    }

    /// Queue a command without waiting for it to run.
    pub fn dispatch(&self, command: LifecycleCommand) {
        if self.commands.send(command).is_err() {
            warn!(?command, "Daemon event loop has stopped, dropping command");
        }
    }

    /// Request a graceful shutdown from inside the process.
    pub fn shutdown(&self) {
        self.dispatch(LifecycleCommand::Quit);
    }

    pub fn notifier(&self) -> &ShutdownNotifier {
        &self.notifier
    }

    /// Snapshot of the currently active configuration.
    pub fn config(&self) -> AppConfig {
        self.config.borrow().clone()
    }

    /// Watch for configuration changes applied by reloads.
    pub fn subscribe_config(&self) -> watch::Receiver<AppConfig> {
        self.config.clone()
    }
}

/// The kestrel control daemon.
pub struct Daemon<C: Compositor> {
    /// `None` only while a call is running on the blocking pool, or after one
    /// panicked.
    compositor: Option<C>,
    config_path: Option<PathBuf>,
    socket_path: PathBuf,
    notifier: ShutdownNotifier,
    command_tx: mpsc::UnboundedSender<LifecycleCommand>,
    command_rx: mpsc::UnboundedReceiver<LifecycleCommand>,
    config_tx: watch::Sender<AppConfig>,
}

impl<C: Compositor> Daemon<C> {
    /// Create a daemon with an in-memory configuration.
    ///
    /// Reloads re-apply the same configuration since there is no file to
    /// re-read.
    pub fn new(config: AppConfig, compositor: C) -> Self {
        let socket_path = config.daemon.resolved_socket_path();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (config_tx, _) = watch::channel(config);

        Self {
            compositor: Some(compositor),
            config_path: None,
            socket_path,
            notifier: ShutdownNotifier::new(),
            command_tx,
            command_rx,
            config_tx,
        }
    }

    /// Create a daemon whose reloads re-read `config_path`.
    pub fn with_config_path(config: AppConfig, config_path: PathBuf, compositor: C) -> Self {
        let mut daemon = Self::new(config, compositor);
        daemon.config_path = Some(config_path);
        daemon
    }

    /// Override the control socket path.
    pub fn with_socket_path(mut self, socket_path: impl Into<PathBuf>) -> Self {
        self.socket_path = socket_path.into();
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle::new(
            self.command_tx.clone(),
            self.notifier.clone(),
            self.config_tx.subscribe(),
        )
    }

    /// Run until quit is requested, a termination signal arrives, or the
    /// shutdown latch is fired by someone else.
    ///
    /// On the way out, shutdown watchers are notified before
    /// [`Compositor::quit`] runs, then the control socket is drained and
    /// removed.
    pub async fn run(mut self) -> Result<(), DaemonError> {
        // Everything fallible happens before the server task exists.
        let mut sigterm = signal(SignalKind::terminate())?;
        let listener = server::bind(&self.socket_path)?;
        let state = Arc::new(IpcState {
            service: LifecycleService::new(self.handle()),
            started_at: Instant::now(),
        });
        let server = tokio::spawn(server::serve_listener(
            listener,
            self.socket_path.clone(),
            state,
            self.notifier.subscribe(),
        ));

        info!(socket = %self.socket_path.display(), "kestrel daemon running");

        let mut latch = self.notifier.subscribe();

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(LifecycleCommand::ReloadConfig) => self.reload_config().await,
                    Some(LifecycleCommand::Quit) => {
                        info!("Quit command received, stopping daemon");
                        break;
                    }
                    // The daemon holds a sender, so the channel never closes
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    warn!("Ctrl-C received, initiating graceful shutdown");
                    break;
                }
                _ = sigterm.recv() => {
                    warn!("SIGTERM received, initiating graceful shutdown");
                    break;
                }
                _ = &mut latch => {
                    info!("Shutdown latch fired, stopping daemon");
                    break;
                }
            }
        }

        self.notifier.notify_shutdown();
        self.on_compositor(|compositor| compositor.quit()).await;

        match server.await {
            Ok(result) => result?,
            Err(e) => error!(error = %e, "IPC server task failed"),
        }

        info!("Daemon stopped");
        Ok(())
    }

    async fn reload_config(&mut self) {
        let config = match &self.config_path {
            Some(path) => match AppConfig::load(path).await {
                Ok(config) => config,
                Err(e) => {
                    error!(
                        path = %path.display(),
                        error = %e,
                        "Config reload failed, keeping the active configuration"
                    );
                    return;
                }
            },
            None => self.active_config(),
        };

        let applied = config.clone();
        if !self
            .on_compositor(move |compositor| compositor.reload_config(&applied))
            .await
        {
            return;
        }
        self.config_tx.send_replace(config);
        info!("Configuration reloaded");
    }

    /// Run `call` against the compositor on the blocking thread pool.
    ///
    /// Returns `false` if the compositor is unavailable or the call panicked.
    async fn on_compositor<F>(&mut self, call: F) -> bool
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let Some(mut compositor) = self.compositor.take() else {
            error!("Compositor is unavailable after an earlier failure, skipping call");
            return false;
        };

        let result = tokio::task::spawn_blocking(move || {
            call(&mut compositor);
            compositor
        })
        .await;

        match result {
            Ok(compositor) => {
                self.compositor = Some(compositor);
                true
            }
            Err(e) => {
                error!(error = %e, "Compositor call panicked");
                false
            }
        }
    }

    fn active_config(&self) -> AppConfig {
        self.config_tx.borrow().clone()
    }
}

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("daemon startup failed: {0}")]
    Startup(String),

    #[error("configuration error: {0}")]
    Config(#[from] kestrel_config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Reload(String),
        Quit,
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Call>>>);

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Compositor for Recorder {
        fn reload_config(&mut self, config: &AppConfig) {
            self.0
                .lock()
                .unwrap()
                .push(Call::Reload(config.logging.level.clone()));
        }

        fn quit(&mut self) {
            self.0.lock().unwrap().push(Call::Quit);
        }
    }

    fn test_daemon(tmp: &TempDir, recorder: Recorder) -> Daemon<Recorder> {
        let config_path = tmp.path().join("kestrel.toml");
        std::fs::write(&config_path, "").unwrap();
        Daemon::with_config_path(AppConfig::default(), config_path, recorder)
            .with_socket_path(tmp.path().join("kestrel.sock"))
    }

    #[tokio::test]
    async fn test_quit_command_runs_shutdown_sequence() {
        let tmp = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let daemon = test_daemon(&tmp, recorder.clone());
        let handle = daemon.handle();
        let watcher = handle.notifier().subscribe();

        let run = tokio::spawn(daemon.run());
        handle.shutdown();

        tokio::time::timeout(std::time::Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert!(handle.notifier().is_shutting_down());
        assert!(watcher.await.is_some());
        assert_eq!(recorder.calls(), vec![Call::Quit]);
        assert!(!tmp.path().join("kestrel.sock").exists());
    }

    #[tokio::test]
    async fn test_reload_rereads_config_file() {
        let tmp = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let daemon = test_daemon(&tmp, recorder.clone());
        let handle = daemon.handle();
        let mut config_rx = handle.subscribe_config();

        let run = tokio::spawn(daemon.run());

        std::fs::write(tmp.path().join("kestrel.toml"), "[logging]\nlevel = \"debug\"\n")
            .unwrap();
        handle.dispatch(LifecycleCommand::ReloadConfig);
        config_rx.changed().await.unwrap();
        assert_eq!(handle.config().logging.level, "debug");

        handle.shutdown();
        run.await.unwrap().unwrap();
        assert_eq!(
            recorder.calls(),
            vec![Call::Reload("debug".to_string()), Call::Quit]
        );
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_active_config() {
        let tmp = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let daemon = test_daemon(&tmp, recorder.clone());
        let handle = daemon.handle();

        let run = tokio::spawn(daemon.run());

        std::fs::write(tmp.path().join("kestrel.toml"), "[logging]\nlevel = \"loud\"\n")
            .unwrap();
        handle.dispatch(LifecycleCommand::ReloadConfig);
        handle.shutdown();
        run.await.unwrap().unwrap();

        assert_eq!(handle.config().logging.level, "info");
        assert_eq!(recorder.calls(), vec![Call::Quit]);
    }

    #[tokio::test]
    async fn test_external_latch_stops_daemon() {
        let tmp = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let daemon = test_daemon(&tmp, recorder.clone());
        let handle = daemon.handle();

        let run = tokio::spawn(daemon.run());
        tokio::task::yield_now().await;
        handle.notifier().notify_shutdown();

        tokio::time::timeout(std::time::Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(recorder.calls(), vec![Call::Quit]);
    }

    #[tokio::test]
    async fn test_startup_failure_leaves_nothing_running() {
        let tmp = TempDir::new().unwrap();
        // A regular file where the socket's parent directory should be
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let socket_path = blocker.join("kestrel.sock");

        let recorder = Recorder::default();
        let daemon = Daemon::new(AppConfig::default(), recorder.clone())
            .with_socket_path(&socket_path);
        let handle = daemon.handle();

        assert!(matches!(daemon.run().await, Err(DaemonError::Io(_))));
        assert_eq!(handle.notifier().pending_count(), 0);
        assert!(!socket_path.exists());
        assert_eq!(recorder.calls(), Vec::<Call>::new());
    }

    #[test]
    fn test_dispatch_after_daemon_dropped_does_not_panic() {
        let tmp = TempDir::new().unwrap();
        let daemon = test_daemon(&tmp, Recorder::default());
        let handle = daemon.handle();
        drop(daemon);
        handle.shutdown();
    }
}
