#![deny(unsafe_code)]

//! kestrel CLI: run the control daemon or talk to a running one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use kestrel_config::AppConfig;
use kestrel_core::{Compositor, Daemon, IpcClient};

/// kestrel: lifecycle control for a running compositor.
#[derive(Parser)]
#[command(name = "kestrel", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "kestrel.toml", global = true)]
    config: PathBuf,

    /// Control socket path, overriding `daemon.socket_path`.
    #[arg(short, long, global = true)]
    socket: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the kestrel daemon.
    Start,

    /// Ask a running daemon to quit.
    Quit,

    /// Ask a running daemon to reload its configuration.
    Reload,

    /// Check that the daemon answers, verifying the echoed payload.
    Ping {
        /// Text to send instead of a random payload.
        #[arg(long)]
        payload: Option<String>,

        /// Seconds to wait for the echo (defaults to `client.ping_timeout_secs`).
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Block until the daemon announces shutdown.
    Watch,

    /// Show daemon health and build information.
    Status,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_found = cli.config.exists();
    let config = load_config(&cli.config).await?;
    kestrel_core::logging::init(&config.logging.level, cli.verbose);
    if !config_found {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    let socket_path = resolve_socket_path(&config, cli.socket.as_deref());

    match cli.command {
        Commands::Start => cmd_start(config, config_found.then_some(cli.config), socket_path).await,
        Commands::Quit => cmd_quit(&IpcClient::new(socket_path)).await,
        Commands::Reload => cmd_reload(&IpcClient::new(socket_path)).await,
        Commands::Ping { payload, timeout } => {
            let timeout = resolve_ping_timeout(&config, timeout);
            cmd_ping(&IpcClient::new(socket_path), payload, timeout).await
        }
        Commands::Watch => cmd_watch(&IpcClient::new(socket_path)).await,
        Commands::Status => cmd_status(&IpcClient::new(socket_path)).await,
        Commands::Config { show } => cmd_config(&cli.config, &config, show),
    }
}

/// Compositor used by `kestrel start` when no real compositor is attached.
///
/// It only logs what it was asked to do.
struct StandaloneCompositor;

impl Compositor for StandaloneCompositor {
    fn reload_config(&mut self, config: &AppConfig) {
        info!(log_level = %config.logging.level, "Compositor configuration applied");
    }

    fn quit(&mut self) {
        info!("Compositor state torn down");
    }
}

async fn cmd_start(
    config: AppConfig,
    config_path: Option<PathBuf>,
    socket_path: PathBuf,
) -> Result<()> {
    info!(version = %kestrel_core::build_info::version_string(), "Starting kestrel daemon");

    let daemon = match config_path {
        Some(path) => Daemon::with_config_path(config, path, StandaloneCompositor),
        None => Daemon::new(config, StandaloneCompositor),
    };
    daemon.with_socket_path(socket_path).run().await?;
    Ok(())
}

async fn cmd_quit(client: &IpcClient) -> Result<()> {
    client.quit().await?;
    println!("Quit requested.");
    Ok(())
}

async fn cmd_reload(client: &IpcClient) -> Result<()> {
    client.reload_config().await?;
    println!("Config reload requested.");
    Ok(())
}

async fn cmd_ping(client: &IpcClient, payload: Option<String>, timeout: Duration) -> Result<()> {
    let Some(text) = payload else {
        let rtt = client.check_alive(timeout).await?;
        println!("pong in {rtt:?}");
        return Ok(());
    };

    let sent = text.into_bytes();
    let response = tokio::time::timeout(timeout, client.ping(Some(sent.clone())))
        .await
        .with_context(|| format!("no ping response within {timeout:?}"))??;

    if response.payload() != sent.as_slice() {
        bail!("ping response payload does not match the request");
    }
    println!("{}", String::from_utf8_lossy(response.payload()));
    Ok(())
}

async fn cmd_watch(client: &IpcClient) -> Result<()> {
    let mut watch = client.shutdown_watch().await?;
    match watch.next().await? {
        Some(notification) => {
            println!("{}", serde_json::to_string(&notification)?);
        }
        None => warn!("Shutdown watch closed without a notification"),
    }
    Ok(())
}

async fn cmd_status(client: &IpcClient) -> Result<()> {
    let health = client.health().await?;
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        println!("{}", render_config(config)?);
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load config from {}", path.display()))
    } else {
        Ok(AppConfig::default())
    }
}

fn render_config(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(config).context("failed to render config")
}

fn resolve_ping_timeout(config: &AppConfig, flag_secs: Option<u64>) -> Duration {
    flag_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.client.ping_timeout())
}

fn resolve_socket_path(config: &AppConfig, flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf)
        .unwrap_or_else(|| config.daemon.resolved_socket_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use kestrel_test_utils::{TestConfigBuilder, TestDaemon};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "kestrel", "ping", "--payload", "hi", "--socket", "/tmp/k.sock", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.socket.as_deref(), Some(Path::new("/tmp/k.sock")));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Ping { payload: Some(ref p), timeout: None } if p == "hi"
        ));
    }

    #[test]
    fn test_socket_flag_overrides_config() {
        let config = TestConfigBuilder::new()
            .socket_path("/run/kestrel/from-config.sock")
            .build();
        assert_eq!(
            resolve_socket_path(&config, None),
            PathBuf::from("/run/kestrel/from-config.sock")
        );
        assert_eq!(
            resolve_socket_path(&config, Some(Path::new("/tmp/flag.sock"))),
            PathBuf::from("/tmp/flag.sock")
        );
    }

    #[test]
    fn test_ping_timeout_flag_overrides_config() {
        let config = TestConfigBuilder::new().ping_timeout_secs(3).build();
        assert_eq!(resolve_ping_timeout(&config, None), Duration::from_secs(3));
        assert_eq!(
            resolve_ping_timeout(&config, Some(1)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_rendered_config_parses_back() {
        let config = TestConfigBuilder::new()
            .socket_path("/run/user/1000/kestrel.sock")
            .log_level("debug")
            .ping_timeout_secs(3)
            .build();

        let rendered = render_config(&config).unwrap();
        assert!(rendered.contains("level = \"debug\""));
        assert_eq!(AppConfig::parse(&rendered).unwrap(), config);
    }

    #[tokio::test]
    async fn test_missing_config_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("absent.toml")).await.unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn test_invalid_config_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("kestrel.toml");
        std::fs::write(&path, "[client]\nping_timeout_secs = 0\n").unwrap();
        assert!(load_config(&path).await.is_err());
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
    async fn test_ping_and_watch_against_running_daemon() {
        let mut daemon = TestDaemon::start().await;
        let client = daemon.client();

        cmd_ping(&client, None, Duration::from_secs(2)).await.unwrap();
        cmd_ping(&client, Some("hello".to_string()), Duration::from_secs(2))
            .await
            .unwrap();

        let notifier = daemon.handle.notifier().clone();
        let before = notifier.pending_count();
        let watcher = tokio::spawn({
            let client = client.clone();
            async move { cmd_watch(&client).await }
        });
        while notifier.pending_count() == before {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cmd_quit(&client).await.unwrap();

        watcher.await.unwrap().unwrap();
        daemon.wait_stopped(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_without_daemon_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let client = IpcClient::new(tmp.path().join("kestrel.sock"));
        assert!(cmd_ping(&client, None, Duration::from_secs(1)).await.is_err());
    }
}
