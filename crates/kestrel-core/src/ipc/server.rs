//! IPC server: axum HTTP router over a Unix domain socket.
//!
//! Maps the lifecycle control service onto JSON routes. `/shutdown-watch`
//! answers with a server-sent event stream that carries at most one
//! `shutdown` event and then ends. When the client goes away the stream is
//! dropped, which cancels the underlying subscription.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use futures::{Stream, StreamExt};
use tokio::net::UnixListener;
use tracing::{debug, info};

use super::types::*;
use crate::service::LifecycleService;

/// SSE event name carrying the shutdown notification.
pub const SHUTDOWN_EVENT: &str = "shutdown";

/// Shared state accessible to all IPC route handlers.
pub struct IpcState {
    pub service: LifecycleService,
    pub started_at: Instant,
}

/// Build the axum router with all control routes.
pub fn router(state: Arc<IpcState>) -> axum::Router {
    axum::Router::new()
        .route("/health", get(handle_health))
        .route("/quit", post(handle_quit))
        .route("/reload-config", post(handle_reload_config))
        .route("/ping", post(handle_ping))
        .route("/shutdown-watch", post(handle_shutdown_watch))
        .with_state(state)
}

/// Bind the control socket, replacing a stale socket file if present.
pub fn bind(socket_path: &Path) -> Result<UnixListener, std::io::Error> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    info!(path = %socket_path.display(), "IPC server listening");
    Ok(listener)
}

/// Serve on a listener from [`bind`] until `shutdown` completes, removing the
/// socket file afterwards.
pub async fn serve_listener<F>(
    listener: UnixListener,
    socket_path: PathBuf,
    state: Arc<IpcState>,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future + Send + 'static,
{
    let app = router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("IPC server shutting down");
        })
        .await?;

    std::fs::remove_file(&socket_path).ok();
    Ok(())
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_health(State(state): State<Arc<IpcState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::build_info::VERSION.to_string(),
        git_hash: crate::build_info::GIT_HASH.to_string(),
        build_profile: crate::build_info::BUILD_PROFILE.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        pid: std::process::id(),
        shutting_down: state.service.handle().notifier().is_shutting_down(),
    })
}

async fn handle_quit(
    State(state): State<Arc<IpcState>>,
    Json(req): Json<QuitRequest>,
) -> Json<Ack> {
    Json(state.service.quit(req))
}

async fn handle_reload_config(
    State(state): State<Arc<IpcState>>,
    Json(req): Json<ReloadConfigRequest>,
) -> Json<Ack> {
    Json(state.service.reload_config(req))
}

async fn handle_ping(
    State(state): State<Arc<IpcState>>,
    Json(req): Json<PingRequest>,
) -> Json<PingResponse> {
    Json(state.service.ping(req))
}

async fn handle_shutdown_watch(
    State(state): State<Arc<IpcState>>,
    Json(req): Json<ShutdownWatchRequest>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    debug!("Shutdown watch opened");
    let events = state
        .service
        .shutdown_watch(req)
        .into_stream()
        .map(|notification| Event::default().event(SHUTDOWN_EVENT).json_data(notification));
    Sse::new(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::{DaemonHandle, LifecycleCommand};
    use crate::shutdown::ShutdownNotifier;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use kestrel_config::AppConfig;
    use pretty_assertions::assert_eq;
    use tokio::sync::{mpsc, watch};
    use tower::ServiceExt;

    fn test_state() -> (Arc<IpcState>, mpsc::UnboundedReceiver<LifecycleCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (_config_tx, config_rx) = watch::channel(AppConfig::default());
        let handle = DaemonHandle::new(command_tx, ShutdownNotifier::new(), config_rx);

        let state = Arc::new(IpcState {
            service: LifecycleService::new(handle),
            started_at: Instant::now(),
        });
        (state, command_rx)
    }

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_bytes(resp: axum::response::Response) -> axum::body::Bytes {
        axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_serve_replaces_stale_socket_and_removes_it_on_shutdown() {
        let tmp = tempfile::TempDir::new().unwrap();
        let socket_path = tmp.path().join("kestrel.sock");
        std::fs::write(&socket_path, "stale").unwrap();

        let (state, _commands) = test_state();
        let notifier = state.service.handle().notifier().clone();
        let listener = bind(&socket_path).unwrap();
        let server = tokio::spawn(serve_listener(
            listener,
            socket_path.clone(),
            state,
            notifier.subscribe(),
        ));

        let client = crate::ipc::IpcClient::new(&socket_path);
        let response = client.ping(Some(vec![7, 0, 7])).await.unwrap();
        assert_eq!(response.payload, Some(vec![7, 0, 7]));

        notifier.notify_shutdown();
        server.await.unwrap().unwrap();
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _commands) = test_state();
        let app = router(state);
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(health.status, "ok");
        assert!(!health.shutting_down);
    }

    #[tokio::test]
    async fn test_quit_endpoint() {
        let (state, mut commands) = test_state();
        let app = router(state);

        let resp = app.oneshot(json_post("/quit", "{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&body_bytes(resp).await[..], b"{}");
        assert_eq!(commands.try_recv().unwrap(), LifecycleCommand::Quit);
    }

    #[tokio::test]
    async fn test_reload_endpoint() {
        let (state, mut commands) = test_state();
        let app = router(state);

        let resp = app.oneshot(json_post("/reload-config", "{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(commands.try_recv().unwrap(), LifecycleCommand::ReloadConfig);
    }

    #[tokio::test]
    async fn test_ping_endpoint_echoes_payload() {
        let (state, _commands) = test_state();

        for body in ["{}", r#"{"payload":[]}"#, r#"{"payload":[0,1,254,255]}"#] {
            let app = router(state.clone());
            let resp = app.oneshot(json_post("/ping", body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(&body_bytes(resp).await[..], body.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_malformed_request_is_rejected_before_dispatch() {
        let (state, mut commands) = test_state();
        let app = router(state);

        let resp = app.oneshot(json_post("/quit", "not json")).await.unwrap();
        assert!(resp.status().is_client_error());
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_watch_streams_single_event() {
        let (state, _commands) = test_state();
        let notifier = state.service.handle().notifier().clone();
        let app = router(state);

        let resp = app
            .oneshot(json_post("/shutdown-watch", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(notifier.pending_count(), 1);

        notifier.notify_shutdown();
        notifier.notify_shutdown();

        let body = body_bytes(resp).await;
        let text = std::str::from_utf8(&body).unwrap();
        assert_eq!(text.matches("event: shutdown").count(), 1);
        assert!(text.contains("data: {}"));
    }

    #[tokio::test]
    async fn test_dropped_watch_response_cancels_subscription() {
        let (state, _commands) = test_state();
        let notifier = state.service.handle().notifier().clone();
        let app = router(state);

        let resp = app
            .oneshot(json_post("/shutdown-watch", "{}"))
            .await
            .unwrap();
        assert_eq!(notifier.pending_count(), 1);

        drop(resp);
        assert_eq!(notifier.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_watch_frames_arrive_before_end() {
        let (state, _commands) = test_state();
        let notifier = state.service.handle().notifier().clone();
        let app = router(state);

        let resp = app
            .oneshot(json_post("/shutdown-watch", "{}"))
            .await
            .unwrap();
        let mut body = resp.into_body();
        notifier.notify_shutdown();

        let frame = body.frame().await.unwrap().unwrap();
        let data = frame.into_data().unwrap();
        assert!(std::str::from_utf8(&data).unwrap().contains("event: shutdown"));
        assert!(body.frame().await.is_none());
    }
}
