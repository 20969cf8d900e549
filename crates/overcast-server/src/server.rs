//! `HubServer`: axum WebSocket broadcast hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::HubConfig;
use crate::error::HubError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::BroadcastManager;
use crate::websocket::session::{SessionLimits, run_hub_session};

/// How long `stop` waits for the listener task.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection map and role registry.
    pub broadcast: Arc<BroadcastManager>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the hub was created.
    pub start_time: Instant,
    /// Session limits handed to every connection.
    pub limits: SessionLimits,
    /// Prometheus handle for `/metrics`, if a recorder was installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The broadcast hub.
pub struct HubServer {
    config: HubConfig,
    broadcast: Arc<BroadcastManager>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
    serve_task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl HubServer {
    /// Create a hub. Nothing is bound until [`listen`](Self::listen).
    pub fn new(config: HubConfig) -> Self {
        Self {
            broadcast: Arc::new(BroadcastManager::new(config.max_dropped_messages)),
            config,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
            serve_task: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Serve `GET /metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        let state = AppState {
            broadcast: self.broadcast.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            limits: SessionLimits {
                heartbeat_interval: self.config.heartbeat_interval(),
                heartbeat_timeout: self.config.heartbeat_timeout(),
                send_queue_capacity: self.config.send_queue_capacity,
            },
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
    }

    /// Bind and start serving in a background task.
    ///
    /// Fails if the address is already bound; this is not retried.
    pub async fn listen(&self) -> Result<SocketAddr, HubError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(HubError::Stopped);
        }
        if self.serve_task.lock().is_some() {
            return Err(HubError::AlreadyListening);
        }

        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| HubError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %e, "hub listener exited with error");
            }
        });

        let mut slot = self.serve_task.lock();
        if slot.is_some() {
            task.abort();
            return Err(HubError::AlreadyListening);
        }
        *slot = Some(task);
        info!(addr = %local_addr, "hub listening");
        Ok(local_addr)
    }

    /// Terminate every connection and close the listener. Idempotent.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("stopping hub");
        self.shutdown.shutdown();
        self.broadcast.close_all().await;
        let handles: Vec<JoinHandle<()>> = self.serve_task.lock().take().into_iter().collect();
        self.shutdown
            .graceful_shutdown(handles, Some(STOP_TIMEOUT))
            .await;
        info!("hub stopped");
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Connection map and role registry.
    pub fn broadcast(&self) -> &Arc<BroadcastManager> {
        &self.broadcast
    }

    /// Hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }
}

/// GET / and GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let conn_id = format!("conn_{}", Uuid::now_v7().simple());
    let token = state.shutdown.child_token();
    ws.on_upgrade(move |socket| {
        run_hub_session(socket, conn_id, state.broadcast, state.limits, token)
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.broadcast.connection_count().await;
    let overlays = state.broadcast.overlay_count();
    Json(health::health_check(state.start_time, connections, overlays))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
