//! HTTP server for submitting and killing load test runs.
//!
//! Provides endpoints for:
//! - Scheduling a run (`POST /run`)
//! - Killing the active run (`POST /kill`)
//! - Scheduler status, health and Prometheus metrics

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use ddosy_core::{
    Dispatcher, HttpTransport, RunId, ScheduleError, ScheduleRequest, Scheduler, SchedulerStatus,
    Transport,
};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::wire::{ErrorResponse, RunIdResponse, ScheduleRequestBody};

/// Idle connections kept per target host by the outbound client.
const MAX_IDLE_PER_HOST: usize = 64;

// ============================================================================
// Server
// ============================================================================

/// Owns the scheduler and exposes the submit and kill operations.
pub struct Server {
    config: ServerConfig,
    scheduler: Scheduler,
    dispatcher: Arc<Dispatcher>,
    worker: Mutex<Option<JoinHandle<()>>>,
    prometheus: Option<PrometheusHandle>,
}

impl Server {
    /// Build a server that sends traffic over HTTP and start its worker.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.request_timeout, MAX_IDLE_PER_HOST)
            .context("Failed to build HTTP client")?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a server over an arbitrary transport and start its worker.
    pub fn with_transport(config: ServerConfig, transport: Arc<dyn Transport>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(transport, config.max_in_flight));
        let scheduler = Scheduler::new(config.max_queue, Arc::clone(&dispatcher));
        let worker = scheduler.start();

        info!(
            max_queue = config.max_queue,
            max_in_flight = config.max_in_flight,
            request_timeout = ?config.request_timeout,
            "Scheduler started"
        );

        Self {
            config,
            scheduler,
            dispatcher,
            worker: Mutex::new(worker),
            prometheus: None,
        }
    }

    /// Serve `/metrics` from this recorder handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Validate and queue a run, returning its id.
    pub async fn submit(&self, request: ScheduleRequest) -> Result<RunId, ScheduleError> {
        self.scheduler.submit(request).await
    }

    /// Kill the active run, returning its id.
    pub async fn kill(&self) -> Result<RunId, ScheduleError> {
        self.scheduler.kill().await
    }

    pub async fn status(&self) -> StatusResponse {
        StatusResponse {
            service: "ddosy".to_string(),
            scheduler: self.scheduler.status().await,
            in_flight: self.dispatcher.in_flight(),
            max_in_flight: self.dispatcher.max_in_flight(),
        }
    }

    /// Stop accepting runs, kill the active one and wait for the worker.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "Scheduler worker ended abnormally");
            }
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub scheduler: SchedulerStatus,
    pub in_flight: usize,
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// Error returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("malformed request body: {0}")]
    Body(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Schedule(ScheduleError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Schedule(ScheduleError::Backpressure { .. }) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Schedule(ScheduleError::NoActiveRun) => StatusCode::CONFLICT,
            ApiError::Schedule(ScheduleError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Body(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Body(rejection.body_text())
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /run - Schedule a load test run
async fn schedule_handler(
    Extension(server): Extension<Arc<Server>>,
    body: Result<Json<ScheduleRequestBody>, JsonRejection>,
) -> Result<Json<RunIdResponse>, ApiError> {
    let Json(body) = body?;
    let request = parse_request(body)?;
    let id = server.submit(request).await?;
    Ok(Json(RunIdResponse { id }))
}

/// Convert a wire body into an engine request. Bodies that cannot be
/// converted are counted with the same rejection metric as the scheduler uses.
fn parse_request(body: ScheduleRequestBody) -> Result<ScheduleRequest, ScheduleError> {
    ScheduleRequest::try_from(body).map_err(|e| {
        counter!("ddosy_runs_rejected_total", "reason" => e.kind()).increment(1);
        e
    })
}

/// POST /kill - Kill the active run
async fn kill_handler(
    Extension(server): Extension<Arc<Server>>,
) -> Result<Json<RunIdResponse>, ApiError> {
    let id = server.kill().await?;
    Ok(Json(RunIdResponse { id }))
}

/// GET /status - Active run, queued runs and dispatch usage
async fn status_handler(Extension(server): Extension<Arc<Server>>) -> Json<StatusResponse> {
    Json(server.status().await)
}

/// GET /health - Health check
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "ddosy".to_string(),
    })
}

/// GET /metrics - Prometheus metrics
async fn metrics_handler(Extension(server): Extension<Arc<Server>>) -> impl IntoResponse {
    match &server.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "metrics recorder not installed".to_string(),
        ),
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(server: Arc<Server>) -> Router {
    Router::new()
        .route("/run", post(schedule_handler))
        .route("/kill", post(kill_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(server))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves, then shut the scheduler down.
pub async fn run_server<F>(server: Arc<Server>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = server.config().listen_addr();
    let app = create_router(Arc::clone(&server));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "ddosy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server failed")?;

    server.shutdown().await;
    info!("ddosy stopped");
    Ok(())
}
