//! Local HTTP target for end-to-end load tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Bytes, extract::State, http::StatusCode, routing::any, Router};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

struct TargetState {
    hits: watch::Sender<usize>,
    bodies: Mutex<Vec<Bytes>>,
    status: StatusCode,
    delay: Option<Duration>,
}

/// HTTP server bound to an ephemeral localhost port that answers every
/// request on every path and records what it received.
///
/// The server is aborted when dropped.
pub struct TargetServer {
    addr: SocketAddr,
    state: Arc<TargetState>,
    handle: JoinHandle<()>,
}

impl TargetServer {
    /// Target answering `200 OK` immediately.
    pub async fn start() -> Self {
        Self::spawn(StatusCode::OK, None).await
    }

    /// Target answering every request with `status`.
    pub async fn with_status(status: StatusCode) -> Self {
        Self::spawn(status, None).await
    }

    /// Target that holds each request for `delay` before answering.
    pub async fn slow(delay: Duration) -> Self {
        Self::spawn(StatusCode::OK, Some(delay)).await
    }

    async fn spawn(status: StatusCode, delay: Option<Duration>) -> Self {
        let (hits, _) = watch::channel(0usize);
        let state = Arc::new(TargetState {
            hits,
            bodies: Mutex::new(Vec::new()),
            status,
            delay,
        });

        let app = Router::new()
            .route("/", any(record))
            .route("/*path", any(record))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind target listener");
        let addr = listener.local_addr().expect("target local addr");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Base URL of the target, e.g. `http://127.0.0.1:49152`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received so far.
    pub fn hits(&self) -> usize {
        *self.state.hits.borrow()
    }

    /// Bodies of all requests received so far, in arrival order.
    pub async fn bodies(&self) -> Vec<Bytes> {
        self.state.bodies.lock().await.clone()
    }

    /// Wait until at least `count` requests arrived. Returns `false` on timeout.
    pub async fn wait_for_hits(&self, count: usize, timeout: Duration) -> bool {
        let mut rx = self.state.hits.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|&hits| hits >= count))
            .await
            .map(|res| res.is_ok())
            .unwrap_or(false)
    }
}

impl Drop for TargetServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn record(State(state): State<Arc<TargetState>>, body: Bytes) -> StatusCode {
    state.bodies.lock().await.push(body);
    state.hits.send_modify(|hits| *hits += 1);
    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }
    state.status
}
