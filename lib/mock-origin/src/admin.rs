//! Management API for driving the mock origin from another process.
//!
//! The admin API is served on its own listener. Requests to the origin listener are always correlated, whatever their
//! path, so management routes cannot share it.

use std::{future::Future, sync::Arc};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use snafu::ResultExt as _;
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{debug, info};

use crate::{
    config::OriginConfig,
    error::{OriginError, Serve},
    request::RequestSummary,
    response::ProgrammedResponse,
    store::CorrelationStore,
    trace::TraceId,
};

#[derive(Clone)]
struct AdminState {
    store: Arc<CorrelationStore>,
    shutdown_tx: mpsc::Sender<()>,
}

#[derive(Deserialize)]
struct EnqueueParams {
    #[serde(default = "default_status")]
    status: u16,
}

fn default_status() -> u16 {
    StatusCode::OK.as_u16()
}

/// Number of responses still queued for a trace.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PendingResponses {
    /// Number of queued responses.
    pub pending: usize,
}

/// Management API for a [`CorrelationStore`].
///
/// Routes:
///
/// - `POST /traces/{trace_id}/responses?status=<code>`: queue a response. The request body becomes the response body
///   and the request's `Content-Type` (default `text/plain`) becomes the response content type.
/// - `GET /traces/{trace_id}/requests`: recorded requests for the trace, as JSON.
/// - `GET /traces/{trace_id}/responses/pending`: number of responses still queued.
/// - `POST /shutdown`: request a graceful shutdown.
pub struct AdminApi {
    state: AdminState,
    max_body_bytes: usize,
}

impl AdminApi {
    /// Creates a new `AdminApi` over the given store.
    ///
    /// Shutdown requests are signalled on `shutdown_tx`.
    pub fn new(store: Arc<CorrelationStore>, shutdown_tx: mpsc::Sender<()>) -> Self {
        Self {
            state: AdminState { store, shutdown_tx },
            max_body_bytes: OriginConfig::default().max_body_bytes,
        }
    }

    /// Sets the largest programmed response body, in bytes, that will be accepted.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Builds the admin router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/shutdown", post(handle_shutdown))
            .route("/traces/{trace_id}/responses", post(handle_enqueue_response))
            .route("/traces/{trace_id}/responses/pending", get(handle_pending_responses))
            .route("/traces/{trace_id}/requests", get(handle_requests_dump))
            .layer(DefaultBodyLimit::max(self.max_body_bytes))
            .with_state(self.state.clone())
    }

    /// Serves the admin API from the given listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// If the server fails while accepting connections, an error is returned.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), OriginError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(local_addr) = listener.local_addr() {
            info!(address = %local_addr, "Admin API listening.");
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context(Serve)
    }
}

async fn handle_shutdown(State(state): State<AdminState>) -> StatusCode {
    info!("Received shutdown request. Stopping...");

    // A full channel means shutdown was already requested.
    if state.shutdown_tx.try_send(()).is_err() {
        debug!("Shutdown already in progress.");
    }

    StatusCode::ACCEPTED
}

async fn handle_enqueue_response(
    State(state): State<AdminState>, Path(trace_id): Path<String>, Query(params): Query<EnqueueParams>,
    headers: HeaderMap, body: Bytes,
) -> (StatusCode, String) {
    let status = match StatusCode::from_u16(params.status) {
        Ok(status) => status,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid status code: {}", e)),
    };

    let content_type = headers
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("text/plain"));

    let trace_id = TraceId::from(trace_id);
    debug!(%trace_id, status = status.as_u16(), body_len = body.len(), "Programming response.");
    state
        .store
        .enqueue_response(&trace_id, ProgrammedResponse::new(status, content_type, body));

    (StatusCode::ACCEPTED, String::new())
}

async fn handle_requests_dump(
    State(state): State<AdminState>, Path(trace_id): Path<String>,
) -> Json<Vec<RequestSummary>> {
    let requests = state.store.requests_for(&TraceId::from(trace_id));
    Json(requests.iter().map(|request| request.summary()).collect())
}

async fn handle_pending_responses(
    State(state): State<AdminState>, Path(trace_id): Path<String>,
) -> Json<PendingResponses> {
    Json(PendingResponses {
        pending: state.store.pending_responses(&TraceId::from(trace_id)),
    })
}
