use std::{future::Future, sync::Arc};

use axum::{
    body::{to_bytes, Bytes},
    extract::{Request, State},
    Router,
};
use snafu::ResultExt as _;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::{
    config::OriginConfig,
    error::{OriginError, Serve},
    request::RecordedRequest,
    response::ProgrammedResponse,
    store::CorrelationStore,
    trace::{TraceExtractor, TraceId},
};

/// A mock HTTP origin that answers each request with the response programmed for its trace.
///
/// Every request, whatever its method or path, is handled the same way:
///
/// - no trace identifier: `400 I dont have a trace`, and nothing is recorded
/// - otherwise the request is recorded under its trace, and the next programmed response for that trace is returned,
///   or `503 I dont have a response for <trace>` if none is queued
/// - if the body cannot be read, the request is recorded with an empty body and answered with
///   `413 I could not read the request body`
#[derive(Clone)]
pub struct MockOrigin {
    store: Arc<CorrelationStore>,
    extractor: TraceExtractor,
    max_body_bytes: usize,
}

impl MockOrigin {
    /// Creates a new `MockOrigin` with an empty correlation store.
    pub fn new(extractor: TraceExtractor) -> Self {
        Self::with_store(extractor, Arc::new(CorrelationStore::new()))
    }

    /// Creates a new `MockOrigin` backed by the given correlation store.
    pub fn with_store(extractor: TraceExtractor, store: Arc<CorrelationStore>) -> Self {
        Self {
            store,
            extractor,
            max_body_bytes: OriginConfig::default().max_body_bytes,
        }
    }

    /// Creates a new `MockOrigin` from the given configuration.
    ///
    /// # Errors
    ///
    /// If the configured trace header name is invalid, an error is returned.
    pub fn from_config(config: &OriginConfig) -> Result<Self, OriginError> {
        let extractor = TraceExtractor::new(&config.trace_id_header)?;
        Ok(Self::new(extractor).with_max_body_bytes(config.max_body_bytes))
    }

    /// Sets the largest request body, in bytes, that will be buffered.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Returns the correlation store backing this origin.
    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    /// Returns the trace extractor used by this origin.
    pub fn trace_extractor(&self) -> &TraceExtractor {
        &self.extractor
    }

    /// Handles a single request.
    pub async fn handle(&self, request: Request) -> ProgrammedResponse {
        let Some(trace_id) = self.extractor.extract(request.headers()) else {
            warn!(
                method = %request.method(),
                path = request.uri().path(),
                header = %self.extractor.header_name(),
                "Received request without a trace identifier."
            );
            return ProgrammedResponse::no_trace();
        };

        let (parts, body) = request.into_parts();
        let body = match to_bytes(body, self.max_body_bytes).await {
            Ok(body) => body,
            Err(e) => {
                // The request still counts as received for its trace, but it does not consume a programmed response.
                warn!(%trace_id, error = %e, "Failed to read request body.");
                self.store
                    .record_request(&trace_id, RecordedRequest::from_parts(parts, Bytes::new()));
                return ProgrammedResponse::unreadable_body();
            }
        };

        let request = RecordedRequest::from_parts(parts, body);
        debug!(
            %trace_id,
            method = %request.method(),
            path = request.path(),
            body_len = request.body().len(),
            "Recording request."
        );

        match self.store.exchange(&trace_id, request) {
            Some(response) => {
                debug!(%trace_id, status = response.status().as_u16(), "Returning programmed response.");
                response
            }
            None => no_response(&trace_id),
        }
    }

    /// Builds a router that sends every request to this origin.
    pub fn router(&self) -> Router {
        Router::new().fallback(handle_origin_request).with_state(self.clone())
    }

    /// Serves requests from the given listener until `shutdown` resolves.
    ///
    /// Each connection is handled on its own task.
    ///
    /// # Errors
    ///
    /// If the server fails while accepting connections, an error is returned.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), OriginError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(local_addr) = listener.local_addr() {
            info!(
                address = %local_addr,
                trace_header = %self.extractor.header_name(),
                "Mock origin listening."
            );
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context(Serve)?;

        info!("Mock origin stopped.");
        Ok(())
    }
}

fn no_response(trace_id: &TraceId) -> ProgrammedResponse {
    warn!(%trace_id, "No programmed response available for trace.");
    ProgrammedResponse::no_response(trace_id)
}

async fn handle_origin_request(State(origin): State<MockOrigin>, request: Request) -> ProgrammedResponse {
    origin.handle(request).await
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode};
    use tower::ServiceExt as _;

    use super::*;

    const HEADER: &str = "X-Balanced-Guru";

    fn origin() -> MockOrigin {
        MockOrigin::new(TraceExtractor::new(HEADER).unwrap())
    }

    fn traced(trace_id: &str, method: Method, path: &str, body: impl Into<Body>) -> Request {
        Request::builder()
            .method(method)
            .uri(path)
            .header(HEADER, trace_id)
            .body(body.into())
            .unwrap()
    }

    async fn send(origin: &MockOrigin, request: Request) -> (StatusCode, String, Bytes) {
        let response = origin.router().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response.headers()[CONTENT_TYPE].to_str().unwrap().to_string();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, body)
    }

    #[tokio::test]
    async fn programmed_response_is_returned_and_request_recorded() {
        let origin = origin();
        let trace_id = TraceId::from("abc");
        origin
            .store()
            .enqueue_response(&trace_id, ProgrammedResponse::text(StatusCode::OK, "hello"));

        let (status, content_type, body) = send(&origin, traced("abc", Method::GET, "/", Body::empty())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/plain");
        assert_eq!(&body[..], b"hello");

        let requests = origin.store().requests_for(&trace_id);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header(HEADER).unwrap(), "abc");
    }

    #[tokio::test]
    async fn missing_trace_is_rejected_without_recording() {
        let origin = origin();
        origin.store().enqueue_response(
            &TraceId::from("other"),
            ProgrammedResponse::text(StatusCode::OK, "not for you"),
        );

        let request = Request::builder().uri("/anything").body(Body::empty()).unwrap();
        let (status, content_type, body) = send(&origin, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(content_type, "text/plain");
        assert_eq!(&body[..], b"I dont have a trace");

        // Only the trace that had a response programmed exists, and its response is untouched.
        assert_eq!(origin.store().trace_count(), 1);
        assert_eq!(origin.store().pending_responses(&TraceId::from("other")), 1);
    }

    #[tokio::test]
    async fn missing_trace_creates_no_entry() {
        let origin = origin();

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, _, _) = send(&origin, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(origin.store().trace_count(), 0);
    }

    #[tokio::test]
    async fn exhausted_queue_returns_service_unavailable() {
        let origin = origin();
        let trace_id = TraceId::from("xyz");
        origin
            .store()
            .enqueue_response(&trace_id, ProgrammedResponse::text(StatusCode::ACCEPTED, "once"));

        let (status, _, body) = send(&origin, traced("xyz", Method::POST, "/first", Body::empty())).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(&body[..], b"once");

        let (status, content_type, body) = send(&origin, traced("xyz", Method::POST, "/second", Body::empty())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(content_type, "text/plain");
        assert_eq!(&body[..], b"I dont have a response for xyz");

        assert_eq!(origin.store().requests_for(&trace_id).len(), 2);
    }

    #[tokio::test]
    async fn unprogrammed_trace_is_starved() {
        let origin = origin();

        let (status, _, body) = send(&origin, traced("fresh-trace", Method::GET, "/", Body::empty())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(std::str::from_utf8(&body).unwrap().contains("fresh-trace"));
        assert_eq!(origin.store().requests_for(&TraceId::from("fresh-trace")).len(), 1);
    }

    #[tokio::test]
    async fn form_bodies_are_recorded_verbatim() {
        let origin = origin();
        let raw = Bytes::from_static(b"name=a%20b&x=1&x=2");
        let request = Request::builder()
            .method(Method::POST)
            .uri("/form?q=1")
            .header(HEADER, "form")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(raw.clone()))
            .unwrap();

        send(&origin, request).await;

        let requests = origin.store().requests_for(&TraceId::from("form"));
        assert_eq!(requests[0].method(), &Method::POST);
        assert_eq!(requests[0].path(), "/form");
        assert_eq!(requests[0].query(), Some("q=1"));
        assert_eq!(requests[0].body(), &raw);
    }

    #[tokio::test]
    async fn oversized_body_is_recorded_without_consuming_a_response() {
        let origin = origin().with_max_body_bytes(4);
        let trace_id = TraceId::from("big");
        origin
            .store()
            .enqueue_response(&trace_id, ProgrammedResponse::text(StatusCode::OK, "later"));

        let (status, content_type, body) = send(&origin, traced("big", Method::PUT, "/upload", "way too large")).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(content_type, "text/plain");
        assert_eq!(&body[..], b"I could not read the request body");

        let requests = origin.store().requests_for(&trace_id);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method(), &Method::PUT);
        assert_eq!(requests[0].path(), "/upload");
        assert!(requests[0].body().is_empty());
        assert_eq!(origin.store().pending_responses(&trace_id), 1);
    }

    #[tokio::test]
    async fn non_utf8_traces_do_not_collide() {
        let origin = origin();
        let mut headers = http::HeaderMap::new();
        headers.insert(
            origin.trace_extractor().header_name().clone(),
            HeaderValue::from_bytes(b"\xff").unwrap(),
        );
        let ff = origin.trace_extractor().extract(&headers).unwrap();
        origin
            .store()
            .enqueue_response(&ff, ProgrammedResponse::text(StatusCode::OK, "for ff"));

        let request = Request::builder()
            .uri("/")
            .header(HEADER, HeaderValue::from_bytes(b"\xfe").unwrap())
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&origin, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        assert!(origin.store().requests_for(&ff).is_empty());
        assert_eq!(origin.store().pending_responses(&ff), 1);
        assert_eq!(origin.store().trace_count(), 2);
    }

    #[tokio::test]
    async fn responses_are_delivered_in_order() {
        let origin = origin();
        let trace_id = TraceId::from("ordered");
        for body in ["one", "two", "three"] {
            origin
                .store()
                .enqueue_response(&trace_id, ProgrammedResponse::text(StatusCode::OK, body));
        }

        for expected in ["one", "two", "three"] {
            let (_, _, body) = send(&origin, traced("ordered", Method::GET, "/", Body::empty())).await;
            assert_eq!(&body[..], expected.as_bytes());
        }
    }

    #[tokio::test]
    async fn traces_do_not_interfere() {
        let origin = origin();
        let first = TraceId::from("t1");
        let second = TraceId::from("t2");
        origin
            .store()
            .enqueue_response(&first, ProgrammedResponse::text(StatusCode::OK, "for t1"));

        let (status, _, _) = send(&origin, traced("t2", Method::GET, "/", Body::empty())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(origin.store().pending_responses(&first), 1);
        assert!(origin.store().requests_for(&first).is_empty());

        let (status, _, body) = send(&origin, traced("t1", Method::GET, "/", Body::empty())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"for t1");
        assert_eq!(origin.store().requests_for(&second).len(), 1);
    }
}
