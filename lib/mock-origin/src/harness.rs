//! Test harness for running the mock origin alongside a test suite.
//!
//! An [`OriginHarness`] owns a mock origin running on a background thread, started once and left running until the
//! process exits. Tests never tear the origin down between cases: each case works against its own [`TraceId`] through
//! an [`OriginCase`], and traces from earlier cases are simply never referenced again.
//!
//! ```no_run
//! use http::StatusCode;
//! use mock_origin::harness::OriginHarness;
//!
//! # fn main() -> Result<(), mock_origin::OriginError> {
//! let origin = OriginHarness::shared()?;
//! let case = origin.begin_case();
//! case.add_response(StatusCode::OK, "text/plain", "hello")?;
//!
//! // Point the proxy under test at `origin.base_url()`, configured to forward `case.trace_id()` in the
//! // `case.trace_header()` header, then drive it.
//!
//! let requests = case.requests();
//! # let _ = requests;
//! # Ok(())
//! # }
//! ```

use std::{
    future::pending,
    net::SocketAddr,
    sync::{mpsc, Arc, Mutex, OnceLock, PoisonError},
    thread::{self, JoinHandle},
};

use bytes::Bytes;
use http::{header::HeaderName, StatusCode};
use snafu::ResultExt as _;
use tokio::{net::TcpListener, runtime::Builder};
use tracing::{debug, error};

use crate::{
    config::OriginConfig,
    error::{Bind, OriginError, Runtime},
    port::select_port,
    request::RecordedRequest,
    response::ProgrammedResponse,
    server::MockOrigin,
    store::CorrelationStore,
    trace::TraceId,
};

static SHARED: OnceLock<OriginHarness> = OnceLock::new();
static SHARED_INIT: Mutex<()> = Mutex::new(());

/// A mock origin running in the background for the remainder of the process.
pub struct OriginHarness {
    address: SocketAddr,
    trace_header: HeaderName,
    store: Arc<CorrelationStore>,
    server: JoinHandle<Result<(), OriginError>>,
}

impl OriginHarness {
    /// Starts a mock origin on a dedicated background thread.
    ///
    /// When the configured listen port is `0`, an ephemeral port is selected first. This returns only once the origin
    /// is accepting connections. The origin runs until the process exits.
    ///
    /// # Errors
    ///
    /// If the trace header is invalid, no port can be selected, the listener cannot be bound, or the background
    /// runtime cannot be created, an error is returned.
    pub fn start(config: OriginConfig) -> Result<Self, OriginError> {
        let origin = MockOrigin::from_config(&config)?;
        let trace_header = origin.trace_extractor().header_name().clone();
        let store = Arc::clone(origin.store());

        let mut address = config.listen_address;
        if address.port() == 0 {
            address.set_port(select_port(address.ip())?);
        }

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let server = thread::Builder::new()
            .name("mock-origin".to_string())
            .spawn(move || {
                let runtime = match Builder::new_multi_thread()
                    .worker_threads(2)
                    .thread_name("mock-origin-worker")
                    .enable_all()
                    .build()
                    .context(Runtime)
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Ok(());
                    }
                };

                runtime.block_on(async move {
                    let listener = match TcpListener::bind(address).await.context(Bind { address }) {
                        Ok(listener) => listener,
                        Err(e) => {
                            error!(error = %e, "Failed to bind mock origin listener.");
                            let _ = ready_tx.send(Err(e));
                            return Ok(());
                        }
                    };

                    let local_addr = listener.local_addr().unwrap_or(address);
                    let _ = ready_tx.send(Ok(local_addr));
                    origin.serve(listener, pending()).await
                })
            })
            .context(Runtime)?;

        let address = ready_rx.recv().map_err(|_| OriginError::StartupAborted)??;
        debug!(%address, "Mock origin harness started.");

        Ok(Self {
            address,
            trace_header,
            store,
            server,
        })
    }

    /// Returns the process-wide harness, starting it with the default configuration on first use.
    ///
    /// # Errors
    ///
    /// If the harness has not been started yet and fails to start, an error is returned. A later call will try again.
    pub fn shared() -> Result<&'static OriginHarness, OriginError> {
        if let Some(harness) = SHARED.get() {
            return Ok(harness);
        }

        let _guard = SHARED_INIT.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(harness) = SHARED.get() {
            return Ok(harness);
        }

        let harness = Self::start(OriginConfig::default())?;
        Ok(SHARED.get_or_init(|| harness))
    }

    /// Returns the address the origin is listening on.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns the origin's base URL, such as `http://127.0.0.1:34567`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// Returns the name of the header the origin reads trace identifiers from.
    pub fn trace_header(&self) -> &HeaderName {
        &self.trace_header
    }

    /// Returns the correlation store shared with the origin.
    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    /// Returns `true` if the background server is still running.
    pub fn is_running(&self) -> bool {
        !self.server.is_finished()
    }

    /// Begins a new test case under a freshly generated trace identifier.
    pub fn begin_case(&self) -> OriginCase {
        self.begin_case_with(TraceId::generate())
    }

    /// Begins a new test case under the given trace identifier.
    ///
    /// Useful when the proxy under test generates trace identifiers itself.
    pub fn begin_case_with(&self, trace_id: TraceId) -> OriginCase {
        OriginCase {
            trace_id,
            trace_header: self.trace_header.clone(),
            base_url: self.base_url(),
            store: Arc::clone(&self.store),
        }
    }
}

/// A view of the mock origin scoped to a single trace.
#[derive(Clone, Debug)]
pub struct OriginCase {
    trace_id: TraceId,
    trace_header: HeaderName,
    base_url: String,
    store: Arc<CorrelationStore>,
}

impl OriginCase {
    /// Returns the trace identifier of this case.
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Returns the name of the header the trace identifier must be sent in.
    pub fn trace_header(&self) -> &HeaderName {
        &self.trace_header
    }

    /// Returns the origin's base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Switches this case to a freshly generated trace identifier.
    ///
    /// Requests and responses under the previous identifier are left in place but are no longer visible here.
    pub fn reset(&mut self) -> &TraceId {
        self.trace_id = TraceId::generate();
        debug!(trace_id = %self.trace_id, "Reset trace for test case.");
        &self.trace_id
    }

    /// Queues a response for the current trace.
    ///
    /// # Errors
    ///
    /// If `content_type` is not a valid header value, an error is returned.
    pub fn add_response<B>(&self, status: StatusCode, content_type: &str, body: B) -> Result<(), OriginError>
    where
        B: Into<Bytes>,
    {
        let response = ProgrammedResponse::try_new(status, content_type, body)?;
        self.push_response(response);
        Ok(())
    }

    /// Queues an already-built response for the current trace.
    pub fn push_response(&self, response: ProgrammedResponse) {
        self.store.enqueue_response(&self.trace_id, response);
    }

    /// Returns the requests recorded so far for the current trace, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.store.requests_for(&self.trace_id)
    }

    /// Returns the number of responses still queued for the current trace.
    pub fn pending_responses(&self) -> usize {
        self.store.pending_responses(&self.trace_id)
    }
}
