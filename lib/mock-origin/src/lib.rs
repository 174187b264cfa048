//! A trace-correlated mock HTTP origin for testing HTTP proxies.
//!
//! The mock origin stands in for a real backend behind a proxy under test. Each test programs the responses it wants
//! returned for its own trace identifier, and the proxy is configured to forward that identifier in a request header.
//! When a request reaches the origin, it is recorded under its trace and answered with the next response programmed
//! for that trace. Many tests can share a single origin concurrently, as each one only ever sees its own trace.
//!
//! Requests without a trace identifier are answered with `400 I dont have a trace`. Requests whose trace has no
//! response waiting are answered with `503 I dont have a response for <trace>`.
#![deny(warnings)]
#![deny(missing_docs)]

pub mod admin;
pub use self::admin::AdminApi;

mod config;
pub use self::config::{OriginConfig, DEFAULT_TRACE_ID_HEADER, ENV_PREFIX};

mod error;
pub use self::error::OriginError;

pub mod harness;
pub use self::harness::{OriginCase, OriginHarness};

mod port;
pub use self::port::select_port;

mod request;
pub use self::request::{RecordedRequest, RequestSummary};

mod response;
pub use self::response::{ProgrammedResponse, NO_TRACE_BODY, UNREADABLE_BODY};

mod server;
pub use self::server::MockOrigin;

mod store;
pub use self::store::CorrelationStore;

mod trace;
pub use self::trace::{TraceExtractor, TraceId};
