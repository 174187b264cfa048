use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use snafu::ResultExt as _;

use crate::{
    error::{InvalidContentType, OriginError},
    trace::TraceId,
};

/// Body of the response sent when a request carries no trace identifier.
pub const NO_TRACE_BODY: &str = "I dont have a trace";

/// Body of the response sent when the request body could not be read.
pub const UNREADABLE_BODY: &str = "I could not read the request body";

/// A response that a test registers ahead of time for a trace.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProgrammedResponse {
    status: StatusCode,
    content_type: HeaderValue,
    body: Bytes,
}

impl ProgrammedResponse {
    /// Creates a new `ProgrammedResponse`.
    pub fn new<B>(status: StatusCode, content_type: HeaderValue, body: B) -> Self
    where
        B: Into<Bytes>,
    {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    /// Creates a new `ProgrammedResponse`, parsing the content type from a string.
    ///
    /// # Errors
    ///
    /// If `content_type` contains characters that are not allowed in a header value, an error is returned.
    pub fn try_new<B>(status: StatusCode, content_type: &str, body: B) -> Result<Self, OriginError>
    where
        B: Into<Bytes>,
    {
        let content_type = HeaderValue::from_str(content_type).context(InvalidContentType { content_type })?;
        Ok(Self::new(status, content_type, body))
    }

    /// Creates a new `ProgrammedResponse` with a `text/plain` content type.
    pub fn text<B>(status: StatusCode, body: B) -> Self
    where
        B: Into<Bytes>,
    {
        Self::new(status, HeaderValue::from_static("text/plain"), body)
    }

    /// Response for a request that did not carry a trace identifier.
    pub fn no_trace() -> Self {
        Self::text(StatusCode::BAD_REQUEST, NO_TRACE_BODY)
    }

    /// Response for a request whose trace has nothing queued.
    pub fn no_response(trace_id: &TraceId) -> Self {
        Self::text(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("I dont have a response for {}", trace_id),
        )
    }

    /// Response for a request whose body could not be read.
    pub fn unreadable_body() -> Self {
        Self::text(StatusCode::PAYLOAD_TOO_LARGE, UNREADABLE_BODY)
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the content type.
    pub fn content_type(&self) -> &HeaderValue {
        &self.content_type
    }

    /// Returns the body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

impl IntoResponse for ProgrammedResponse {
    fn into_response(self) -> Response {
        (self.status, [(CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}
