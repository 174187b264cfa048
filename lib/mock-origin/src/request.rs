use bytes::Bytes;
use http::{request::Parts, HeaderMap, HeaderValue, Method, Uri, Version};
use serde::Serialize;

/// A snapshot of a request received by the origin.
///
/// The body is kept exactly as it arrived on the wire. It is never decoded, whatever content type the request
/// declares.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl RecordedRequest {
    /// Creates a new `RecordedRequest` from its parts.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers,
            body,
        }
    }

    /// Creates a new `RecordedRequest` from the head of an HTTP request and its fully-buffered body.
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
        }
    }

    /// Returns the request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI, as it appeared in the request line.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the request path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns the HTTP version of the request.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns all request headers, including the trace header.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first value of the given header, if present.
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// Returns the raw request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the request body as a string slice, if it is valid UTF-8.
    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Returns a serializable summary of this request.
    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            method: self.method.to_string(),
            path: self.path().to_string(),
            query: self.query().map(str::to_string),
            headers: self
                .headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            body: self.body.clone(),
            body_utf8: self.body_text().map(str::to_string),
        }
    }
}

/// A serializable view of a [`RecordedRequest`].
///
/// `body` always carries the exact bytes. `body_utf8` is additionally populated when those bytes are valid UTF-8.
#[derive(Clone, Debug, Serialize)]
pub struct RequestSummary {
    /// Request method.
    pub method: String,

    /// Request path.
    pub path: String,

    /// Query string, if any.
    pub query: Option<String>,

    /// Request headers, in the order they were received.
    pub headers: Vec<(String, String)>,

    /// Raw request body.
    pub body: Bytes,

    /// Request body as text, if it is valid UTF-8.
    pub body_utf8: Option<String>,
}
