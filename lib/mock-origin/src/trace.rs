use std::{fmt, sync::Arc};

use http::{header::HeaderName, HeaderMap};
use snafu::ResultExt as _;
use uuid::Uuid;

use crate::error::{InvalidTraceHeader, OriginError};

/// An opaque trace identifier.
///
/// Trace identifiers are compared by exact string equality. Nothing about their shape is validated: any non-empty
/// string is a valid trace identifier.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TraceId(Arc<str>);

impl TraceId {
    /// Creates a new `TraceId` from the given value.
    pub fn new<S>(value: S) -> Self
    where
        S: Into<Arc<str>>,
    {
        Self(value.into())
    }

    /// Generates a fresh, random `TraceId`.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().hyphenated().to_string())
    }

    /// Returns the trace identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TraceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TraceId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for TraceId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Extracts trace identifiers from inbound request headers.
#[derive(Clone, Debug)]
pub struct TraceExtractor {
    header: HeaderName,
}

impl TraceExtractor {
    /// Creates a new `TraceExtractor` that reads the trace identifier from the given header.
    ///
    /// # Errors
    ///
    /// If `header` is not a valid HTTP header name, an error is returned.
    pub fn new(header: &str) -> Result<Self, OriginError> {
        let header = HeaderName::from_bytes(header.as_bytes()).context(InvalidTraceHeader { name: header })?;
        Ok(Self { header })
    }

    /// Returns the name of the header the trace identifier is read from.
    pub fn header_name(&self) -> &HeaderName {
        &self.header
    }

    /// Extracts the trace identifier from the given headers.
    ///
    /// Header lookup is case-insensitive. When the header appears more than once, the first value wins. Returns `None`
    /// if the header is absent or empty.
    ///
    /// Header bytes are decoded as ISO-8859-1, so every byte maps to exactly one character and distinct header values
    /// always yield distinct identifiers.
    pub fn extract(&self, headers: &HeaderMap) -> Option<TraceId> {
        let value = headers.get(&self.header)?;
        if value.is_empty() {
            return None;
        }

        Some(TraceId::from(decode_latin1(value.as_bytes())))
    }
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn headers_with(name: &'static str, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.append(name, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn extracts_present_header() {
        let extractor = TraceExtractor::new("X-Balanced-Guru").unwrap();
        let headers = headers_with("x-balanced-guru", "abc");

        assert_eq!(extractor.extract(&headers), Some(TraceId::from("abc")));
    }

    #[test]
    fn lookup_ignores_configured_case() {
        let extractor = TraceExtractor::new("X-TRACE-ID").unwrap();
        let headers = headers_with("x-trace-id", "xyz");

        assert_eq!(extractor.header_name().as_str(), "x-trace-id");
        assert_eq!(extractor.extract(&headers), Some(TraceId::from("xyz")));
    }

    #[test]
    fn missing_header() {
        let extractor = TraceExtractor::new("X-Balanced-Guru").unwrap();
        let headers = headers_with("x-other", "abc");

        assert_eq!(extractor.extract(&headers), None);
    }

    #[test]
    fn empty_header_is_missing() {
        let extractor = TraceExtractor::new("X-Balanced-Guru").unwrap();
        let headers = headers_with("x-balanced-guru", "");

        assert_eq!(extractor.extract(&headers), None);
    }

    #[test]
    fn first_value_wins() {
        let extractor = TraceExtractor::new("X-Balanced-Guru").unwrap();
        let mut headers = headers_with("x-balanced-guru", "first");
        headers.append("x-balanced-guru", HeaderValue::from_static("second"));

        assert_eq!(extractor.extract(&headers), Some(TraceId::from("first")));
    }

    #[test]
    fn value_shape_is_not_validated() {
        let extractor = TraceExtractor::new("X-Balanced-Guru").unwrap();
        let headers = headers_with("x-balanced-guru", "  not a uuid; whatever=1 ");

        assert_eq!(
            extractor.extract(&headers).as_ref().map(TraceId::as_str),
            Some("  not a uuid; whatever=1 ")
        );
    }

    #[test]
    fn opaque_bytes_stay_distinct() {
        let extractor = TraceExtractor::new("X-Balanced-Guru").unwrap();
        let extract = |raw: &'static [u8]| {
            let mut headers = HeaderMap::new();
            headers.append("x-balanced-guru", HeaderValue::from_bytes(raw).unwrap());
            extractor.extract(&headers).unwrap()
        };

        let fe = extract(b"\xfe");
        let ff = extract(b"\xff");
        assert_ne!(fe, ff);
        assert_eq!(fe.as_str(), "\u{fe}");
        assert_eq!(ff.as_str(), "\u{ff}");

        // Plain ASCII is unaffected.
        assert_eq!(extract(b"trace-1").as_str(), "trace-1");
    }

    #[test]
    fn rejects_invalid_header_name() {
        let err = TraceExtractor::new("not a header").unwrap_err();
        assert!(matches!(err, OriginError::InvalidTraceHeader { ref name, .. } if name == "not a header"));
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = TraceId::generate();
        let b = TraceId::generate();

        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }
}
