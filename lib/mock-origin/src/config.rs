use std::{
    net::{Ipv4Addr, SocketAddr},
    path::Path,
};

use figment::{
    providers::{Env, Format as _, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use snafu::ResultExt as _;

use crate::error::{OriginError, ReadConfiguration};

/// Trace header used when none is configured.
pub const DEFAULT_TRACE_ID_HEADER: &str = "X-Balanced-Guru";

/// Prefix for environment variables that override configuration values.
pub const ENV_PREFIX: &str = "MOCK_ORIGIN_";

const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Mock origin configuration.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Name of the request header carrying the trace identifier.
    ///
    /// Matched case-insensitively. Defaults to `X-Balanced-Guru`.
    pub trace_id_header: String,

    /// Address the origin listens on.
    ///
    /// A port of `0` selects an ephemeral port. Defaults to `127.0.0.1:0`.
    pub listen_address: SocketAddr,

    /// Address the admin API listens on, if enabled.
    pub admin_address: Option<SocketAddr>,

    /// Largest request body, in bytes, that will be buffered and recorded.
    pub max_body_bytes: usize,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            trace_id_header: DEFAULT_TRACE_ID_HEADER.to_string(),
            listen_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            admin_address: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl OriginConfig {
    /// Creates a new `OriginConfig` with default values and the given trace header.
    pub fn with_trace_id_header<S>(trace_id_header: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            trace_id_header: trace_id_header.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from the default sources.
    ///
    /// Sources are, in increasing order of precedence: built-in defaults, the YAML file at `path` (if given), and
    /// environment variables prefixed with `MOCK_ORIGIN_`.
    ///
    /// # Errors
    ///
    /// If the YAML file cannot be read or parsed, or any value has the wrong type, an error is returned.
    pub fn load(path: Option<&Path>) -> Result<Self, OriginError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            let contents = std::fs::read_to_string(path).context(ReadConfiguration { path })?;
            figment = figment.merge(Yaml::string(&contents));
        }

        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Extracts configuration from the given `Figment`.
    ///
    /// # Errors
    ///
    /// If any value is missing or has the wrong type, an error is returned.
    pub fn from_figment(figment: Figment) -> Result<Self, OriginError> {
        figment
            .extract()
            .map_err(|e| OriginError::Configuration { source: Box::new(e) })
    }
}
