use std::{io, net::SocketAddr, path::PathBuf};

use http::header::{InvalidHeaderName, InvalidHeaderValue};
use snafu::Snafu;

/// A mock origin error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum OriginError {
    /// The configured trace header name is not a valid HTTP header name.
    #[snafu(display("Invalid trace header name '{}'.", name))]
    InvalidTraceHeader {
        /// Header name as it was configured.
        name: String,

        /// Error source.
        source: InvalidHeaderName,
    },

    /// A programmed response was given a content type that cannot be sent as a header value.
    #[snafu(display("Invalid content type '{}' for programmed response.", content_type))]
    InvalidContentType {
        /// Content type as it was given.
        content_type: String,

        /// Error source.
        source: InvalidHeaderValue,
    },

    /// No ephemeral port could be acquired from the operating system.
    #[snafu(display("Failed to select an ephemeral port."))]
    SelectPort {
        /// Error source.
        source: io::Error,
    },

    /// The listener could not be bound.
    #[snafu(display("Failed to bind listener to {}.", address))]
    Bind {
        /// Address the listener was to be bound to.
        address: SocketAddr,

        /// Error source.
        source: io::Error,
    },

    /// The server stopped with an I/O error.
    #[snafu(display("Server failed while accepting connections."))]
    Serve {
        /// Error source.
        source: io::Error,
    },

    /// The background runtime or thread hosting the server could not be created.
    #[snafu(display("Failed to create background runtime for the mock origin."))]
    Runtime {
        /// Error source.
        source: io::Error,
    },

    /// The background server exited before it reported that it was ready.
    #[snafu(display("Mock origin exited before it started accepting connections."))]
    StartupAborted,

    /// The configuration file could not be read.
    #[snafu(display("Failed to read configuration file '{}'.", path.display()))]
    ReadConfiguration {
        /// Path to the configuration file.
        path: PathBuf,

        /// Error source.
        source: io::Error,
    },

    /// Configuration could not be loaded.
    #[snafu(display("Failed to load mock origin configuration."))]
    Configuration {
        /// Error source.
        source: Box<figment::Error>,
    },
}
