use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use mock_origin::OriginConfig;

/// A trace-correlated mock HTTP origin for testing HTTP proxies.
///
/// Configuration is read, in increasing order of precedence, from built-in defaults, the configuration file (if
/// given), `MOCK_ORIGIN_`-prefixed environment variables, and finally the flags below.
#[derive(Clone, Parser)]
#[command(about)]
pub struct Cli {
    /// Path to a YAML configuration file.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Address for the origin to listen on.
    ///
    /// A port of `0` selects an ephemeral port, which is logged at startup.
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Address for the admin API to listen on.
    ///
    /// The admin API is disabled unless this is set here or in the configuration.
    #[arg(long)]
    pub admin_listen: Option<SocketAddr>,

    /// Name of the request header carrying the trace identifier.
    #[arg(long)]
    pub trace_header: Option<String>,
}

impl Cli {
    /// Applies any overrides given on the command line to `config`.
    pub fn apply_overrides(&self, config: &mut OriginConfig) {
        if let Some(listen) = self.listen {
            config.listen_address = listen;
        }

        if let Some(admin_listen) = self.admin_listen {
            config.admin_address = Some(admin_listen);
        }

        if let Some(trace_header) = &self.trace_header {
            config.trace_id_header = trace_header.clone();
        }
    }
}
