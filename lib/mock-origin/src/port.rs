use std::net::{IpAddr, TcpListener};

use snafu::ResultExt as _;

use crate::error::{OriginError, SelectPort};

/// Asks the operating system for a free TCP port on the given address.
///
/// A socket is bound to port 0, the assigned port is read back, and the socket is closed again. Another process may
/// claim the port before the caller binds to it.
///
/// # Errors
///
/// If the socket cannot be bound, or its local address cannot be read, an error is returned.
pub fn select_port(ip: IpAddr) -> Result<u16, OriginError> {
    let listener = TcpListener::bind((ip, 0)).context(SelectPort)?;
    let port = listener.local_addr().context(SelectPort)?.port();
    drop(listener);

    Ok(port)
}
