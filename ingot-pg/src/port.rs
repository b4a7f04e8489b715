//! OS-assisted free-port allocation

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use tracing::debug;

/// Asks the OS for a currently free loopback port.
///
/// The listener is dropped before the caller binds the port, so another
/// process can win the race in between. The server's own bind is the
/// authoritative check: a lost race surfaces as a start failure, not as a
/// wrong answer here.
pub fn alloc_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    debug!("allocated ephemeral port {}", port);
    Ok(port)
}
