//! TCP bootstrap between exactly two processes.
//!
//! # Roles
//!
//! - **Listener**: `Idle → Bound → Listening → Accepted`. Binds a port on
//!   all IPv4 interfaces with `SO_REUSEADDR`, listens with a backlog of one
//!   and accepts a single peer. The listening socket is closed once the
//!   peer is accepted.
//! - **Connector**: `Idle → Resolved → Connected`. Resolves the listener's
//!   host to an IPv4 address and connects to it.
//!
//! Both roles run the same template: open a socket, configure it, block
//! until the peer is there. A failure at any step drops every socket opened
//! so far before the error is returned; no partially set up socket ever
//! reaches the caller. Nothing is retried and nothing times out.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream, ToSocketAddrs};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, warn};

use crate::config::Role;
use crate::connection::OobConnection;
use crate::error::{Error, Result};

/// Pending connections the listener queues; it serves one peer.
const LISTEN_BACKLOG: i32 = 1;

/// One role of the bootstrap, expressed as the steps of the shared
/// template.
trait Rendezvous {
    const ROLE: Role;

    /// Options, bind and listen: everything between opening the socket and
    /// waiting for the peer.
    fn configure(&self, socket: &Socket) -> Result<()>;

    /// Block until the peer is connected.
    fn meet(&self, socket: Socket) -> Result<OobConnection>;
}

fn open_socket(role: Role) -> Result<Socket> {
    Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| Error::connect(role, "open socket", e))
}

/// Open and configure a socket for `R`, closing it again on failure.
fn prepare<R: Rendezvous>(rendezvous: &R) -> Result<Socket> {
    let role = R::ROLE;
    let socket = open_socket(role)?;
    if let Err(e) = rendezvous.configure(&socket) {
        warn!(role = %role, error = %e, "closing socket after failed setup");
        return Err(e);
    }
    Ok(socket)
}

/// Hand a prepared socket to `R` and wait for the peer.
fn complete<R: Rendezvous>(rendezvous: &R, socket: Socket) -> Result<OobConnection> {
    let role = R::ROLE;
    rendezvous.meet(socket).map_err(|e| {
        warn!(role = %role, error = %e, "socket closed after failed rendezvous");
        e
    })
}

struct Passive {
    port: u16,
}

impl Rendezvous for Passive {
    const ROLE: Role = Role::Listener;

    fn configure(&self, socket: &Socket) -> Result<()> {
        socket
            .set_reuse_address(true)
            .map_err(|e| Error::connect(Self::ROLE, "set SO_REUSEADDR", e))?;

        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.port);
        socket
            .bind(&SockAddr::from(addr))
            .map_err(|source| Error::Bind {
                port: self.port,
                source,
            })?;
        debug!(port = self.port, "listener bound");

        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| Error::connect(Self::ROLE, "listen", e))?;
        debug!(port = self.port, backlog = LISTEN_BACKLOG, "listener listening");
        Ok(())
    }

    fn meet(&self, socket: Socket) -> Result<OobConnection> {
        let (accepted, peer) = socket
            .accept()
            .map_err(|e| Error::connect(Self::ROLE, "accept connection", e))?;
        // the listening socket is closed here; only the accepted one lives on
        drop(socket);

        let stream = TcpStream::from(accepted);
        let peer_addr = match peer.as_socket() {
            Some(addr) => addr,
            None => stream
                .peer_addr()
                .map_err(|e| Error::connect(Self::ROLE, "query peer address", e))?,
        };
        debug!(port = self.port, peer = %peer_addr, "listener accepted peer");
        Ok(OobConnection::new(stream, Self::ROLE, peer_addr))
    }
}

struct Active {
    addr: SocketAddrV4,
}

impl Rendezvous for Active {
    const ROLE: Role = Role::Connector;

    fn configure(&self, _socket: &Socket) -> Result<()> {
        Ok(())
    }

    fn meet(&self, socket: Socket) -> Result<OobConnection> {
        socket
            .connect(&SockAddr::from(self.addr))
            .map_err(|e| Error::connect(Self::ROLE, "connect to listener", e))?;
        debug!(peer = %self.addr, "connector connected");
        Ok(OobConnection::new(
            TcpStream::from(socket),
            Self::ROLE,
            SocketAddr::V4(self.addr),
        ))
    }
}

/// A bound, listening socket waiting for its single peer.
#[derive(Debug)]
pub struct OobListener {
    socket: Socket,
    local_addr: SocketAddr,
}

impl OobListener {
    /// Bind `port` on all IPv4 interfaces and start listening.
    ///
    /// Port 0 picks an ephemeral port; see [`OobListener::local_addr`].
    ///
    /// # Errors
    ///
    /// [`Error::Bind`] when the port is unavailable (check
    /// [`Error::is_address_in_use`]), [`Error::Connect`] for any other step.
    pub fn bind(port: u16) -> Result<Self> {
        let socket = prepare(&Passive { port })?;
        let local_addr = socket
            .local_addr()
            .map(|addr| addr.as_socket())
            .map_err(|e| Error::connect(Role::Listener, "query local address", e))?
            .unwrap_or(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)));
        Ok(Self { socket, local_addr })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Block until one peer connects, then close the listening socket.
    pub fn accept(self) -> Result<OobConnection> {
        let port = self.local_addr.port();
        complete(&Passive { port }, self.socket)
    }
}

/// Resolve `host` to the first IPv4 address it names.
pub fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddrV4> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::HostResolution {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

    let addr = addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| Error::HostResolution {
            host: host.to_string(),
            reason: "no IPv4 address".to_string(),
        })?;
    debug!(host, resolved = %addr, "connector resolved host");
    Ok(addr)
}

/// Resolve `host` and connect to the listener on `port`.
///
/// Blocks until the listener accepts or the OS reports a failure.
pub fn connect(host: &str, port: u16) -> Result<OobConnection> {
    let active = Active {
        addr: resolve_ipv4(host, port)?,
    };
    let socket = prepare(&active)?;
    complete(&active, socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral_port() {
        let listener = OobListener::bind(0).unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        assert!(listener.local_addr().is_ipv4());
    }

    #[test]
    fn test_resolve_localhost() {
        let addr = resolve_ipv4("127.0.0.1", 4242).unwrap();
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 4242));
    }

    #[test]
    fn test_resolve_ipv6_literal_has_no_ipv4() {
        let err = resolve_ipv4("::1", 4242).unwrap_err();
        match err {
            Error::HostResolution { host, reason } => {
                assert_eq!(host, "::1");
                assert_eq!(reason, "no IPv4 address");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_garbage_host() {
        let err = resolve_ipv4("no such host.invalid", 4242).unwrap_err();
        assert!(matches!(err, Error::HostResolution { .. }));
    }
}
