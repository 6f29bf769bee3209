//! Bootstrap configuration and role selection.

use std::fmt;

use crate::connection::OobConnection;
use crate::connector::{connect, OobListener};
use crate::error::Result;

/// Port used when the caller does not pick one.
pub const DEFAULT_PORT: u16 = 13337;

/// Which side of the bootstrap a process plays.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Role {
    /// Binds a port and waits for one peer.
    Listener,
    /// Resolves the listener's host and connects to it.
    Connector,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Listener => f.write_str("listener"),
            Role::Connector => f.write_str("connector"),
        }
    }
}

/// Where to meet the peer.
///
/// Without a `server` the process listens on `port` on all interfaces;
/// with one it connects to `server:port`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub port: u16,
    pub server: Option<String>,
}

impl BootstrapConfig {
    pub fn listener(port: u16) -> Self {
        Self { port, server: None }
    }

    pub fn connector(server: impl Into<String>, port: u16) -> Self {
        Self {
            port,
            server: Some(server.into()),
        }
    }

    pub fn role(&self) -> Role {
        match self.server {
            Some(_) => Role::Connector,
            None => Role::Listener,
        }
    }

    /// Run the role's state machine and return the live connection.
    ///
    /// Blocks until the peer shows up or the OS reports a failure.
    pub fn establish(&self) -> Result<OobConnection> {
        match &self.server {
            Some(host) => connect(host, self.port),
            None => OobListener::bind(self.port)?.accept(),
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self::listener(DEFAULT_PORT)
    }
}
