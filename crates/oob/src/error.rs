//! Error types for the bootstrap library.

use std::io;

use thiserror::Error;

use crate::config::Role;
use crate::memory::MemoryKind;

/// Result type alias for the bootstrap library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while bootstrapping a peer or preparing memory.
///
/// Every variant names the step that failed. Nothing in this crate retries;
/// whether a failure is fatal is up to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The listening socket could not be bound to the requested port.
    #[error("failed to bind listener to port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// A socket step other than bind failed (open, configure, listen,
    /// accept or connect).
    #[error("{role} failed to {step}: {source}")]
    Connect {
        role: Role,
        step: &'static str,
        #[source]
        source: io::Error,
    },

    /// The peer hostname did not resolve to a usable IPv4 address.
    #[error("failed to resolve host {host:?}: {reason}")]
    HostResolution { host: String, reason: String },

    /// The capability set could not allocate the requested size.
    #[error("failed to allocate {size} bytes of {kind} memory: {reason}")]
    AllocationFailure {
        kind: MemoryKind,
        size: usize,
        reason: String,
    },

    /// No capability set is bound for the requested memory kind.
    #[error("unsupported memory kind {0}")]
    UnsupportedKind(KindRef),

    /// A copy or fill was rejected by the backing memory.
    #[error("{kind} memory {op} failed: {reason}")]
    Memory {
        kind: MemoryKind,
        op: &'static str,
        reason: String,
    },

    /// The barrier exchange did not complete.
    #[error("barrier failed: {0}")]
    Barrier(#[from] BarrierError),

    /// The peer sent a malformed address blob.
    #[error("protocol error while {step}: {source}")]
    Protocol {
        step: &'static str,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// True when the failure is a bind on a port that is already taken.
    pub fn is_address_in_use(&self) -> bool {
        matches!(self, Error::Bind { source, .. } if source.kind() == io::ErrorKind::AddrInUse)
    }

    pub(crate) fn connect(role: Role, step: &'static str, source: io::Error) -> Self {
        Error::Connect { role, step, source }
    }

    pub(crate) fn memory(kind: MemoryKind, op: &'static str, reason: impl Into<String>) -> Self {
        Error::Memory {
            kind,
            op,
            reason: reason.into(),
        }
    }
}

/// How a memory kind was named when the lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindRef {
    /// A declared kind with no capability set bound in this registry.
    Unbound(MemoryKind),
    /// An ordinal outside the declared set of kinds.
    Index(usize),
}

impl std::fmt::Display for KindRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KindRef::Unbound(kind) => write!(f, "{} (no allocator bound)", kind),
            KindRef::Index(index) => write!(f, "#{} (out of range)", index),
        }
    }
}

/// Ways the 4-byte barrier exchange can fail.
#[derive(Debug, Error)]
pub enum BarrierError {
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),
    /// The peer closed the stream before the full token arrived.
    #[error("short read: received {received} of {expected} bytes")]
    ShortRead { received: usize, expected: usize },
}
