//! Out-of-band bootstrap for two-party benchmarks.
//!
//! This crate provides the pieces a benchmark needs before its real
//! transfer library takes over:
//! - A single TCP connection between a listener and a connector
//! - A blocking two-party barrier over that connection
//! - Address-blob exchange for handing worker addresses to the peer
//! - A registry of memory capability sets (host, CUDA device, CUDA managed)
//! - Test-string buffers prepared through those capability sets

pub mod barrier;
pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod memory;

pub use barrier::{barrier, BARRIER_TOKEN_LEN};
pub use config::{BootstrapConfig, Role, DEFAULT_PORT};
pub use connection::{OobConnection, MAX_BLOB_LEN};
pub use connector::{connect, resolve_ipv4, OobListener};
pub use error::{BarrierError, Error, KindRef, Result};
pub use memory::{AllocatorRegistry, MemoryAllocator, MemoryHandle, MemoryKind, TestBuffer};
