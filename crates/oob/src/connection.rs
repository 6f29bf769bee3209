//! The live connection a bootstrap produces.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use tracing::debug;

use crate::barrier::barrier;
use crate::config::Role;
use crate::error::{Error, Result};

/// Largest address blob [`OobConnection::recv_blob`] accepts.
pub const MAX_BLOB_LEN: usize = 1 << 20;

/// A connected, bidirectional byte stream to the one peer.
///
/// Owned by the caller. [`OobConnection::close`] shuts it down explicitly;
/// dropping it closes the descriptor as well.
#[derive(Debug)]
pub struct OobConnection {
    stream: TcpStream,
    role: Role,
    peer_addr: SocketAddr,
}

impl OobConnection {
    pub(crate) fn new(stream: TcpStream, role: Role, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            role,
            peer_addr,
        }
    }

    /// The side of the bootstrap that produced this connection.
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.stream
            .local_addr()
            .map_err(|e| Error::connect(self.role, "query local address", e))
    }

    /// Block until the peer also reaches its barrier.
    pub fn barrier(&mut self) -> Result<()> {
        barrier(&mut self.stream)?;
        debug!(role = %self.role, peer = %self.peer_addr, "barrier passed");
        Ok(())
    }

    /// Send an opaque blob (e.g. a worker address) to the peer.
    pub fn send_blob(&mut self, blob: &[u8]) -> Result<()> {
        write_blob(&mut self.stream, blob)
    }

    /// Receive a blob sent with [`OobConnection::send_blob`].
    pub fn recv_blob(&mut self) -> Result<Vec<u8>> {
        read_blob(&mut self.stream)
    }

    /// Give up the wrapper and keep the socket, e.g. to hand it to a
    /// transfer library.
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }

    /// Shut the stream down in both directions and close it.
    pub fn close(self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => {}
            // the peer got there first
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
            Err(e) => return Err(Error::connect(self.role, "close connection", e)),
        }
        debug!(role = %self.role, peer = %self.peer_addr, "connection closed");
        Ok(())
    }
}

#[cfg(unix)]
impl std::os::fd::AsRawFd for OobConnection {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        std::os::fd::AsRawFd::as_raw_fd(&self.stream)
    }
}

/// Write `blob` behind an 8-byte little-endian length.
pub fn write_blob<W: Write + ?Sized>(writer: &mut W, blob: &[u8]) -> Result<()> {
    let send = |e| Error::Protocol {
        step: "sending blob",
        source: e,
    };
    if blob.len() > MAX_BLOB_LEN {
        return Err(send(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("blob of {} bytes exceeds {} byte limit", blob.len(), MAX_BLOB_LEN),
        )));
    }
    writer
        .write_all(&(blob.len() as u64).to_le_bytes())
        .map_err(send)?;
    writer.write_all(blob).map_err(send)?;
    writer.flush().map_err(send)
}

/// Read one blob written by [`write_blob`].
pub fn read_blob<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>> {
    let recv = |e| Error::Protocol {
        step: "receiving blob",
        source: e,
    };
    let mut header = [0u8; 8];
    reader.read_exact(&mut header).map_err(recv)?;

    let len = u64::from_le_bytes(header);
    if len > MAX_BLOB_LEN as u64 {
        return Err(recv(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("peer announced {} byte blob, limit is {}", len, MAX_BLOB_LEN),
        )));
    }

    let mut blob = vec![0u8; len as usize];
    reader.read_exact(&mut blob).map_err(recv)?;
    Ok(blob)
}
