//! Two-party barrier over a connected stream.
//!
//! Each side sends a 4-byte token and then blocks until it has read 4 bytes
//! back. Both sides send before they receive, so neither can deadlock, and
//! neither returns before the other has at least entered the barrier. The
//! token's value carries no meaning.

use std::io::{self, Read, Write};

use crate::error::BarrierError;

/// Size of the token each side sends.
pub const BARRIER_TOKEN_LEN: usize = 4;

/// Rendezvous with the peer on the other end of `stream`.
///
/// Succeeds only when a full token came back. A peer that closes the stream
/// early yields [`BarrierError::ShortRead`]. Nothing is retried, including
/// calls interrupted by a signal on either side.
pub fn barrier<S: Read + Write + ?Sized>(stream: &mut S) -> Result<(), BarrierError> {
    let token = [0u8; BARRIER_TOKEN_LEN];
    let mut sent = 0;
    while sent < BARRIER_TOKEN_LEN {
        match stream.write(&token[sent..]) {
            Ok(0) => return Err(BarrierError::Send(io::ErrorKind::WriteZero.into())),
            Ok(n) => sent += n,
            Err(e) => return Err(BarrierError::Send(e)),
        }
    }
    stream.flush().map_err(BarrierError::Send)?;

    let mut reply = [0u8; BARRIER_TOKEN_LEN];
    let mut received = 0;
    while received < BARRIER_TOKEN_LEN {
        match stream.read(&mut reply[received..]) {
            Ok(0) => {
                return Err(BarrierError::ShortRead {
                    received,
                    expected: BARRIER_TOKEN_LEN,
                })
            }
            Ok(n) => received += n,
            Err(e) => return Err(BarrierError::Recv(e)),
        }
    }
    Ok(())
}
