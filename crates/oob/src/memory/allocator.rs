//! The capability interface every memory kind implements.

use std::fmt;

use crate::error::{Error, Result};
use crate::memory::MemoryKind;

/// A region of memory owned by the caller that allocated it.
///
/// The handle records which kind produced it and how long it is. Bytes are
/// only reachable through the [`MemoryAllocator`] of that kind, since the
/// region may not be host-addressable. A handle must be given back to
/// [`MemoryAllocator::release`] exactly once; `release` consumes it.
pub struct MemoryHandle {
    kind: MemoryKind,
    len: usize,
    repr: HandleRepr,
}

enum HandleRepr {
    /// Host heap bytes, owned by the handle.
    Host(Box<[u8]>),
    /// An address in some other address space (e.g. a device pointer).
    Raw(u64),
}

impl MemoryHandle {
    /// Wrap host heap bytes.
    pub fn from_host(kind: MemoryKind, bytes: Box<[u8]>) -> Self {
        Self {
            kind,
            len: bytes.len(),
            repr: HandleRepr::Host(bytes),
        }
    }

    /// Wrap an address that only the owning allocator knows how to reach.
    pub fn from_raw(kind: MemoryKind, address: u64, len: usize) -> Self {
        Self {
            kind,
            len,
            repr: HandleRepr::Raw(address),
        }
    }

    /// Kind of the allocator that produced this handle.
    #[inline]
    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The raw address, if this handle is not host heap memory.
    pub fn raw_address(&self) -> Option<u64> {
        match self.repr {
            HandleRepr::Raw(address) => Some(address),
            HandleRepr::Host(_) => None,
        }
    }

    pub(crate) fn host_bytes(&self) -> Option<&[u8]> {
        match &self.repr {
            HandleRepr::Host(bytes) => Some(bytes),
            HandleRepr::Raw(_) => None,
        }
    }

    pub(crate) fn host_bytes_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.repr {
            HandleRepr::Host(bytes) => Some(bytes),
            HandleRepr::Raw(_) => None,
        }
    }
}

impl fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("MemoryHandle");
        s.field("kind", &self.kind).field("len", &self.len);
        if let Some(address) = self.raw_address() {
            s.field("address", &format_args!("{:#x}", address));
        }
        s.finish()
    }
}

/// The four operations bound to one memory kind.
///
/// Implementations are stateless from the caller's point of view and are
/// shared read-only for the lifetime of the registry that holds them.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a registry can be shared
/// between threads, even though the bootstrap itself is single-threaded.
pub trait MemoryAllocator: Send + Sync + fmt::Debug {
    /// The kind this capability set serves.
    fn kind(&self) -> MemoryKind;

    /// Allocate `size` bytes.
    ///
    /// # Errors
    ///
    /// [`Error::AllocationFailure`] with the requested size. A failed
    /// allocation never yields a handle.
    fn allocate(&self, size: usize) -> Result<MemoryHandle>;

    /// Give a handle back. Consumes it, so it cannot be released twice.
    fn release(&self, handle: MemoryHandle) -> Result<()>;

    /// Copy host bytes into `dst` starting at `offset`.
    fn copy_from_host(&self, dst: &mut MemoryHandle, offset: usize, src: &[u8]) -> Result<()>;

    /// Copy `dst.len()` bytes out of `src`, starting at `offset`, into host
    /// memory.
    fn copy_to_host(&self, dst: &mut [u8], src: &MemoryHandle, offset: usize) -> Result<()>;

    /// Copy `len` bytes between two handles of this kind.
    fn copy(
        &self,
        dst: &mut MemoryHandle,
        dst_offset: usize,
        src: &MemoryHandle,
        src_offset: usize,
        len: usize,
    ) -> Result<()>;

    /// Set the first `len` bytes of `dst` to `value`.
    fn fill(&self, dst: &mut MemoryHandle, value: u8, len: usize) -> Result<()>;
}

/// Reject handles produced by another kind's allocator.
pub(crate) fn check_owner(kind: MemoryKind, op: &'static str, handle: &MemoryHandle) -> Result<()> {
    if handle.kind() != kind {
        return Err(Error::memory(
            kind,
            op,
            format!("handle belongs to {} memory", handle.kind()),
        ));
    }
    Ok(())
}

/// Reject `[offset, offset + len)` when it does not fit in `handle`.
pub(crate) fn check_range(
    kind: MemoryKind,
    op: &'static str,
    handle: &MemoryHandle,
    offset: usize,
    len: usize,
) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= handle.len() => Ok(()),
        _ => Err(Error::memory(
            kind,
            op,
            format!(
                "range {}..{} exceeds buffer of {} bytes",
                offset,
                offset.saturating_add(len),
                handle.len()
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_accessors() {
        let handle = MemoryHandle::from_host(MemoryKind::Host, vec![0u8; 8].into_boxed_slice());
        assert_eq!(handle.kind(), MemoryKind::Host);
        assert_eq!(handle.len(), 8);
        assert!(handle.raw_address().is_none());
        assert!(handle.host_bytes().is_some());

        let handle = MemoryHandle::from_raw(MemoryKind::Device, 0x1000, 64);
        assert_eq!(handle.raw_address(), Some(0x1000));
        assert!(handle.host_bytes().is_none());
        assert!(format!("{:?}", handle).contains("0x1000"));
    }

    #[test]
    fn test_check_range() {
        let handle = MemoryHandle::from_raw(MemoryKind::Device, 0, 16);
        assert!(check_range(MemoryKind::Device, "copy", &handle, 0, 16).is_ok());
        assert!(check_range(MemoryKind::Device, "copy", &handle, 16, 0).is_ok());
        assert!(check_range(MemoryKind::Device, "copy", &handle, 15, 2).is_err());
        assert!(check_range(MemoryKind::Device, "copy", &handle, usize::MAX, 2).is_err());
    }

    #[test]
    fn test_check_owner() {
        let handle = MemoryHandle::from_raw(MemoryKind::DeviceManaged, 0, 16);
        assert!(check_owner(MemoryKind::DeviceManaged, "fill", &handle).is_ok());
        let err = check_owner(MemoryKind::Device, "fill", &handle).unwrap_err();
        assert!(err.to_string().contains("cuda-managed"), "{err}");
    }
}
