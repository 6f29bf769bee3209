//! Host heap capability set.

use tracing::trace;

use crate::error::{Error, Result};
use crate::memory::allocator::{check_owner, check_range, MemoryAllocator, MemoryHandle};
use crate::memory::MemoryKind;

/// Capability set for ordinary host memory.
///
/// Always present in a registry. Allocation reports failure instead of
/// aborting when the heap cannot satisfy the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostAllocator;

impl HostAllocator {
    fn bytes<'h>(&self, op: &'static str, handle: &'h MemoryHandle) -> Result<&'h [u8]> {
        check_owner(MemoryKind::Host, op, handle)?;
        handle
            .host_bytes()
            .ok_or_else(|| Error::memory(MemoryKind::Host, op, "handle is not host memory"))
    }

    fn bytes_mut<'h>(&self, op: &'static str, handle: &'h mut MemoryHandle) -> Result<&'h mut [u8]> {
        check_owner(MemoryKind::Host, op, handle)?;
        handle
            .host_bytes_mut()
            .ok_or_else(|| Error::memory(MemoryKind::Host, op, "handle is not host memory"))
    }
}

impl MemoryAllocator for HostAllocator {
    fn kind(&self) -> MemoryKind {
        MemoryKind::Host
    }

    fn allocate(&self, size: usize) -> Result<MemoryHandle> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|e| Error::AllocationFailure {
                kind: MemoryKind::Host,
                size,
                reason: e.to_string(),
            })?;
        bytes.resize(size, 0);
        trace!(size, "allocated host buffer");
        Ok(MemoryHandle::from_host(MemoryKind::Host, bytes.into_boxed_slice()))
    }

    fn release(&self, handle: MemoryHandle) -> Result<()> {
        check_owner(MemoryKind::Host, "release", &handle)?;
        trace!(size = handle.len(), "released host buffer");
        drop(handle);
        Ok(())
    }

    fn copy_from_host(&self, dst: &mut MemoryHandle, offset: usize, src: &[u8]) -> Result<()> {
        check_range(MemoryKind::Host, "copy", dst, offset, src.len())?;
        let bytes = self.bytes_mut("copy", dst)?;
        bytes[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn copy_to_host(&self, dst: &mut [u8], src: &MemoryHandle, offset: usize) -> Result<()> {
        check_range(MemoryKind::Host, "copy", src, offset, dst.len())?;
        let bytes = self.bytes("copy", src)?;
        dst.copy_from_slice(&bytes[offset..offset + dst.len()]);
        Ok(())
    }

    fn copy(
        &self,
        dst: &mut MemoryHandle,
        dst_offset: usize,
        src: &MemoryHandle,
        src_offset: usize,
        len: usize,
    ) -> Result<()> {
        check_range(MemoryKind::Host, "copy", src, src_offset, len)?;
        check_range(MemoryKind::Host, "copy", dst, dst_offset, len)?;
        let from = &self.bytes("copy", src)?[src_offset..src_offset + len];
        let to = &mut self.bytes_mut("copy", dst)?[dst_offset..dst_offset + len];
        to.copy_from_slice(from);
        Ok(())
    }

    fn fill(&self, dst: &mut MemoryHandle, value: u8, len: usize) -> Result<()> {
        check_range(MemoryKind::Host, "fill", dst, 0, len)?;
        self.bytes_mut("fill", dst)?[..len].fill(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_zeroed() {
        let alloc = HostAllocator;
        let handle = alloc.allocate(32).unwrap();
        assert_eq!(handle.len(), 32);
        assert_eq!(handle.kind(), MemoryKind::Host);

        let mut out = [0xffu8; 32];
        alloc.copy_to_host(&mut out, &handle, 0).unwrap();
        assert!(out.iter().all(|&b| b == 0));
        alloc.release(handle).unwrap();
    }

    #[test]
    fn test_allocate_failure_reports_size() {
        let alloc = HostAllocator;
        let err = alloc.allocate(usize::MAX).unwrap_err();
        match err {
            Error::AllocationFailure { kind, size, .. } => {
                assert_eq!(kind, MemoryKind::Host);
                assert_eq!(size, usize::MAX);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_copy_and_fill() {
        let alloc = HostAllocator;
        let mut a = alloc.allocate(8).unwrap();
        let mut b = alloc.allocate(8).unwrap();

        alloc.fill(&mut a, b'x', 8).unwrap();
        alloc.copy_from_host(&mut a, 2, b"abc").unwrap();
        alloc.copy(&mut b, 0, &a, 1, 5).unwrap();

        let mut out = [0u8; 8];
        alloc.copy_to_host(&mut out, &a, 0).unwrap();
        assert_eq!(&out, b"xxabcxxx");
        alloc.copy_to_host(&mut out[..5], &b, 0).unwrap();
        assert_eq!(&out[..5], b"xabcx");

        alloc.release(a).unwrap();
        alloc.release(b).unwrap();
    }

    #[test]
    fn test_out_of_range_copy_is_rejected() {
        let alloc = HostAllocator;
        let mut a = alloc.allocate(4).unwrap();
        assert!(alloc.copy_from_host(&mut a, 3, b"ab").is_err());
        assert!(alloc.fill(&mut a, 0, 5).is_err());
        let mut out = [0u8; 2];
        assert!(alloc.copy_to_host(&mut out, &a, 3).is_err());
    }

    #[test]
    fn test_foreign_handle_is_rejected() {
        let alloc = HostAllocator;
        let handle = MemoryHandle::from_raw(MemoryKind::Device, 0x10, 4);
        assert!(matches!(alloc.release(handle), Err(Error::Memory { .. })));
    }
}
