//! Test-string buffers.
//!
//! A test string of `size` bytes is the cyclic alphabet `A..Z` over the
//! first `size - 1` bytes followed by a NUL. Every byte is written through
//! the buffer kind's `copy_from_host`, one byte at a time, so the same code
//! works for memory the host cannot address.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::memory::{AllocatorRegistry, MemoryAllocator, MemoryHandle, MemoryKind};

const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[inline]
fn pattern_byte(i: usize) -> u8 {
    ALPHABET[i % ALPHABET.len()]
}

/// Write the test string into the first `size` bytes of `buffer`.
///
/// With `size == 1` only the terminating NUL is written.
///
/// # Errors
///
/// [`Error::Memory`] when `size` is zero or larger than the buffer, or when
/// a byte copy fails.
pub fn generate_test_string(
    allocator: &dyn MemoryAllocator,
    buffer: &mut MemoryHandle,
    size: usize,
) -> Result<()> {
    if size == 0 {
        return Err(Error::memory(
            allocator.kind(),
            "generate test string",
            "size must be at least 1",
        ));
    }
    if size > buffer.len() {
        return Err(Error::memory(
            allocator.kind(),
            "generate test string",
            format!("{} bytes requested, buffer holds {}", size, buffer.len()),
        ));
    }

    for i in 0..size - 1 {
        allocator.copy_from_host(buffer, i, &[pattern_byte(i)])?;
    }
    allocator.copy_from_host(buffer, size - 1, &[0])
}

/// The bytes [`generate_test_string`] produces for `size`.
pub fn expected_test_string(size: usize) -> Vec<u8> {
    let mut bytes: Vec<u8> = (0..size.saturating_sub(1)).map(pattern_byte).collect();
    if size > 0 {
        bytes.push(0);
    }
    bytes
}

/// True when host-staged `bytes` hold a complete test string.
pub fn verify_test_string(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes == expected_test_string(bytes.len()).as_slice()
}

/// A test string living in memory of some kind.
///
/// Owns its handle and gives it back to the allocator on drop. Call
/// [`TestBuffer::release`] to observe a release failure instead of having
/// it logged.
#[derive(Debug)]
pub struct TestBuffer<'r> {
    allocator: &'r dyn MemoryAllocator,
    handle: Option<MemoryHandle>,
}

impl<'r> TestBuffer<'r> {
    /// Allocate `size` bytes of `kind` and fill them with the test string.
    ///
    /// The allocation is released again if generation fails.
    pub fn generate(registry: &'r AllocatorRegistry, kind: MemoryKind, size: usize) -> Result<Self> {
        let allocator = registry.resolve(kind)?;
        let mut handle = allocator.allocate(size)?;
        if let Err(e) = generate_test_string(allocator, &mut handle, size) {
            if let Err(release) = allocator.release(handle) {
                warn!(%kind, error = %release, "failed to release buffer after generate error");
            }
            return Err(e);
        }
        debug!(%kind, size, "generated test string");
        Ok(Self {
            allocator,
            handle: Some(handle),
        })
    }

    pub fn kind(&self) -> MemoryKind {
        self.allocator.kind()
    }

    pub fn len(&self) -> usize {
        self.handle.as_ref().map_or(0, MemoryHandle::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The underlying handle, for handing to a transfer library.
    pub fn handle(&self) -> Option<&MemoryHandle> {
        self.handle.as_ref()
    }

    /// Copy the buffer into host memory.
    pub fn to_host(&self) -> Result<Vec<u8>> {
        let mut staging = vec![0u8; self.len()];
        if let Some(handle) = &self.handle {
            self.allocator.copy_to_host(&mut staging, handle, 0)?;
        }
        Ok(staging)
    }

    /// Give the memory back now.
    pub fn release(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.allocator.release(handle),
            None => Ok(()),
        }
    }
}

impl Drop for TestBuffer<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let kind = handle.kind();
            if let Err(e) = self.allocator.release(handle) {
                warn!(%kind, error = %e, "failed to release test buffer");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HostAllocator;

    #[test]
    fn test_expected_pattern() {
        assert_eq!(expected_test_string(0), Vec::<u8>::new());
        assert_eq!(expected_test_string(1), vec![0]);
        assert_eq!(expected_test_string(4), b"ABC\0".to_vec());

        let long = expected_test_string(30);
        assert_eq!(&long[24..29], b"YZABC");
        assert_eq!(long[29], 0);
    }

    #[test]
    fn test_generate_into_host_buffer() {
        let alloc = HostAllocator;
        let mut handle = alloc.allocate(16).unwrap();
        generate_test_string(&alloc, &mut handle, 16).unwrap();

        let mut out = [0u8; 16];
        alloc.copy_to_host(&mut out, &handle, 0).unwrap();
        assert_eq!(&out, b"ABCDEFGHIJKLMNO\0");
        assert!(verify_test_string(&out));
    }

    #[test]
    fn test_generate_single_byte_writes_only_sentinel() {
        let alloc = HostAllocator;
        let mut handle = alloc.allocate(1).unwrap();
        alloc.fill(&mut handle, b'#', 1).unwrap();
        generate_test_string(&alloc, &mut handle, 1).unwrap();

        let mut out = [0xffu8; 1];
        alloc.copy_to_host(&mut out, &handle, 0).unwrap();
        assert_eq!(out, [0]);
    }

    #[test]
    fn test_generate_prefix_leaves_rest_untouched() {
        let alloc = HostAllocator;
        let mut handle = alloc.allocate(8).unwrap();
        alloc.fill(&mut handle, b'.', 8).unwrap();
        generate_test_string(&alloc, &mut handle, 3).unwrap();

        let mut out = [0u8; 8];
        alloc.copy_to_host(&mut out, &handle, 0).unwrap();
        assert_eq!(&out, b"AB\0.....");
    }

    #[test]
    fn test_generate_rejects_bad_sizes() {
        let alloc = HostAllocator;
        let mut handle = alloc.allocate(4).unwrap();
        assert!(generate_test_string(&alloc, &mut handle, 0).is_err());
        assert!(generate_test_string(&alloc, &mut handle, 5).is_err());
    }

    #[test]
    fn test_verify_rejects_corruption() {
        let mut bytes = expected_test_string(10);
        assert!(verify_test_string(&bytes));
        bytes[3] = b'x';
        assert!(!verify_test_string(&bytes));
        assert!(!verify_test_string(b"ABC"));
        assert!(!verify_test_string(&[]));
    }

    #[test]
    fn test_buffer_to_host_and_release() {
        let registry = AllocatorRegistry::host_only();
        let buffer = TestBuffer::generate(&registry, MemoryKind::Host, 27).unwrap();
        assert_eq!(buffer.len(), 27);
        assert_eq!(buffer.kind(), MemoryKind::Host);

        let staged = buffer.to_host().unwrap();
        assert_eq!(staged, expected_test_string(27));
        buffer.release().unwrap();
    }

    #[test]
    fn test_buffer_unsupported_kind() {
        let registry = AllocatorRegistry::host_only();
        let err = TestBuffer::generate(&registry, MemoryKind::Device, 8).unwrap_err();
        assert!(matches!(err, Error::UnsupportedKind(_)));
    }
}
