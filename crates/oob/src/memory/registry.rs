//! Mapping from memory kind to capability set.
//!
//! The registry is an ordinary value: build it once at startup and pass it
//! by reference to whatever prepares buffers. Each kind has exactly one
//! slot, indexed by [`MemoryKind::index`]; the host slot is always filled.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, KindRef, Result};
use crate::memory::{HostAllocator, MemoryAllocator, MemoryKind};

/// Read-only table of capability sets, one slot per [`MemoryKind`].
#[derive(Clone)]
pub struct AllocatorRegistry {
    entries: [Option<Arc<dyn MemoryAllocator>>; MemoryKind::COUNT],
}

impl AllocatorRegistry {
    /// Registry with only host memory bound.
    pub fn host_only() -> Self {
        Self::builder().build()
    }

    /// Registry with host memory plus device and managed memory on the
    /// GPU with the given ordinal.
    #[cfg(feature = "cuda")]
    pub fn with_cuda(ordinal: usize) -> Result<Self> {
        use crate::memory::CudaAllocator;

        let device = crate::memory::cuda::open(ordinal, MemoryKind::Device)?;
        Ok(Self::builder()
            .register(CudaAllocator::on(Arc::clone(&device), MemoryKind::Device)?)
            .register(CudaAllocator::on(device, MemoryKind::DeviceManaged)?)
            .build())
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Capability set for `kind`.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedKind`] when no capability set is bound for it.
    pub fn resolve(&self, kind: MemoryKind) -> Result<&dyn MemoryAllocator> {
        self.entries[kind.index()]
            .as_deref()
            .ok_or(Error::UnsupportedKind(KindRef::Unbound(kind)))
    }

    /// Bounds-checked resolve by ordinal.
    pub fn resolve_index(&self, index: usize) -> Result<&dyn MemoryAllocator> {
        self.resolve(MemoryKind::from_index(index)?)
    }

    /// Host capability set; always present.
    pub fn host(&self) -> &dyn MemoryAllocator {
        match self.entries[MemoryKind::Host.index()].as_deref() {
            Some(host) => host,
            None => &HostAllocator,
        }
    }

    pub fn supports(&self, kind: MemoryKind) -> bool {
        self.entries[kind.index()].is_some()
    }

    /// Kinds with a bound capability set, in ordinal order.
    pub fn kinds(&self) -> impl Iterator<Item = MemoryKind> + '_ {
        MemoryKind::ALL
            .into_iter()
            .filter(move |kind| self.supports(*kind))
    }
}

impl Default for AllocatorRegistry {
    fn default() -> Self {
        Self::host_only()
    }
}

impl fmt::Debug for AllocatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter().flatten()).finish()
    }
}

/// Collects capability sets before freezing them into a registry.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: [Option<Arc<dyn MemoryAllocator>>; MemoryKind::COUNT],
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `allocator` to the slot of its own kind, replacing any earlier
    /// binding.
    pub fn register(mut self, allocator: impl MemoryAllocator + 'static) -> Self {
        let slot = allocator.kind().index();
        self.entries[slot] = Some(Arc::new(allocator));
        self
    }

    /// Freeze the table. Host memory is bound if nothing else was.
    pub fn build(mut self) -> AllocatorRegistry {
        let host = &mut self.entries[MemoryKind::Host.index()];
        if host.is_none() {
            *host = Some(Arc::new(HostAllocator));
        }
        AllocatorRegistry {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHandle;

    /// Pretends to be device memory by keeping bytes on the host behind a
    /// raw handle.
    #[derive(Debug)]
    struct FakeDevice;

    impl MemoryAllocator for FakeDevice {
        fn kind(&self) -> MemoryKind {
            MemoryKind::Device
        }
        fn allocate(&self, size: usize) -> Result<MemoryHandle> {
            Ok(MemoryHandle::from_raw(MemoryKind::Device, 0xdead_0000, size))
        }
        fn release(&self, _handle: MemoryHandle) -> Result<()> {
            Ok(())
        }
        fn copy_from_host(&self, _: &mut MemoryHandle, _: usize, _: &[u8]) -> Result<()> {
            Ok(())
        }
        fn copy_to_host(&self, _: &mut [u8], _: &MemoryHandle, _: usize) -> Result<()> {
            Ok(())
        }
        fn copy(&self, _: &mut MemoryHandle, _: usize, _: &MemoryHandle, _: usize, _: usize) -> Result<()> {
            Ok(())
        }
        fn fill(&self, _: &mut MemoryHandle, _: u8, _: usize) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_host_only() {
        let registry = AllocatorRegistry::host_only();
        assert_eq!(registry.resolve(MemoryKind::Host).unwrap().kind(), MemoryKind::Host);
        assert_eq!(registry.host().kind(), MemoryKind::Host);
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec![MemoryKind::Host]);

        for kind in [MemoryKind::Device, MemoryKind::DeviceManaged] {
            let err = registry.resolve(kind).unwrap_err();
            assert!(matches!(err, Error::UnsupportedKind(KindRef::Unbound(k)) if k == kind));
        }
    }

    #[test]
    fn test_resolve_index_bounds() {
        let registry = AllocatorRegistry::host_only();
        assert!(registry.resolve_index(0).is_ok());
        let err = registry.resolve_index(MemoryKind::COUNT).unwrap_err();
        assert!(matches!(err, Error::UnsupportedKind(KindRef::Index(_))));
    }

    #[test]
    fn test_register_binds_own_slot() {
        let registry = AllocatorRegistry::builder().register(FakeDevice).build();
        assert!(registry.supports(MemoryKind::Host));
        assert!(registry.supports(MemoryKind::Device));
        assert!(!registry.supports(MemoryKind::DeviceManaged));

        let device = registry.resolve(MemoryKind::Device).unwrap();
        let handle = device.allocate(8).unwrap();
        assert_eq!(handle.raw_address(), Some(0xdead_0000));
        device.release(handle).unwrap();
    }

    #[test]
    fn test_every_bound_slot_matches_its_kind() {
        let registry = AllocatorRegistry::builder().register(FakeDevice).build();
        for kind in registry.kinds() {
            assert_eq!(registry.resolve(kind).unwrap().kind(), kind);
        }
    }
}
