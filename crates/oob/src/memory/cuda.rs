//! CUDA device and managed memory capability sets.
//!
//! Both kinds share one implementation; they differ only in how memory is
//! obtained (`cuMemAlloc` vs `cuMemAllocManaged`). Copies and fills use the
//! synchronous driver calls, so every operation has completed when it
//! returns.

use std::fmt;
use std::sync::Arc;

use cudarc::driver::{result, sys, CudaDevice, DriverError};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::memory::allocator::{check_owner, check_range, MemoryAllocator, MemoryHandle};
use crate::memory::MemoryKind;

/// Capability set for device-resident or device-managed memory.
pub struct CudaAllocator {
    device: Arc<CudaDevice>,
    kind: MemoryKind,
}

impl CudaAllocator {
    /// Device-resident memory on the GPU with the given ordinal.
    pub fn device(ordinal: usize) -> Result<Self> {
        Self::on(open(ordinal, MemoryKind::Device)?, MemoryKind::Device)
    }

    /// Managed memory on the GPU with the given ordinal.
    pub fn managed(ordinal: usize) -> Result<Self> {
        Self::on(
            open(ordinal, MemoryKind::DeviceManaged)?,
            MemoryKind::DeviceManaged,
        )
    }

    /// Share an already opened device.
    ///
    /// # Errors
    ///
    /// [`Error::Memory`] if `kind` is [`MemoryKind::Host`].
    pub fn on(device: Arc<CudaDevice>, kind: MemoryKind) -> Result<Self> {
        check_device_kind(kind)?;
        Ok(Self { device, kind })
    }

    fn bind(&self, op: &'static str) -> Result<()> {
        self.device
            .bind_to_thread()
            .map_err(|e| driver_error(self.kind, op, e))
    }

    fn address(&self, op: &'static str, handle: &MemoryHandle) -> Result<sys::CUdeviceptr> {
        check_owner(self.kind, op, handle)?;
        handle
            .raw_address()
            .ok_or_else(|| Error::memory(self.kind, op, "handle is not device memory"))
    }
}

fn check_device_kind(kind: MemoryKind) -> Result<()> {
    match kind {
        MemoryKind::Host => Err(Error::memory(kind, "open", "host memory is not served by CUDA")),
        MemoryKind::Device | MemoryKind::DeviceManaged => Ok(()),
    }
}

pub(crate) fn open(ordinal: usize, kind: MemoryKind) -> Result<Arc<CudaDevice>> {
    let device = CudaDevice::new(ordinal).map_err(|e| driver_error(kind, "initialize", e))?;
    debug!(ordinal, %kind, "opened CUDA device");
    Ok(device)
}

fn driver_error(kind: MemoryKind, op: &'static str, err: DriverError) -> Error {
    Error::memory(kind, op, format!("{:?}", err))
}

impl fmt::Debug for CudaAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaAllocator")
            .field("ordinal", &self.device.ordinal())
            .field("kind", &self.kind)
            .finish()
    }
}

impl MemoryAllocator for CudaAllocator {
    fn kind(&self) -> MemoryKind {
        self.kind
    }

    fn allocate(&self, size: usize) -> Result<MemoryHandle> {
        self.bind("allocate")?;
        let allocated = unsafe {
            match self.kind {
                MemoryKind::DeviceManaged => {
                    result::malloc_managed(size, sys::CUmemAttach_flags::CU_MEM_ATTACH_GLOBAL)
                }
                _ => result::malloc_sync(size),
            }
        };
        let address = allocated.map_err(|e| Error::AllocationFailure {
            kind: self.kind,
            size,
            reason: format!("{:?}", e),
        })?;
        trace!(size, kind = %self.kind, address, "allocated device buffer");
        Ok(MemoryHandle::from_raw(self.kind, address, size))
    }

    fn release(&self, handle: MemoryHandle) -> Result<()> {
        let address = self.address("release", &handle)?;
        self.bind("release")?;
        unsafe { result::free_sync(address) }.map_err(|e| driver_error(self.kind, "release", e))?;
        trace!(size = handle.len(), kind = %self.kind, "released device buffer");
        Ok(())
    }

    fn copy_from_host(&self, dst: &mut MemoryHandle, offset: usize, src: &[u8]) -> Result<()> {
        check_range(self.kind, "copy", dst, offset, src.len())?;
        let address = self.address("copy", dst)?;
        if src.is_empty() {
            return Ok(());
        }
        self.bind("copy")?;
        unsafe { result::memcpy_htod_sync(address + offset as u64, src) }
            .map_err(|e| driver_error(self.kind, "copy", e))
    }

    fn copy_to_host(&self, dst: &mut [u8], src: &MemoryHandle, offset: usize) -> Result<()> {
        check_range(self.kind, "copy", src, offset, dst.len())?;
        let address = self.address("copy", src)?;
        if dst.is_empty() {
            return Ok(());
        }
        self.bind("copy")?;
        unsafe { result::memcpy_dtoh_sync(dst, address + offset as u64) }
            .map_err(|e| driver_error(self.kind, "copy", e))
    }

    fn copy(
        &self,
        dst: &mut MemoryHandle,
        dst_offset: usize,
        src: &MemoryHandle,
        src_offset: usize,
        len: usize,
    ) -> Result<()> {
        check_range(self.kind, "copy", src, src_offset, len)?;
        check_range(self.kind, "copy", dst, dst_offset, len)?;
        let to = self.address("copy", dst)?;
        let from = self.address("copy", src)?;
        if len == 0 {
            return Ok(());
        }
        self.bind("copy")?;
        unsafe { result::memcpy_dtod_sync(to + dst_offset as u64, from + src_offset as u64, len) }
            .map_err(|e| driver_error(self.kind, "copy", e))
    }

    fn fill(&self, dst: &mut MemoryHandle, value: u8, len: usize) -> Result<()> {
        check_range(self.kind, "fill", dst, 0, len)?;
        let address = self.address("fill", dst)?;
        if len == 0 {
            return Ok(());
        }
        self.bind("fill")?;
        unsafe { result::memset_d8_sync(address, value, len) }
            .map_err(|e| driver_error(self.kind, "fill", e))
    }
}
