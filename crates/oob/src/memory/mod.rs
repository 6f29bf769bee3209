//! Memory abstraction used to prepare transfer buffers.
//!
//! Buffers may live in host memory or in accelerator memory that the host
//! cannot address directly. Code that prepares a buffer never touches its
//! bytes itself; it resolves the [`MemoryAllocator`] for the buffer's
//! [`MemoryKind`] from an [`AllocatorRegistry`] and goes through its
//! allocate / release / copy / fill operations.
//!
//! - **host**: plain heap memory, always available
//! - **cuda**: device-resident memory (feature `cuda`)
//! - **cuda-managed**: unified memory migrated on demand (feature `cuda`)

pub mod allocator;
pub mod buffer;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod host;
pub mod kind;
pub mod registry;

pub use allocator::{MemoryAllocator, MemoryHandle};
pub use buffer::{expected_test_string, generate_test_string, verify_test_string, TestBuffer};
#[cfg(feature = "cuda")]
pub use cuda::CudaAllocator;
pub use host::HostAllocator;
pub use kind::{MemoryKind, ParseMemoryKindError};
pub use registry::{AllocatorRegistry, RegistryBuilder};
