//! Memory residency classes.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::error::{Error, KindRef, Result};

/// Where a buffer lives.
///
/// The set is closed: every kind has a fixed ordinal in `0..COUNT`, which is
/// also its slot in an [`AllocatorRegistry`](super::AllocatorRegistry).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub enum MemoryKind {
    /// Ordinary host heap memory.
    #[default]
    Host,
    /// Accelerator-resident memory, not host-addressable.
    Device,
    /// Accelerator-managed (unified) memory.
    DeviceManaged,
}

impl MemoryKind {
    /// Number of declared kinds.
    pub const COUNT: usize = 3;

    /// Every declared kind, in ordinal order.
    pub const ALL: [MemoryKind; Self::COUNT] = [
        MemoryKind::Host,
        MemoryKind::Device,
        MemoryKind::DeviceManaged,
    ];

    /// Ordinal of this kind.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bounds-checked lookup of a kind by ordinal.
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(Error::UnsupportedKind(KindRef::Index(index)))
    }

    /// Short name, as accepted on the command line.
    pub const fn name(self) -> &'static str {
        match self {
            MemoryKind::Host => "host",
            MemoryKind::Device => "cuda",
            MemoryKind::DeviceManaged => "cuda-managed",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a string names no memory kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown memory type {0:?} (expected host, cuda or cuda-managed)")]
pub struct ParseMemoryKindError(String);

impl FromStr for MemoryKind {
    type Err = ParseMemoryKindError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseMemoryKindError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_match_all() {
        for (i, kind) in MemoryKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(MemoryKind::from_index(i).unwrap(), *kind);
        }
    }

    #[test]
    fn test_from_index_out_of_range() {
        let err = MemoryKind::from_index(MemoryKind::COUNT).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedKind(KindRef::Index(i)) if i == MemoryKind::COUNT
        ));
        assert!(MemoryKind::from_index(usize::MAX).is_err());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("host".parse::<MemoryKind>().unwrap(), MemoryKind::Host);
        assert_eq!("cuda".parse::<MemoryKind>().unwrap(), MemoryKind::Device);
        assert_eq!(
            "CUDA-Managed".parse::<MemoryKind>().unwrap(),
            MemoryKind::DeviceManaged
        );
        assert!("rocm".parse::<MemoryKind>().is_err());

        for kind in MemoryKind::ALL {
            assert_eq!(kind.to_string().parse::<MemoryKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_default_is_host() {
        assert_eq!(MemoryKind::default(), MemoryKind::Host);
    }
}
