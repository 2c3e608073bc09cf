// SPDX-License-Identifier: AGPL-3.0-only

//! Host staging buffers
//!
//! Host memory is obtained best-effort: the request is clamped to a ceiling
//! and halved until the allocation succeeds. An optional budget caps every
//! attempt so memory pressure can be reproduced without exhausting the host.
//!
//! Device elements are little-endian; the accessors below encode and decode
//! them so probes never reinterpret raw memory.

use crate::error::{BenchError, Result};
use tracing::{debug, warn};

/// Reusable host byte buffer that shuttles data to and from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingBuffer {
    bytes: Vec<u8>,
}

impl StagingBuffer {
    /// Allocate `min(requested, ceiling)` bytes, halving on failure.
    ///
    /// Sizes are rounded down to a multiple of `granule` (the element
    /// size). Attempts larger than `budget` count as failures.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::StagingUnavailable`] when not even one granule
    /// can be allocated.
    pub fn allocate(
        requested: usize,
        ceiling: usize,
        granule: usize,
        budget: Option<usize>,
    ) -> Result<Self> {
        let granule = granule.max(1);
        let round = |n: usize| n / granule * granule;
        let mut size = round(requested.min(ceiling));

        while size >= granule {
            if budget.map_or(true, |b| size <= b) {
                let mut bytes = Vec::new();
                if bytes.try_reserve_exact(size).is_ok() {
                    bytes.resize(size, 0);
                    if size < requested.min(ceiling) {
                        warn!(
                            "host staging reduced to {size} bytes (requested {})",
                            requested.min(ceiling)
                        );
                    }
                    debug!("host staging buffer: {size} bytes");
                    return Ok(Self { bytes });
                }
            }
            size = round(size / 2);
        }
        Err(BenchError::StagingUnavailable { requested })
    }

    /// Wrap existing bytes.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Capacity in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// All bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// All bytes, mutable.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Set every byte to zero.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Store 32-bit element `i`.
    pub fn put_u32(&mut self, i: usize, value: u32) {
        self.bytes[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Load 32-bit element `i`.
    pub fn get_u32(&self, i: usize) -> u32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[i * 4..i * 4 + 4]);
        u32::from_le_bytes(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_ceiling() {
        let s = StagingBuffer::allocate(10_000, 4_096, 8, None).unwrap();
        assert_eq!(s.len(), 4_096);
    }

    #[test]
    fn halves_under_budget() {
        // 8000 → 4000 → 2000 fits a 3000-byte budget
        let s = StagingBuffer::allocate(8_000, usize::MAX, 8, Some(3_000)).unwrap();
        assert_eq!(s.len(), 2_000);
    }

    #[test]
    fn rounds_down_to_element_size() {
        let s = StagingBuffer::allocate(1_001, usize::MAX, 4, None).unwrap();
        assert_eq!(s.len(), 1_000);
    }

    #[test]
    fn fails_when_nothing_fits() {
        assert!(matches!(
            StagingBuffer::allocate(64, 64, 8, Some(4)),
            Err(BenchError::StagingUnavailable { requested: 64 })
        ));
        assert!(StagingBuffer::allocate(0, 64, 1, None).is_err());
    }

    #[test]
    fn element_accessors_are_little_endian() {
        let mut s = StagingBuffer::from_vec(vec![0; 16]);
        s.put_u32(2, 0x0506_0708);
        assert_eq!(s.as_bytes()[8], 0x08);
        assert_eq!(s.as_bytes()[11], 0x05);
        assert_eq!(s.get_u32(2), 0x0506_0708);
        s.put_u32(0, 7);
        assert_eq!(s.get_u32(0), 7);
        s.clear();
        assert!(s.as_bytes().iter().all(|&b| b == 0));
    }
}
