// SPDX-License-Identifier: AGPL-3.0-only

//! Device capabilities queried once per run
//!
//! The board test never asks the device for sizes mid-run; the queue reports
//! them at connection time and every probe reads them from here.

use fpga_chip::units::MB;

/// Accelerator capabilities reported by the execution channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Device name as reported by the platform
    pub name: String,

    /// Total device global memory in bytes
    pub global_mem_bytes: usize,

    /// Largest single allocation in bytes
    pub max_alloc_bytes: usize,

    /// Independently addressable memory channels (banks), numbered from 1
    pub mem_channels: usize,
}

impl DeviceCapabilities {
    /// Whether channel `channel` (1-based) exists.
    #[must_use]
    pub const fn has_channel(&self, channel: usize) -> bool {
        channel >= 1 && channel <= self.mem_channels
    }

    /// Global memory in MB (for reporting).
    #[must_use]
    pub const fn global_mem_mb(&self) -> usize {
        self.global_mem_bytes / MB
    }
}

impl std::fmt::Display for DeviceCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: global mem {} bytes, max alloc {} bytes, {} channel(s)",
            self.name, self.global_mem_bytes, self.max_alloc_bytes, self.mem_channels
        )
    }
}
