// SPDX-License-Identifier: AGPL-3.0-only

//! Global memory topology.
//!
//! A board specification lists one or more `global_mem` systems, each with a
//! total theoretical bandwidth and one `interface` per memory bank. The
//! system whose first bank starts at address `0x0` is the default global
//! memory every test allocates from.

/// Bank count assumed when no board specification can be read.
pub const DEFAULT_CHANNEL_COUNT: usize = 8;

/// One memory interface (bank / channel) of a global memory system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInterface {
    /// Base address of the bank.
    pub address: u64,
    /// Size of the bank in bytes.
    pub size: u64,
}

/// Global memory topology read from a board specification.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardTopology {
    /// Memory type label (e.g. `DDR`), if the specification names it.
    pub memory_name: Option<String>,
    /// Theoretical bandwidth of all interfaces together, MB/s.
    pub max_bandwidth_mb_s: f64,
    /// Interfaces in specification order.
    pub interfaces: Vec<MemInterface>,
}

impl BoardTopology {
    /// Number of memory channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.interfaces.len()
    }

    /// Theoretical bandwidth of one channel, assuming equal widths.
    ///
    /// `None` when the record lists no interfaces.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn per_channel_bandwidth_mb_s(&self) -> Option<f64> {
        match self.interfaces.len() {
            0 => None,
            n => Some(self.max_bandwidth_mb_s / n as f64),
        }
    }

    /// Whether this memory system contains the bank at address zero.
    #[must_use]
    pub fn starts_at_zero(&self) -> bool {
        self.interfaces.iter().any(|i| i.address == 0)
    }
}
