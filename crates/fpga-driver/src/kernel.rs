// SPDX-License-Identifier: AGPL-3.0-only

//! Device programs the board test launches.
//!
//! The bitstream under test carries a fixed set of kernels; a launch names
//! one of them plus its arguments. Device-side semantics:
//!
//! | Kernel | Work grid | Effect |
//! |--------|-----------|--------|
//! | `Nop` | ND-range | nothing (clock probe) |
//! | `SingleTaskNop` | 1 item | nothing (latency probe) |
//! | `PipeWrite` | 1 item | blocking write of `value` into a capacity-1 pipe |
//! | `PipeRead` | 1 item | blocking read from the pipe, store at `dest[index]` |
//! | `Stream` | ND-range | per 32-bit element `gid < len`, see [`AccessPattern`] |

use crate::queue::BufferId;

/// Shape of an ND-range launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkGrid {
    /// Total work items
    pub global: usize,
    /// Work-group size
    pub local: usize,
}

impl WorkGrid {
    /// Grid of exactly `global` items in groups of `local`.
    #[must_use]
    pub const fn new(global: usize, local: usize) -> Self {
        Self { global, local }
    }

    /// Smallest grid of `local`-sized groups covering `items`.
    ///
    /// Work items past `items` must be no-ops in the program.
    #[must_use]
    pub const fn padded(items: usize, local: usize) -> Self {
        Self {
            global: items.div_ceil(local) * local,
            local,
        }
    }

    /// Single work item.
    #[must_use]
    pub const fn single() -> Self {
        Self { global: 1, local: 1 }
    }

    /// Number of work groups.
    #[must_use]
    pub const fn groups(&self) -> usize {
        self.global / self.local
    }

    /// Whether the grid divides evenly into work groups.
    #[must_use]
    pub const fn is_uniform(&self) -> bool {
        self.local != 0 && self.global % self.local == 0
    }
}

/// Inter-kernel pipe identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeId(pub u32);

/// Memory access pattern of a streaming kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessPattern {
    /// `mem[gid] = gid`
    Write,
    /// reads `mem[gid]`, writes nothing
    Read,
    /// `mem[gid] = mem[gid] + READ_WRITE_INCREMENT`
    ReadWrite,
}

impl AccessPattern {
    /// All patterns in the order the bandwidth test runs them.
    pub const ALL: [Self; 3] = [Self::Write, Self::Read, Self::ReadWrite];

    /// Value the read-write kernel adds to every element; fixed in the
    /// bitstream.
    pub const READ_WRITE_INCREMENT: u32 = 2;

    /// Kernel name in the bitstream.
    #[must_use]
    pub const fn kernel_name(&self) -> &'static str {
        match self {
            Self::Write => "MemWriteStream",
            Self::Read => "MemReadStream",
            Self::ReadWrite => "MemReadWriteStream",
        }
    }

    /// Bytes crossing the memory interface per byte of buffer.
    #[must_use]
    pub const fn traffic_factor(&self) -> usize {
        match self {
            Self::Write | Self::Read => 1,
            Self::ReadWrite => 2,
        }
    }
}

impl std::fmt::Display for AccessPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kernel_name())
    }
}

/// A device program launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kernel {
    /// Empty ND-range kernel
    Nop {
        /// Launch shape
        grid: WorkGrid,
    },

    /// Empty single-task kernel
    SingleTaskNop,

    /// Sender side of the launch handshake
    PipeWrite {
        /// Pipe to write
        pipe: PipeId,
        /// Token
        value: u32,
    },

    /// Receiver side of the launch handshake
    PipeRead {
        /// Pipe to read
        pipe: PipeId,
        /// Buffer receiving the token
        dest: BufferId,
        /// 32-bit element index in `dest`
        index: usize,
    },

    /// Streaming access over 32-bit elements `[offset, offset + len)` of
    /// `buffer`; work item `gid` touches element `offset + gid`.
    Stream {
        /// Access pattern
        pattern: AccessPattern,
        /// Target buffer
        buffer: BufferId,
        /// First element
        offset: usize,
        /// Elements in range; items with `gid >= len` do nothing
        len: usize,
        /// Launch shape
        grid: WorkGrid,
    },
}

impl Kernel {
    /// Kernel name in the bitstream.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Nop { .. } => "NopNDRange",
            Self::SingleTaskNop => "NopSingleTask",
            Self::PipeWrite { .. } => "KernelSender",
            Self::PipeRead { .. } => "KernelReceiver",
            Self::Stream { pattern, .. } => pattern.kernel_name(),
        }
    }

    /// Launch shape.
    #[must_use]
    pub const fn grid(&self) -> WorkGrid {
        match self {
            Self::Nop { grid } | Self::Stream { grid, .. } => *grid,
            Self::SingleTaskNop | Self::PipeWrite { .. } | Self::PipeRead { .. } => {
                WorkGrid::single()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_grid_rounds_up_to_group_multiple() {
        let grid = WorkGrid::padded(100_000, 32 * 1024);
        assert_eq!(grid.global, 131_072);
        assert_eq!(grid.groups(), 4);
        assert!(grid.is_uniform());
    }

    #[test]
    fn padded_grid_exact_multiple_is_unchanged() {
        let grid = WorkGrid::padded(65_536, 32 * 1024);
        assert_eq!(grid.global, 65_536);
    }

    #[test]
    fn read_write_moves_twice_the_bytes() {
        assert_eq!(AccessPattern::Write.traffic_factor(), 1);
        assert_eq!(AccessPattern::Read.traffic_factor(), 1);
        assert_eq!(AccessPattern::ReadWrite.traffic_factor(), 2);
    }

    #[test]
    fn single_task_kernels_have_unit_grid() {
        assert_eq!(Kernel::SingleTaskNop.grid(), WorkGrid::single());
        let k = Kernel::PipeWrite { pipe: PipeId(0), value: 7 };
        assert_eq!(k.name(), "KernelSender");
        assert_eq!(k.grid().global, 1);
    }
}
