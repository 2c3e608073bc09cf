// SPDX-License-Identifier: AGPL-3.0-only

//! Fixed parameters of each qualification probe.
//!
//! These are the values the board test has always used on real boards.
//! Engines take them as the `Default` of their config structs; tests shrink
//! the sizes, never the semantics.

use crate::units::{GB, KB, MB};

/// Host-to-device global memory test (exhaustive verifier).
pub mod global_mem {
    use super::MB;

    /// Largest host staging buffer requested before halving.
    pub const MAX_HOST_CHUNK: usize = 512 * MB;

    /// Mismatch lines printed overall and per chunk.
    pub const MAX_REPORTED_ERRORS: usize = 32;
}

/// Host speed block-size sweep.
pub mod host_speed {
    use super::{KB, MB};

    /// Bytes moved per sweep iteration, in each direction.
    pub const TOTAL_BYTES: usize = 8 * MB;

    /// Smallest block size of the sweep.
    pub const MIN_BLOCK_BYTES: usize = 32 * KB;

    /// Round-trip mismatch lines printed per iteration.
    pub const MAX_REPORTED_ERRORS: usize = 32;
}

/// Unaligned host read/write test.
pub mod host_rw {
    use super::KB;

    /// Longest transfer; every length `1..=MAX_BYTES` is exercised.
    pub const MAX_BYTES: usize = KB;

    /// Extra device bytes so the device region has an odd size.
    pub const DEVICE_SLACK: usize = 3;

    /// Guard margin (and misalignment) of the host write buffer.
    pub const HOST_IN_OFFSET: usize = 5;

    /// Guard margin (and misalignment) of the host read-back buffer.
    pub const HOST_RD_OFFSET: usize = 8;

    /// Sentinel filling the write buffer (`-6` as a signed char).
    pub const WRITE_SENTINEL: u8 = 0xFA;

    /// Sentinel filling the read-back buffer (`-3` as a signed char).
    pub const READ_SENTINEL: u8 = 0xFD;
}

/// Kernel clock frequency probe.
pub mod clock {
    use super::{KB, MB};

    /// Byte-equivalent size of the no-op grid. 128 MB is the smallest
    /// global memory found on any supported board.
    pub const TOTAL_BYTES: usize = 128 * MB;

    /// Work items in the no-op grid (one per 4-byte word).
    pub const GLOBAL_SIZE: usize = TOTAL_BYTES / core::mem::size_of::<u32>();

    /// Required work-group size of the no-op program.
    pub const WORK_GROUP_SIZE: usize = 32 * KB;

    /// Allowed deviation from the compiled fmax, in percent (exclusive).
    pub const TOLERANCE_PCT: f64 = 2.0;
}

/// Kernel launch latency probe.
pub mod latency {
    /// Back-to-back single-task launches.
    pub const NUM_KERNELS: usize = 10_000;
}

/// Kernel launch (pipe handshake) probe.
pub mod launch {
    /// Value the sender program writes into the pipe.
    pub const TEST_VALUE: u32 = 0xDEAD_1234;
}

/// Kernel-to-memory read/write test.
pub mod mem_rw {
    use super::GB;

    /// Elements covered by one kernel launch / one write segment.
    pub const SEGMENT_ELEMS: usize = GB;
}

/// Kernel-to-memory multi-bank bandwidth test.
pub mod mem_bw {
    use super::{GB, KB};

    /// Upper bound on the region tested per bank.
    pub const MAX_TOTAL_BYTES: usize = 4 * GB;

    /// Work-group size of the streaming programs.
    pub const WORK_GROUP_SIZE: usize = 32 * KB;

    /// Mismatch lines printed per verification pass.
    pub const MAX_REPORTED_ERRORS: usize = 512;

    /// Utilization (percent of theoretical) below which a warning is raised.
    pub const UTILIZATION_WARN_PCT: f64 = 90.0;
}
