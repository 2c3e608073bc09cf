// SPDX-License-Identifier: AGPL-3.0-only

//! Chunked transfer engine
//!
//! Moves an arbitrarily large byte range between host and a device region
//! through one staging buffer:
//!
//! ```text
//! [0 ─────────── S)[S ─────────── 2S)  ...  [kS ── total)
//!  fill → copy → wait, fill → copy → wait, ...
//! ```
//!
//! Every chunk is `min(S, remaining)` bytes; the chunks cover `[0, total)`
//! exactly once in increasing order.

use crate::error::{BenchError, Result};
use crate::staging::StagingBuffer;
use fpga_chip::units::rate_mb_s;
use fpga_driver::{BufferId, DeviceQueue};
use tracing::trace;

/// One transfer chunk: `len` bytes at logical byte `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset from the start of the range
    pub offset: usize,
    /// Bytes in this chunk (never zero)
    pub len: usize,
}

/// Partition of `[0, total)` into staging-sized chunks.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    total: usize,
    step: usize,
    next: usize,
}

impl TransferPlan {
    /// Plan `total` bytes in chunks of at most `step` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::DegenerateStaging`] for `step == 0` with a
    /// non-empty range.
    pub fn new(total: usize, step: usize) -> Result<Self> {
        if step == 0 && total > 0 {
            return Err(BenchError::DegenerateStaging { total });
        }
        Ok(Self {
            total,
            step,
            next: 0,
        })
    }

    /// Number of chunks the plan yields.
    pub fn chunk_count(&self) -> usize {
        if self.total == 0 {
            0
        } else {
            self.total.div_ceil(self.step)
        }
    }
}

impl Iterator for TransferPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next >= self.total {
            return None;
        }
        let chunk = Chunk {
            offset: self.next,
            len: self.step.min(self.total - self.next),
        };
        self.next += chunk.len;
        Some(chunk)
    }
}

/// Bytes moved and summed submit→end time of a chunked transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Bytes transferred
    pub bytes: usize,
    /// Copies issued
    pub chunks: usize,
    /// Sum of per-chunk submit→end times, ns
    pub elapsed_ns: u64,
}

impl TransferStats {
    /// Bandwidth in MB/s.
    pub fn rate_mb_s(&self) -> f64 {
        rate_mb_s(self.bytes, self.elapsed_ns)
    }
}

/// Write `total` bytes to `buffer` starting at device byte `base`.
///
/// `fill` receives each chunk and the staging slice to populate.
///
/// # Errors
///
/// Returns error on a degenerate staging buffer or a channel fault.
pub fn write_chunked(
    queue: &mut dyn DeviceQueue,
    buffer: BufferId,
    base: usize,
    total: usize,
    staging: &mut StagingBuffer,
    mut fill: impl FnMut(Chunk, &mut [u8]),
) -> Result<TransferStats> {
    let mut stats = TransferStats::default();
    for chunk in TransferPlan::new(total, staging.len())? {
        let host = &mut staging.as_bytes_mut()[..chunk.len];
        fill(chunk, host);
        let event = queue.copy_to_device(host, buffer, base + chunk.offset)?;
        let ts = queue.wait(event)?;
        trace!("write chunk @{} ({} bytes): {} ns", chunk.offset, chunk.len, ts.sub_exec_ns());
        stats.bytes += chunk.len;
        stats.chunks += 1;
        stats.elapsed_ns += ts.sub_exec_ns();
    }
    Ok(stats)
}

/// Read `total` bytes from `buffer` starting at device byte `base`.
///
/// The staging slice is zeroed before each copy; `consume` receives each
/// chunk and the bytes read back.
///
/// # Errors
///
/// Returns error on a degenerate staging buffer or a channel fault.
pub fn read_chunked(
    queue: &mut dyn DeviceQueue,
    buffer: BufferId,
    base: usize,
    total: usize,
    staging: &mut StagingBuffer,
    mut consume: impl FnMut(Chunk, &[u8]),
) -> Result<TransferStats> {
    let mut stats = TransferStats::default();
    for chunk in TransferPlan::new(total, staging.len())? {
        let host = &mut staging.as_bytes_mut()[..chunk.len];
        host.fill(0);
        let event = queue.copy_from_device(buffer, base + chunk.offset, host)?;
        let ts = queue.wait(event)?;
        trace!("read chunk @{} ({} bytes): {} ns", chunk.offset, chunk.len, ts.sub_exec_ns());
        consume(chunk, host);
        stats.bytes += chunk.len;
        stats.chunks += 1;
        stats.elapsed_ns += ts.sub_exec_ns();
    }
    Ok(stats)
}
