// SPDX-License-Identifier: AGPL-3.0-only

//! Exhaustive global memory verifier
//!
//! Fills the largest allocatable device region with 64-bit elements whose
//! value is their absolute element index, reads everything back and counts
//! every mismatch. Gates the host bandwidth sweep.

use crate::chunked::{read_chunked, write_chunked, TransferStats};
use crate::context::{with_region, BoardContext, Verdict, VerifyTally};
use crate::error::Result;
use crate::staging::StagingBuffer;
use fpga_chip::limits::global_mem;
use fpga_driver::DeviceQueue;
use tracing::{error, info};

const ELEM: usize = std::mem::size_of::<u64>();

/// Verifier parameters.
#[derive(Debug, Clone, Copy)]
pub struct GlobalMemConfig {
    /// Largest host staging buffer, bytes
    pub max_host_chunk: usize,
    /// Mismatches logged overall and per chunk
    pub max_reported_errors: usize,
}

impl Default for GlobalMemConfig {
    fn default() -> Self {
        Self {
            max_host_chunk: global_mem::MAX_HOST_CHUNK,
            max_reported_errors: global_mem::MAX_REPORTED_ERRORS,
        }
    }
}

/// Verifier result.
#[derive(Debug, Clone)]
pub struct GlobalMemReport {
    /// Pass iff every element read back as written
    pub verdict: Verdict,
    /// Bytes covered
    pub bytes: usize,
    /// Comparison results
    pub tally: VerifyTally,
    /// Write phase
    pub write: TransferStats,
    /// Read phase
    pub read: TransferStats,
}

impl GlobalMemReport {
    fn no_memory() -> Self {
        Self {
            verdict: Verdict::FAIL,
            bytes: 0,
            tally: VerifyTally::default(),
            write: TransferStats::default(),
            read: TransferStats::default(),
        }
    }
}

/// Write and verify the maximum allocation.
///
/// # Errors
///
/// Returns error if no host staging memory can be obtained or the channel
/// faults.
pub fn run(
    queue: &mut dyn DeviceQueue,
    ctx: &BoardContext,
    cfg: &GlobalMemConfig,
) -> Result<GlobalMemReport> {
    let bytes = ctx.caps.max_alloc_bytes / ELEM * ELEM;
    if bytes == 0 {
        error!("device reports no allocatable global memory");
        return Ok(GlobalMemReport::no_memory());
    }
    info!(
        "verifying {} MB of global memory ({} elements)",
        bytes / fpga_chip::units::MB,
        bytes / ELEM
    );

    let mut staging = StagingBuffer::allocate(bytes, cfg.max_host_chunk, ELEM, ctx.host_budget)?;

    with_region(queue, bytes, None, |q, buffer| {
        let write = write_chunked(q, buffer, 0, bytes, &mut staging, |chunk, host| {
            let first = (chunk.offset / ELEM) as u64;
            for (i, word) in host.chunks_exact_mut(ELEM).enumerate() {
                word.copy_from_slice(&(first + i as u64).to_le_bytes());
            }
        })?;
        info!("write: {:.2} MB/s", write.rate_mb_s());

        let cap = cfg.max_reported_errors;
        let mut tally = VerifyTally::with_cap(cap);
        let read = read_chunked(q, buffer, 0, bytes, &mut staging, |chunk, host| {
            let first = (chunk.offset / ELEM) as u64;
            let before = tally.errors;
            for (i, word) in host.chunks_exact(ELEM).enumerate() {
                let mut raw = [0u8; ELEM];
                raw.copy_from_slice(word);
                let index = first + i as u64;
                tally.check(index, index, u64::from_le_bytes(raw));
            }
            let chunk_errors = tally.errors - before;
            if chunk_errors > 0 {
                error!(
                    "{chunk_errors} error(s) in chunk at byte {} ({} bytes)",
                    chunk.offset, chunk.len
                );
            }
        })?;
        info!("read: {:.2} MB/s", read.rate_mb_s());

        if tally.is_clean() {
            info!("global memory verified: {} elements", tally.compared);
        } else {
            error!("{} mismatch(es) in global memory", tally.errors);
        }
        Ok(GlobalMemReport {
            verdict: Verdict::from_pass(tally.is_clean()),
            bytes,
            tally,
            write,
            read,
        })
    })
}
