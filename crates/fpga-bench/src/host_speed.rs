// SPDX-License-Identifier: AGPL-3.0-only

//! Host↔device bandwidth sweep
//!
//! Moves a fixed total in blocks that double from a minimum until one block
//! covers the total. Every block size is measured in both directions:
//!
//! | Figure | Definition |
//! |--------|------------|
//! | average | total / Σ per-chunk start→end |
//! | fastest | best single-chunk rate |
//! | slowest | worst single-chunk rate |
//! | end-to-end | total / (last end − first submit) |
//!
//! The sweep only runs on a board whose global memory verified clean.

use crate::chunked::TransferPlan;
use crate::context::{with_region, BoardContext, Verdict};
use crate::error::Result;
use crate::global_mem::GlobalMemReport;
use fpga_chip::limits::host_speed;
use fpga_chip::units::{rate_mb_s, KB};
use fpga_driver::{span_ns, BufferId, DeviceQueue, OpTimestamps};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, warn};

/// Sweep parameters.
#[derive(Debug, Clone, Copy)]
pub struct HostSpeedConfig {
    /// Bytes per iteration and direction
    pub total_bytes: usize,
    /// First block size
    pub min_block_bytes: usize,
    /// Round-trip mismatches logged per iteration
    pub max_reported_errors: usize,
}

impl Default for HostSpeedConfig {
    fn default() -> Self {
        Self {
            total_bytes: host_speed::TOTAL_BYTES,
            min_block_bytes: host_speed::MIN_BLOCK_BYTES,
            max_reported_errors: host_speed::MAX_REPORTED_ERRORS,
        }
    }
}

/// Rates for one block size in one direction, MB/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    /// Block size, bytes
    pub block_bytes: usize,
    /// Total over summed chunk time
    pub average: f64,
    /// Best single chunk
    pub fastest: f64,
    /// Worst single chunk
    pub slowest: f64,
    /// Total over wall span of the batch
    pub end_to_end: f64,
}

impl SpeedSample {
    /// Best figure of this sample.
    pub fn top(&self) -> f64 {
        self.fastest.max(self.end_to_end)
    }
}

/// Sweep result.
#[derive(Debug, Clone, Default)]
pub struct HostSpeedReport {
    /// Fails when gated, or when any round trip mismatched
    pub verdict: Option<Verdict>,
    /// Host → device samples, one per block size
    pub write: Vec<SpeedSample>,
    /// Device → host samples, one per block size
    pub read: Vec<SpeedSample>,
    /// Round-trip byte mismatches over all iterations
    pub data_errors: usize,
}

impl HostSpeedReport {
    /// Sweep verdict; a sweep that never ran fails.
    pub fn verdict(&self) -> Verdict {
        self.verdict.unwrap_or(Verdict::FAIL)
    }

    /// Best host → device figure, MB/s.
    pub fn top_write_mb_s(&self) -> f64 {
        self.write.iter().map(SpeedSample::top).fold(0.0, f64::max)
    }

    /// Best device → host figure, MB/s.
    pub fn top_read_mb_s(&self) -> f64 {
        self.read.iter().map(SpeedSample::top).fold(0.0, f64::max)
    }

    /// Mean of the two directions' best figures, MB/s.
    pub fn combined_mb_s(&self) -> f64 {
        (self.top_write_mb_s() + self.top_read_mb_s()) / 2.0
    }
}

/// Number of block sizes: `ceil(log2(total / min)) + 1`.
pub fn iteration_count(total: usize, min_block: usize) -> usize {
    let mut k = 0;
    while (min_block << k) < total {
        k += 1;
    }
    k + 1
}

/// Host buffer pattern: even bytes from their index, odd bytes random.
fn fill_pattern(buf: &mut [u8], rng: &mut ChaCha8Rng) {
    for (j, b) in buf.iter_mut().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let idx = j as u8;
        *b = if j % 2 == 1 {
            rng.gen()
        } else if j & 2 != 0 {
            !idx
        } else {
            idx
        };
    }
}

#[derive(Clone, Copy)]
enum Direction {
    ToDevice,
    FromDevice,
}

/// Issue every chunk copy of one direction, then wait once.
fn sweep_once(
    q: &mut dyn DeviceQueue,
    buffer: BufferId,
    block: usize,
    dir: Direction,
    host_w: &[u8],
    host_r: &mut [u8],
) -> Result<SpeedSample> {
    let total = host_w.len();
    let mut events = Vec::new();
    for chunk in TransferPlan::new(total, block)? {
        let range = chunk.offset..chunk.offset + chunk.len;
        let event = match dir {
            Direction::ToDevice => q.copy_to_device(&host_w[range], buffer, chunk.offset)?,
            Direction::FromDevice => q.copy_from_device(buffer, chunk.offset, &mut host_r[range])?,
        };
        events.push((chunk.len, event));
    }
    q.wait_all()?;

    let mut timed: Vec<(usize, OpTimestamps)> = Vec::with_capacity(events.len());
    for (len, event) in events {
        timed.push((len, q.profile(event)?));
    }

    Ok(summarize(block, total, &timed))
}

/// Rates for one sweep step from per-chunk timestamps, in any order.
fn summarize(block: usize, total: usize, timed: &[(usize, OpTimestamps)]) -> SpeedSample {
    let busy_ns: u64 = timed.iter().map(|(_, ts)| ts.start_exec_ns()).sum();
    let chunk_rates = timed.iter().map(|(len, ts)| rate_mb_s(*len, ts.start_exec_ns()));
    let (fastest, slowest) = chunk_rates.fold((0.0_f64, f64::INFINITY), |(hi, lo), r| {
        (hi.max(r), lo.min(r))
    });

    SpeedSample {
        block_bytes: block,
        average: rate_mb_s(total, busy_ns),
        fastest,
        slowest: if slowest.is_finite() { slowest } else { 0.0 },
        end_to_end: rate_mb_s(total, span_ns(timed.iter().map(|(_, ts)| ts))),
    }
}

/// Run the sweep.
///
/// Returns a failing report without touching the device when the global
/// memory verifier did not pass.
///
/// # Errors
///
/// Returns error if the channel faults.
pub fn run(
    queue: &mut dyn DeviceQueue,
    ctx: &BoardContext,
    cfg: &HostSpeedConfig,
    verified: &GlobalMemReport,
) -> Result<HostSpeedReport> {
    if !verified.verdict.passed() {
        error!("global memory verification failed, skipping host speed sweep");
        return Ok(HostSpeedReport::default());
    }

    let total = cfg.total_bytes.min(ctx.caps.max_alloc_bytes);
    let min_block = cfg.min_block_bytes.min(total);
    if total == 0 || min_block == 0 {
        error!("host speed sweep has nothing to transfer");
        return Ok(HostSpeedReport::default());
    }
    if total < cfg.total_bytes {
        warn!("sweep total clamped to {} KB by the device's maximum allocation", total / KB);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(ctx.seed);
    let mut host_w = vec![0u8; total];
    fill_pattern(&mut host_w, &mut rng);
    let mut host_r = vec![0u8; total];
    let iterations = iteration_count(total, min_block);
    info!("host speed sweep: {} KB total, {iterations} block sizes", total / KB);

    with_region(queue, total, None, |q, buffer| {
        // warm-up, untimed
        let e = q.copy_to_device(&host_w[..min_block], buffer, 0)?;
        q.wait(e)?;
        let e = q.copy_from_device(buffer, 0, &mut host_r[..min_block])?;
        q.wait(e)?;

        let mut report = HostSpeedReport::default();
        let mut pass = true;
        for k in 0..iterations {
            let block = (min_block << k).min(total);
            host_r.fill(0);
            let w = sweep_once(q, buffer, block, Direction::ToDevice, &host_w, &mut host_r)?;
            let r = sweep_once(q, buffer, block, Direction::FromDevice, &host_w, &mut host_r)?;
            debug!(
                "block {} KB: write {:.1} MB/s, read {:.1} MB/s",
                block / KB,
                w.average,
                r.average
            );
            report.write.push(w);
            report.read.push(r);

            let mut errors = 0;
            for (j, (a, b)) in host_w.iter().zip(&host_r).enumerate() {
                if a != b {
                    if errors < cfg.max_reported_errors {
                        error!("block {} KB: byte {j} wrote {a:#04x}, read {b:#04x}", block / KB);
                    }
                    errors += 1;
                }
            }
            report.data_errors += errors;
            pass &= errors == 0;
        }

        info!(
            "host speed: write {:.2} MB/s, read {:.2} MB/s, combined {:.2} MB/s",
            report.top_write_mb_s(),
            report.top_read_mb_s(),
            report.combined_mb_s()
        );
        report.verdict = Some(Verdict::from_pass(pass));
        Ok(report)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_mem::{self, GlobalMemConfig};
    use fpga_driver::{ReadFault, SoftwareQueue};

    fn verified(q: &mut SoftwareQueue, ctx: &BoardContext) -> GlobalMemReport {
        let cfg = GlobalMemConfig {
            max_host_chunk: 256 * KB,
            ..GlobalMemConfig::default()
        };
        global_mem::run(q, ctx, &cfg).unwrap()
    }

    #[test]
    fn iteration_count_matches_log2() {
        assert_eq!(iteration_count(8 * 1024 * 1024, 32 * 1024), 9);
        assert_eq!(iteration_count(32 * 1024, 32 * 1024), 1);
        assert_eq!(iteration_count(100, 32), 3);
    }

    #[test]
    fn pattern_even_bytes_follow_index() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut buf = vec![0u8; 8];
        fill_pattern(&mut buf, &mut rng);
        assert_eq!(buf[0], 0);
        assert_eq!(buf[2], !2u8);
        assert_eq!(buf[4], 4);
        assert_eq!(buf[6], !6u8);
    }

    #[test]
    fn sweep_doubles_block_size_and_orders_rates() {
        let mut q = SoftwareQueue::small_board();
        let ctx = BoardContext::from_queue(&q);
        let gate = verified(&mut q, &ctx);
        let cfg = HostSpeedConfig {
            total_bytes: 512 * KB,
            min_block_bytes: 32 * KB,
            ..HostSpeedConfig::default()
        };
        let report = run(&mut q, &ctx, &cfg, &gate).unwrap();
        assert!(report.verdict().passed());
        assert_eq!(report.write.len(), 5);
        for (k, s) in report.write.iter().chain(&report.read).enumerate() {
            assert_eq!(s.block_bytes, (32 * KB) << (k % 5));
            let eps = s.average * 1e-9;
            assert!(s.fastest + eps >= s.average && s.average + eps >= s.slowest, "{s:?}");
        }
        assert!(report.combined_mb_s() > 0.0);
        assert_eq!(q.allocated_bytes(), 0);
    }

    #[test]
    fn total_is_clamped_to_max_alloc() {
        let mut q = SoftwareQueue::small_board();
        let ctx = BoardContext::from_queue(&q);
        let gate = verified(&mut q, &ctx);
        let report = run(&mut q, &ctx, &HostSpeedConfig::default(), &gate).unwrap();
        // 1 MB max alloc: 32 KB .. 1 MB
        assert_eq!(report.write.len(), 6);
        assert_eq!(report.write.last().map(|s| s.block_bytes), Some(1024 * 1024));
    }

    #[test]
    fn failed_verifier_gates_sweep() {
        let mut q = SoftwareQueue::small_board()
            .with_read_fault(ReadFault { byte_offset: 40, xor: 1 });
        let ctx = BoardContext::from_queue(&q);
        let gate = verified(&mut q, &ctx);
        assert!(!gate.verdict.passed());
        let report = run(&mut q, &ctx, &HostSpeedConfig::default(), &gate).unwrap();
        assert_eq!(report.verdict(), Verdict::FAIL);
        assert!(report.write.is_empty());
    }

    #[test]
    fn read_back_corruption_fails_sweep() {
        let mut q = SoftwareQueue::small_board();
        let ctx = BoardContext::from_queue(&q);
        let gate = verified(&mut q, &ctx);
        let mut q = q.with_read_fault(ReadFault { byte_offset: 100, xor: 0xFF });
        let cfg = HostSpeedConfig {
            total_bytes: 128 * KB,
            ..HostSpeedConfig::default()
        };
        let report = run(&mut q, &ctx, &cfg, &gate).unwrap();
        assert_eq!(report.verdict(), Verdict::FAIL);
        assert_eq!(report.data_errors, 3);
    }

    #[test]
    fn end_to_end_spans_earliest_submit_to_latest_end() {
        let ts = |submit, start, end| OpTimestamps { submit, start, end };
        // completion order differs from submission order
        let timed = [
            (1000, ts(100, 400, 900)),
            (1000, ts(0, 50, 300)),
            (1000, ts(200, 900, 1_200)),
        ];
        let s = summarize(1000, 3000, &timed);
        assert_eq!(s.end_to_end, rate_mb_s(3000, 1_200));
        assert_eq!(s.average, rate_mb_s(3000, 1_050));

        let empty = summarize(1000, 0, &[]);
        assert_eq!(empty.end_to_end, 0.0);
        assert_eq!(empty.slowest, 0.0);
    }
}
