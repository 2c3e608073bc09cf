// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel-to-memory multi-bank bandwidth
//!
//! For every access pattern and every memory bank, a streaming program runs
//! over the largest region the bank can hold and its start→end time gives
//! the bank bandwidth. Results are checked against the data each pattern
//! must leave behind:
//!
//! | Pattern | Device effect | Check |
//! |---------|---------------|-------|
//! | `Write` | `mem[i] = i` | element == index |
//! | `Read` | none | not verified |
//! | `ReadWrite` | `mem[i] += 2` | element == input + 2 (wrapping) |
//!
//! With a board topology available the average rate is compared with the
//! theoretical bandwidth of one channel.

use crate::context::{with_region, BoardContext, Mismatch, Verdict, VerifyTally};
use crate::error::Result;
use crate::staging::StagingBuffer;
use fpga_chip::limits::mem_bw;
use fpga_chip::units::rate_mb_s;
use fpga_chip::{BoardTopology, DEFAULT_CHANNEL_COUNT};
use fpga_driver::{AccessPattern, BoardSpecProvider, DeviceQueue, Kernel, MemChannel, WorkGrid};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, warn};

const ELEM: usize = std::mem::size_of::<u32>();

/// Test parameters.
#[derive(Debug, Clone, Copy)]
pub struct MemBwConfig {
    /// Upper bound on bytes per bank
    pub max_total_bytes: usize,
    /// Work-group size of the streaming programs
    pub work_group_size: usize,
    /// Mismatches logged before failing
    pub max_reported_errors: usize,
    /// Warn below this utilization, percent
    pub utilization_warn_pct: f64,
    /// Banks tested when no topology is available
    pub default_channels: usize,
}

impl Default for MemBwConfig {
    fn default() -> Self {
        Self {
            max_total_bytes: mem_bw::MAX_TOTAL_BYTES,
            work_group_size: mem_bw::WORK_GROUP_SIZE,
            max_reported_errors: mem_bw::MAX_REPORTED_ERRORS,
            utilization_warn_pct: mem_bw::UTILIZATION_WARN_PCT,
            default_channels: DEFAULT_CHANNEL_COUNT,
        }
    }
}

/// Bandwidth of one pattern on one bank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BankSample {
    /// Access pattern
    pub pattern: AccessPattern,
    /// Bank index, from 0
    pub bank: usize,
    /// Memory channel the region was pinned to, from 1
    pub channel: usize,
    /// Measured rate, MB/s
    pub rate_mb_s: f64,
}

/// Test result.
#[derive(Debug, Clone)]
pub struct MemBwReport {
    /// Fails on the first pattern/bank whose data did not verify
    pub verdict: Verdict,
    /// Bytes per bank
    pub bytes: usize,
    /// Banks tested
    pub banks: usize,
    /// One sample per pattern and bank, in run order
    pub samples: Vec<BankSample>,
    /// Topology used for utilization, if available
    pub topology: Option<BoardTopology>,
    /// Recorded mismatches of the failing pass
    pub mismatches: Vec<Mismatch>,
}

impl MemBwReport {
    fn empty(verdict: Verdict) -> Self {
        Self {
            verdict,
            bytes: 0,
            banks: 0,
            samples: Vec::new(),
            topology: None,
            mismatches: Vec::new(),
        }
    }

    /// Mean of every sample, MB/s.
    #[allow(clippy::cast_precision_loss)]
    pub fn average_mb_s(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.rate_mb_s).sum::<f64>() / self.samples.len() as f64
    }

    /// Mean over the samples of one pattern, MB/s.
    #[allow(clippy::cast_precision_loss)]
    pub fn pattern_average_mb_s(&self, pattern: AccessPattern) -> Option<f64> {
        let rates: Vec<f64> = self
            .samples
            .iter()
            .filter(|s| s.pattern == pattern)
            .map(|s| s.rate_mb_s)
            .collect();
        if rates.is_empty() {
            None
        } else {
            Some(rates.iter().sum::<f64>() / rates.len() as f64)
        }
    }

    /// Blended average as a percentage of one channel's theoretical
    /// bandwidth.
    pub fn utilization_pct(&self) -> Option<f64> {
        let per_channel = self.topology.as_ref()?.per_channel_bandwidth_mb_s()?;
        Some(self.average_mb_s() / per_channel * 100.0)
    }
}

/// Channel bank `bank` (from 0) is pinned to: `bank + 1` when the device
/// has it, channel 1 otherwise.
pub fn channel_for_bank(bank: usize, device_channels: usize) -> MemChannel {
    if bank < device_channels {
        MemChannel(bank + 1)
    } else {
        MemChannel(1)
    }
}

/// Verify one pattern's output; `None` when it passed.
fn verify(
    pattern: AccessPattern,
    input: &StagingBuffer,
    output: &StagingBuffer,
    n: usize,
    cap: usize,
) -> Option<VerifyTally> {
    if pattern == AccessPattern::Read {
        return None;
    }
    let mut tally = VerifyTally::with_cap(cap);
    for i in 0..n {
        #[allow(clippy::cast_possible_truncation)]
        let expected = match pattern {
            AccessPattern::ReadWrite => {
                input.get_u32(i).wrapping_add(AccessPattern::READ_WRITE_INCREMENT)
            }
            AccessPattern::Write | AccessPattern::Read => i as u32,
        };
        tally.check(i as u64, u64::from(expected), u64::from(output.get_u32(i)));
    }
    if tally.is_clean() {
        None
    } else {
        Some(tally)
    }
}

/// Run the test.
///
/// # Errors
///
/// Returns error if no host memory can be obtained or the channel faults.
pub fn run(
    queue: &mut dyn DeviceQueue,
    ctx: &BoardContext,
    spec: &dyn BoardSpecProvider,
    cfg: &MemBwConfig,
) -> Result<MemBwReport> {
    let requested = ctx.caps.max_alloc_bytes.min(cfg.max_total_bytes) / ELEM * ELEM;
    if requested == 0 {
        error!("device reports no allocatable global memory");
        return Ok(MemBwReport::empty(Verdict::FAIL));
    }

    let mut input = StagingBuffer::allocate(requested, requested, ELEM, ctx.host_budget)?;
    let bytes = input.len();
    let mut output = StagingBuffer::allocate(bytes, bytes, ELEM, ctx.host_budget)?;
    let bytes = bytes.min(output.len());
    let n = bytes / ELEM;

    let mut rng = ChaCha8Rng::seed_from_u64(ctx.seed);
    for i in 0..n {
        input.put_u32(i, rng.gen());
    }

    let topology = match spec.topology() {
        Ok(t) if t.channel_count() > 0 => Some(t),
        Ok(_) => {
            warn!("board specification lists no memory interfaces");
            None
        }
        Err(e) => {
            warn!("global memory topology unavailable ({e}), assuming {} banks", cfg.default_channels);
            None
        }
    };
    let banks = topology
        .as_ref()
        .map_or(cfg.default_channels, BoardTopology::channel_count);
    info!("kernel-to-memory bandwidth: {bytes} bytes per bank, {banks} bank(s)");

    let mut report = MemBwReport {
        verdict: Verdict::Pass,
        bytes,
        banks,
        samples: Vec::with_capacity(AccessPattern::ALL.len() * banks),
        topology,
        mismatches: Vec::new(),
    };
    let grid = WorkGrid::padded(n, cfg.work_group_size);

    for pattern in AccessPattern::ALL {
        for bank in 0..banks {
            let channel = channel_for_bank(bank, ctx.caps.mem_channels);
            let rate = with_region(queue, bytes, Some(channel), |q, buffer| {
                let e = q.copy_to_device(&input.as_bytes()[..bytes], buffer, 0)?;
                q.wait(e)?;
                let e = q.launch(&Kernel::Stream {
                    pattern,
                    buffer,
                    offset: 0,
                    len: n,
                    grid,
                })?;
                let ts = q.wait(e)?;
                output.clear();
                let e = q.copy_from_device(buffer, 0, &mut output.as_bytes_mut()[..bytes])?;
                q.wait(e)?;
                Ok(rate_mb_s(bytes * pattern.traffic_factor(), ts.start_exec_ns()))
            })?;
            debug!("{pattern} bank {bank} (channel {}): {rate:.2} MB/s", channel.0);
            report.samples.push(BankSample {
                pattern,
                bank,
                channel: channel.0,
                rate_mb_s: rate,
            });

            if let Some(tally) = verify(pattern, &input, &output, n, cfg.max_reported_errors) {
                error!("{pattern} bank {bank}: {} mismatch(es)", tally.errors);
                report.verdict = Verdict::FAIL;
                report.mismatches = tally.first;
                return Ok(report);
            }
        }
        if let Some(avg) = report.pattern_average_mb_s(pattern) {
            info!("{pattern}: {avg:.2} MB/s average");
        }
    }

    info!("average kernel-to-memory bandwidth: {:.2} MB/s", report.average_mb_s());
    match report.utilization_pct() {
        Some(pct) if pct < cfg.utilization_warn_pct => {
            warn!("utilization {pct:.1}% is below {}% of theoretical", cfg.utilization_warn_pct);
        }
        Some(pct) => info!("utilization {pct:.1}% of theoretical"),
        None => warn!("no theoretical bandwidth to compare against"),
    }
    Ok(report)
}
