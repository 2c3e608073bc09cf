// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel launch latency and throughput
//!
//! Launches many single-task no-op programs back to back without waiting
//! on any of them, then waits for all. The span from the first submission
//! to the last completion gives the per-launch latency and the sustained
//! launch rate. Informational: the probe never fails.

use crate::context::Verdict;
use crate::error::Result;
use fpga_chip::limits::latency;
use fpga_driver::{span_ns, DeviceQueue, Kernel};
use tracing::info;

/// Probe parameters.
#[derive(Debug, Clone, Copy)]
pub struct LatencyConfig {
    /// Launches in the batch
    pub launches: usize,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            launches: latency::NUM_KERNELS,
        }
    }
}

/// Probe result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyReport {
    /// Always [`Verdict::Pass`]
    pub verdict: Verdict,
    /// Launches completed
    pub launches: usize,
    /// First submission to last completion, ns
    pub elapsed_ns: u64,
}

impl LatencyReport {
    /// Mean time per launch, µs.
    #[allow(clippy::cast_precision_loss)]
    pub fn latency_us(&self) -> f64 {
        if self.launches == 0 {
            return 0.0;
        }
        self.elapsed_ns as f64 / 1000.0 / self.launches as f64
    }

    /// Launches completed per millisecond.
    #[allow(clippy::cast_precision_loss)]
    pub fn throughput_per_ms(&self) -> f64 {
        if self.elapsed_ns == 0 {
            return 0.0;
        }
        self.launches as f64 / (self.elapsed_ns as f64 / 1_000_000.0)
    }
}

/// Run the batch.
///
/// # Errors
///
/// Returns error if the channel faults.
pub fn run(queue: &mut dyn DeviceQueue, cfg: &LatencyConfig) -> Result<LatencyReport> {
    let mut events = Vec::with_capacity(cfg.launches);
    for _ in 0..cfg.launches {
        events.push(queue.launch(&Kernel::SingleTaskNop)?);
    }
    queue.wait_all()?;

    let mut stamps = Vec::with_capacity(events.len());
    for event in events {
        stamps.push(queue.profile(event)?);
    }
    let report = LatencyReport {
        verdict: Verdict::Pass,
        launches: cfg.launches,
        elapsed_ns: span_ns(&stamps),
    };
    info!(
        "{} launches: {:.3} us latency, {:.3} kernels/ms",
        report.launches,
        report.latency_us(),
        report.throughput_per_ms()
    );
    Ok(report)
}
