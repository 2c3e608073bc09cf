// SPDX-License-Identifier: AGPL-3.0-only

//! Run context, verdicts and verification tallies shared by every probe.

use crate::error::Result;
use fpga_driver::{BufferId, DeviceCapabilities, DeviceQueue, MemChannel};
use tracing::{error, warn};

/// Everything a probe needs to know about the board, fixed for one run.
///
/// Built once from the queue and handed to every probe by reference.
#[derive(Debug, Clone)]
pub struct BoardContext {
    /// Capabilities reported by the execution channel
    pub caps: DeviceCapabilities,
    /// Reconcile measurements against the compiled board specification
    pub report_check: bool,
    /// Cap on any single host staging allocation, bytes
    pub host_budget: Option<usize>,
    /// Seed for host-side random data
    pub seed: u64,
}

impl BoardContext {
    /// Context for the board behind `queue`, report checking on, seed 0.
    pub fn from_queue(queue: &dyn DeviceQueue) -> Self {
        Self {
            caps: queue.capabilities().clone(),
            report_check: true,
            host_budget: None,
            seed: 0,
        }
    }

    /// Enable or disable report checking.
    #[must_use]
    pub const fn with_report_check(mut self, report_check: bool) -> Self {
        self.report_check = report_check;
        self
    }

    /// Limit host staging allocations to `bytes`.
    #[must_use]
    pub const fn with_host_budget(mut self, bytes: usize) -> Self {
        self.host_budget = Some(bytes);
        self
    }

    /// Seed host-side random data.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Outcome of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Path is functional and within tolerance
    Pass,
    /// Path failed; the code becomes the process exit status
    Fail(u8),
}

impl Verdict {
    /// Generic failure.
    pub const FAIL: Self = Self::Fail(1);

    /// `Pass` when `ok`, generic failure otherwise.
    pub const fn from_pass(ok: bool) -> Self {
        if ok {
            Self::Pass
        } else {
            Self::FAIL
        }
    }

    /// Whether the probe passed.
    pub const fn passed(self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Process exit status: zero on pass, positive on failure.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Pass => 0,
            Self::Fail(code) => i32::from(code.max(1)),
        }
    }

    /// Pass only if both passed; keeps the first failure code.
    #[must_use]
    pub const fn and(self, other: Self) -> Self {
        match self {
            Self::Pass => other,
            Self::Fail(_) => self,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASSED"),
            Self::Fail(_) => write!(f, "FAILED"),
        }
    }
}

/// One element that read back wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    /// Absolute element index
    pub index: u64,
    /// Value written
    pub expected: u64,
    /// Value read back
    pub actual: u64,
}

/// Mismatch counter with a cap on recorded detail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyTally {
    /// Elements compared
    pub compared: u64,
    /// Mismatches counted (uncapped)
    pub errors: u64,
    /// First mismatches, at most `cap`
    pub first: Vec<Mismatch>,
    cap: usize,
}

impl VerifyTally {
    /// Empty tally recording at most `cap` mismatches.
    pub fn with_cap(cap: usize) -> Self {
        Self {
            cap,
            ..Self::default()
        }
    }

    /// Compare one element; count and maybe record a mismatch.
    ///
    /// Returns `true` when the element matched.
    pub fn check(&mut self, index: u64, expected: u64, actual: u64) -> bool {
        self.compared += 1;
        if expected == actual {
            return true;
        }
        self.errors += 1;
        if self.first.len() < self.cap {
            error!("mismatch at element {index}: wrote {expected:#x}, read {actual:#x}");
            self.first.push(Mismatch {
                index,
                expected,
                actual,
            });
        }
        false
    }

    /// Whether every compared element matched.
    pub const fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

/// Allocate a device region, run `f` on it and release it, also when `f`
/// fails.
///
/// # Errors
///
/// Returns the allocation error, the error from `f`, or the release error
/// when `f` succeeded.
pub fn with_region<T>(
    queue: &mut dyn DeviceQueue,
    bytes: usize,
    channel: Option<MemChannel>,
    f: impl FnOnce(&mut dyn DeviceQueue, BufferId) -> Result<T>,
) -> Result<T> {
    let buffer = queue.alloc(bytes, channel)?;
    let result = f(&mut *queue, buffer);
    match (result, queue.release(buffer)) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), release) => {
            if let Err(re) = release {
                warn!("release of buffer {} failed: {re}", buffer.id());
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;
    use fpga_driver::SoftwareQueue;

    #[test]
    fn verdict_exit_codes() {
        assert_eq!(Verdict::Pass.exit_code(), 0);
        assert_eq!(Verdict::FAIL.exit_code(), 1);
        assert_eq!(Verdict::Fail(0).exit_code(), 1);
        assert_eq!(Verdict::Fail(3).exit_code(), 3);
        assert_eq!(Verdict::Pass.and(Verdict::Fail(2)), Verdict::Fail(2));
        assert_eq!(Verdict::Fail(4).and(Verdict::Fail(2)), Verdict::Fail(4));
        assert!(Verdict::from_pass(true).passed());
    }

    #[test]
    fn tally_counts_all_but_records_cap() {
        let mut tally = VerifyTally::with_cap(2);
        for i in 0..5 {
            tally.check(i, i, i + 1);
        }
        assert!(tally.check(9, 9, 9));
        assert_eq!(tally.compared, 6);
        assert_eq!(tally.errors, 5);
        assert_eq!(tally.first.len(), 2);
        assert_eq!(tally.first[1], Mismatch { index: 1, expected: 1, actual: 2 });
    }

    #[test]
    fn region_is_released_on_error() {
        let mut q = SoftwareQueue::small_board();
        let err = with_region(&mut q, 1024, None, |_, _| -> Result<()> {
            Err(BenchError::invalid_config("probe aborted"))
        })
        .unwrap_err();
        assert!(matches!(err, BenchError::InvalidConfig { .. }));
        assert_eq!(q.allocated_bytes(), 0);
    }

    #[test]
    fn context_copies_capabilities() {
        let q = SoftwareQueue::small_board();
        let ctx = BoardContext::from_queue(&q).with_report_check(false).with_seed(7);
        assert_eq!(ctx.caps.mem_channels, 4);
        assert!(!ctx.report_check);
        assert_eq!(ctx.seed, 7);
    }
}
