// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel clock frequency probe
//!
//! A no-op program with one work item per cycle runs over a large grid;
//! items divided by elapsed microseconds is the kernel clock in MHz. With
//! report checking on, the measurement must land within tolerance of the
//! fmax the bitstream was compiled for.

use crate::context::{BoardContext, Verdict};
use crate::error::Result;
use fpga_chip::limits::clock;
use fpga_chip::units::frequency_mhz;
use fpga_driver::{BoardSpecProvider, DeviceQueue, Kernel, SpecLookupError, WorkGrid};
use tracing::{error, info, warn};

/// Probe parameters.
#[derive(Debug, Clone, Copy)]
pub struct ClockConfig {
    /// Work items in the no-op grid
    pub global_size: usize,
    /// Work-group size
    pub work_group_size: usize,
    /// Allowed deviation from compiled fmax, percent (exclusive)
    pub tolerance_pct: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            global_size: clock::GLOBAL_SIZE,
            work_group_size: clock::WORK_GROUP_SIZE,
            tolerance_pct: clock::TOLERANCE_PCT,
        }
    }
}

/// Probe result.
#[derive(Debug)]
pub struct ClockReport {
    /// Pass iff within tolerance, or report checking is off
    pub verdict: Verdict,
    /// Measured kernel clock, MHz
    pub measured_mhz: f64,
    /// Compiled fmax, when looked up successfully
    pub compiled_mhz: Option<f64>,
    /// `|compiled − measured| / compiled × 100`
    pub pct_error: Option<f64>,
    /// Why the compiled fmax is unavailable
    pub lookup_error: Option<SpecLookupError>,
}

/// Percent deviation of `measured` from `compiled`.
pub fn percent_error(compiled: f64, measured: f64) -> f64 {
    (compiled - measured).abs() / compiled * 100.0
}

/// Whether `pct` is strictly below `tolerance`; NaN and negative
/// deviations (from a non-positive compiled fmax) are out of tolerance.
pub fn within_tolerance(pct: f64, tolerance: f64) -> bool {
    (0.0..tolerance).contains(&pct)
}

/// Measure the kernel clock and reconcile it with the compiled fmax.
///
/// # Errors
///
/// Returns error if the channel faults.
pub fn run(
    queue: &mut dyn DeviceQueue,
    ctx: &BoardContext,
    spec: &dyn BoardSpecProvider,
    cfg: &ClockConfig,
) -> Result<ClockReport> {
    let grid = WorkGrid::new(cfg.global_size, cfg.work_group_size);
    let event = queue.launch(&Kernel::Nop { grid })?;
    let ts = queue.wait(event)?;
    let measured_mhz = frequency_mhz(cfg.global_size as u64, ts.sub_exec_ns());
    info!("measured kernel clock: {measured_mhz:.2} MHz");

    let mut report = ClockReport {
        verdict: Verdict::Pass,
        measured_mhz,
        compiled_mhz: None,
        pct_error: None,
        lookup_error: None,
    };
    if !ctx.report_check {
        info!("report checking disabled, compiled fmax not consulted");
        return Ok(report);
    }

    match spec.compiled_fmax_mhz() {
        Ok(compiled) => {
            let pct = percent_error(compiled, measured_mhz);
            info!("compiled fmax: {compiled:.2} MHz ({pct:.3}% deviation)");
            if !within_tolerance(pct, cfg.tolerance_pct) {
                error!(
                    "measured clock not within {}% of compiled fmax",
                    cfg.tolerance_pct
                );
                report.verdict = Verdict::FAIL;
            }
            report.compiled_mhz = Some(compiled);
            report.pct_error = Some(pct);
        }
        Err(e) => {
            warn!("cannot read compiled fmax: {e}");
            error!("reporting measured frequency only, {measured_mhz:.2} MHz");
            report.verdict = Verdict::FAIL;
            report.lookup_error = Some(e);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpga_driver::{SimTiming, SoftwareQueue, StaticBoardSpec};

    fn ideal() -> SoftwareQueue {
        SoftwareQueue::small_board().with_timing(SimTiming::ideal())
    }

    fn spec(fmax: f64) -> StaticBoardSpec {
        StaticBoardSpec {
            fmax_mhz: Some(fmax),
            topology: None,
        }
    }

    #[test]
    fn frequency_is_items_over_elapsed() {
        let mut q = ideal();
        let ctx = BoardContext::from_queue(&q);
        let cfg = ClockConfig {
            global_size: 3_000_000,
            work_group_size: 1000,
            ..ClockConfig::default()
        };
        let report = run(&mut q, &ctx, &spec(300.0), &cfg).unwrap();
        // 3M cycles at 300 MHz = 10 ms
        assert!((report.measured_mhz - 300.0).abs() < 1e-9);
        assert_eq!(report.verdict, Verdict::Pass);
        assert_eq!(report.pct_error, Some(0.0));
    }

    #[test]
    fn tolerance_boundary_is_exclusive() {
        assert!(percent_error(100.0, 98.0) >= 2.0);
        assert!(percent_error(100.0, 98.5) < 2.0);

        let mut q = ideal();
        let ctx = BoardContext::from_queue(&q);
        // measured 300 MHz; 300 / 0.98 puts it 2.04% low
        let report = run(&mut q, &ctx, &spec(306.2), &ClockConfig::default()).unwrap();
        assert_eq!(report.verdict, Verdict::FAIL);
        let report = run(&mut q, &ctx, &spec(305.0), &ClockConfig::default()).unwrap();
        assert_eq!(report.verdict, Verdict::Pass);
    }

    #[test]
    fn unusable_compiled_fmax_fails() {
        for compiled in [f64::NAN, -300.0, 0.0, f64::INFINITY] {
            let mut q = ideal();
            let ctx = BoardContext::from_queue(&q);
            let report = run(&mut q, &ctx, &spec(compiled), &ClockConfig::default()).unwrap();
            assert_eq!(report.verdict, Verdict::FAIL, "compiled fmax {compiled}");
        }
        assert!(!within_tolerance(f64::NAN, 2.0));
        assert!(!within_tolerance(-1.0, 2.0));
        assert!(within_tolerance(0.0, 2.0));
    }

    #[test]
    fn default_grid_within_tolerance_with_launch_overhead() {
        let mut q = SoftwareQueue::small_board();
        let ctx = BoardContext::from_queue(&q);
        let report = run(&mut q, &ctx, &spec(300.0), &ClockConfig::default()).unwrap();
        assert!(report.verdict.passed());
        assert!(report.measured_mhz < 300.0 && report.measured_mhz > 299.0);
    }

    #[test]
    fn missing_report_fails_but_keeps_measurement() {
        let mut q = ideal();
        let ctx = BoardContext::from_queue(&q);
        let report = run(&mut q, &ctx, &StaticBoardSpec::default(), &ClockConfig::default()).unwrap();
        assert_eq!(report.verdict, Verdict::FAIL);
        assert!(report.measured_mhz > 0.0);
        assert!(matches!(report.lookup_error, Some(SpecLookupError::NotProvided(_))));
    }

    #[test]
    fn report_check_off_passes_without_lookup() {
        let mut q = ideal();
        let ctx = BoardContext::from_queue(&q).with_report_check(false);
        let report = run(&mut q, &ctx, &StaticBoardSpec::default(), &ClockConfig::default()).unwrap();
        assert!(report.verdict.passed());
        assert!(report.compiled_mhz.is_none() && report.lookup_error.is_none());
    }
}
