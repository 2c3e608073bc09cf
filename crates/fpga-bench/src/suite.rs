// SPDX-License-Identifier: AGPL-3.0-only

//! Board test suite
//!
//! | # | Test | Probes |
//! |---|------|--------|
//! | 1 | Host speed and host read/write | verifier, sweep, unaligned stress |
//! | 2 | Kernel clock frequency | clock probe |
//! | 3 | Kernel launch | handshake |
//! | 4 | Kernel latency | launch batch |
//! | 5 | Kernel-to-memory read/write | read-modify-write over the allocation |
//! | 6 | Kernel-to-memory bandwidth | multi-bank streaming |
//!
//! The clock test runs ahead of every kernel test (3–6). When report
//! checking is on and the clock test fails, kernel tests are not run.

use crate::clock::{self, ClockConfig, ClockReport};
use crate::context::{BoardContext, Verdict};
use crate::error::Result;
use crate::global_mem::{self, GlobalMemConfig, GlobalMemReport};
use crate::host_rw::{self, HostRwConfig, HostRwReport};
use crate::host_speed::{self, HostSpeedConfig, HostSpeedReport};
use crate::latency::{self, LatencyConfig, LatencyReport};
use crate::launch::{self, LaunchConfig, LaunchReport};
use crate::mem_bw::{self, MemBwConfig, MemBwReport};
use crate::mem_rw::{self, MemRwConfig, MemRwReport};
use fpga_driver::{BoardSpecProvider, DeviceQueue};
use tracing::{error, info};

/// Tests of the suite, numbered as on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TestId {
    /// 1: host↔device interface
    HostSpeed = 1,
    /// 2: kernel clock against compiled fmax
    ClockFrequency = 2,
    /// 3: kernel-to-kernel pipe handshake
    KernelLaunch = 3,
    /// 4: kernel launch latency
    KernelLatency = 4,
    /// 5: kernel-to-memory read/write
    KernelMemRw = 5,
    /// 6: kernel-to-memory bandwidth
    KernelMemBw = 6,
}

impl TestId {
    /// Every test in run order.
    pub const ALL: [Self; 6] = [
        Self::HostSpeed,
        Self::ClockFrequency,
        Self::KernelLaunch,
        Self::KernelLatency,
        Self::KernelMemRw,
        Self::KernelMemBw,
    ];

    /// Test number.
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Test for a command-line number.
    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.number() == n)
    }

    /// Display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::HostSpeed => "Host Speed and Host Read Write Test",
            Self::ClockFrequency => "Kernel Clock Frequency Test",
            Self::KernelLaunch => "Kernel Launch Test",
            Self::KernelLatency => "Kernel Latency Measurement",
            Self::KernelMemRw => "Kernel-to-Memory Read Write Test",
            Self::KernelMemBw => "Kernel-to-Memory Bandwidth Test",
        }
    }

    /// What the test checks.
    pub const fn description(self) -> &'static str {
        match self {
            Self::HostSpeed => {
                "Checks the host to device interface. Verifies the whole maximum \
                 allocation, measures host to device write and read bandwidth over \
                 a block-size sweep, then round-trips every length up to 1 KB \
                 between unaligned host buffers and an odd-sized device region."
            }
            Self::ClockFrequency => {
                "Measures the kernel clock of the bitstream with a no-op kernel and \
                 compares it with the compiled fmax from quartus.json in \
                 reports/lib/json or board_test.prj/reports/lib/json. With report \
                 checking on, a missing report or a deviation of 2% or more fails \
                 the test and the kernel tests are not run."
            }
            Self::KernelLaunch => {
                "Launches a sender kernel that writes a known value into a pipe \
                 and a receiver kernel that stores what it reads; the host checks \
                 the stored value."
            }
            Self::KernelLatency => {
                "Launches many no-operation kernels back to back and reports the \
                 mean launch latency and launch throughput."
            }
            Self::KernelMemRw => {
                "Writes the entire allocation from the host, a kernel reads, \
                 modifies and writes every element back, and the host verifies \
                 the modified data."
            }
            Self::KernelMemBw => {
                "Measures kernel to global memory bandwidth for write, read and \
                 read-write access on every memory bank and compares the average \
                 with the theoretical bandwidth in board_spec.xml under \
                 OFS_OCL_SHIM_ROOT_HW when set."
            }
        }
    }

    const fn needs_clock(self) -> bool {
        !matches!(self, Self::HostSpeed | Self::ClockFrequency)
    }
}

impl std::fmt::Display for TestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}. {}", self.number(), self.name())
    }
}

/// Which tests to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Tests 1–6
    All,
    /// One test, plus the clock test ahead of kernel tests
    Only(TestId),
}

impl Selection {
    /// Tests in execution order.
    pub fn plan(self) -> Vec<TestId> {
        match self {
            Self::All => TestId::ALL.to_vec(),
            Self::Only(t) if t.needs_clock() => vec![TestId::ClockFrequency, t],
            Self::Only(t) => vec![t],
        }
    }
}

/// Parameters of every probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuiteConfig {
    /// Exhaustive verifier
    pub global_mem: GlobalMemConfig,
    /// Bandwidth sweep
    pub host_speed: HostSpeedConfig,
    /// Unaligned stress
    pub host_rw: HostRwConfig,
    /// Clock probe
    pub clock: ClockConfig,
    /// Handshake
    pub launch: LaunchConfig,
    /// Latency batch
    pub latency: LatencyConfig,
    /// Kernel read/write
    pub mem_rw: MemRwConfig,
    /// Multi-bank bandwidth
    pub mem_bw: MemBwConfig,
}

/// Verdict of one selected test; `None` when it was not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestOutcome {
    /// Test
    pub test: TestId,
    /// Result, if the test ran
    pub verdict: Option<Verdict>,
}

/// Headline figures of a run; `None` for tests that did not run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSummary {
    /// Best host → device bandwidth, MB/s
    pub h2d_write_mb_s: Option<f64>,
    /// Best device → host bandwidth, MB/s
    pub h2d_read_mb_s: Option<f64>,
    /// Mean of both directions, MB/s
    pub h2d_combined_mb_s: Option<f64>,
    /// Unaligned host read/write passed
    pub host_rw_pass: Option<bool>,
    /// Measured kernel clock, MHz
    pub kernel_freq_mhz: Option<f64>,
    /// Kernel launch latency, µs
    pub latency_us: Option<f64>,
    /// Kernel launches per ms
    pub throughput_per_ms: Option<f64>,
    /// Average kernel-to-memory bandwidth, MB/s
    pub kernel_mem_bw_mb_s: Option<f64>,
    /// Kernel-to-memory read/write passed
    pub kernel_mem_rw_pass: Option<bool>,
}

/// Everything a run produced.
#[derive(Debug, Default)]
pub struct SuiteReport {
    /// Selected tests in run order
    pub outcomes: Vec<TestOutcome>,
    /// Test 1: verifier
    pub global_mem: Option<GlobalMemReport>,
    /// Test 1: sweep
    pub host_speed: Option<HostSpeedReport>,
    /// Test 1: unaligned stress
    pub host_rw: Option<HostRwReport>,
    /// Test 2
    pub clock: Option<ClockReport>,
    /// Test 3
    pub launch: Option<LaunchReport>,
    /// Test 4
    pub latency: Option<LatencyReport>,
    /// Test 5
    pub mem_rw: Option<MemRwReport>,
    /// Test 6
    pub mem_bw: Option<MemBwReport>,
}

impl SuiteReport {
    /// Whether every test that ran passed and none was skipped.
    pub fn passed(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.verdict.is_some_and(Verdict::passed))
    }

    /// Process exit status: the first failure's code, else zero.
    pub fn exit_code(&self) -> i32 {
        self.outcomes
            .iter()
            .filter_map(|o| o.verdict)
            .find(|v| !v.passed())
            .map_or(0, Verdict::exit_code)
    }

    /// Headline figures.
    pub fn metrics(&self) -> MetricsSummary {
        let sweep = self.host_speed.as_ref().filter(|r| r.verdict.is_some());
        MetricsSummary {
            h2d_write_mb_s: sweep.map(HostSpeedReport::top_write_mb_s),
            h2d_read_mb_s: sweep.map(HostSpeedReport::top_read_mb_s),
            h2d_combined_mb_s: sweep.map(HostSpeedReport::combined_mb_s),
            host_rw_pass: self.host_rw.as_ref().map(|r| r.verdict.passed()),
            kernel_freq_mhz: self.clock.as_ref().map(|r| r.measured_mhz),
            latency_us: self.latency.as_ref().map(LatencyReport::latency_us),
            throughput_per_ms: self.latency.as_ref().map(LatencyReport::throughput_per_ms),
            kernel_mem_bw_mb_s: self
                .mem_bw
                .as_ref()
                .filter(|r| !r.samples.is_empty())
                .map(MemBwReport::average_mb_s),
            kernel_mem_rw_pass: self.mem_rw.as_ref().map(|r| r.verdict.passed()),
        }
    }
}

/// Run the selected tests.
///
/// # Errors
///
/// Returns error if a probe cannot take its measurement (host memory
/// unavailable, channel fault). Probe failures are reported in the
/// outcomes instead.
pub fn run(
    queue: &mut dyn DeviceQueue,
    ctx: &BoardContext,
    spec: &dyn BoardSpecProvider,
    selection: Selection,
    cfg: &SuiteConfig,
) -> Result<SuiteReport> {
    let mut report = SuiteReport::default();
    let mut clock_gate_closed = false;

    for test in selection.plan() {
        if clock_gate_closed && test.needs_clock() {
            error!("{test}: not run, kernel clock out of tolerance");
            report.outcomes.push(TestOutcome { test, verdict: None });
            continue;
        }
        info!("*** {test} ***");

        let verdict = match test {
            TestId::HostSpeed => {
                let gm = global_mem::run(queue, ctx, &cfg.global_mem)?;
                let hs = host_speed::run(queue, ctx, &cfg.host_speed, &gm)?;
                let rw = host_rw::run(queue, ctx, &cfg.host_rw)?;
                let v = gm.verdict.and(hs.verdict()).and(rw.verdict);
                report.global_mem = Some(gm);
                report.host_speed = Some(hs);
                report.host_rw = Some(rw);
                v
            }
            TestId::ClockFrequency => {
                let r = clock::run(queue, ctx, spec, &cfg.clock)?;
                let v = r.verdict;
                if !v.passed() && ctx.report_check {
                    clock_gate_closed = true;
                }
                report.clock = Some(r);
                v
            }
            TestId::KernelLaunch => {
                let r = launch::run(queue, &cfg.launch)?;
                report.launch = Some(r);
                r.verdict
            }
            TestId::KernelLatency => {
                let r = latency::run(queue, &cfg.latency)?;
                report.latency = Some(r);
                r.verdict
            }
            TestId::KernelMemRw => {
                let r = mem_rw::run(queue, ctx, &cfg.mem_rw)?;
                let v = r.verdict;
                report.mem_rw = Some(r);
                v
            }
            TestId::KernelMemBw => {
                let r = mem_bw::run(queue, ctx, spec, &cfg.mem_bw)?;
                let v = r.verdict;
                report.mem_bw = Some(r);
                v
            }
        };
        info!("{test}: {verdict}");
        report.outcomes.push(TestOutcome {
            test,
            verdict: Some(verdict),
        });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_tests_run_behind_the_clock() {
        assert_eq!(
            Selection::Only(TestId::KernelLatency).plan(),
            vec![TestId::ClockFrequency, TestId::KernelLatency]
        );
        assert_eq!(Selection::Only(TestId::HostSpeed).plan(), vec![TestId::HostSpeed]);
        assert_eq!(Selection::Only(TestId::ClockFrequency).plan(), vec![TestId::ClockFrequency]);
        assert_eq!(Selection::All.plan().len(), 6);
    }

    #[test]
    fn numbers_round_trip() {
        for t in TestId::ALL {
            assert_eq!(TestId::from_number(t.number()), Some(t));
        }
        assert_eq!(TestId::from_number(0), None);
        assert_eq!(TestId::from_number(7), None);
        assert_eq!(TestId::KernelMemBw.to_string(), "6. Kernel-to-Memory Bandwidth Test");
    }

    #[test]
    fn exit_code_is_first_failure() {
        let report = SuiteReport {
            outcomes: vec![
                TestOutcome { test: TestId::HostSpeed, verdict: Some(Verdict::Pass) },
                TestOutcome { test: TestId::ClockFrequency, verdict: Some(Verdict::Fail(2)) },
                TestOutcome { test: TestId::KernelLaunch, verdict: None },
            ],
            ..SuiteReport::default()
        };
        assert_eq!(report.exit_code(), 2);
        assert!(!report.passed());
        assert_eq!(SuiteReport::default().exit_code(), 0);
    }
}
