// SPDX-License-Identifier: AGPL-3.0-only

//! Whole-suite runs against the simulated board.

use fpga_bench::{suite, BoardContext, Selection, SuiteConfig, TestId, Verdict};
use fpga_driver::{FileBoardSpec, ReadFault, SoftwareQueue, StaticBoardSpec};
use std::fs;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn fmax(mhz: f64) -> StaticBoardSpec {
    StaticBoardSpec {
        fmax_mhz: Some(mhz),
        topology: None,
    }
}

#[test]
fn full_run_passes_on_a_healthy_board() {
    init_tracing();
    let mut q = SoftwareQueue::small_board();
    let ctx = BoardContext::from_queue(&q);
    let report = suite::run(&mut q, &ctx, &fmax(300.0), Selection::All, &SuiteConfig::default())
        .unwrap();

    let run: Vec<_> = report.outcomes.iter().map(|o| o.test).collect();
    assert_eq!(run, TestId::ALL.to_vec());
    assert!(report.passed(), "{:?}", report.outcomes);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(q.allocated_bytes(), 0);

    let m = report.metrics();
    assert!(m.h2d_write_mb_s.unwrap() > 0.0);
    assert!(m.h2d_read_mb_s.unwrap() > 0.0);
    assert_eq!(m.host_rw_pass, Some(true));
    assert!((m.kernel_freq_mhz.unwrap() - 300.0).abs() < 1.0);
    assert!(m.latency_us.unwrap() > 0.0);
    assert!(m.throughput_per_ms.unwrap() > 0.0);
    assert!(m.kernel_mem_bw_mb_s.unwrap() > 0.0);
    assert_eq!(m.kernel_mem_rw_pass, Some(true));
}

#[test]
fn clock_out_of_tolerance_skips_kernel_tests() {
    init_tracing();
    let mut q = SoftwareQueue::small_board();
    let ctx = BoardContext::from_queue(&q);
    let report = suite::run(&mut q, &ctx, &fmax(450.0), Selection::All, &SuiteConfig::default())
        .unwrap();

    assert_eq!(report.outcomes[0].verdict, Some(Verdict::Pass));
    assert_eq!(report.outcomes[1].verdict, Some(Verdict::FAIL));
    for o in &report.outcomes[2..] {
        assert_eq!(o.verdict, None, "{}", o.test);
    }
    assert!(report.launch.is_none() && report.mem_bw.is_none());
    assert_eq!(report.exit_code(), 1);

    let m = report.metrics();
    assert!(m.kernel_freq_mhz.is_some());
    assert!(m.latency_us.is_none() && m.kernel_mem_rw_pass.is_none());
}

#[test]
fn report_check_off_ignores_missing_reports() {
    let mut q = SoftwareQueue::small_board();
    let ctx = BoardContext::from_queue(&q).with_report_check(false);
    let report = suite::run(
        &mut q,
        &ctx,
        &StaticBoardSpec::default(),
        Selection::Only(TestId::KernelMemRw),
        &SuiteConfig::default(),
    )
    .unwrap();

    let run: Vec<_> = report.outcomes.iter().map(|o| o.test).collect();
    assert_eq!(run, vec![TestId::ClockFrequency, TestId::KernelMemRw]);
    assert!(report.passed());
    assert!(report.host_speed.is_none());
}

#[test]
fn single_kernel_test_is_gated_by_missing_report() {
    let mut q = SoftwareQueue::small_board();
    let ctx = BoardContext::from_queue(&q);
    let dir = tempfile::tempdir().unwrap();
    let spec = FileBoardSpec::new(dir.path());
    let report = suite::run(
        &mut q,
        &ctx,
        &spec,
        Selection::Only(TestId::KernelLatency),
        &SuiteConfig::default(),
    )
    .unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[1].verdict, None);
    assert!(report.clock.as_ref().unwrap().lookup_error.is_some());
    assert!(report.latency.is_none());
}

#[test]
fn compiled_fmax_read_from_project_reports() {
    let dir = tempfile::tempdir().unwrap();
    let json = dir.path().join("board_test.prj/reports/lib/json");
    fs::create_dir_all(&json).unwrap();
    fs::write(
        json.join("quartus.json"),
        r#"{"quartusFitClockSummary": {"nodes": [{"name": "Kernel fmax", "kernel clock fmax": "300.0"}]}}"#,
    )
    .unwrap();

    let mut q = SoftwareQueue::small_board();
    let ctx = BoardContext::from_queue(&q);
    let report = suite::run(
        &mut q,
        &ctx,
        &FileBoardSpec::new(dir.path()),
        Selection::Only(TestId::KernelLaunch),
        &SuiteConfig::default(),
    )
    .unwrap();

    assert!(report.passed(), "{:?}", report.outcomes);
    assert_eq!(report.clock.as_ref().unwrap().compiled_mhz, Some(300.0));
    assert_eq!(report.launch.unwrap().received, 0xDEAD_1234);
}

#[test]
fn corrupted_read_back_fails_test_one_and_skips_sweep() {
    let mut q = SoftwareQueue::small_board().with_read_fault(ReadFault {
        byte_offset: 4096,
        xor: 0x80,
    });
    let ctx = BoardContext::from_queue(&q);
    let report = suite::run(
        &mut q,
        &ctx,
        &fmax(300.0),
        Selection::Only(TestId::HostSpeed),
        &SuiteConfig::default(),
    )
    .unwrap();

    assert_eq!(report.outcomes[0].verdict, Some(Verdict::FAIL));
    assert_eq!(report.global_mem.as_ref().unwrap().tally.errors, 1);
    assert_eq!(report.host_speed.as_ref().unwrap().verdict, None);
    assert!(report.metrics().h2d_write_mb_s.is_none());
    assert_eq!(report.exit_code(), 1);
}
