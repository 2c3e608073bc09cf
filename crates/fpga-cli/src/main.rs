// SPDX-License-Identifier: AGPL-3.0-only

//! `board-test`: qualification suite for FPGA accelerator boards.
//!
//! ```text
//! USAGE:
//!   board-test run [--test <1..6|all>]   Run the suite (default: all)
//!   board-test tests [--details]         List the tests
//!   board-test info                      Board capabilities and compile reports
//! ```
//!
//! Runs against the simulated board; its geometry and kernel clock are set
//! with the `--sim-*` flags.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use fpga_bench::{
    suite, BoardContext, MetricsSummary, Selection, SuiteConfig, SuiteReport, TestId,
};
use fpga_chip::units::MB;
use fpga_driver::{
    simulated_capabilities, BoardSpecProvider, DeviceQueue, FileBoardSpec, SimTiming,
    SoftwareQueue,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "board-test", about = "FPGA board qualification suite", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run all tests or a single one.
    Run {
        /// Test number 1-6, or "all".
        #[arg(long = "test", default_value = "all", value_parser = parse_selection)]
        selection: Selection,
        /// Do not consult compile reports; the clock test only measures.
        #[arg(long)]
        no_report_check: bool,
        /// Seed for host-side random test data.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[command(flatten)]
        board: BoardArgs,
    },
    /// List the tests.
    Tests {
        /// Describe what each test does.
        #[arg(long)]
        details: bool,
    },
    /// Print board capabilities and what the compile reports say.
    Info {
        #[command(flatten)]
        board: BoardArgs,
    },
}

#[derive(Args)]
struct BoardArgs {
    /// Directory holding reports/lib/json or board_test.prj/reports/lib/json.
    #[arg(long, default_value = ".")]
    reports_dir: PathBuf,
    /// Board support package root with hardware/*/board_spec.xml
    /// (default: $OFS_OCL_SHIM_ROOT_HW).
    #[arg(long)]
    shim_root: Option<PathBuf>,
    /// Simulated global memory, MB.
    #[arg(long, default_value_t = 64)]
    sim_global_mem_mb: usize,
    /// Simulated largest single allocation, MB.
    #[arg(long, default_value_t = 16)]
    sim_max_alloc_mb: usize,
    /// Simulated memory channels.
    #[arg(long, default_value_t = 4)]
    sim_channels: usize,
    /// Simulated kernel clock, MHz.
    #[arg(long, default_value_t = 300.0)]
    sim_fmax_mhz: f64,
}

impl BoardArgs {
    fn queue(&self) -> Result<SoftwareQueue> {
        let global = self
            .sim_global_mem_mb
            .checked_mul(MB)
            .context("--sim-global-mem-mb too large")?;
        let max_alloc = self
            .sim_max_alloc_mb
            .checked_mul(MB)
            .context("--sim-max-alloc-mb too large")?;
        if max_alloc > global {
            bail!("maximum allocation ({max_alloc} B) exceeds global memory ({global} B)");
        }
        if !(self.sim_fmax_mhz.is_finite() && self.sim_fmax_mhz > 0.0) {
            bail!("--sim-fmax-mhz must be positive, got {}", self.sim_fmax_mhz);
        }
        let timing = SimTiming {
            kernel_clock_mhz: self.sim_fmax_mhz,
            ..SimTiming::default()
        };
        Ok(SoftwareQueue::new(simulated_capabilities(global, max_alloc, self.sim_channels))
            .with_timing(timing))
    }

    fn board_spec(&self) -> FileBoardSpec {
        let spec = FileBoardSpec::from_env(self.reports_dir.clone());
        match &self.shim_root {
            Some(root) => spec.with_shim_root(Some(root.clone())),
            None => spec,
        }
    }
}

fn parse_selection(s: &str) -> Result<Selection, String> {
    if s.eq_ignore_ascii_case("all") {
        return Ok(Selection::All);
    }
    s.parse::<u8>()
        .ok()
        .and_then(TestId::from_number)
        .map(Selection::Only)
        .ok_or_else(|| format!("expected a test number 1-6 or \"all\", got {s:?}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Run {
            selection,
            no_report_check,
            seed,
            board,
        } => {
            let code = cmd_run(selection, !no_report_check, seed, &board)?;
            std::process::exit(code);
        }
        Cmd::Tests { details } => cmd_tests(details),
        Cmd::Info { board } => cmd_info(&board)?,
    }

    Ok(())
}

fn cmd_run(selection: Selection, report_check: bool, seed: u64, board: &BoardArgs) -> Result<i32> {
    let mut queue = board.queue()?;
    let spec = board.board_spec();
    let ctx = BoardContext::from_queue(&queue)
        .with_report_check(report_check)
        .with_seed(seed);

    println!("Board        : {} [{}]", ctx.caps.name, queue.backend_type());
    println!("Global memory: {} MB", ctx.caps.global_mem_mb());
    println!("Max alloc    : {} MB", ctx.caps.max_alloc_bytes / MB);
    println!("Channels     : {}", ctx.caps.mem_channels);
    println!("Report check : {}", if report_check { "on" } else { "off" });
    println!();

    let report = suite::run(&mut queue, &ctx, &spec, selection, &SuiteConfig::default())
        .context("board test aborted")?;

    print_sweep(&report);
    print_banks(&report);
    print_outcomes(&report);
    print_metrics(&report.metrics());

    let code = report.exit_code();
    if code == 0 {
        println!("\nBOARD TEST PASSED");
    } else {
        println!("\nBOARD TEST FAILED (exit {code})");
    }
    Ok(code)
}

fn print_sweep(report: &SuiteReport) {
    let Some(hs) = report.host_speed.as_ref().filter(|r| r.verdict.is_some()) else {
        return;
    };
    println!("Host speed sweep (MB/s)");
    println!(
        "  {:>9}  {:>10} {:>10} {:>10} {:>10}   {:>10} {:>10} {:>10} {:>10}",
        "block KB", "wr avg", "wr max", "wr min", "wr e2e", "rd avg", "rd max", "rd min", "rd e2e"
    );
    for (w, r) in hs.write.iter().zip(&hs.read) {
        println!(
            "  {:>9}  {:>10.1} {:>10.1} {:>10.1} {:>10.1}   {:>10.1} {:>10.1} {:>10.1} {:>10.1}",
            w.block_bytes / 1024,
            w.average,
            w.fastest,
            w.slowest,
            w.end_to_end,
            r.average,
            r.fastest,
            r.slowest,
            r.end_to_end
        );
    }
    println!();
}

fn print_banks(report: &SuiteReport) {
    let Some(bw) = report.mem_bw.as_ref().filter(|r| !r.samples.is_empty()) else {
        return;
    };
    println!(
        "Kernel-to-memory bandwidth ({} banks, {} KB per bank)",
        bw.banks,
        bw.bytes / 1024
    );
    for s in &bw.samples {
        println!(
            "  {:<10} bank {:>2}  channel {:>2}  {:>10.1} MB/s",
            s.pattern.to_string(),
            s.bank,
            s.channel,
            s.rate_mb_s
        );
    }
    match bw.utilization_pct() {
        Some(pct) => println!("  utilization {pct:.1}% of theoretical"),
        None => println!("  utilization unknown (no board specification)"),
    }
    println!();
}

fn print_outcomes(report: &SuiteReport) {
    println!("Results");
    for o in &report.outcomes {
        let status = match o.verdict {
            Some(v) if v.passed() => "✓ PASS".to_string(),
            Some(v) => format!("✗ FAIL ({})", v.exit_code()),
            None => "- NOT RUN".to_string(),
        };
        println!("  {status:<12} {}", o.test);
    }
}

fn print_metrics(m: &MetricsSummary) {
    fn row(label: &str, value: Option<f64>, unit: &str) {
        if let Some(v) = value {
            println!("  {label:<26}: {v:.2} {unit}");
        }
    }
    fn flag(label: &str, value: Option<bool>) {
        if let Some(ok) = value {
            println!("  {label:<26}: {}", if ok { "PASS" } else { "FAIL" });
        }
    }

    println!("\nMetrics");
    row("Host → device write", m.h2d_write_mb_s, "MB/s");
    row("Device → host read", m.h2d_read_mb_s, "MB/s");
    row("Host ↔ device combined", m.h2d_combined_mb_s, "MB/s");
    flag("Host read/write", m.host_rw_pass);
    row("Kernel clock", m.kernel_freq_mhz, "MHz");
    row("Kernel launch latency", m.latency_us, "µs");
    row("Kernel launch throughput", m.throughput_per_ms, "launches/ms");
    row("Kernel-to-memory bandwidth", m.kernel_mem_bw_mb_s, "MB/s");
    flag("Kernel-to-memory read/write", m.kernel_mem_rw_pass);
}

fn cmd_tests(details: bool) {
    for t in TestId::ALL {
        println!("{t}");
        if details {
            println!("   {}\n", t.description());
        }
    }
    if !details {
        println!("\nRun one with `board-test run --test <N>`; omit --test to run all.");
    }
}

fn cmd_info(board: &BoardArgs) -> Result<()> {
    let queue = board.queue()?;
    let spec = board.board_spec();
    let ctx = BoardContext::from_queue(&queue);

    println!("Board          : {}", ctx.caps.name);
    println!("Backend        : {}", queue.backend_type());
    println!("Global memory  : {} MB", ctx.caps.global_mem_mb());
    println!("Max allocation : {} MB", ctx.caps.max_alloc_bytes / MB);
    println!("Channels       : {}", ctx.caps.mem_channels);

    match spec.compiled_fmax_mhz() {
        Ok(f) => println!("Compiled fmax  : {f:.2} MHz"),
        Err(e) => println!("Compiled fmax  : (unavailable: {e})"),
    }
    match spec.topology() {
        Ok(t) => {
            println!(
                "Global memory  : {} ({} interfaces, {:.0} MB/s)",
                t.memory_name.as_deref().unwrap_or("unnamed"),
                t.channel_count(),
                t.max_bandwidth_mb_s
            );
            for (i, iface) in t.interfaces.iter().enumerate() {
                println!("  [{i}] address {:#x}  size {} MB", iface.address, iface.size >> 20);
            }
        }
        Err(e) => println!("Topology       : (unavailable: {e})"),
    }
    Ok(())
}
