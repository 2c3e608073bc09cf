// SPDX-License-Identifier: AGPL-3.0-only

//! Measurement and verification engine for FPGA board qualification.
//!
//! Every probe is a free `run` function over a [`DeviceQueue`] and a
//! [`BoardContext`], configured by a `*Config` struct whose `Default` holds
//! the production parameters, and returning a report whose [`Verdict`]
//! decides pass or fail.
//!
//! ```text
//! suite ─┬─ global_mem ──gates──▶ host_speed      (test 1)
//!        ├─ host_rw                                (test 1)
//!        ├─ clock ──gates──▶ launch, latency,      (tests 2–6)
//!        │                   mem_rw, mem_bw
//!        └─ chunked / staging (shared transfer machinery)
//! ```
//!
//! # Example
//!
//! ```
//! use fpga_bench::{suite, BoardContext, Selection, SuiteConfig, TestId};
//! use fpga_driver::{SoftwareQueue, StaticBoardSpec};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut q = SoftwareQueue::small_board();
//! let ctx = BoardContext::from_queue(&q).with_report_check(false);
//! let report = suite::run(
//!     &mut q,
//!     &ctx,
//!     &StaticBoardSpec::default(),
//!     Selection::Only(TestId::KernelLaunch),
//!     &SuiteConfig::default(),
//! )?;
//! assert_eq!(report.exit_code(), 0);
//! # Ok(())
//! # }
//! ```
//!
//! [`DeviceQueue`]: fpga_driver::DeviceQueue

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod chunked;
pub mod clock;
mod context;
mod error;
pub mod global_mem;
pub mod host_rw;
pub mod host_speed;
pub mod latency;
pub mod launch;
pub mod mem_bw;
pub mod mem_rw;
pub mod staging;
pub mod suite;

pub use chunked::{read_chunked, write_chunked, Chunk, TransferPlan, TransferStats};
pub use context::{with_region, BoardContext, Mismatch, Verdict, VerifyTally};
pub use error::{BenchError, Result};
pub use staging::StagingBuffer;
pub use suite::{MetricsSummary, Selection, SuiteConfig, SuiteReport, TestId, TestOutcome};
