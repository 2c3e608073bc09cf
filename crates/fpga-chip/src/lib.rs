// SPDX-License-Identifier: AGPL-3.0-only

//! Board model for FPGA accelerator qualification.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the board under test: size units, the fixed parameters of
//! every qualification probe, and the global-memory topology record that a
//! vendor board specification describes.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`units`] | KB/MB/GB constants, MB/s and MHz conversions from nanosecond counters |
//! | [`limits`] | Fixed sizes, offsets, sentinels and tolerances of each probe |
//! | [`topology`] | Global memory topology (channel count, per-channel bandwidth) |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod limits;
pub mod topology;
pub mod units;

pub use topology::{BoardTopology, MemInterface, DEFAULT_CHANNEL_COUNT};
