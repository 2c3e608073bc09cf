// SPDX-License-Identifier: AGPL-3.0-only

//! Device execution channel implementations
//!
//! - **Software**: simulated board with deterministic timing (CI, fault drills)
//!
//! A hardware queue wraps a vendor runtime and implements
//! [`DeviceQueue`](crate::DeviceQueue) outside this crate.

mod dataflow;
pub mod software;

pub use software::{simulated_capabilities, ReadFault, SimTiming, SoftwareQueue};
