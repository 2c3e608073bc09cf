// SPDX-License-Identifier: AGPL-3.0-only

//! Device access layer for FPGA board qualification.
//!
//! Everything the probes need from an accelerator goes through one trait,
//! [`DeviceQueue`]: device memory, copies, program launches, completion and
//! profiling timestamps. The crate also resolves the board specification
//! (compiled kernel clock, global memory topology) and ships a simulated
//! board so the whole harness runs without hardware.
//!
//! # Quick start
//!
//! ```
//! use fpga_driver::{DeviceQueue, SoftwareQueue};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut q = SoftwareQueue::small_board();
//! let buf = q.alloc(4096, None)?;
//! let ev = q.copy_to_device(&[0xA5; 4096], buf, 0)?;
//! let ts = q.wait(ev)?;
//! println!("4 KB in {} ns", ts.sub_exec_ns());
//! q.release(buf)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | `queue` | [`DeviceQueue`], buffer/event handles, channels |
//! | `timing` | [`OpTimestamps`], batch spans |
//! | `kernel` | [`Kernel`] launches and [`AccessPattern`] |
//! | [`board_spec`] | [`BoardSpecProvider`], report and `board_spec.xml` lookup |
//! | [`backends`] | [`SoftwareQueue`] |

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod backends;
pub mod board_spec;
mod capabilities;
mod error;
mod kernel;
mod queue;
mod timing;

pub use backends::{simulated_capabilities, ReadFault, SimTiming, SoftwareQueue};
pub use board_spec::{BoardSpecProvider, FileBoardSpec, SpecLookupError, StaticBoardSpec};
pub use capabilities::DeviceCapabilities;
pub use error::{DriverError, Result};
pub use kernel::{AccessPattern, Kernel, PipeId, WorkGrid};
pub use queue::{BackendType, BufferId, DeviceQueue, Event, MemChannel};
pub use timing::{span_ns, total_ns, OpTimestamps};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        AccessPattern, BoardSpecProvider, BufferId, DeviceCapabilities, DeviceQueue, DriverError,
        Event, Kernel, MemChannel, OpTimestamps, Result, SoftwareQueue, WorkGrid,
    };
}
