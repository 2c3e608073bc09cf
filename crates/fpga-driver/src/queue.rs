// SPDX-License-Identifier: AGPL-3.0-only

//! Device execution channel abstraction
//!
//! One trait covers everything the board test needs from an accelerator
//! connection: device memory, data movement, program launch, completion and
//! profiling. Probes are written against the trait, so the same code runs on
//! a hardware queue or on the [`SoftwareQueue`](crate::SoftwareQueue).

use crate::capabilities::DeviceCapabilities;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::timing::OpTimestamps;
use std::fmt::Debug;

/// Device execution channel
///
/// Operations may execute out of order relative to each other on the
/// device; the host orders dependent operations with explicit waits.
/// Host slices passed to copies are only borrowed for the duration of the
/// call, so copies complete their host-side access before returning.
pub trait DeviceQueue: Debug {
    /// Capabilities discovered when the connection was opened
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Allocate a device region of `bytes`, optionally pinned to a memory
    /// channel (1-based)
    ///
    /// # Errors
    ///
    /// Returns error if the size exceeds the maximum allocation, the device
    /// is out of memory, or the channel does not exist.
    fn alloc(&mut self, bytes: usize, channel: Option<MemChannel>) -> Result<BufferId>;

    /// Release a device region
    ///
    /// # Errors
    ///
    /// Returns error if the buffer is unknown.
    fn release(&mut self, buffer: BufferId) -> Result<()>;

    /// Copy `src` to `dst` at byte offset `dst_offset`
    ///
    /// # Errors
    ///
    /// Returns error if the range falls outside the buffer.
    fn copy_to_device(&mut self, src: &[u8], dst: BufferId, dst_offset: usize) -> Result<Event>;

    /// Copy `dst.len()` bytes from `src` at byte offset `src_offset` into `dst`
    ///
    /// # Errors
    ///
    /// Returns error if the range falls outside the buffer.
    fn copy_from_device(&mut self, src: BufferId, src_offset: usize, dst: &mut [u8])
        -> Result<Event>;

    /// Launch a device program
    ///
    /// # Errors
    ///
    /// Returns error if the program arguments are invalid.
    fn launch(&mut self, kernel: &Kernel) -> Result<Event>;

    /// Block until `event` completes and return its profiling timestamps
    ///
    /// # Errors
    ///
    /// Returns error if the event is unknown or can never complete.
    fn wait(&mut self, event: Event) -> Result<OpTimestamps>;

    /// Block until every submitted operation completes
    ///
    /// # Errors
    ///
    /// Returns error if an outstanding operation can never complete.
    fn wait_all(&mut self) -> Result<()>;

    /// Profiling timestamps of a completed event
    ///
    /// # Errors
    ///
    /// Returns error if the event is unknown or still outstanding.
    fn profile(&self, event: Event) -> Result<OpTimestamps>;

    /// Backend type for reporting
    fn backend_type(&self) -> BackendType;
}

/// Device buffer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u32);

impl BufferId {
    /// Create buffer handle
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get buffer ID
    pub const fn id(&self) -> u32 {
        self.0
    }
}

/// Operation handle returned by every submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Event(u64);

impl Event {
    /// Create event handle
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get event ID
    pub const fn id(&self) -> u64 {
        self.0
    }
}

/// Memory channel (bank) selector, 1-based as in the board specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemChannel(pub usize);

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Physical accelerator behind a vendor runtime
    Hardware,

    /// Simulated accelerator with deterministic timing
    Software,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hardware => write!(f, "Hardware"),
            Self::Software => write!(f, "Software (simulated board)"),
        }
    }
}
