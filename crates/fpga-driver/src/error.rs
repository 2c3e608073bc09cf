// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for device execution channel operations

use thiserror::Error;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors raised by a device execution channel
#[derive(Debug, Error)]
pub enum DriverError {
    /// Allocation larger than the device's maximum single allocation
    #[error("Allocation of {requested} bytes exceeds device limit of {limit} bytes")]
    AllocationTooLarge {
        /// Requested size in bytes
        requested: usize,
        /// Maximum single allocation in bytes
        limit: usize,
    },

    /// Device global memory exhausted
    #[error("Out of device memory: {requested} bytes requested, {available} bytes free")]
    OutOfDeviceMemory {
        /// Requested size in bytes
        requested: usize,
        /// Bytes still free on the device
        available: usize,
    },

    /// Memory channel not present on this board
    #[error("Memory channel {channel} not available (board has {count})")]
    InvalidChannel {
        /// Requested channel (1-based)
        channel: usize,
        /// Channels present
        count: usize,
    },

    /// Buffer handle does not refer to a live allocation
    #[error("Unknown device buffer {0}")]
    UnknownBuffer(u32),

    /// Event handle was never issued by this queue
    #[error("Unknown event {0}")]
    UnknownEvent(u64),

    /// Access outside a device buffer
    #[error("Access [{offset}, {offset}+{len}) outside buffer {buffer} of {size} bytes")]
    OutOfBounds {
        /// Buffer handle
        buffer: u32,
        /// Start offset in bytes
        offset: usize,
        /// Length in bytes
        len: usize,
        /// Buffer size in bytes
        size: usize,
    },

    /// Profiling requested for an operation that has not completed
    #[error("Event {0} has not completed")]
    NotComplete(u64),

    /// Device programs blocked on each other with nothing left to unblock them
    #[error("Device deadlock: {pending} program(s) can never make progress")]
    Deadlock {
        /// Programs still pending
        pending: usize,
    },

    /// Device program rejected at launch
    #[error("Invalid launch: {reason}")]
    InvalidLaunch {
        /// Reason for rejection
        reason: String,
    },
}

impl DriverError {
    /// Create an invalid launch error
    pub fn invalid_launch(reason: impl Into<String>) -> Self {
        Self::InvalidLaunch {
            reason: reason.into(),
        }
    }
}
