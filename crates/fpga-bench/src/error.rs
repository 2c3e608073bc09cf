// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the measurement engine
//!
//! Probe failures (data mismatch, frequency out of tolerance) are reported
//! as [`Verdict`](crate::Verdict) values. These errors mean a measurement
//! could not be taken at all.

use fpga_driver::DriverError;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors that stop a probe before it can produce a verdict
#[derive(Debug, Error)]
pub enum BenchError {
    /// Device execution channel fault
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// No host memory could be obtained, even after halving to one element
    #[error("Host staging allocation failed (requested {requested} bytes)")]
    StagingUnavailable {
        /// Bytes requested before halving
        requested: usize,
    },

    /// Staging buffer of zero bytes for a non-empty transfer
    #[error("Degenerate staging buffer for a {total}-byte transfer")]
    DegenerateStaging {
        /// Bytes to transfer
        total: usize,
    },

    /// Engine configuration inconsistent with the device
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is inconsistent
        reason: String,
    },
}

impl BenchError {
    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
