// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel-to-kernel handshake
//!
//! A sender program writes a known token into a capacity-1 pipe; a receiver
//! program reads it and stores it in device memory. Both are launched before
//! either is waited on, so the pipe is the only thing ordering them. The
//! host reads the stored token back and compares.

use crate::context::{with_region, Verdict};
use crate::error::Result;
use fpga_chip::limits::launch;
use fpga_driver::{DeviceQueue, Kernel, PipeId};
use tracing::{error, info};

/// Probe parameters.
#[derive(Debug, Clone, Copy)]
pub struct LaunchConfig {
    /// Token sent through the pipe
    pub value: u32,
    /// Pipe connecting sender and receiver
    pub pipe: PipeId,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            value: launch::TEST_VALUE,
            pipe: PipeId(0),
        }
    }
}

/// Probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchReport {
    /// Pass iff the token arrived intact
    pub verdict: Verdict,
    /// Token sent
    pub expected: u32,
    /// Token stored by the receiver
    pub received: u32,
}

/// Run the handshake.
///
/// # Errors
///
/// Returns error if the channel faults, including a deadlock between the
/// two programs.
pub fn run(queue: &mut dyn DeviceQueue, cfg: &LaunchConfig) -> Result<LaunchReport> {
    with_region(queue, 4, None, |q, cell| {
        let e = q.copy_to_device(&0u32.to_le_bytes(), cell, 0)?;
        q.wait(e)?;

        info!("launching sender and receiver");
        let sender = q.launch(&Kernel::PipeWrite {
            pipe: cfg.pipe,
            value: cfg.value,
        })?;
        let receiver = q.launch(&Kernel::PipeRead {
            pipe: cfg.pipe,
            dest: cell,
            index: 0,
        })?;
        q.wait(sender)?;
        q.wait(receiver)?;

        let mut raw = [0u8; 4];
        let e = q.copy_from_device(cell, 0, &mut raw)?;
        q.wait(e)?;
        let received = u32::from_le_bytes(raw);

        let verdict = Verdict::from_pass(received == cfg.value);
        if verdict.passed() {
            info!("handshake token {received:#010x} received");
        } else {
            error!("handshake sent {:#010x}, received {received:#010x}", cfg.value);
        }
        Ok(LaunchReport {
            verdict,
            expected: cfg.value,
            received,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpga_driver::SoftwareQueue;

    #[test]
    fn token_arrives_on_every_repeat() {
        let mut q = SoftwareQueue::small_board();
        for _ in 0..5 {
            let report = run(&mut q, &LaunchConfig::default()).unwrap();
            assert_eq!(report.received, 0xDEAD_1234);
            assert!(report.verdict.passed());
        }
        assert_eq!(q.allocated_bytes(), 0);
        assert_eq!(q.pending_launches(), 0);
    }

    #[test]
    fn corrupted_token_fails() {
        let mut q = SoftwareQueue::small_board().with_pipe_fault(0x0000_0100);
        let report = run(&mut q, &LaunchConfig::default()).unwrap();
        assert_eq!(report.verdict, Verdict::FAIL);
        assert_eq!(report.received, 0xDEAD_1334);
    }
}
