// SPDX-License-Identifier: AGPL-3.0-only

//! Unaligned host read/write stress
//!
//! Every transfer length from one byte up to the maximum goes host → device
//! → host through host windows that start at odd offsets and a device region
//! of odd size. Each host window is framed by sentinel guard bytes:
//!
//! ```text
//! [ guard × pad ][ window: max bytes ............ ][ guard × pad ]
//!                 ^ data[0..len]  ^ guard checked from len
//! ```
//!
//! A data mismatch fails the probe. A guard overwritten by a copy means the
//! transfer engine wrote outside its bounds and host memory can no longer
//! be trusted, so the probe panics.

use crate::context::{with_region, BoardContext, Verdict};
use crate::error::{BenchError, Result};
use fpga_chip::limits::host_rw;
use fpga_driver::DeviceQueue;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{error, info};

/// Host buffer with sentinel-filled guard regions around a window.
#[derive(Debug, Clone)]
pub struct PaddedBuffer {
    data: Vec<u8>,
    pad: usize,
    capacity: usize,
    sentinel: u8,
}

impl PaddedBuffer {
    /// Window of `capacity` bytes framed by `pad` guard bytes on each side,
    /// everything initialised to `sentinel`.
    pub fn new(capacity: usize, pad: usize, sentinel: u8) -> Self {
        Self {
            data: vec![sentinel; pad + capacity + pad],
            pad,
            capacity,
            sentinel,
        }
    }

    /// Largest window length.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// First `len` bytes of the window.
    pub fn window(&self, len: usize) -> &[u8] {
        &self.data[self.pad..self.pad + len]
    }

    /// First `len` bytes of the window, mutable.
    pub fn window_mut(&mut self, len: usize) -> &mut [u8] {
        &mut self.data[self.pad..self.pad + len]
    }

    /// Guard before the window.
    pub fn leading_guard(&self) -> &[u8] {
        &self.data[..self.pad]
    }

    /// `pad` bytes starting right after a `len`-byte window.
    pub fn trailing_guard(&self, len: usize) -> &[u8] {
        let start = self.pad + len;
        &self.data[start..start + self.pad]
    }

    /// Whether both guards around a `len`-byte window still hold the
    /// sentinel.
    pub fn guards_intact(&self, len: usize) -> bool {
        let s = self.sentinel;
        self.leading_guard().iter().all(|&b| b == s)
            && self.trailing_guard(len).iter().all(|&b| b == s)
    }
}

/// Stress parameters.
#[derive(Debug, Clone, Copy)]
pub struct HostRwConfig {
    /// Longest transfer, bytes
    pub max_bytes: usize,
    /// Device region is `max_bytes + device_slack` bytes
    pub device_slack: usize,
    /// Byte offset into the device region
    pub device_offset: usize,
    /// Guard size and misalignment of the write buffer
    pub write_pad: usize,
    /// Guard size and misalignment of the read-back buffer
    pub read_pad: usize,
    /// Write buffer sentinel
    pub write_sentinel: u8,
    /// Read-back buffer sentinel
    pub read_sentinel: u8,
}

impl Default for HostRwConfig {
    fn default() -> Self {
        Self {
            max_bytes: host_rw::MAX_BYTES,
            device_slack: host_rw::DEVICE_SLACK,
            device_offset: 0,
            write_pad: host_rw::HOST_IN_OFFSET,
            read_pad: host_rw::HOST_RD_OFFSET,
            write_sentinel: host_rw::WRITE_SENTINEL,
            read_sentinel: host_rw::READ_SENTINEL,
        }
    }
}

/// Stress result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRwReport {
    /// Fails on the first length that did not round-trip
    pub verdict: Verdict,
    /// Lengths that round-tripped
    pub lengths_passed: usize,
    /// Length that failed, if any
    pub failed_length: Option<usize>,
}

/// Run the stress.
///
/// # Panics
///
/// Panics if a copy overwrote a guard byte.
///
/// # Errors
///
/// Returns error if the device offset does not fit the region, or the
/// channel faults.
pub fn run(
    queue: &mut dyn DeviceQueue,
    ctx: &BoardContext,
    cfg: &HostRwConfig,
) -> Result<HostRwReport> {
    let region = cfg.max_bytes + cfg.device_slack;
    if cfg.device_offset + cfg.max_bytes > region {
        return Err(BenchError::invalid_config(format!(
            "device offset {} + {} bytes exceeds the {region}-byte region",
            cfg.device_offset, cfg.max_bytes
        )));
    }
    info!(
        "unaligned read/write: lengths 1..={}, device offset {}",
        cfg.max_bytes, cfg.device_offset
    );

    let mut rng = ChaCha8Rng::seed_from_u64(ctx.seed);
    let mut host_in = PaddedBuffer::new(cfg.max_bytes, cfg.write_pad, cfg.write_sentinel);
    let mut host_rd = PaddedBuffer::new(cfg.max_bytes, cfg.read_pad, cfg.read_sentinel);

    with_region(queue, region, None, |q, buffer| {
        for len in 1..=cfg.max_bytes {
            rng.fill_bytes(host_in.window_mut(len));

            let e = q.copy_to_device(host_in.window(len), buffer, cfg.device_offset)?;
            q.wait(e)?;
            let e = q.copy_from_device(buffer, cfg.device_offset, host_rd.window_mut(len))?;
            q.wait(e)?;

            let mut mismatched = false;
            for (j, (w, r)) in host_in.window(len).iter().zip(host_rd.window(len)).enumerate() {
                if w != r {
                    error!("length {len}: byte {j} wrote {w:#04x}, read {r:#04x}");
                    mismatched = true;
                }
            }
            if mismatched {
                return Ok(HostRwReport {
                    verdict: Verdict::FAIL,
                    lengths_passed: len - 1,
                    failed_length: Some(len),
                });
            }

            assert!(
                host_in.guards_intact(len),
                "write buffer guard overwritten at length {len}"
            );
            assert!(
                host_rd.guards_intact(len),
                "read-back buffer guard overwritten at length {len}"
            );
        }
        info!("all {} lengths round-tripped", cfg.max_bytes);
        Ok(HostRwReport {
            verdict: Verdict::Pass,
            lengths_passed: cfg.max_bytes,
            failed_length: None,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpga_driver::{ReadFault, SoftwareQueue};

    #[test]
    fn padded_buffer_layout() {
        let mut b = PaddedBuffer::new(4, 2, 0xFA);
        b.window_mut(3).copy_from_slice(&[1, 2, 3]);
        assert_eq!(b.window(3), &[1, 2, 3]);
        assert_eq!(b.leading_guard(), &[0xFA, 0xFA]);
        assert_eq!(b.trailing_guard(3), &[0xFA, 0xFA]);
        assert!(b.guards_intact(3));
        assert!(!b.guards_intact(2));
        assert_eq!(b.capacity(), 4);
    }

    #[test]
    fn every_length_round_trips() {
        let mut q = SoftwareQueue::small_board();
        let ctx = BoardContext::from_queue(&q);
        let report = run(&mut q, &ctx, &HostRwConfig::default()).unwrap();
        assert_eq!(report.verdict, Verdict::Pass);
        assert_eq!(report.lengths_passed, 1024);
        assert_eq!(q.allocated_bytes(), 0);
    }

    #[test]
    fn nonzero_device_offset_within_slack() {
        let mut q = SoftwareQueue::small_board();
        let ctx = BoardContext::from_queue(&q);
        let cfg = HostRwConfig {
            max_bytes: 64,
            device_offset: 3,
            ..HostRwConfig::default()
        };
        assert!(run(&mut q, &ctx, &cfg).unwrap().verdict.passed());

        let bad = HostRwConfig { device_offset: 4, ..cfg };
        assert!(matches!(run(&mut q, &ctx, &bad), Err(BenchError::InvalidConfig { .. })));
    }

    #[test]
    fn corrupted_read_fails_at_first_covering_length() {
        let mut q = SoftwareQueue::small_board().with_read_fault(ReadFault { byte_offset: 9, xor: 0x80 });
        let ctx = BoardContext::from_queue(&q);
        let report = run(&mut q, &ctx, &HostRwConfig::default()).unwrap();
        assert_eq!(report.verdict, Verdict::FAIL);
        assert_eq!(report.failed_length, Some(10));
        assert_eq!(report.lengths_passed, 9);
    }
}
