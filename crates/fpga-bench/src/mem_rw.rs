// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel-to-memory read/write
//!
//! The host fills the maximum allocation with 32-bit elements equal to
//! their index, a read-modify-write program adds two to every element, and
//! the host reads everything back. Large regions are handled in segments so
//! each launch covers at most one segment of elements.

use crate::chunked::{read_chunked, write_chunked, Chunk};
use crate::context::{with_region, BoardContext, Mismatch, Verdict};
use crate::error::Result;
use crate::staging::StagingBuffer;
use fpga_chip::limits::mem_rw;
use fpga_driver::{AccessPattern, DeviceQueue, Kernel, WorkGrid};
use tracing::{error, info};

const ELEM: usize = std::mem::size_of::<u32>();

/// Test parameters.
#[derive(Debug, Clone, Copy)]
pub struct MemRwConfig {
    /// Elements per write segment and per launch
    pub segment_elems: usize,
}

impl Default for MemRwConfig {
    fn default() -> Self {
        Self {
            segment_elems: mem_rw::SEGMENT_ELEMS,
        }
    }
}

/// Test result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemRwReport {
    /// Pass iff every element read back incremented
    pub verdict: Verdict,
    /// Elements in the device region
    pub elements: usize,
    /// Launches issued
    pub segments: usize,
    /// First element that read back wrong
    pub first_mismatch: Option<Mismatch>,
}

/// Elements held by the host staging vectors: the whole region, or one
/// segment's worth when the count exceeds `i32::MAX`.
fn host_elems(elements: usize, segment_elems: usize) -> usize {
    if elements > i32::MAX as usize {
        segment_elems.min(elements)
    } else {
        elements
    }
}

fn segments(elements: usize, segment_elems: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..elements)
        .step_by(segment_elems.max(1))
        .map(move |start| (start, segment_elems.min(elements - start)))
}

/// Run the test.
///
/// # Errors
///
/// Returns error if no host staging memory can be obtained or the channel
/// faults.
pub fn run(queue: &mut dyn DeviceQueue, ctx: &BoardContext, cfg: &MemRwConfig) -> Result<MemRwReport> {
    let elements = ctx.caps.max_alloc_bytes / ELEM;
    if elements == 0 {
        error!("device reports no allocatable global memory");
        return Ok(MemRwReport {
            verdict: Verdict::FAIL,
            elements: 0,
            segments: 0,
            first_mismatch: None,
        });
    }
    let bytes = elements * ELEM;
    let host = host_elems(elements, cfg.segment_elems) * ELEM;
    let mut staging = StagingBuffer::allocate(host, host, ELEM, ctx.host_budget)?;
    info!(
        "kernel read/write over {elements} elements, {} segment(s)",
        elements.div_ceil(cfg.segment_elems.max(1))
    );

    with_region(queue, bytes, None, |q, buffer| {
        let fill_index = |chunk: Chunk, host: &mut [u8], base: usize| {
            let first = base + chunk.offset / ELEM;
            for (i, word) in host.chunks_exact_mut(ELEM).enumerate() {
                word.copy_from_slice(&((first + i) as u32).to_le_bytes());
            }
        };

        let mut launched = 0;
        for (start, len) in segments(elements, cfg.segment_elems) {
            write_chunked(q, buffer, start * ELEM, len * ELEM, &mut staging, |c, h| {
                fill_index(c, h, start);
            })?;
            q.launch(&Kernel::Stream {
                pattern: AccessPattern::ReadWrite,
                buffer,
                offset: start,
                len,
                grid: WorkGrid::new(len, 1),
            })?;
            launched += 1;
        }
        q.wait_all()?;

        let mut first_mismatch = None;
        for (start, len) in segments(elements, cfg.segment_elems) {
            read_chunked(q, buffer, start * ELEM, len * ELEM, &mut staging, |c, host| {
                if first_mismatch.is_some() {
                    return;
                }
                let first = start + c.offset / ELEM;
                for (i, word) in host.chunks_exact(ELEM).enumerate() {
                    let expected =
                        ((first + i) as u32).wrapping_add(AccessPattern::READ_WRITE_INCREMENT);
                    let actual = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                    if actual != expected {
                        first_mismatch = Some(Mismatch {
                            index: (first + i) as u64,
                            expected: u64::from(expected),
                            actual: u64::from(actual),
                        });
                        return;
                    }
                }
            })?;
            if first_mismatch.is_some() {
                break;
            }
        }

        if let Some(m) = first_mismatch {
            error!(
                "element {}: expected {:#x}, read {:#x}",
                m.index, m.expected, m.actual
            );
        } else {
            info!("all {elements} elements incremented");
        }
        Ok(MemRwReport {
            verdict: Verdict::from_pass(first_mismatch.is_none()),
            elements,
            segments: launched,
            first_mismatch,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpga_driver::{ReadFault, SoftwareQueue};

    #[test]
    fn segments_cover_region() {
        let segs: Vec<_> = segments(10, 4).collect();
        assert_eq!(segs, vec![(0, 4), (4, 4), (8, 2)]);
        assert_eq!(host_elems(100, 8), 100);
    }

    #[test]
    fn whole_region_incremented() {
        let mut q = SoftwareQueue::small_board();
        let ctx = BoardContext::from_queue(&q);
        let report = run(&mut q, &ctx, &MemRwConfig::default()).unwrap();
        assert!(report.verdict.passed());
        assert_eq!(report.elements, 256 * 1024);
        assert_eq!(report.segments, 1);
    }

    #[test]
    fn multiple_segments_with_small_host_budget() {
        let mut q = SoftwareQueue::small_board();
        let ctx = BoardContext::from_queue(&q).with_host_budget(40_000);
        let cfg = MemRwConfig { segment_elems: 100_000 };
        let report = run(&mut q, &ctx, &cfg).unwrap();
        assert!(report.verdict.passed());
        assert_eq!(report.segments, 3);
        assert_eq!(q.allocated_bytes(), 0);
    }

    #[test]
    fn device_program_applies_the_verified_increment() {
        let mut q = SoftwareQueue::small_board();
        let buffer = q.alloc(16, None).unwrap();
        let e = q.copy_to_device(&[0u8; 16], buffer, 0).unwrap();
        q.wait(e).unwrap();
        let e = q
            .launch(&Kernel::Stream {
                pattern: AccessPattern::ReadWrite,
                buffer,
                offset: 0,
                len: 4,
                grid: WorkGrid::new(4, 1),
            })
            .unwrap();
        q.wait(e).unwrap();
        let mut back = [0u8; 16];
        let e = q.copy_from_device(buffer, 0, &mut back).unwrap();
        q.wait(e).unwrap();
        for word in back.chunks_exact(4) {
            let v = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            assert_eq!(v, AccessPattern::READ_WRITE_INCREMENT);
        }
        q.release(buffer).unwrap();
    }

    #[test]
    fn first_mismatch_stops_verification() {
        let mut q = SoftwareQueue::small_board()
            .with_read_fault(ReadFault { byte_offset: 4 * 77, xor: 0x04 });
        let ctx = BoardContext::from_queue(&q);
        let report = run(&mut q, &ctx, &MemRwConfig::default()).unwrap();
        assert_eq!(report.verdict, Verdict::FAIL);
        assert_eq!(
            report.first_mismatch,
            Some(Mismatch { index: 77, expected: 79, actual: 79 ^ 0x04 })
        );
    }
}
