// SPDX-License-Identifier: AGPL-3.0-only

//! Device-side semantics of the bitstream's data-moving kernels.

use crate::kernel::{AccessPattern, PipeId};
use std::collections::HashMap;

/// Capacity-1 inter-kernel pipes.
#[derive(Debug, Default)]
pub(crate) struct PipeSlots {
    slots: HashMap<PipeId, u32>,
}

impl PipeSlots {
    /// Non-blocking write; `None` while the pipe is full.
    pub(crate) fn try_write(&mut self, pipe: PipeId, value: u32) -> Option<()> {
        if self.slots.contains_key(&pipe) {
            return None;
        }
        self.slots.insert(pipe, value);
        Some(())
    }

    /// Non-blocking read; `None` while the pipe is empty.
    pub(crate) fn try_read(&mut self, pipe: PipeId) -> Option<u32> {
        self.slots.remove(&pipe)
    }
}

/// Apply a streaming kernel to little-endian 32-bit elements of `mem`.
///
/// Work item `gid` touches element `offset + gid`; items with
/// `gid >= len` are padding and do nothing.
pub(crate) fn run_stream(
    pattern: AccessPattern,
    mem: &mut [u8],
    offset: usize,
    len: usize,
    global: usize,
) {
    let active = len.min(global);
    let range = &mut mem[offset * 4..(offset + active) * 4];
    match pattern {
        AccessPattern::Read => {}
        AccessPattern::Write => {
            for (gid, word) in range.chunks_exact_mut(4).enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                let value = gid as u32;
                word.copy_from_slice(&value.to_le_bytes());
            }
        }
        AccessPattern::ReadWrite => {
            for word in range.chunks_exact_mut(4) {
                let v = u32::from_le_bytes([word[0], word[1], word[2], word[3]])
                    .wrapping_add(AccessPattern::READ_WRITE_INCREMENT);
                word.copy_from_slice(&v.to_le_bytes());
            }
        }
    }
}
