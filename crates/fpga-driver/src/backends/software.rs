// SPDX-License-Identifier: AGPL-3.0-only

//! Software (simulated board) backend
//!
//! Implements [`DeviceQueue`] with host memory standing in for device
//! global memory and a deterministic device clock standing in for the
//! profiling counters. This enables:
//!
//! 1. **CI without hardware**: every probe runs end to end and its
//!    arithmetic (chunk coverage, rates, frequency, utilization) can be
//!    checked against exact expected values.
//!
//! 2. **Fault drills**: read-back corruption and pipe token corruption can
//!    be injected to prove that each verifier actually detects failures.
//!
//! ## Timing model
//!
//! ```text
//! host clock   ──submit──────────────────────────wait──▶
//! device clock         ├─setup─┤──── duration ────┤
//!                    submit   start              end
//! ```
//!
//! The device executes one operation at a time. A copy takes
//! `bytes / host_link_mb_s` after `copy_setup_ns`; a program takes
//! `work_items / kernel_clock_mhz` (one item per cycle) after
//! `launch_overhead_ns`, or longer when its memory traffic at
//! `mem_channel_mb_s` dominates.
//!
//! ## Execution model
//!
//! Copies run at submission. Programs that cannot make progress (pipe full
//! on write, empty on read) stay pending until a later submission unblocks
//! them; waiting on a program that can never run reports
//! [`DriverError::Deadlock`].

use crate::backends::dataflow::{run_stream, PipeSlots};
use crate::capabilities::DeviceCapabilities;
use crate::error::{DriverError, Result};
use crate::kernel::Kernel;
use crate::queue::{BackendType, BufferId, DeviceQueue, Event, MemChannel};
use crate::timing::OpTimestamps;
use fpga_chip::units::{NS_PER_SEC, MB};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace, warn};

/// Timing parameters of the simulated board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimTiming {
    /// Host link bandwidth for copies, MB/s
    pub host_link_mb_s: f64,
    /// Submission to start of a copy, ns
    pub copy_setup_ns: u64,
    /// Kernel clock, MHz
    pub kernel_clock_mhz: f64,
    /// Submission to start of a program, ns
    pub launch_overhead_ns: u64,
    /// Streaming bandwidth of one memory channel, MB/s
    pub mem_channel_mb_s: f64,
}

impl Default for SimTiming {
    fn default() -> Self {
        Self {
            host_link_mb_s: 6_000.0,
            copy_setup_ns: 2_000,
            kernel_clock_mhz: 300.0,
            launch_overhead_ns: 20_000,
            mem_channel_mb_s: 19_200.0,
        }
    }
}

impl SimTiming {
    /// Zero setup and launch overhead; durations are pure data/cycle time.
    #[must_use]
    pub fn ideal() -> Self {
        Self {
            copy_setup_ns: 0,
            launch_overhead_ns: 0,
            ..Self::default()
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn copy_ns(&self, bytes: usize) -> u64 {
        ((bytes as f64 / MB as f64) / self.host_link_mb_s * NS_PER_SEC).ceil().max(1.0) as u64
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn cycles_ns(&self, cycles: usize) -> u64 {
        (cycles as f64 * 1000.0 / self.kernel_clock_mhz).ceil().max(1.0) as u64
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn traffic_ns(&self, bytes: usize) -> u64 {
        ((bytes as f64 / MB as f64) / self.mem_channel_mb_s * NS_PER_SEC).ceil() as u64
    }
}

/// Corrupt one byte of every read-back that covers `byte_offset`.
///
/// Applies to every buffer; device contents stay intact, only the data
/// delivered to the host is altered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadFault {
    /// Byte offset within a buffer
    pub byte_offset: usize,
    /// Bits flipped in that byte (non-zero)
    pub xor: u8,
}

#[derive(Debug)]
struct SimBuffer {
    data: Vec<u8>,
    channel: usize,
}

#[derive(Debug)]
struct PendingLaunch {
    event: Event,
    kernel: Kernel,
    submit: u64,
}

/// Simulated FPGA board.
#[derive(Debug)]
pub struct SoftwareQueue {
    caps: DeviceCapabilities,
    timing: SimTiming,

    buffers: HashMap<u32, SimBuffer>,
    next_buffer: u32,
    allocated: usize,

    /// Completed timestamps, indexed by event id. One entry (24 bytes) per
    /// operation, kept for the life of the queue so any event can still be
    /// profiled; drop the queue between long runs.
    events: Vec<Option<OpTimestamps>>,
    pending: VecDeque<PendingLaunch>,
    pipes: PipeSlots,

    host_clock: u64,
    device_clock: u64,

    read_fault: Option<ReadFault>,
    pipe_fault: u32,
}

impl SoftwareQueue {
    /// Simulated board with the given capabilities and default timing.
    pub fn new(caps: DeviceCapabilities) -> Self {
        debug!("SoftwareQueue: {caps}");
        Self {
            caps,
            timing: SimTiming::default(),
            buffers: HashMap::new(),
            next_buffer: 0,
            allocated: 0,
            events: Vec::new(),
            pending: VecDeque::new(),
            pipes: PipeSlots::default(),
            host_clock: 0,
            device_clock: 0,
            read_fault: None,
            pipe_fault: 0,
        }
    }

    /// Small board for unit tests: 4 MB global memory, 1 MB maximum
    /// allocation, 4 channels.
    pub fn small_board() -> Self {
        Self::new(simulated_capabilities(4 * MB, MB, 4))
    }

    /// Replace the timing model.
    #[must_use]
    pub fn with_timing(mut self, timing: SimTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Inject a read-back fault.
    #[must_use]
    pub fn with_read_fault(mut self, fault: ReadFault) -> Self {
        self.read_fault = Some(fault);
        self
    }

    /// XOR every token passing through a pipe with `mask`.
    #[must_use]
    pub fn with_pipe_fault(mut self, mask: u32) -> Self {
        self.pipe_fault = mask;
        self
    }

    /// Bytes currently allocated on the device.
    pub const fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    /// Programs submitted but not yet run.
    pub fn pending_launches(&self) -> usize {
        self.pending.len()
    }

    /// Memory channel a buffer is pinned to.
    pub fn buffer_channel(&self, buffer: BufferId) -> Option<usize> {
        self.buffers.get(&buffer.id()).map(|b| b.channel)
    }

    fn buffer(&self, buffer: BufferId) -> Result<&SimBuffer> {
        self.buffers
            .get(&buffer.id())
            .ok_or(DriverError::UnknownBuffer(buffer.id()))
    }

    fn check_range(&self, buffer: BufferId, offset: usize, len: usize) -> Result<()> {
        let size = self.buffer(buffer)?.data.len();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(()),
            _ => Err(DriverError::OutOfBounds {
                buffer: buffer.id(),
                offset,
                len,
                size,
            }),
        }
    }

    fn next_event(&mut self) -> Event {
        let event = Event::new(self.events.len() as u64);
        self.events.push(None);
        event
    }

    /// Place an operation on the device timeline and record its timestamps.
    fn complete(&mut self, event: Event, submit: u64, setup: u64, duration: u64) -> OpTimestamps {
        let start = self.device_clock.max(submit) + setup;
        let end = start + duration;
        self.device_clock = end;
        let ts = OpTimestamps { submit, start, end };
        self.events[event.id() as usize] = Some(ts);
        ts
    }

    fn validate_launch(&self, kernel: &Kernel) -> Result<()> {
        let grid = kernel.grid();
        if grid.global == 0 || !grid.is_uniform() {
            return Err(DriverError::invalid_launch(format!(
                "{}: global size {} not a non-zero multiple of work-group size {}",
                kernel.name(),
                grid.global,
                grid.local
            )));
        }
        match kernel {
            Kernel::PipeRead { dest, index, .. } => self.check_range(*dest, index * 4, 4),
            Kernel::Stream { buffer, offset, len, .. } => {
                self.check_range(*buffer, offset * 4, len * 4)
            }
            Kernel::Nop { .. } | Kernel::SingleTaskNop | Kernel::PipeWrite { .. } => Ok(()),
        }
    }

    /// Run one pending program if it can make progress; returns its
    /// duration in ns.
    fn try_run(&mut self, kernel: &Kernel) -> Option<u64> {
        match kernel {
            Kernel::Nop { grid } => Some(self.timing.cycles_ns(grid.global)),
            Kernel::SingleTaskNop => Some(self.timing.cycles_ns(1)),
            Kernel::PipeWrite { pipe, value } => {
                self.pipes.try_write(*pipe, value ^ self.pipe_fault)?;
                Some(self.timing.cycles_ns(1))
            }
            Kernel::PipeRead { pipe, dest, index } => {
                let value = self.pipes.try_read(*pipe)?;
                match self.buffers.get_mut(&dest.id()) {
                    Some(buf) => {
                        buf.data[index * 4..index * 4 + 4].copy_from_slice(&value.to_le_bytes());
                    }
                    None => warn!("KernelReceiver: destination buffer {} released", dest.id()),
                }
                Some(self.timing.cycles_ns(1))
            }
            Kernel::Stream { pattern, buffer, offset, len, grid } => {
                match self.buffers.get_mut(&buffer.id()) {
                    Some(buf) => {
                        run_stream(*pattern, &mut buf.data, *offset, *len, grid.global);
                    }
                    None => warn!("{pattern}: buffer {} released", buffer.id()),
                }
                let traffic = len * 4 * pattern.traffic_factor();
                Some(
                    self.timing
                        .cycles_ns(grid.global)
                        .max(self.timing.traffic_ns(traffic)),
                )
            }
        }
    }

    /// Run pending programs until none can make progress.
    fn progress(&mut self) {
        loop {
            let mut ran_any = false;
            let mut still_pending = VecDeque::with_capacity(self.pending.len());
            while let Some(launch) = self.pending.pop_front() {
                if let Some(duration) = self.try_run(&launch.kernel) {
                    trace!("ran {} (event {})", launch.kernel.name(), launch.event.id());
                    let overhead = self.timing.launch_overhead_ns;
                    self.complete(launch.event, launch.submit, overhead, duration);
                    ran_any = true;
                } else {
                    still_pending.push_back(launch);
                }
            }
            self.pending = still_pending;
            if !ran_any || self.pending.is_empty() {
                break;
            }
        }
    }

    fn completed(&self, event: Event) -> Result<Option<OpTimestamps>> {
        self.events
            .get(event.id() as usize)
            .copied()
            .ok_or(DriverError::UnknownEvent(event.id()))
    }
}

impl DeviceQueue for SoftwareQueue {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    fn alloc(&mut self, bytes: usize, channel: Option<MemChannel>) -> Result<BufferId> {
        if bytes > self.caps.max_alloc_bytes {
            return Err(DriverError::AllocationTooLarge {
                requested: bytes,
                limit: self.caps.max_alloc_bytes,
            });
        }
        let available = self.caps.global_mem_bytes.saturating_sub(self.allocated);
        if bytes > available {
            return Err(DriverError::OutOfDeviceMemory {
                requested: bytes,
                available,
            });
        }
        let channel = channel.map_or(1, |c| c.0);
        if !self.caps.has_channel(channel) {
            return Err(DriverError::InvalidChannel {
                channel,
                count: self.caps.mem_channels,
            });
        }

        let id = self.next_buffer;
        self.next_buffer += 1;
        self.buffers.insert(
            id,
            SimBuffer {
                data: vec![0u8; bytes],
                channel,
            },
        );
        self.allocated += bytes;
        debug!("alloc buffer {id}: {bytes} bytes on channel {channel}");
        Ok(BufferId::new(id))
    }

    fn release(&mut self, buffer: BufferId) -> Result<()> {
        let buf = self
            .buffers
            .remove(&buffer.id())
            .ok_or(DriverError::UnknownBuffer(buffer.id()))?;
        self.allocated -= buf.data.len();
        debug!("release buffer {}", buffer.id());
        Ok(())
    }

    fn copy_to_device(&mut self, src: &[u8], dst: BufferId, dst_offset: usize) -> Result<Event> {
        self.check_range(dst, dst_offset, src.len())?;
        self.progress();
        if let Some(buf) = self.buffers.get_mut(&dst.id()) {
            buf.data[dst_offset..dst_offset + src.len()].copy_from_slice(src);
        }
        let event = self.next_event();
        let (submit, setup) = (self.host_clock, self.timing.copy_setup_ns);
        let duration = self.timing.copy_ns(src.len());
        self.complete(event, submit, setup, duration);
        Ok(event)
    }

    fn copy_from_device(
        &mut self,
        src: BufferId,
        src_offset: usize,
        dst: &mut [u8],
    ) -> Result<Event> {
        self.check_range(src, src_offset, dst.len())?;
        self.progress();
        let buf = self.buffer(src)?;
        dst.copy_from_slice(&buf.data[src_offset..src_offset + dst.len()]);
        if let Some(fault) = self.read_fault {
            if (src_offset..src_offset + dst.len()).contains(&fault.byte_offset) {
                dst[fault.byte_offset - src_offset] ^= fault.xor;
            }
        }
        let event = self.next_event();
        let (submit, setup) = (self.host_clock, self.timing.copy_setup_ns);
        let duration = self.timing.copy_ns(dst.len());
        self.complete(event, submit, setup, duration);
        Ok(event)
    }

    fn launch(&mut self, kernel: &Kernel) -> Result<Event> {
        self.validate_launch(kernel)?;
        let event = self.next_event();
        trace!("submit {} (event {})", kernel.name(), event.id());
        self.pending.push_back(PendingLaunch {
            event,
            kernel: kernel.clone(),
            submit: self.host_clock,
        });
        self.progress();
        Ok(event)
    }

    fn wait(&mut self, event: Event) -> Result<OpTimestamps> {
        self.progress();
        match self.completed(event)? {
            Some(ts) => {
                self.host_clock = self.host_clock.max(ts.end);
                Ok(ts)
            }
            None => Err(DriverError::Deadlock {
                pending: self.pending.len(),
            }),
        }
    }

    fn wait_all(&mut self) -> Result<()> {
        self.progress();
        if !self.pending.is_empty() {
            return Err(DriverError::Deadlock {
                pending: self.pending.len(),
            });
        }
        self.host_clock = self.host_clock.max(self.device_clock);
        Ok(())
    }

    fn profile(&self, event: Event) -> Result<OpTimestamps> {
        self.completed(event)?
            .ok_or(DriverError::NotComplete(event.id()))
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Software
    }
}

/// Capabilities of a simulated board.
pub fn simulated_capabilities(
    global_mem_bytes: usize,
    max_alloc_bytes: usize,
    mem_channels: usize,
) -> DeviceCapabilities {
    DeviceCapabilities {
        name: "Simulated FPGA board".into(),
        global_mem_bytes,
        max_alloc_bytes,
        mem_channels,
    }
}
