// SPDX-License-Identifier: AGPL-3.0-only

//! Operation timing from device profiling counters.
//!
//! Every operation submitted to a [`DeviceQueue`](crate::DeviceQueue) yields
//! three timestamps in nanoseconds on the device clock:
//!
//! ```text
//!   submit ──queue──▶ start ──execute──▶ end
//! ```
//!
//! Copy bandwidth is measured submit→end (it includes the host-side DMA
//! setup), kernel bandwidth start→end, and batches from the first submission
//! to the last completion.

/// Profiling timestamps of one completed operation (ns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpTimestamps {
    /// Command submitted to the queue
    pub submit: u64,
    /// Command started executing on the device
    pub start: u64,
    /// Command finished
    pub end: u64,
}

impl OpTimestamps {
    /// Submission to completion.
    #[must_use]
    pub const fn sub_exec_ns(&self) -> u64 {
        self.end.saturating_sub(self.submit)
    }

    /// Execution start to completion.
    #[must_use]
    pub const fn start_exec_ns(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// `submit ≤ start ≤ end`
    #[must_use]
    pub const fn is_ordered(&self) -> bool {
        self.submit <= self.start && self.start <= self.end
    }
}

/// Time from submission of `first` to completion of `last`.
#[must_use]
pub const fn total_ns(first: &OpTimestamps, last: &OpTimestamps) -> u64 {
    last.end.saturating_sub(first.submit)
}

/// Earliest submission to latest completion over a batch.
///
/// Out-of-order queues may finish the last submitted command first, so
/// batch timing looks at every handle. Empty batches span zero.
#[must_use]
pub fn span_ns<'a>(batch: impl IntoIterator<Item = &'a OpTimestamps>) -> u64 {
    let (first, last) = batch
        .into_iter()
        .fold((u64::MAX, 0u64), |(lo, hi), t| (lo.min(t.submit), hi.max(t.end)));
    last.saturating_sub(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_handle_intervals() {
        let t = OpTimestamps { submit: 100, start: 250, end: 1_000 };
        assert!(t.is_ordered());
        assert_eq!(t.sub_exec_ns(), 900);
        assert_eq!(t.start_exec_ns(), 750);
    }

    #[test]
    fn total_across_two_handles() {
        let a = OpTimestamps { submit: 10, start: 20, end: 30 };
        let b = OpTimestamps { submit: 15, start: 30, end: 90 };
        assert_eq!(total_ns(&a, &b), 80);
    }

    #[test]
    fn span_ignores_submission_order() {
        let batch = [
            OpTimestamps { submit: 50, start: 60, end: 400 },
            OpTimestamps { submit: 10, start: 20, end: 100 },
            OpTimestamps { submit: 70, start: 80, end: 200 },
        ];
        assert_eq!(span_ns(&batch), 390);
        assert_eq!(span_ns(&[] as &[OpTimestamps]), 0);
    }
}
