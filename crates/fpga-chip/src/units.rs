// SPDX-License-Identifier: AGPL-3.0-only

//! Size units and rate conversions.
//!
//! Device timing counters report nanoseconds; every rate the harness prints
//! is derived here so the unit scaling lives in one place.

/// One kibibyte.
pub const KB: usize = 1024;

/// One mebibyte.
pub const MB: usize = 1024 * 1024;

/// One gibibyte.
pub const GB: usize = 1024 * 1024 * 1024;

/// Nanoseconds per second.
pub const NS_PER_SEC: f64 = 1_000_000_000.0;

/// Bytes expressed in mebibytes.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bytes_to_mb(bytes: usize) -> f64 {
    bytes as f64 / MB as f64
}

/// Transfer rate in MB/s for `bytes` moved in `elapsed_ns`.
///
/// Returns `0.0` for a zero-length interval rather than infinity.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rate_mb_s(bytes: usize, elapsed_ns: u64) -> f64 {
    if elapsed_ns == 0 {
        return 0.0;
    }
    bytes_to_mb(bytes) / (elapsed_ns as f64 / NS_PER_SEC)
}

/// Frequency in MHz of `cycles` events completed in `elapsed_ns`.
///
/// `cycles / (ns / 1000)`: cycles per microsecond is MHz.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn frequency_mhz(cycles: u64, elapsed_ns: u64) -> f64 {
    if elapsed_ns == 0 {
        return 0.0;
    }
    cycles as f64 / (elapsed_ns as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_mb_in_one_second() {
        let rate = rate_mb_s(MB, 1_000_000_000);
        assert!((rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_interval_is_zero_rate() {
        assert_eq!(rate_mb_s(MB, 0), 0.0);
        assert_eq!(frequency_mhz(1000, 0), 0.0);
    }

    #[test]
    fn frequency_unit_scaling() {
        // 300 cycles per µs = 300 MHz
        let f = frequency_mhz(300_000, 1_000_000);
        assert!((f - 300.0).abs() < 1e-9);
    }
}
