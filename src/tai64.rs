//! TAI64N decoding shared by every per-family status decoder (§4.1).
//!
//! TAI64 stores seconds since the TAI epoch in a 64-bit value offset by
//! 2^62; TAI64N appends a 32-bit nanoseconds field. Decoded seconds are
//! sanity-clamped to a plausible calendar window — anything outside it
//! yields `None` rather than a decode error, since a garbage timestamp
//! doesn't make the rest of the record unusable.

use std::time::{Duration, SystemTime};

/// `2^62`, the TAI64 epoch offset used by s6 and daemontools.
pub(crate) const TAI64_OFFSET: u64 = 1u64 << 62;

/// `2^62 + 10`, runit's base accounting for the 10s TAI-UTC offset at the
/// Unix epoch.
pub(crate) const RUNIT_TAI64_BASE: u64 = TAI64_OFFSET + 10;

/// Lower/upper bound (inclusive/exclusive) of Unix seconds considered sane.
/// The upper bound is the year-10000 boundary from §4.1.
const MIN_SANE_UNIX_SECS: u64 = 1;
const MAX_SANE_UNIX_SECS: u64 = 253_402_300_800;

/// Decodes a 12-byte big-endian TAI64N value (8-byte seconds + 4-byte
/// nanoseconds) against `base`, returning `None` if the value doesn't
/// represent a real TAI64 timestamp or falls outside the sane window.
pub(crate) fn decode_tai64n(raw: &[u8; 12], base: u64) -> Option<SystemTime> {
    let tai64 = u64::from_be_bytes(raw[0..8].try_into().unwrap());
    let nanos = u32::from_be_bytes(raw[8..12].try_into().unwrap());

    if tai64 <= base {
        return None;
    }
    let unix_secs = tai64 - base;
    if !(MIN_SANE_UNIX_SECS..MAX_SANE_UNIX_SECS).contains(&unix_secs) {
        return None;
    }

    Some(SystemTime::UNIX_EPOCH + Duration::new(unix_secs, nanos))
}

/// `now - since`, clamped to zero so clock skew or a future timestamp never
/// yields a negative uptime (§3 invariant 2).
pub(crate) fn uptime_since(since: Option<SystemTime>, now: SystemTime) -> Duration {
    match since {
        Some(since) => now.duration_since(since).unwrap_or(Duration::ZERO),
        None => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(base: u64, unix_secs: u64, nanos: u32) -> [u8; 12] {
        let mut raw = [0u8; 12];
        raw[0..8].copy_from_slice(&(base + unix_secs).to_be_bytes());
        raw[8..12].copy_from_slice(&nanos.to_be_bytes());
        raw
    }

    #[test]
    fn decodes_runit_timestamp() {
        let raw = encode(RUNIT_TAI64_BASE, 1_000_000_000, 500);
        let ts = decode_tai64n(&raw, RUNIT_TAI64_BASE).unwrap();
        let expected = SystemTime::UNIX_EPOCH + Duration::new(1_000_000_000, 500);
        assert_eq!(ts, expected);
    }

    #[test]
    fn decodes_s6_timestamp_with_plain_offset() {
        let raw = encode(TAI64_OFFSET, 42, 0);
        let ts = decode_tai64n(&raw, TAI64_OFFSET).unwrap();
        assert_eq!(ts, SystemTime::UNIX_EPOCH + Duration::new(42, 0));
    }

    #[test]
    fn clamps_values_at_or_below_base() {
        let raw = encode(TAI64_OFFSET, 0, 0);
        assert_eq!(decode_tai64n(&raw, TAI64_OFFSET), None);
    }

    #[test]
    fn clamps_values_past_year_10000() {
        let raw = encode(TAI64_OFFSET, MAX_SANE_UNIX_SECS, 0);
        assert_eq!(decode_tai64n(&raw, TAI64_OFFSET), None);
    }

    #[test]
    fn uptime_never_negative() {
        let now = SystemTime::UNIX_EPOCH + Duration::new(100, 0);
        let future = SystemTime::UNIX_EPOCH + Duration::new(200, 0);
        assert_eq!(uptime_since(Some(future), now), Duration::ZERO);
        assert_eq!(uptime_since(None, now), Duration::ZERO);
        assert_eq!(
            uptime_since(Some(SystemTime::UNIX_EPOCH + Duration::new(40, 0)), now),
            Duration::new(60, 0)
        );
    }
}
