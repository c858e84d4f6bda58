//! Status record decoding (§3, §4.1, §4.2).
//!
//! One decode function per family. Each validates the input length, copies
//! it verbatim into [`RawRecord`], decodes the TAI64N timestamp(s) and PID,
//! and folds the family-specific flag bits into a [`State`] by the shared
//! inference table in §4.2. Decoders allocate nothing beyond the
//! fixed-size `raw` buffer already inside [`Status`].

use std::time::{Duration, SystemTime};

use crate::error::DecodeError;
use crate::tai64::{decode_tai64n, uptime_since, RUNIT_TAI64_BASE, TAI64_OFFSET};

pub const RUNIT_RECORD_SIZE: usize = 20;
pub const DAEMONTOOLS_RECORD_SIZE: usize = 18;
pub const S6_PRE220_RECORD_SIZE: usize = 35;
pub const S6_CURRENT_RECORD_SIZE: usize = 43;

/// Inferred logical state of a supervised process (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Unknown,
    Down,
    Starting,
    Running,
    Paused,
    Stopping,
    Finishing,
    Crashed,
    Exited,
}

/// Which family (and, for s6, which record generation) produced a `Status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FamilyTag {
    Runit,
    Daemontools,
    S6Pre220,
    S6Current,
    /// Produced by [`crate::systemd`]'s `systemctl show` mapping rather than
    /// a binary status record.
    Systemd,
}

/// Want/normally-up intent extracted from the record (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub want_up: bool,
    pub want_down: bool,
    pub normally_up: bool,
}

/// Exact record bytes, preserved for dedup (§3 invariant 3). Fixed capacity
/// so decoding never touches the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord {
    bytes: [u8; S6_CURRENT_RECORD_SIZE],
    len: usize,
}

impl RawRecord {
    fn from_slice(data: &[u8]) -> Self {
        let mut bytes = [0u8; S6_CURRENT_RECORD_SIZE];
        bytes[..data.len()].copy_from_slice(data);
        Self { bytes, len: data.len() }
    }

    /// No-record placeholder used by the systemd adapter, whose status
    /// comes from parsed `systemctl show` text rather than a binary record.
    pub fn empty() -> Self {
        Self {
            bytes: [0u8; S6_CURRENT_RECORD_SIZE],
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Uniform decoded snapshot of a supervised service (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub state: State,
    pub pid: i32,
    pub since: Option<SystemTime>,
    pub uptime: Duration,
    pub ready: bool,
    pub ready_since: Option<SystemTime>,
    pub flags: Flags,
    pub raw: RawRecord,
    pub family_hint: FamilyTag,
}

impl Status {
    /// `raw.len()` equals the record size of the family that produced it
    /// (§3 invariant 3); `re_hash_key` is what a watcher dedups on.
    pub fn re_hash_key(&self) -> &[u8] {
        self.raw.as_slice()
    }
}

fn expect_len(raw: &[u8], expected: usize) -> Result<(), DecodeError> {
    if raw.len() != expected {
        return Err(DecodeError::Size {
            expected,
            got: raw.len(),
        });
    }
    Ok(())
}

fn ts12(raw: &[u8], offset: usize) -> [u8; 12] {
    raw[offset..offset + 12].try_into().unwrap()
}

/// Derives `{state, want_up, want_down}` by the shared inference table
/// (§4.2), common to runit, daemontools, and s6-current.
fn infer_state(pid: i32, paused: bool, finishing: bool, want_up: bool, want_down: bool) -> State {
    let running = pid > 0;
    match (running, paused, finishing, want_up, want_down) {
        (false, _, _, _, true) => State::Down,
        (false, _, false, true, _) => State::Crashed,
        (false, _, true, _, _) => State::Finishing,
        (true, true, _, _, _) => State::Paused,
        (true, _, true, _, _) => State::Finishing,
        (true, _, _, _, true) => State::Stopping,
        (true, _, _, true, _) => State::Running,
        (true, _, _, _, _) => State::Running,
        _ => State::Unknown,
    }
}

/// Decodes a 20-byte runit status record (§4.1 runit row, §8 S1/S2).
pub fn decode_runit(raw: &[u8], now: SystemTime) -> Result<Status, DecodeError> {
    expect_len(raw, RUNIT_RECORD_SIZE)?;

    let since = decode_tai64n(&ts12(raw, 0), RUNIT_TAI64_BASE);
    let pid = u32::from_le_bytes(raw[12..16].try_into().unwrap()) as i32;
    let paused = raw[16] != 0;
    let want_up = raw[17] == b'u';
    let want_down = raw[17] == b'd';
    let term = raw[18] != 0;

    let state = infer_state(pid, paused, term, want_up, want_down);
    let flags = Flags {
        want_up,
        want_down,
        normally_up: want_up,
    };

    Ok(Status {
        state,
        pid,
        since,
        uptime: uptime_since(since, now),
        ready: false,
        ready_since: None,
        flags,
        raw: RawRecord::from_slice(raw),
        family_hint: FamilyTag::Runit,
    })
}

/// Decodes an 18-byte daemontools status record (§4.1 daemontools row, §8 S3).
pub fn decode_daemontools(raw: &[u8], now: SystemTime) -> Result<Status, DecodeError> {
    expect_len(raw, DAEMONTOOLS_RECORD_SIZE)?;

    let since = decode_tai64n(&ts12(raw, 0), TAI64_OFFSET);
    let pid = u32::from_le_bytes(raw[12..16].try_into().unwrap()) as i32;
    let want_up = raw[17] == b'u';
    let want_down = raw[17] == b'd';

    // daemontools records carry no paused/term bits; only pid and want
    // drive the inference table for this family.
    let state = infer_state(pid, false, false, want_up, want_down);
    let flags = Flags {
        want_up,
        want_down,
        normally_up: want_up,
    };

    Ok(Status {
        state,
        pid,
        since,
        uptime: uptime_since(since, now),
        ready: false,
        ready_since: None,
        flags,
        raw: RawRecord::from_slice(raw),
        family_hint: FamilyTag::Daemontools,
    })
}

const S6_FLAG_PAUSED: u8 = 0x01;
const S6_FLAG_FINISHING: u8 = 0x02;
const S6_FLAG_WANT_UP: u8 = 0x04;
const S6_FLAG_READY: u8 = 0x08;
/// Pre-2.20 only: the finishing-bit position instead encodes normally-up.
const S6_PRE220_FLAG_NORMALLY_UP: u8 = 0x02;

/// Decodes a 35-byte pre-2.20 s6 status record. Per §4.2's documented
/// simplification, pause/finish bits aren't reliably extractable at this
/// size: state collapses to `pid > 0 => Running` or `Down`.
fn decode_s6_pre220(raw: &[u8], now: SystemTime) -> Result<Status, DecodeError> {
    expect_len(raw, S6_PRE220_RECORD_SIZE)?;

    let since = decode_tai64n(&ts12(raw, 0), TAI64_OFFSET);
    let ready_since = decode_tai64n(&ts12(raw, 12), TAI64_OFFSET);
    let pid = u32::from_be_bytes(raw[28..32].try_into().unwrap()) as i32;
    let flag = raw[34];
    let ready = flag & S6_FLAG_READY != 0;
    let normally_up = flag & S6_PRE220_FLAG_NORMALLY_UP != 0;

    let (state, want_up, want_down) = if pid > 0 {
        (State::Running, true, false)
    } else {
        (State::Down, false, true)
    };

    Ok(Status {
        state,
        pid,
        since,
        uptime: uptime_since(since, now),
        ready,
        ready_since,
        flags: Flags {
            want_up,
            want_down,
            normally_up,
        },
        raw: RawRecord::from_slice(raw),
        family_hint: FamilyTag::S6Pre220,
    })
}

/// Decodes a 43-byte current (s6 >= 2.20) status record (§8 S4).
fn decode_s6_current(raw: &[u8], now: SystemTime) -> Result<Status, DecodeError> {
    expect_len(raw, S6_CURRENT_RECORD_SIZE)?;

    let since = decode_tai64n(&ts12(raw, 0), TAI64_OFFSET);
    let ready_since = decode_tai64n(&ts12(raw, 12), TAI64_OFFSET);
    let pid = u64::from_be_bytes(raw[24..32].try_into().unwrap()) as i32;
    let flag = raw[42];

    let paused = flag & S6_FLAG_PAUSED != 0;
    let finishing = flag & S6_FLAG_FINISHING != 0;
    let want_up = flag & S6_FLAG_WANT_UP != 0;
    let want_down = !want_up;
    let ready = flag & S6_FLAG_READY != 0;

    let state = infer_state(pid, paused, finishing, want_up, want_down);

    Ok(Status {
        state,
        pid,
        since,
        uptime: uptime_since(since, now),
        ready,
        ready_since,
        flags: Flags {
            want_up,
            want_down,
            normally_up: want_up,
        },
        raw: RawRecord::from_slice(raw),
        family_hint: FamilyTag::S6Current,
    })
}

/// Decodes an s6 status record, dispatching on the observed size (§4.2,
/// Open Question "s6 format discrimination"). Any size other than 35 or 43
/// is a hard decode error, never a silent fallback.
pub fn decode_s6(raw: &[u8], now: SystemTime) -> Result<Status, DecodeError> {
    match raw.len() {
        S6_PRE220_RECORD_SIZE => decode_s6_pre220(raw, now),
        S6_CURRENT_RECORD_SIZE => decode_s6_current(raw, now),
        got => Err(DecodeError::UnknownS6Size { got }),
    }
}
