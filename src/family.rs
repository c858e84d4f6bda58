//! Operation and capability model (§3, §4.4).
//!
//! The family dimension is a closed set (§9 Design Notes: "prefer a tagged
//! variant... plus a per-family capability table"). `Family` selects a
//! record layout, a capability set, and — for the systemd family — the
//! adapter in [`crate::systemd`].

use std::fmt;

/// One of the four supervisor families this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Runit,
    Daemontools,
    S6,
    Systemd,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Family::Runit => "runit",
            Family::Daemontools => "daemontools",
            Family::S6 => "s6",
            Family::Systemd => "systemd",
        };
        f.write_str(s)
    }
}

/// Closed enumeration of control verbs (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Up,
    Once,
    Down,
    Term,
    Interrupt,
    HUP,
    Alarm,
    Quit,
    Kill,
    Pause,
    Cont,
    /// systemd-only; no wire byte.
    USR1,
    /// systemd-only; no wire byte.
    USR2,
    Exit,
    /// Read-only; never written to a control endpoint.
    Status,
}

impl Operation {
    /// Human name for diagnostics and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Up => "up",
            Operation::Once => "once",
            Operation::Down => "down",
            Operation::Term => "term",
            Operation::Interrupt => "interrupt",
            Operation::HUP => "hup",
            Operation::Alarm => "alarm",
            Operation::Quit => "quit",
            Operation::Kill => "kill",
            Operation::Pause => "pause",
            Operation::Cont => "cont",
            Operation::USR1 => "usr1",
            Operation::USR2 => "usr2",
            Operation::Exit => "exit",
            Operation::Status => "status",
        }
    }

    /// The single wire byte written to `supervise/control` for this
    /// operation, if any (§6: `'u' 'o' 'd' 't' 'i' 'h' 'a' 'q' 'k' 'p' 'c' 'x'`).
    /// `Status` is read-only and `USR1`/`USR2` are systemd-only signals with
    /// no daemontools-family wire representation (§3 invariant 4 only
    /// applies to operations that return `Some`).
    pub fn wire_byte(&self) -> Option<u8> {
        match self {
            Operation::Up => Some(b'u'),
            Operation::Once => Some(b'o'),
            Operation::Down => Some(b'd'),
            Operation::Term => Some(b't'),
            Operation::Interrupt => Some(b'i'),
            Operation::HUP => Some(b'h'),
            Operation::Alarm => Some(b'a'),
            Operation::Quit => Some(b'q'),
            Operation::Kill => Some(b'k'),
            Operation::Pause => Some(b'p'),
            Operation::Cont => Some(b'c'),
            Operation::Exit => Some(b'x'),
            Operation::USR1 | Operation::USR2 | Operation::Status => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// All fourteen control operations, `Status` excluded, in declaration order.
/// Used by the capability tables below and by tests that iterate the full set.
pub const ALL_CONTROL_OPS: &[Operation] = &[
    Operation::Up,
    Operation::Once,
    Operation::Down,
    Operation::Term,
    Operation::Interrupt,
    Operation::HUP,
    Operation::Alarm,
    Operation::Quit,
    Operation::Kill,
    Operation::Pause,
    Operation::Cont,
    Operation::USR1,
    Operation::USR2,
    Operation::Exit,
];

impl Family {
    /// True if `op` is in this family's supported set (§4.4). `Status` is
    /// always supported (it never touches the control endpoint).
    pub fn supports(&self, op: Operation) -> bool {
        if op == Operation::Status {
            return true;
        }
        match self {
            Family::Runit => !matches!(op, Operation::USR1 | Operation::USR2),
            Family::Daemontools => !matches!(
                op,
                Operation::Once | Operation::Quit | Operation::USR1 | Operation::USR2
            ),
            Family::S6 => !matches!(
                op,
                Operation::Pause | Operation::Cont | Operation::USR1 | Operation::USR2
            ),
            // All operations are representable on systemd (§4.4); they are
            // realized differently per-operation (see crate::systemd).
            Family::Systemd => true,
        }
    }

    /// Default root directory supervisors of this family place service
    /// directories under. Informational only — the crate never scans it;
    /// callers pass an explicit service path to `Client::open`.
    pub fn default_supervise_root(&self) -> &'static str {
        match self {
            Family::Runit => "/etc/service",
            Family::Daemontools => "/service",
            Family::S6 => "/etc/s6/service",
            Family::Systemd => "/etc/systemd/system",
        }
    }

    /// Name of the family's own privileged control CLI, for diagnostics
    /// (the crate itself never shells out to it except for the systemd
    /// family, which uses `systemctl`/`systemd-run` directly).
    pub fn privilege_tool(&self) -> &'static str {
        match self {
            Family::Runit => "sv",
            Family::Daemontools => "svc",
            Family::S6 => "s6-svc",
            Family::Systemd => "systemctl",
        }
    }

    /// Name of the family's conventional log-reading companion.
    pub fn logger_name(&self) -> &'static str {
        match self {
            Family::Runit => "svlogd",
            Family::Daemontools => "multilog",
            Family::S6 => "s6-log",
            Family::Systemd => "journald",
        }
    }

    /// Name of the family's scanner/init process.
    pub fn scanner_name(&self) -> &'static str {
        match self {
            Family::Runit => "runsvdir",
            Family::Daemontools => "svscan",
            Family::S6 => "s6-svscan",
            Family::Systemd => "systemd",
        }
    }
}

/// Per-family parameters bound to a [`crate::client::Client`] at
/// construction. Immutable once built (§3).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub family: Family,
    pub supervise_root: String,
    pub privilege_tool: String,
    pub logger_name: String,
    pub scanner_name: String,
}

impl ServiceConfig {
    /// Builds the config with every field defaulted from `family`'s tables.
    pub fn for_family(family: Family) -> Self {
        Self {
            family,
            supervise_root: family.default_supervise_root().to_string(),
            privilege_tool: family.privilege_tool().to_string(),
            logger_name: family.logger_name().to_string(),
            scanner_name: family.scanner_name().to_string(),
        }
    }

    pub fn supports(&self, op: Operation) -> bool {
        self.family.supports(op)
    }
}
