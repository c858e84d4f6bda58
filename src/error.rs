//! Error taxonomy for `svctl`.
//!
//! Every fallible operation returns an [`OpError`] (or, for bulk operations,
//! a [`MultiError`] aggregating several). Both carry enough context — the
//! operation attempted, the service path, and a classified [`ErrorCause`] —
//! to let upstream code match by kind and to produce the one-line
//! `<family> <op> "<path>": <cause>` description callers see in logs.
//!
//! The shape mirrors `nu-plugin-tramp`'s `RpcError`/`TrampError`: one flat
//! `thiserror` enum per concern, `#[from]` at the I/O boundary, no
//! `anyhow`/`Box<dyn Error>` in the public surface.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::family::{Family, Operation};

/// Record-size mismatch or other structural decode failure.
///
/// Per §4.2/§7, a timestamp outside the sane window is *not* a decode
/// failure — it is clamped to `since: None` and decoding proceeds. Only a
/// wrong-sized record is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("status record has wrong size: expected {expected}, got {got}")]
    Size { expected: usize, got: usize },

    #[error("status record size {got} does not match any known s6 layout (35 or 43 bytes)")]
    UnknownS6Size { got: usize },
}

/// Classified cause of an [`OpError`].
#[derive(Debug, Error)]
pub enum ErrorCause {
    /// `<service>/supervise` does not exist at client construction time.
    #[error("service is not supervised (no supervise/ directory)")]
    NotSupervised,

    /// All retry attempts were exhausted without delivering the control byte.
    #[error("control endpoint did not become ready after retrying")]
    ControlNotReady,

    /// The operation is not in the family's capability set.
    #[error("operation is not supported by the {0} family")]
    Unsupported(Family),

    /// The status record failed to decode.
    #[error("failed to decode status record: {0}")]
    Decode(#[from] DecodeError),

    /// An underlying filesystem or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller- or component-supplied deadline elapsed.
    #[error("operation timed out")]
    Timeout,

    /// Cancellation was observed at a suspension point.
    #[error("operation was cancelled")]
    Cancelled,

    /// A `systemctl`/`systemd-run`/`kill` invocation failed or returned
    /// unparsable output.
    #[error("systemd adapter error: {0}")]
    Systemd(String),
}

/// Operation context attached to every failure (§3 `OpError`, §7).
///
/// `cause` is the chainable, classified error; `op`/`path`/`family` exist so
/// upstream code can match on them without parsing the `Display` string.
#[derive(Debug, Error)]
#[error("{family} {op} \"{}\": {cause}", path.display())]
pub struct OpError {
    pub family: Family,
    pub op: Operation,
    pub path: PathBuf,
    #[source]
    pub cause: ErrorCause,
}

impl OpError {
    pub fn new(family: Family, op: Operation, path: impl Into<PathBuf>, cause: ErrorCause) -> Self {
        Self {
            family,
            op,
            path: path.into(),
            cause,
        }
    }

    /// True if this failure came from a transient I/O or connect-stage
    /// problem and is therefore eligible for retry (§7 propagation policy).
    pub fn is_retryable(&self) -> bool {
        matches!(self.cause, ErrorCause::Io(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, ErrorCause::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, ErrorCause::Timeout)
    }
}

/// Aggregation of multiple [`OpError`]s from a bulk operation (§3, §4.8).
///
/// Preserves every error — a coordinator never drops a sibling failure to
/// report only the first one.
#[derive(Debug, Error)]
pub struct MultiError {
    pub errors: Vec<OpError>,
}

impl MultiError {
    pub fn new(errors: Vec<OpError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OpError> {
        self.errors.iter()
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} operations failed:", self.errors.len(), self.errors.len())?;
        for e in &self.errors {
            write!(f, "\n  {e}")?;
        }
        Ok(())
    }
}

pub type OpResult<T> = Result<T, OpError>;
