//! Control-channel client (§4.3).
//!
//! Delivers exactly one byte to `<service>/supervise/control`. The
//! endpoint is a named pipe on some systems and a stream socket on others,
//! so every attempt tries a Unix socket first and falls back to opening the
//! path as a non-blocking FIFO (§9 Open Question: "socket vs FIFO
//! precedence" — this crate mandates socket first). Writes are serialized
//! per client through an internal mutex; retries use a doubling backoff
//! cancellable at every sleep.

use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;

use crate::cancel::Ctx;
use crate::error::{ErrorCause, OpError};
use crate::family::{Operation, ServiceConfig};

/// Control client timing and retry parameters (§6 configuration defaults).
#[derive(Debug, Clone)]
pub struct ControlOptions {
    pub dial_timeout: Duration,
    pub write_timeout: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub max_attempts: u32,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(1),
            backoff_min: Duration::from_millis(10),
            backoff_max: Duration::from_secs(1),
            max_attempts: 10,
        }
    }
}

/// Delivers single-byte commands to one service's control endpoint.
pub struct ControlClient {
    control_path: PathBuf,
    config: ServiceConfig,
    options: ControlOptions,
    write_lock: Mutex<()>,
}

impl ControlClient {
    pub fn new(control_path: PathBuf, config: ServiceConfig, options: ControlOptions) -> Self {
        Self {
            control_path,
            config,
            options,
            write_lock: Mutex::new(()),
        }
    }

    /// Sends `op`'s wire byte, retrying with backoff up to `max_attempts`.
    /// Rejects unsupported operations before touching the filesystem
    /// (§3 invariant 5, §8 property 4/S6).
    pub async fn send(&self, op: Operation, ctx: &Ctx) -> Result<(), OpError> {
        let family = self.config.family;
        let fail = |cause: ErrorCause| OpError::new(family, op, self.control_path.clone(), cause);

        if !self.config.supports(op) {
            return Err(fail(ErrorCause::Unsupported(family)));
        }
        let byte = match op.wire_byte() {
            Some(b) => b,
            None => return Err(fail(ErrorCause::Unsupported(family))),
        };

        let _guard = self.write_lock.lock().await;

        let mut backoff = self.options.backoff_min;
        for attempt in 1..=self.options.max_attempts {
            match self.attempt_once(byte, ctx).await {
                Ok(()) => {
                    tracing::debug!(op = %op, path = %self.control_path.display(), attempt, "control write delivered");
                    return Ok(());
                }
                Err(cause @ (ErrorCause::Cancelled | ErrorCause::Timeout)) => {
                    return Err(fail(cause));
                }
                Err(cause) if attempt == self.options.max_attempts => {
                    tracing::warn!(op = %op, path = %self.control_path.display(), %cause, "control write exhausted retries");
                    return Err(fail(ErrorCause::ControlNotReady));
                }
                Err(cause) => {
                    tracing::trace!(op = %op, attempt, backoff_ms = backoff.as_millis() as u64, %cause, "control write attempt failed, backing off");
                    ctx.sleep(backoff).await.map_err(fail)?;
                    backoff = (backoff * 2).min(self.options.backoff_max);
                }
            }
        }
        unreachable!("loop returns on its final iteration")
    }

    /// One full attempt: socket, then FIFO fallback. Both failing counts as
    /// a single failed attempt towards `max_attempts` (§4.3).
    async fn attempt_once(&self, byte: u8, ctx: &Ctx) -> Result<(), ErrorCause> {
        match self.try_socket(byte, ctx).await {
            Ok(()) => return Ok(()),
            Err(cause @ (ErrorCause::Cancelled | ErrorCause::Timeout)) => return Err(cause),
            Err(_) => {}
        }
        self.try_fifo(byte, ctx).await
    }

    async fn try_socket(&self, byte: u8, ctx: &Ctx) -> Result<(), ErrorCause> {
        let dial_ctx = ctx.narrowed_by(self.options.dial_timeout);
        let mut stream = match dial_ctx.race(UnixStream::connect(&self.control_path)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(io_err)) => return Err(ErrorCause::Io(io_err)),
            Err(cause) => return Err(cause),
        };

        let write_ctx = ctx.narrowed_by(self.options.write_timeout);
        match write_ctx.race(stream.write_all(&[byte])).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(io_err)) => Err(ErrorCause::Io(io_err)),
            Err(cause) => Err(cause),
        }
    }

    async fn try_fifo(&self, byte: u8, ctx: &Ctx) -> Result<(), ErrorCause> {
        let write_ctx = ctx.narrowed_by(self.options.write_timeout);
        let open = tokio::fs::OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.control_path);

        let mut file = match write_ctx.race(open).await {
            Ok(Ok(file)) => file,
            Ok(Err(io_err)) => return Err(ErrorCause::Io(io_err)),
            Err(cause) => return Err(cause),
        };

        match write_ctx.race(file.write_all(&[byte])).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(io_err)) => Err(ErrorCause::Io(io_err)),
            Err(cause) => Err(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::Family;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn s5_send_up_writes_exactly_one_byte_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let control_path = dir.path().join("control");
        let listener = UnixListener::bind(&control_path).unwrap();

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 8];
            let n = socket.read(&mut buf).await.unwrap();
            buf[..n].to_vec()
        });

        let client = ControlClient::new(
            control_path,
            ServiceConfig::for_family(Family::Runit),
            ControlOptions::default(),
        );
        client.send(Operation::Up, &Ctx::new()).await.unwrap();

        let received = accept.await.unwrap();
        assert_eq!(received, vec![b'u']);
    }

    #[tokio::test]
    async fn s6_daemontools_once_is_rejected_without_touching_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        // Deliberately does not exist; if the capability check didn't
        // short-circuit before I/O this would fail with `ControlNotReady`
        // instead of `Unsupported` after the full retry budget.
        let control_path = dir.path().join("nonexistent").join("control");

        let client = ControlClient::new(
            control_path,
            ServiceConfig::for_family(Family::Daemontools),
            ControlOptions::default(),
        );
        let err = client.send(Operation::Once, &Ctx::new()).await.unwrap_err();
        assert!(matches!(err.cause, ErrorCause::Unsupported(Family::Daemontools)));
    }

    #[tokio::test]
    async fn property4_capability_gating_is_exact_per_family() {
        for family in [Family::Runit, Family::Daemontools, Family::S6] {
            for &op in crate::family::ALL_CONTROL_OPS {
                let dir = tempfile::tempdir().unwrap();
                let control_path = dir.path().join("control");
                let client = ControlClient::new(
                    control_path,
                    ServiceConfig::for_family(family),
                    ControlOptions {
                        max_attempts: 1,
                        backoff_min: Duration::from_millis(1),
                        ..Default::default()
                    },
                );
                let result = client.send(op, &Ctx::new()).await;
                let rejected = matches!(
                    result,
                    Err(OpError {
                        cause: ErrorCause::Unsupported(_),
                        ..
                    })
                );
                assert_eq!(rejected, !family.supports(op), "{family} {op}");
            }
        }
    }

    #[tokio::test]
    async fn property7_retry_bound_is_exactly_max_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let control_path = dir.path().join("never-created");
        let options = ControlOptions {
            max_attempts: 3,
            backoff_min: Duration::from_millis(1),
            backoff_max: Duration::from_millis(4),
            dial_timeout: Duration::from_millis(50),
            write_timeout: Duration::from_millis(50),
        };
        let client = ControlClient::new(control_path, ServiceConfig::for_family(Family::Runit), options);

        let start = std::time::Instant::now();
        let err = client.send(Operation::Up, &Ctx::new()).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err.cause, ErrorCause::ControlNotReady));
        // Two inter-attempt sleeps of 1ms then 2ms (capped at backoff_max=4ms).
        assert!(elapsed >= Duration::from_millis(2));
    }

    #[tokio::test]
    async fn cancellation_short_circuits_retries() {
        let dir = tempfile::tempdir().unwrap();
        let control_path = dir.path().join("never-created");
        let ctx = Ctx::new();
        ctx.cancel();

        let client = ControlClient::new(control_path, ServiceConfig::for_family(Family::Runit), ControlOptions::default());
        let err = client.send(Operation::Up, &ctx).await.unwrap_err();
        assert!(matches!(err.cause, ErrorCause::Cancelled));
    }
}
