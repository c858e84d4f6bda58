//! Multi-service coordinator (§4.8).
//!
//! Fans an operation out across a bounded worker pool. Built on a
//! `tokio::sync::Semaphore` sized to `concurrency` plus a
//! `tokio::task::JoinSet`, a bounded generalization of the usual
//! `tokio::spawn`-per-unit fan-out pattern for a batch of independent
//! work. Worker failures never cancel siblings — every result is collected.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cancel::Ctx;
use crate::client::{Client, ClientOptions, SupervisorClient};
use crate::error::{ErrorCause, MultiError, OpError};
use crate::family::{Family, Operation};
use crate::status::Status;

/// Coordinator tuning parameters (§6 defaults: `concurrency: 10`,
/// `per_op_timeout: 5s`).
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub concurrency: usize,
    pub per_op_timeout: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            per_op_timeout: Duration::from_secs(5),
        }
    }
}

/// Bounded fan-out over a set of service paths, all of the same family.
pub struct Coordinator {
    family: Family,
    client_options: ClientOptions,
    options: CoordinatorOptions,
}

impl Coordinator {
    pub fn new(family: Family, client_options: ClientOptions, options: CoordinatorOptions) -> Self {
        Self {
            family,
            client_options,
            options,
        }
    }

    fn concurrency(&self) -> usize {
        self.options.concurrency.max(1)
    }

    async fn send_all(&self, op: Operation, paths: &[PathBuf], ctx: &Ctx) -> Option<MultiError> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency()));
        let mut set: JoinSet<Option<OpError>> = JoinSet::new();

        for path in paths.iter().cloned() {
            let semaphore = semaphore.clone();
            let client_options = self.client_options.clone();
            let op_ctx = ctx.narrowed_by(self.options.per_op_timeout);

            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                match Client::open(&path, client_options) {
                    Ok(client) => SupervisorClient::send(&client, op, &op_ctx).await.err(),
                    Err(err) => Some(err),
                }
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(err)) => errors.push(err),
                Ok(None) => {}
                Err(join_err) => errors.push(OpError::new(
                    self.family,
                    op,
                    PathBuf::new(),
                    ErrorCause::Io(std::io::Error::other(join_err.to_string())),
                )),
            }
        }
        MultiError::new(errors)
    }

    pub async fn up(&self, paths: &[PathBuf], ctx: &Ctx) -> Option<MultiError> {
        self.send_all(Operation::Up, paths, ctx).await
    }

    pub async fn down(&self, paths: &[PathBuf], ctx: &Ctx) -> Option<MultiError> {
        self.send_all(Operation::Down, paths, ctx).await
    }

    pub async fn term(&self, paths: &[PathBuf], ctx: &Ctx) -> Option<MultiError> {
        self.send_all(Operation::Term, paths, ctx).await
    }

    pub async fn kill(&self, paths: &[PathBuf], ctx: &Ctx) -> Option<MultiError> {
        self.send_all(Operation::Kill, paths, ctx).await
    }

    /// Reads status for every path; successes and failures are partitioned
    /// rather than short-circuiting on the first error (§4.8, §8 S9).
    pub async fn status(&self, paths: &[PathBuf], ctx: &Ctx) -> (HashMap<PathBuf, Status>, Option<MultiError>) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency()));
        let mut set: JoinSet<(PathBuf, Result<Status, OpError>)> = JoinSet::new();

        for path in paths.iter().cloned() {
            let semaphore = semaphore.clone();
            let client_options = self.client_options.clone();
            let op_ctx = ctx.narrowed_by(self.options.per_op_timeout);
            let result_path = path.clone();

            set.spawn(async move {
                let result = async {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                    let client = Client::open(&path, client_options)?;
                    SupervisorClient::status(&client, &op_ctx).await
                }
                .await;
                (result_path, result)
            });
        }

        let mut statuses = HashMap::new();
        let mut errors = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((path, Ok(status))) => {
                    statuses.insert(path, status);
                }
                Ok((_path, Err(err))) => errors.push(err),
                Err(join_err) => errors.push(OpError::new(
                    self.family,
                    Operation::Status,
                    PathBuf::new(),
                    ErrorCause::Io(std::io::Error::other(join_err.to_string())),
                )),
            }
        }
        (statuses, MultiError::new(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn s9_partial_failure_collects_exactly_one_not_supervised() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        let c = root.path().join("c");
        for svc in [&a, &c] {
            std::fs::create_dir_all(svc.join("supervise")).unwrap();
        }
        std::fs::create_dir_all(&b).unwrap(); // b has no supervise/ dir

        let coordinator = Coordinator::new(
            Family::Runit,
            ClientOptions::builder()
                .with_family(Family::Runit)
                .with_max_attempts(1)
                .with_backoff(Duration::from_millis(1), Duration::from_millis(2))
                .build(),
            CoordinatorOptions::default(),
        );

        let paths = vec![a, b.clone(), c];
        let multi = coordinator.up(&paths, &Ctx::new()).await.expect("one failure expected");
        assert_eq!(multi.len(), 1);
        let failure = multi.iter().next().unwrap();
        assert!(matches!(failure.cause, ErrorCause::NotSupervised));
        assert_eq!(failure.path, b);
    }

    #[tokio::test]
    async fn status_fan_out_partitions_successes_and_failures() {
        let root = tempfile::tempdir().unwrap();
        let ok_path = root.path().join("ok");
        let missing_path = root.path().join("missing");
        std::fs::create_dir_all(ok_path.join("supervise")).unwrap();

        let mut status_file = ok_path.join("supervise").join("status");
        let raw = {
            let mut raw = vec![0u8; crate::status::RUNIT_RECORD_SIZE];
            raw[0..8].copy_from_slice(&(crate::tai64::RUNIT_TAI64_BASE + 1_700_000_000).to_be_bytes());
            raw[12..16].copy_from_slice(&1u32.to_le_bytes());
            raw[17] = b'u';
            raw[19] = 1;
            raw
        };
        tokio::fs::write(&status_file, &raw).await.unwrap();
        status_file.pop();

        let coordinator = Coordinator::new(Family::Runit, ClientOptions::default(), CoordinatorOptions::default());
        let (statuses, errors) = coordinator
            .status(&[ok_path.clone(), missing_path.clone()], &Ctx::new())
            .await;

        assert!(statuses.contains_key(&ok_path));
        let errors = errors.expect("missing_path should have failed");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.iter().next().unwrap().path, missing_path);
    }
}
