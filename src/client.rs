//! Client facade binding a family and service path to C3 (control), C5
//! (status), C6 (watch), and C7 (wait) (§6 caller API surface).
//!
//! [`SupervisorClient`] is the shared interface the coordinator binds
//! against (§9 Design Notes: "the coordinator binds to the trait, not to a
//! concrete family"). It's written with hand-boxed futures rather than an
//! `async-trait`-style macro so it stays `dyn`-safe without adding a macro
//! dependency the rest of the stack doesn't otherwise need.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::{Duration, SystemTime};

use crate::cancel::Ctx;
use crate::control::{ControlClient, ControlOptions};
use crate::error::OpError;
use crate::family::{Family, Operation, ServiceConfig};
use crate::status::{State, Status};
use crate::status_reader::read_status;
use crate::wait::wait as wait_for;
use crate::watch::{WatchOptions, Watcher};

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The subset of the client interface the coordinator binds against (§9
/// Design Notes: "the coordinator binds to the trait, not to a concrete
/// family"). `watch`/`wait` are deliberately excluded — the coordinator
/// only ever fans out `send`/`status` (§6) — so each family's client is
/// free to use its own watcher mechanism (notify-based here, poll-based in
/// [`crate::systemd::SystemdClient`]) without forcing a common return type.
///
/// Implemented by [`Client`] (runit/daemontools/s6) and by
/// [`crate::systemd::SystemdClient`].
pub trait SupervisorClient: Send + Sync {
    fn family(&self) -> Family;
    fn path(&self) -> &Path;

    fn send<'a>(&'a self, op: Operation, ctx: &'a Ctx) -> BoxFuture<'a, Result<(), OpError>>;
    fn status<'a>(&'a self, ctx: &'a Ctx) -> BoxFuture<'a, Result<Status, OpError>>;
}

/// Builder for [`ClientOptions`] (ambient — §6 "Builder ergonomics").
#[derive(Debug, Clone, Default)]
pub struct ClientOptionsBuilder {
    opts: ClientOptions,
}

impl ClientOptionsBuilder {
    pub fn with_family(mut self, family: Family) -> Self {
        self.opts.family = family;
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.opts.control.dial_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.opts.control.write_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.opts.control.backoff_min = min;
        self.opts.control.backoff_max = max;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.opts.control.max_attempts = max_attempts;
        self
    }

    pub fn with_watch_debounce(mut self, debounce: Duration) -> Self {
        self.opts.watch.debounce = debounce;
        self
    }

    pub fn build(self) -> ClientOptions {
        self.opts
    }
}

/// Per-client configuration (§6 configuration option list).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub family: Family,
    pub control: ControlOptions,
    pub watch: WatchOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            family: Family::Runit,
            control: ControlOptions::default(),
            watch: WatchOptions::default(),
        }
    }
}

impl ClientOptions {
    pub fn builder() -> ClientOptionsBuilder {
        ClientOptionsBuilder::default()
    }
}

/// A client bound to one runit/daemontools/s6 service directory.
pub struct Client {
    path: PathBuf,
    config: ServiceConfig,
    status_path: PathBuf,
    control: ControlClient,
    watch_options: WatchOptions,
}

impl Client {
    /// Binds to `path`. Fails if `path/supervise` doesn't exist (§3
    /// lifecycle rule).
    pub fn open(path: impl AsRef<Path>, options: ClientOptions) -> Result<Self, OpError> {
        let path = path.as_ref().to_path_buf();
        let supervise_dir = path.join("supervise");
        if !supervise_dir.is_dir() {
            return Err(OpError::new(
                options.family,
                Operation::Status,
                path,
                crate::error::ErrorCause::NotSupervised,
            ));
        }

        let config = ServiceConfig::for_family(options.family);
        let control = ControlClient::new(supervise_dir.join("control"), config.clone(), options.control);
        Ok(Self {
            path,
            config,
            status_path: supervise_dir.join("status"),
            control,
            watch_options: options.watch,
        })
    }

    pub async fn up(&self, ctx: &Ctx) -> Result<(), OpError> {
        self.control.send(Operation::Up, ctx).await
    }
    pub async fn once(&self, ctx: &Ctx) -> Result<(), OpError> {
        self.control.send(Operation::Once, ctx).await
    }
    pub async fn down(&self, ctx: &Ctx) -> Result<(), OpError> {
        self.control.send(Operation::Down, ctx).await
    }
    pub async fn term(&self, ctx: &Ctx) -> Result<(), OpError> {
        self.control.send(Operation::Term, ctx).await
    }
    pub async fn interrupt(&self, ctx: &Ctx) -> Result<(), OpError> {
        self.control.send(Operation::Interrupt, ctx).await
    }
    pub async fn hup(&self, ctx: &Ctx) -> Result<(), OpError> {
        self.control.send(Operation::HUP, ctx).await
    }
    pub async fn alarm(&self, ctx: &Ctx) -> Result<(), OpError> {
        self.control.send(Operation::Alarm, ctx).await
    }
    pub async fn quit(&self, ctx: &Ctx) -> Result<(), OpError> {
        self.control.send(Operation::Quit, ctx).await
    }
    pub async fn kill(&self, ctx: &Ctx) -> Result<(), OpError> {
        self.control.send(Operation::Kill, ctx).await
    }
    pub async fn pause(&self, ctx: &Ctx) -> Result<(), OpError> {
        self.control.send(Operation::Pause, ctx).await
    }
    pub async fn cont(&self, ctx: &Ctx) -> Result<(), OpError> {
        self.control.send(Operation::Cont, ctx).await
    }
    pub async fn exit_supervise(&self, ctx: &Ctx) -> Result<(), OpError> {
        self.control.send(Operation::Exit, ctx).await
    }

    pub async fn status(&self, ctx: &Ctx) -> Result<Status, OpError> {
        let fail = |cause| OpError::new(self.config.family, Operation::Status, &self.status_path, cause);
        match ctx.race(read_status(&self.status_path, self.config.family, SystemTime::now())).await {
            Ok(result) => result.map_err(fail),
            Err(cause) => Err(fail(cause)),
        }
    }

    pub fn watch(&self) -> Watcher {
        Watcher::spawn(self.status_path.clone(), self.config.family, self.watch_options.clone())
    }

    pub async fn wait(&self, states: &[State], ctx: &Ctx) -> Result<Status, OpError> {
        wait_for(&self.status_path, self.config.family, states, self.watch_options.clone(), ctx)
            .await
            .map_err(|cause| OpError::new(self.config.family, Operation::Status, &self.status_path, cause))
    }
}

impl SupervisorClient for Client {
    fn family(&self) -> Family {
        self.config.family
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn send<'a>(&'a self, op: Operation, ctx: &'a Ctx) -> BoxFuture<'a, Result<(), OpError>> {
        Box::pin(self.control.send(op, ctx))
    }

    fn status<'a>(&'a self, ctx: &'a Ctx) -> BoxFuture<'a, Result<Status, OpError>> {
        Box::pin(Client::status(self, ctx))
    }
}
