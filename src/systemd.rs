//! Systemd adapter (§4.9).
//!
//! Presents the same client surface as [`crate::client::Client`] over
//! `systemctl`/`systemd-run`/signal delivery instead of the daemontools-
//! family control endpoint and binary status record. `Up`/`Down` map to
//! `start`/`stop`; `HUP` tries `systemctl reload` and falls back to
//! `SIGHUP` on `MainPID`; the rest of the signal-shaped operations resolve
//! `MainPID` and deliver the signal through the same sudo-aware `kill`
//! subprocess path as every other command here, rather than an in-process
//! `nix::sys::signal::kill` that would silently bypass `SudoOptions` for a
//! unit the caller doesn't own. Status comes from parsing `systemctl show
//! --no-page`; watch is a poll loop that emits only on a logical-state
//! change.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::process::Command;

use crate::cancel::Ctx;
use crate::client::{BoxFuture, SupervisorClient};
use crate::error::{ErrorCause, OpError};
use crate::family::{Family, Operation};
use crate::status::{FamilyTag, Flags, RawRecord, State, Status};

/// Sudo-prefix privilege escalation (§4.9 "Privilege escalation").
#[derive(Debug, Clone)]
pub struct SudoOptions {
    pub enabled: bool,
    pub command: String,
}

impl Default for SudoOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            command: "sudo".to_string(),
        }
    }
}

/// Systemd adapter tuning parameters (§6 defaults: `watch_poll_interval: 1s`).
#[derive(Debug, Clone)]
pub struct SystemdOptions {
    pub watch_poll_interval: Duration,
    pub sudo: SudoOptions,
    pub command_timeout: Duration,
}

impl Default for SystemdOptions {
    fn default() -> Self {
        Self {
            watch_poll_interval: Duration::from_secs(1),
            sudo: SudoOptions::default(),
            command_timeout: Duration::from_secs(10),
        }
    }
}

/// Process-wide cache of which external tools are present, keyed by tool
/// name (§9 Design Notes: "the only process-wide state is an availability
/// cache for external tools"). Optional — every lookup still falls through
/// to invoking the tool if the cache hasn't been populated.
fn tool_cache() -> &'static Mutex<HashMap<&'static str, bool>> {
    static CACHE: OnceLock<Mutex<HashMap<&'static str, bool>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

async fn tool_available(tool: &'static str) -> bool {
    if let Some(known) = tool_cache().lock().unwrap().get(tool) {
        return *known;
    }
    let found = Command::new(tool).arg("--version").output().await.is_ok();
    tool_cache().lock().unwrap().insert(tool, found);
    found
}

/// A client bound to one systemd unit.
pub struct SystemdClient {
    unit: String,
    options: SystemdOptions,
}

impl SystemdClient {
    pub fn new(unit: impl Into<String>, options: SystemdOptions) -> Self {
        Self {
            unit: unit.into(),
            options,
        }
    }

    fn fail(&self, op: Operation, cause: ErrorCause) -> OpError {
        OpError::new(Family::Systemd, op, self.path(), cause)
    }

    fn prefixed(&self, program: &str) -> Command {
        if self.options.sudo.enabled {
            let mut cmd = Command::new(&self.options.sudo.command);
            cmd.arg(program);
            cmd
        } else {
            Command::new(program)
        }
    }

    async fn run(&self, op: Operation, program: &str, args: &[&str], ctx: &Ctx) -> Result<String, OpError> {
        if !tool_available(program).await {
            return Err(self.fail(op, ErrorCause::Systemd(format!("{program} not found on PATH"))));
        }
        let mut cmd = self.prefixed(program);
        cmd.args(args);
        let run_ctx = ctx.narrowed_by(self.options.command_timeout);
        let output = run_ctx
            .race(cmd.output())
            .await
            .map_err(|cause| self.fail(op, cause))?
            .map_err(|io_err| self.fail(op, ErrorCause::Io(io_err)))?;

        if !output.status.success() {
            return Err(self.fail(
                op,
                ErrorCause::Systemd(format!(
                    "{program} {:?} exited with {}: {}",
                    args,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn systemctl(&self, op: Operation, args: &[&str], ctx: &Ctx) -> Result<String, OpError> {
        self.run(op, "systemctl", args, ctx).await
    }

    async fn main_pid(&self, op: Operation, ctx: &Ctx) -> Result<i32, OpError> {
        let out = self
            .systemctl(op, &["show", "-p", "MainPID", "--value", &self.unit], ctx)
            .await?;
        out.trim()
            .parse::<i32>()
            .map_err(|_| self.fail(op, ErrorCause::Systemd(format!("unparsable MainPID: {out:?}"))))
    }

    /// Resolves `MainPID` and delivers `signal` by shelling out to `kill`
    /// through [`Self::run`] — the same path `systemctl`/`systemd-run` take
    /// — so a configured [`SudoOptions`] prefix applies here too (§4.9
    /// "Privilege escalation").
    async fn signal(&self, op: Operation, signal: Signal, ctx: &Ctx) -> Result<(), OpError> {
        let pid = self.main_pid(op, ctx).await?;
        if pid <= 0 {
            return Err(self.fail(op, ErrorCause::Systemd("unit has no running MainPID".to_string())));
        }
        let signal_arg = format!("-{}", signal as i32);
        let pid_arg = pid.to_string();
        self.run(op, "kill", &[&signal_arg, &pid_arg], ctx).await.map(|_| ())
    }

    /// `HUP` tries `systemctl reload` first; on failure it falls back to
    /// `SIGHUP` on `MainPID` (§4.9, §8 S10).
    async fn hup(&self, ctx: &Ctx) -> Result<(), OpError> {
        match self.systemctl(Operation::HUP, &["reload", &self.unit], ctx).await {
            Ok(_) => Ok(()),
            Err(_) => self.signal(Operation::HUP, Signal::SIGHUP, ctx).await,
        }
    }

    /// Resolves the unit's `ExecStart` argv and runs it via `systemd-run
    /// --no-block` (§4.9).
    async fn once(&self, ctx: &Ctx) -> Result<(), OpError> {
        let exec_start = self
            .systemctl(Operation::Once, &["show", "-p", "ExecStart", "--value", &self.unit], ctx)
            .await?;
        let argv = parse_exec_start_argv(&exec_start)
            .ok_or_else(|| self.fail(Operation::Once, ErrorCause::Systemd(format!("unparsable ExecStart: {exec_start:?}"))))?;

        let mut args: Vec<&str> = vec!["--no-block"];
        args.extend(argv.iter().map(String::as_str));
        self.run(Operation::Once, "systemd-run", &args, ctx).await.map(|_| ())
    }

    async fn exit(&self, ctx: &Ctx) -> Result<(), OpError> {
        self.systemctl(Operation::Exit, &["stop", &self.unit], ctx).await?;
        self.systemctl(Operation::Exit, &["disable", &self.unit], ctx).await.map(|_| ())
    }

    pub async fn send(&self, op: Operation, ctx: &Ctx) -> Result<(), OpError> {
        match op {
            Operation::Up => self.systemctl(op, &["start", &self.unit], ctx).await.map(|_| ()),
            Operation::Down => self.systemctl(op, &["stop", &self.unit], ctx).await.map(|_| ()),
            Operation::HUP => self.hup(ctx).await,
            Operation::Once => self.once(ctx).await,
            Operation::Exit => self.exit(ctx).await,
            Operation::Term => self.signal(op, Signal::SIGTERM, ctx).await,
            Operation::Kill => self.signal(op, Signal::SIGKILL, ctx).await,
            Operation::Interrupt => self.signal(op, Signal::SIGINT, ctx).await,
            Operation::Alarm => self.signal(op, Signal::SIGALRM, ctx).await,
            Operation::Quit => self.signal(op, Signal::SIGQUIT, ctx).await,
            Operation::USR1 => self.signal(op, Signal::SIGUSR1, ctx).await,
            Operation::USR2 => self.signal(op, Signal::SIGUSR2, ctx).await,
            Operation::Pause => self.signal(op, Signal::SIGSTOP, ctx).await,
            Operation::Cont => self.signal(op, Signal::SIGCONT, ctx).await,
            Operation::Status => Ok(()),
        }
    }

    /// Parses `systemctl show --no-page` key/value output into a [`Status`]
    /// (§4.9 mapping table).
    pub async fn status(&self, ctx: &Ctx) -> Result<Status, OpError> {
        let raw = self
            .systemctl(
                Operation::Status,
                &["show", "--no-page", "-p", "ActiveState", "-p", "SubState", "-p", "MainPID", "-p", "ExecMainStartTimestampMonotonic", &self.unit],
                ctx,
            )
            .await?;
        map_show_output(&raw).map_err(|cause| self.fail(Operation::Status, cause))
    }
}

impl SupervisorClient for SystemdClient {
    fn family(&self) -> Family {
        Family::Systemd
    }

    fn path(&self) -> &Path {
        Path::new(&self.unit)
    }

    fn send<'a>(&'a self, op: Operation, ctx: &'a Ctx) -> BoxFuture<'a, Result<(), OpError>> {
        Box::pin(SystemdClient::send(self, op, ctx))
    }

    fn status<'a>(&'a self, ctx: &'a Ctx) -> BoxFuture<'a, Result<Status, OpError>> {
        Box::pin(SystemdClient::status(self, ctx))
    }
}

fn parse_kv(raw: &str) -> HashMap<&str, &str> {
    raw.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect()
}

/// Reads the monotonic clock used to make `ExecMainStartTimestampMonotonic`
/// comparable — `std::time::Instant`'s epoch is unspecified, so only a raw
/// `CLOCK_MONOTONIC` read lines up with systemd's own monotonic counter.
fn monotonic_now_micros() -> i64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: `ts` is a valid, appropriately-sized out-parameter for
    // `clock_gettime`; `CLOCK_MONOTONIC` never fails on a supported target.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    ts.tv_sec * 1_000_000 + (ts.tv_nsec / 1_000)
}

/// Maps parsed `systemctl show` fields to a [`Status`] (§4.9). `since` is
/// left `None`: `ExecMainStartTimestampMonotonic` is boot-relative, not
/// wall-clock, so turning it into a `SystemTime` would require also reading
/// the system boot time; the crate prefers a correct `None` over a
/// spuriously precise value (§9 Design Notes).
fn map_show_output(raw: &str) -> Result<Status, ErrorCause> {
    let fields = parse_kv(raw);

    let active_state = *fields.get("ActiveState").unwrap_or(&"");
    let sub_state = *fields.get("SubState").unwrap_or(&"");
    let pid: i32 = fields.get("MainPID").and_then(|v| v.parse().ok()).unwrap_or(0);
    let start_monotonic_us: i64 = fields
        .get("ExecMainStartTimestampMonotonic")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let (state, want_down) = match active_state {
        "active" if sub_state == "running" => (State::Running, false),
        "inactive" => (State::Down, true),
        "failed" => (State::Down, false),
        "activating" => (State::Starting, false),
        "deactivating" => (State::Stopping, false),
        _ => (State::Unknown, false),
    };

    let uptime = if state == State::Running && start_monotonic_us > 0 {
        let elapsed_us = monotonic_now_micros() - start_monotonic_us;
        Duration::from_micros(elapsed_us.max(0) as u64)
    } else {
        Duration::ZERO
    };

    Ok(Status {
        state,
        pid,
        since: None,
        uptime,
        ready: state == State::Running,
        ready_since: None,
        flags: Flags {
            want_up: state == State::Running,
            want_down,
            normally_up: state == State::Running,
        },
        raw: RawRecord::empty(),
        family_hint: FamilyTag::Systemd,
    })
}

/// Splits a `systemctl show -p ExecStart --value` line into an argv. The
/// field looks like `{ path=/usr/bin/foo ; argv[]=/usr/bin/foo --flag ; ... }`;
/// only `argv[]=...` is needed.
fn parse_exec_start_argv(field: &str) -> Option<Vec<String>> {
    let argv_marker = "argv[]=";
    let start = field.find(argv_marker)? + argv_marker.len();
    let rest = &field[start..];
    let end = rest.find(" ;").unwrap_or(rest.len());
    let argv_str = rest[..end].trim();
    if argv_str.is_empty() {
        return None;
    }
    Some(argv_str.split_whitespace().map(str::to_string).collect())
}

/// A poll-based watcher over a systemd unit's logical state, emitting only
/// on a change (§4.9 "Watch").
pub struct SystemdWatcher {
    client: SystemdClient,
    poll_interval: Duration,
}

impl SystemdWatcher {
    pub fn new(unit: impl Into<String>, options: SystemdOptions) -> Self {
        let poll_interval = options.watch_poll_interval;
        Self {
            client: SystemdClient::new(unit, options),
            poll_interval,
        }
    }

    /// Polls until cancelled or the deadline elapses, invoking `on_change`
    /// each time the logical state differs from the previous poll.
    pub async fn run(&self, ctx: &Ctx, mut on_change: impl FnMut(Status)) -> Result<(), ErrorCause> {
        let mut last_state: Option<State> = None;
        loop {
            match self.client.status(ctx).await {
                Ok(status) => {
                    if last_state != Some(status.state) {
                        last_state = Some(status.state);
                        on_change(status);
                    }
                }
                Err(op_err) => return Err(op_err.cause),
            }
            ctx.sleep(self.poll_interval).await?;
        }
    }
}
