//! Status file watcher (§4.6).
//!
//! One background task per watcher, driven by filesystem notifications on
//! the *parent* `supervise/` directory (supervisors rewrite `status` by
//! rename or in-place overwrite, so watching the file itself is
//! unreliable). Debounces bursts of notifications, dedups by the decoded
//! record's raw bytes, and backs off to a slow poll interval during a
//! restart-loop storm that produces no real change.
//!
//! Built on the `notify` crate the way `nu-plugin-tramp`'s `ops::watch`
//! module is: `notify::recommended_watcher` with a closure that forwards
//! events into a `tokio::sync::mpsc` channel the async loop consumes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant, SystemTime};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ErrorCause;
use crate::family::Family;
use crate::status::{RawRecord, Status};
use crate::status_reader::read_status;

impl From<notify::Error> for ErrorCause {
    fn from(err: notify::Error) -> Self {
        match err.kind {
            notify::ErrorKind::Io(io_err) => ErrorCause::Io(io_err),
            other => ErrorCause::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// One item on a watcher's event channel (§3).
#[derive(Debug)]
pub enum WatchEvent {
    Status(Status),
    Error(ErrorCause),
}

/// Watcher timing knobs (§6 configuration defaults).
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Debounce window after a qualifying FS event (default 25ms).
    pub debounce: Duration,
    /// Floor applied to `debounce` outside of anti-spin backoff (10ms).
    pub min_debounce: Duration,
    /// How long a run of no-change reads must persist before backing off.
    pub anti_spin_threshold: Duration,
    /// Debounce interval used once anti-spin backoff engages.
    pub anti_spin_interval: Duration,
    /// Output channel capacity.
    pub channel_capacity: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(25),
            min_debounce: Duration::from_millis(10),
            anti_spin_threshold: Duration::from_secs(5),
            anti_spin_interval: Duration::from_secs(1),
            channel_capacity: 10,
        }
    }
}

/// A running watch over one service's status file.
pub struct Watcher {
    cancel: CancellationToken,
    receiver: StdMutex<Option<mpsc::Receiver<WatchEvent>>>,
    task: StdMutex<Option<JoinHandle<()>>>,
    cleaned_up: AtomicBool,
}

impl Watcher {
    /// Spawns the background watch task. The first eager read-and-emit
    /// happens before this returns is not guaranteed; it happens as soon as
    /// the task is scheduled, not synchronously in `spawn`.
    pub fn spawn(status_path: PathBuf, family: Family, options: WatchOptions) -> Self {
        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(run(status_path, family, options, tx, task_cancel));

        Self {
            cancel,
            receiver: StdMutex::new(Some(rx)),
            task: StdMutex::new(Some(task)),
            cleaned_up: AtomicBool::new(false),
        }
    }

    /// Takes the receive end of the event channel. Only the first caller
    /// gets `Some` — the channel is owned by the watcher task, not the
    /// consumer (§9 Design Notes).
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<WatchEvent>> {
        self.receiver.lock().unwrap().take()
    }

    /// Stops the task, cancels any pending debounce timer, closes the
    /// notifier, and closes the output channel. Idempotent (§4.6).
    pub async fn cleanup(&self) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        // Safe without an explicit cleanup() call (§4.6); may still emit
        // until the task observes this cancellation.
        self.cancel.cancel();
    }
}

fn qualifies(event: &Event, status_file_name: &std::ffi::OsStr) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p.file_name() == Some(status_file_name))
}

async fn send_event(sender: &mpsc::Sender<WatchEvent>, cancel: &CancellationToken, event: WatchEvent) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        result = sender.send(event) => { let _ = result; }
    }
}

async fn run(
    status_path: PathBuf,
    family: Family,
    options: WatchOptions,
    sender: mpsc::Sender<WatchEvent>,
    cancel: CancellationToken,
) {
    let Some(parent) = status_path.parent().map(Path::to_path_buf) else {
        send_event(
            &sender,
            &cancel,
            WatchEvent::Error(ErrorCause::Io(std::io::Error::other("status path has no parent directory"))),
        )
        .await;
        return;
    };
    let Some(status_file_name) = status_path.file_name().map(|n| n.to_os_string()) else {
        return;
    };

    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = match notify::recommended_watcher(move |res| {
        let _ = notify_tx.send(res);
    }) {
        Ok(w) => w,
        Err(e) => {
            send_event(&sender, &cancel, WatchEvent::Error(e.into())).await;
            return;
        }
    };
    if let Err(e) = watcher.watch(&parent, RecursiveMode::NonRecursive) {
        send_event(&sender, &cancel, WatchEvent::Error(e.into())).await;
        return;
    }

    let mut last_raw: Option<RawRecord> = None;
    let mut no_change_since = Instant::now();
    let mut current_interval = options.debounce.max(options.min_debounce);
    let mut debounce_deadline: Option<Instant> = None;

    // Eager seed read (§4.6 step 2): emit once even if nothing changed yet.
    match read_status(&status_path, family, SystemTime::now()).await {
        Ok(status) => {
            last_raw = Some(status.raw);
            send_event(&sender, &cancel, WatchEvent::Status(status)).await;
        }
        Err(cause) => send_event(&sender, &cancel, WatchEvent::Error(cause)).await,
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(debounce_deadline.unwrap().into()), if debounce_deadline.is_some() => {
                debounce_deadline = None;
                match read_status(&status_path, family, SystemTime::now()).await {
                    Ok(status) => {
                        let changed = last_raw != Some(status.raw);
                        if changed {
                            last_raw = Some(status.raw);
                            no_change_since = Instant::now();
                            current_interval = options.debounce.max(options.min_debounce);
                            tracing::trace!(path = %status_path.display(), "watch delta emitted");
                            send_event(&sender, &cancel, WatchEvent::Status(status)).await;
                        } else if no_change_since.elapsed() >= options.anti_spin_threshold {
                            if current_interval != options.anti_spin_interval {
                                tracing::debug!(path = %status_path.display(), "watch entering anti-spin backoff");
                            }
                            current_interval = options.anti_spin_interval;
                        }
                    }
                    Err(cause) => send_event(&sender, &cancel, WatchEvent::Error(cause)).await,
                }
            }
            maybe_event = notify_rx.recv() => {
                match maybe_event {
                    Some(Ok(event)) => {
                        if qualifies(&event, &status_file_name) {
                            debounce_deadline = Some(Instant::now() + current_interval);
                        }
                    }
                    Some(Err(e)) => send_event(&sender, &cancel, WatchEvent::Error(e.into())).await,
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tai64::RUNIT_TAI64_BASE;
    use tokio::io::AsyncWriteExt;

    fn runit_record(pid: u32) -> Vec<u8> {
        let mut raw = vec![0u8; crate::status::RUNIT_RECORD_SIZE];
        raw[0..8].copy_from_slice(&(RUNIT_TAI64_BASE + 1_700_000_000).to_be_bytes());
        raw[12..16].copy_from_slice(&pid.to_le_bytes());
        raw[17] = b'u';
        raw[19] = if pid > 0 { 1 } else { 0 };
        raw
    }

    async fn write_record(path: &Path, pid: u32) {
        let mut file = tokio::fs::File::create(path).await.unwrap();
        file.write_all(&runit_record(pid)).await.unwrap();
    }

    #[tokio::test]
    async fn seeds_with_an_eager_read() {
        let dir = tempfile::tempdir().unwrap();
        let status_path = dir.path().join("status");
        write_record(&status_path, 10).await;

        let watcher = Watcher::spawn(status_path, Family::Runit, WatchOptions::default());
        let mut rx = watcher.take_receiver().unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(first, WatchEvent::Status(s) if s.pid == 10));
        watcher.cleanup().await;
    }

    #[tokio::test]
    async fn take_receiver_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let status_path = dir.path().join("status");
        write_record(&status_path, 1).await;
        let watcher = Watcher::spawn(status_path, Family::Runit, WatchOptions::default());
        assert!(watcher.take_receiver().is_some());
        assert!(watcher.take_receiver().is_none());
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let status_path = dir.path().join("status");
        write_record(&status_path, 1).await;
        let watcher = Watcher::spawn(status_path, Family::Runit, WatchOptions::default());
        watcher.cleanup().await;
        watcher.cleanup().await;
    }
}
