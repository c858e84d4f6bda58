//! Waiter primitive (§4.7).
//!
//! `wait(states)`: with an empty target set, waits for the next status
//! event of any kind. With a non-empty set, checks the current status for
//! a fast-path match before falling back to a transient watcher. The
//! watcher this function creates is always released, on every exit path —
//! including cancellation — since nothing else holds a reference to it.

use std::path::Path;
use std::time::SystemTime;

use crate::cancel::Ctx;
use crate::error::ErrorCause;
use crate::family::Family;
use crate::status::{State, Status};
use crate::status_reader::read_status;
use crate::watch::{WatchEvent, WatchOptions, Watcher};

/// Waits until the service's status matches one of `states`, or — if
/// `states` is empty — until the next status event of any kind arrives.
pub async fn wait(
    status_path: &Path,
    family: Family,
    states: &[State],
    watch_options: WatchOptions,
    ctx: &Ctx,
) -> Result<Status, ErrorCause> {
    if !states.is_empty() {
        let current = read_status(status_path, family, SystemTime::now()).await?;
        if states.contains(&current.state) {
            return Ok(current);
        }
    }

    let watcher = Watcher::spawn(status_path.to_path_buf(), family, watch_options);
    let mut rx = watcher
        .take_receiver()
        .expect("freshly spawned watcher always has an unclaimed receiver");

    let outcome = ctx
        .race(async {
            loop {
                match rx.recv().await {
                    Some(WatchEvent::Status(status)) => {
                        if states.is_empty() || states.contains(&status.state) {
                            return Ok(status);
                        }
                    }
                    // Watcher errors are non-fatal to the wait; keep
                    // consuming until a matching status or the channel
                    // closes (§7 propagation policy).
                    Some(WatchEvent::Error(_)) => continue,
                    None => {
                        return Err(ErrorCause::Io(std::io::Error::other("watcher channel closed before a matching status arrived")));
                    }
                }
            }
        })
        .await;

    watcher.cleanup().await;

    match outcome {
        Ok(inner) => inner,
        Err(cause) => Err(cause),
    }
}
