//! `svctl` — control and observe `daemontools`-family supervised services.
//!
//! Talks to runit, daemontools, s6, and systemd through their native
//! on-disk and on-wire interfaces — a TAI64N-timestamped binary status
//! record, a single-byte control endpoint, and (for systemd) `systemctl`
//! plus direct signal delivery — rather than by spawning a supervisor CLI
//! on the hot path. Orchestration code uses this to start, stop, signal,
//! wait on, and watch services one at a time or in bulk.
//!
//! ## Layout
//!
//! - [`client::Client`] binds a family and a service directory to the
//!   control/status/watch/wait surface.
//! - [`coordinator::Coordinator`] fans an operation out across many
//!   services with a bounded worker pool, never cancelling siblings on a
//!   partial failure.
//! - [`systemd::SystemdClient`] presents the same operations over
//!   `systemctl`/`systemd-run`/signal delivery for units that have no
//!   `supervise/` directory at all.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use svctl::cancel::Ctx;
//! use svctl::client::{Client, ClientOptions};
//! use svctl::family::Family;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let opts = ClientOptions::builder().with_family(Family::Runit).build();
//! let client = Client::open("/etc/service/sshd", opts)?;
//! let ctx = Ctx::with_timeout(Duration::from_secs(5));
//! client.up(&ctx).await?;
//! let status = client.status(&ctx).await?;
//! println!("{:?}", status.state);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod client;
pub mod control;
pub mod coordinator;
pub mod error;
pub mod family;
pub mod status;
pub mod status_reader;
pub mod systemd;
pub mod tai64;
pub mod wait;
pub mod watch;

pub use cancel::Ctx;
pub use client::{Client, ClientOptions, SupervisorClient};
pub use coordinator::{Coordinator, CoordinatorOptions};
pub use error::{ErrorCause, MultiError, OpError, OpResult};
pub use family::{Family, Operation, ServiceConfig};
pub use status::{Flags, State, Status};
pub use systemd::{SudoOptions, SystemdClient, SystemdOptions, SystemdWatcher};
pub use watch::{WatchEvent, WatchOptions, Watcher};
