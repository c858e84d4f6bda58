//! Status file reader (§4.5).
//!
//! Opens `<service>/supervise/status`, reads the whole record, and hands it
//! to the matching decoder in [`crate::status`]. A short or oversized read
//! surfaces as the decoder's own `DecodeError::Size`/`UnknownS6Size` — the
//! reader itself does no length validation beyond what the OS read returns.

use std::path::Path;
use std::time::SystemTime;

use tokio::io::AsyncReadExt;

use crate::error::ErrorCause;
use crate::family::Family;
use crate::status::{self, Status};

/// Reads and decodes the status record for `family` at `status_path`.
///
/// `family` must not be [`Family::Systemd`] — systemd status comes from
/// `systemctl show` (see [`crate::systemd`]), never from this file-based
/// path; the facade in `client.rs` never routes a systemd client here.
pub async fn read_status(status_path: &Path, family: Family, now: SystemTime) -> Result<Status, ErrorCause> {
    let raw = read_whole_record(status_path).await?;
    let status = match family {
        Family::Runit => status::decode_runit(&raw, now)?,
        Family::Daemontools => status::decode_daemontools(&raw, now)?,
        Family::S6 => status::decode_s6(&raw, now)?,
        Family::Systemd => unreachable!("status_reader is never bound to the systemd family"),
    };
    Ok(status)
}

/// One extra byte of headroom past the largest known record (43-byte
/// current s6 layout) so an oversized file still reaches the decoder's own
/// length check instead of being silently truncated to a valid size.
const READ_CAP: usize = status::S6_CURRENT_RECORD_SIZE + 1;

/// Reads at most [`READ_CAP`] bytes into a stack buffer, never the whole
/// file — an oversized or adversarial `status` file (large mount, symlink)
/// is capped here rather than heap-allocated in full before the decoder
/// gets a chance to reject it on size.
async fn read_whole_record(path: &Path) -> Result<Vec<u8>, ErrorCause> {
    let mut file = tokio::fs::File::open(path).await.map_err(ErrorCause::Io)?;
    let mut buf = [0u8; READ_CAP];
    let mut len = 0;
    while len < buf.len() {
        let n = file.read(&mut buf[len..]).await.map_err(ErrorCause::Io)?;
        if n == 0 {
            break;
        }
        len += n;
    }
    Ok(buf[..len].to_vec())
}
