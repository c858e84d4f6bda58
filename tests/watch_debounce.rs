//! Cross-module watcher behaviour: the eager seed read, debounced collapsing
//! of rapid rewrites into a single emitted delta, and dedup on unchanged
//! bytes (§4.6, §8 properties 5-6).

use std::time::Duration;

use svctl::family::Family;
use svctl::watch::{WatchEvent, WatchOptions, Watcher};
use tokio::io::AsyncWriteExt;

const RUNIT_TAI64_BASE: u64 = (1u64 << 62) + 10;
const RUNIT_RECORD_SIZE: usize = 20;

fn runit_record(pid: u32, run: u8) -> Vec<u8> {
    let mut raw = vec![0u8; RUNIT_RECORD_SIZE];
    raw[0..8].copy_from_slice(&(RUNIT_TAI64_BASE + 1_700_000_000).to_be_bytes());
    raw[12..16].copy_from_slice(&pid.to_le_bytes());
    raw[17] = b'u';
    raw[19] = run;
    raw
}

async fn write_record(path: &std::path::Path, pid: u32, run: u8) {
    let mut file = tokio::fs::File::create(path).await.unwrap();
    file.write_all(&runit_record(pid, run)).await.unwrap();
}

#[tokio::test]
async fn a_burst_of_identical_rewrites_collapses_to_one_delta() {
    let dir = tempfile::tempdir().unwrap();
    let status_path = dir.path().join("status");
    write_record(&status_path, 0, 0).await;

    let options = WatchOptions {
        debounce: Duration::from_millis(30),
        min_debounce: Duration::from_millis(10),
        ..WatchOptions::default()
    };
    let watcher = Watcher::spawn(status_path.clone(), Family::Runit, options);
    let mut rx = watcher.take_receiver().unwrap();

    // Seed event for the initial down state.
    let seed = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(seed, WatchEvent::Status(s) if s.pid == 0));

    // Rapidly rewrite the same final state several times; the debounce
    // window should collapse these into a single emitted delta.
    for _ in 0..5 {
        write_record(&status_path, 99, 1).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let delta = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(delta, WatchEvent::Status(s) if s.pid == 99));

    // No further event should already be queued — the burst was one delta.
    let immediate = rx.try_recv();
    assert!(immediate.is_err(), "expected no extra queued event, got {immediate:?}");

    watcher.cleanup().await;
}

#[tokio::test]
async fn rewriting_identical_bytes_does_not_emit_a_second_delta() {
    let dir = tempfile::tempdir().unwrap();
    let status_path = dir.path().join("status");
    write_record(&status_path, 7, 1).await;

    let watcher = Watcher::spawn(status_path.clone(), Family::Runit, WatchOptions::default());
    let mut rx = watcher.take_receiver().unwrap();

    let seed = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(seed, WatchEvent::Status(s) if s.pid == 7));

    // Rewrite the exact same bytes; dedup on raw record means no new event.
    write_record(&status_path, 7, 1).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(rx.try_recv().is_err());

    watcher.cleanup().await;
}
