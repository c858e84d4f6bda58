//! Cross-module control-channel behaviour: retry exhaustion, cancellation,
//! and successful delivery once a listener appears mid-retry (§4.3, §8
//! property 7).

use std::time::Duration;

use svctl::cancel::Ctx;
use svctl::control::{ControlClient, ControlOptions};
use svctl::family::{Operation, ServiceConfig};
use svctl::{ErrorCause, Family};
use tokio::io::AsyncReadExt;
use tokio::net::UnixListener;

fn fast_options(max_attempts: u32) -> ControlOptions {
    ControlOptions {
        dial_timeout: Duration::from_millis(50),
        write_timeout: Duration::from_millis(50),
        backoff_min: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
        max_attempts,
    }
}

#[tokio::test]
async fn exhausts_retries_against_a_socket_that_never_appears() {
    let dir = tempfile::tempdir().unwrap();
    let control_path = dir.path().join("control");
    let client = ControlClient::new(control_path, ServiceConfig::for_family(Family::Runit), fast_options(4));

    let err = client.send(Operation::Up, &Ctx::new()).await.unwrap_err();
    assert!(matches!(err.cause, ErrorCause::ControlNotReady));
}

#[tokio::test]
async fn succeeds_once_a_listener_binds_mid_retry() {
    let dir = tempfile::tempdir().unwrap();
    let control_path = dir.path().join("control");
    let client = ControlClient::new(control_path.clone(), ServiceConfig::for_family(Family::Runit), fast_options(20));

    let bind_after = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let listener = UnixListener::bind(&control_path).unwrap();
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1];
        socket.read_exact(&mut buf).await.unwrap();
        buf[0]
    });

    client.send(Operation::Down, &Ctx::with_timeout(Duration::from_secs(2))).await.unwrap();
    let received = bind_after.await.unwrap();
    assert_eq!(received, b'd');
}

#[tokio::test]
async fn deadline_shorter_than_first_backoff_times_out_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let control_path = dir.path().join("control");
    let options = ControlOptions {
        dial_timeout: Duration::from_millis(10),
        write_timeout: Duration::from_millis(10),
        backoff_min: Duration::from_secs(10),
        backoff_max: Duration::from_secs(10),
        max_attempts: 5,
    };
    let client = ControlClient::new(control_path, ServiceConfig::for_family(Family::Runit), options);

    let ctx = Ctx::with_timeout(Duration::from_millis(100));
    let err = client.send(Operation::Up, &ctx).await.unwrap_err();
    assert!(matches!(err.cause, ErrorCause::Timeout));
}
