//! Cross-module bulk fan-out: a coordinator spanning several service
//! directories, some missing their `supervise/` directory, collects every
//! failure without cancelling the services that succeed (§4.8, §8 S9).

use std::time::Duration;

use svctl::client::ClientOptions;
use svctl::coordinator::{Coordinator, CoordinatorOptions};
use svctl::{Ctx, ErrorCause, Family};
use tokio::net::UnixListener;

#[tokio::test]
async fn up_across_five_services_reports_every_missing_one() {
    let root = tempfile::tempdir().unwrap();
    let mut paths = Vec::new();
    let mut expected_failures = Vec::new();
    let mut acceptors = Vec::new();

    for i in 0..5 {
        let svc = root.path().join(format!("svc{i}"));
        if i % 2 == 0 {
            let supervise = svc.join("supervise");
            std::fs::create_dir_all(&supervise).unwrap();
            // A present service's control endpoint must actually accept the
            // write, or `up()` fails with `ControlNotReady` instead of
            // succeeding — this test is about the *missing* services.
            let listener = UnixListener::bind(supervise.join("control")).unwrap();
            acceptors.push(tokio::spawn(async move {
                let (_socket, _) = listener.accept().await.unwrap();
            }));
        } else {
            std::fs::create_dir_all(&svc).unwrap();
            expected_failures.push(svc.clone());
        }
        paths.push(svc);
    }

    let coordinator = Coordinator::new(
        Family::Runit,
        ClientOptions::builder()
            .with_family(Family::Runit)
            .with_max_attempts(1)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(2))
            .build(),
        CoordinatorOptions {
            concurrency: 2,
            per_op_timeout: Duration::from_secs(1),
        },
    );

    let multi = coordinator.up(&paths, &Ctx::new()).await.expect("some services have no supervise/ dir");
    assert_eq!(multi.len(), expected_failures.len());
    for failure in multi.iter() {
        assert!(matches!(failure.cause, ErrorCause::NotSupervised));
        assert!(expected_failures.contains(&failure.path));
    }

    for acceptor in acceptors {
        acceptor.await.unwrap();
    }
}

#[tokio::test]
async fn status_fan_out_over_all_present_services_yields_no_multi_error() {
    let root = tempfile::tempdir().unwrap();
    let mut paths = Vec::new();
    for i in 0..3 {
        let svc = root.path().join(format!("svc{i}"));
        let supervise = svc.join("supervise");
        std::fs::create_dir_all(&supervise).unwrap();

        let mut raw = vec![0u8; 20];
        raw[0..8].copy_from_slice(&((1u64 << 62) + 10 + 1_700_000_000).to_be_bytes());
        raw[12..16].copy_from_slice(&(i as u32 + 1).to_le_bytes());
        raw[17] = b'u';
        raw[19] = 1;
        std::fs::write(supervise.join("status"), &raw).unwrap();

        paths.push(svc);
    }

    let coordinator = Coordinator::new(Family::Runit, ClientOptions::default(), CoordinatorOptions::default());
    let (statuses, multi) = coordinator.status(&paths, &Ctx::new()).await;
    assert!(multi.is_none());
    assert_eq!(statuses.len(), 3);
}
