//! End-to-end probe runs against loopback targets.

use std::time::Duration;

use packetpulse::config::EngineConfig;
use packetpulse::engine::{EndState, ProbeMethod, RunConfig, ValidationError};

fn quick_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    // Short iteration timeout so stop requests are observed quickly.
    cfg.probe.iter_timeout_ms = 250;
    cfg
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_completes_at_deadline() {
    let run = RunConfig::new(
        "127.0.0.1:9",
        ProbeMethod::Udp,
        Duration::from_secs(2),
        4,
    );

    let handle = packetpulse::start(run, &quick_config()).await.unwrap();
    let report = handle.await_completion().await;

    assert_eq!(report.end_state, EndState::Completed);
    assert!(report.attempts > 0, "expected attempts, got none");
    assert!(report.attempts >= report.successes);
    assert!(report.attempts >= report.failures);
    assert!(
        (1.5..4.0).contains(&report.elapsed_sec),
        "expected ~2s elapsed, got {}",
        report.elapsed_sec
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_ends_run_early() {
    let run = RunConfig::new(
        "127.0.0.1:9",
        ProbeMethod::Udp,
        Duration::from_secs(10),
        2,
    );

    let handle = packetpulse::start(run, &quick_config()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(handle.stop(), "first stop performs the transition");
    assert!(!handle.stop(), "second stop is a no-op");

    let report = handle.await_completion().await;

    assert_eq!(report.end_state, EndState::Stopped);
    assert!(
        report.elapsed_sec < 2.0,
        "expected ~0.5s elapsed, got {}",
        report.elapsed_sec
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_public_target_rejected_before_any_work() {
    let run = RunConfig::new(
        "8.8.8.8:80",
        ProbeMethod::Udp,
        Duration::from_secs(5),
        1,
    );

    let err = packetpulse::start(run, &EngineConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::DisallowedTarget { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parameter_validation() {
    let cfg = EngineConfig::default();
    let base = |duration, width| {
        RunConfig::new("127.0.0.1:9", ProbeMethod::Udp, duration, width)
    };

    assert!(matches!(
        packetpulse::start(base(Duration::from_secs(1), 0), &cfg)
            .await
            .unwrap_err(),
        ValidationError::ZeroWidth
    ));
    assert!(matches!(
        packetpulse::start(base(Duration::ZERO, 1), &cfg)
            .await
            .unwrap_err(),
        ValidationError::ZeroDuration
    ));
    assert!(matches!(
        packetpulse::start(base(Duration::from_secs(1), cfg.limits.max_width + 1), &cfg)
            .await
            .unwrap_err(),
        ValidationError::WidthTooLarge { .. }
    ));
    assert!(matches!(
        packetpulse::start(
            base(Duration::from_secs(cfg.limits.max_duration_sec + 1), 1),
            &cfg
        )
        .await
        .unwrap_err(),
        ValidationError::DurationTooLong { .. }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshots_are_consistent_and_terminal_snapshot_matches() {
    let mut run = RunConfig::new(
        "127.0.0.1:9",
        ProbeMethod::Udp,
        Duration::from_secs(2),
        2,
    );
    run.report_interval = Some(Duration::from_millis(200));

    let handle = packetpulse::start(run, &quick_config()).await.unwrap();
    let mut progress = handle.subscribe();

    let watcher = tokio::spawn(async move {
        let mut ticks = 0u32;
        let mut last = None;
        while progress.changed().await.is_ok() {
            let snap = progress.borrow().clone();
            assert!(snap.attempts >= snap.successes);
            assert!(snap.attempts >= snap.failures);
            ticks += 1;
            last = Some(snap);
        }
        (ticks, last)
    });

    let report = handle.await_completion().await;
    let (ticks, last) = watcher.await.unwrap();

    assert!(ticks >= 2, "expected multiple progress ticks, got {ticks}");
    // The last published snapshot is the terminal one, emitted after all
    // workers were joined; it matches the final report.
    let last = last.expect("at least one snapshot");
    assert_eq!(last.attempts, report.attempts);
    assert_eq!(last.successes, report.successes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_attempts_cap_completes_early() {
    let mut run = RunConfig::new(
        "127.0.0.1:9",
        ProbeMethod::Udp,
        Duration::from_secs(30),
        4,
    );
    run.max_attempts = 200;

    let handle = packetpulse::start(run, &quick_config()).await.unwrap();
    let report = tokio::time::timeout(Duration::from_secs(10), handle.await_completion())
        .await
        .expect("capped run should end well before its deadline");

    assert_eq!(report.end_state, EndState::Completed);
    assert!(report.attempts >= 200);
    // Concurrent workers may each start one final iteration past the cap.
    assert!(report.attempts < 200 + 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tcp_probe_counts_successes() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();

    // Accept and immediately drop connections for the duration of the test.
    tokio::spawn(async move {
        loop {
            if listener.accept().await.is_err() {
                break;
            }
        }
    });

    let run = RunConfig::new(
        target.to_string(),
        ProbeMethod::Tcp,
        Duration::from_secs(1),
        2,
    );

    let handle = packetpulse::start(run, &quick_config()).await.unwrap();
    let report = handle.await_completion().await;

    assert_eq!(report.end_state, EndState::Completed);
    assert_eq!(report.method, ProbeMethod::Tcp);
    assert!(report.successes > 0, "expected TCP connects to succeed");
    assert!(report.attempts >= report.successes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_udp_run_against_live_listener() {
    let listener = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();

    let run = RunConfig::new(
        target.to_string(),
        ProbeMethod::Udp,
        Duration::from_secs(1),
        2,
    );

    let handle = packetpulse::start(run, &quick_config()).await.unwrap();
    let report = handle.await_completion().await;

    assert_eq!(report.end_state, EndState::Completed);
    assert!(report.successes > 0, "expected UDP sends to succeed");
    assert!(report.bytes_sent > 0, "payload bytes should be counted");
}
