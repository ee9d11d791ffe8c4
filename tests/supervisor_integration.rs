//! Integration tests for server process supervision.

use std::time::Duration;

use etrade_runner::server::{
    LaunchError, ServerCommand, ServerProcess, ServerSupervisor, SupervisorError,
};

fn supervisor() -> ServerSupervisor {
    ServerSupervisor::new(ServerCommand::default()).with_shutdown_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn start_with_missing_binary_fails() {
    let mut sup = ServerSupervisor::new(ServerCommand::new("no-such-binary-xyz", ":8888"));
    let result = sup.start();
    assert!(matches!(
        result,
        Err(SupervisorError::Launch(LaunchError::NotFound(_)))
    ));
    // Failed start leaves nothing to stop.
    assert!(!sup.is_running());
    assert!(sup.stop().await.unwrap().is_none());
}

#[tokio::test]
async fn is_running_until_process_exits() {
    let mut sup = supervisor();
    sup.attach(ServerProcess::spawn_raw("sleep", &["5"]).unwrap())
        .unwrap();
    assert!(sup.is_running());

    sup.stop().await.unwrap();
    assert!(!sup.is_running());
}

#[tokio::test]
async fn is_running_false_after_natural_exit() {
    let mut sup = supervisor();
    sup.attach(ServerProcess::spawn_raw("true", &[]).unwrap())
        .unwrap();

    // Give the process time to exit on its own.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!sup.is_running());

    // stop still reaps cleanly.
    let status = sup.stop().await.unwrap();
    assert!(status.is_some());
}

#[tokio::test]
async fn every_line_is_delivered_exactly_once_in_order() {
    let mut sup = supervisor();
    let script = "for i in $(seq 1 50); do echo line-$i; done";
    sup.attach(ServerProcess::spawn_raw("sh", &["-c", script]).unwrap())
        .unwrap();
    sup.stop().await.unwrap();

    // Collect across repeated drains until the queue stays empty.
    let mut all = Vec::new();
    loop {
        let batch = sup.drain_output();
        if batch.is_empty() {
            break;
        }
        all.extend(batch);
    }

    let expected: Vec<String> = (1..=50).map(|i| format!("line-{i}")).collect();
    assert_eq!(all, expected);
}

#[tokio::test]
async fn stop_blocks_until_exit_with_output_in_flight() {
    let mut sup = supervisor();
    // Emits output continuously until interrupted.
    let script = "while true; do echo tick; sleep 0.05; done";
    sup.attach(ServerProcess::spawn_raw("sh", &["-c", script]).unwrap())
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    sup.stop().await.unwrap();
    assert!(!sup.is_running());

    // Output produced before the stop is still drainable afterwards.
    let lines = sup.drain_output();
    assert!(!lines.is_empty());
    assert!(lines.iter().all(|l| l == "tick"));
}

#[tokio::test]
async fn stop_twice_does_not_error_or_hang() {
    let mut sup = supervisor();
    sup.attach(ServerProcess::spawn_raw("sleep", &["5"]).unwrap())
        .unwrap();

    sup.stop().await.unwrap();
    let second = tokio::time::timeout(Duration::from_secs(1), sup.stop())
        .await
        .expect("second stop must not hang")
        .unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn stdout_and_stderr_are_both_captured() {
    let mut sup = supervisor();
    sup.attach(ServerProcess::spawn_raw("sh", &["-c", "echo out; echo err >&2"]).unwrap())
        .unwrap();
    sup.stop().await.unwrap();

    let mut lines = sup.drain_output();
    lines.sort();
    assert_eq!(lines, vec!["err", "out"]);
}

#[tokio::test]
async fn uncooperative_child_is_killed_after_timeout() {
    let mut sup = ServerSupervisor::new(ServerCommand::default())
        .with_shutdown_timeout(Duration::from_millis(200));
    // exec keeps it a single process; ignored SIGINT survives the exec.
    sup.attach(ServerProcess::spawn_raw("sh", &["-c", "trap '' INT; exec sleep 30"]).unwrap())
        .unwrap();

    let status = tokio::time::timeout(Duration::from_secs(5), sup.stop())
        .await
        .expect("stop must not hang on an uncooperative child")
        .unwrap();
    assert!(status.is_some());
    assert!(!sup.is_running());
}
