//! End-to-end launches through the launchpad sockets.

mod common;

use std::sync::atomic::Ordering;

use common::{Launchpad, own_pid, request};
use wrt_launchpad::LaunchOrigin;
use wrt_runtime::WidgetState;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_warm_handoff_runs_widget_and_replenishes() {
    let mut launchpad = Launchpad::start(true, false);

    let clock = request("org.example.clock").with_arg("category", "clock");
    let pid = launchpad.launch_warm(&clock).await;
    assert_eq!(pid, own_pid());

    let outcome = launchpad.next_outcome().await;
    assert_eq!(outcome.origin, LaunchOrigin::HandOff);
    assert_eq!(outcome.request.app_id.as_str(), "org.example.clock");
    assert_eq!(outcome.request.arg("category"), Some("clock"));
    assert_eq!(outcome.request.caller_pid, own_pid().as_raw());
    assert_eq!(outcome.state, WidgetState::Hidden);
    assert!(outcome.presented);

    // Finished released the slot, so a replacement gets spawned and the
    // next launch is warm again.
    launchpad.wait_for_spawns(2).await;
    let weather = request("org.example.weather");
    assert_eq!(launchpad.launch_warm(&weather).await, own_pid());
    let outcome = launchpad.next_outcome().await;
    assert_eq!(outcome.request.app_id.as_str(), "org.example.weather");

    launchpad.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_without_pool_every_launch_is_cold() {
    let launchpad = Launchpad::start(false, false);
    let socket = launchpad.launch_socket();

    let first = wrt_launchpad::request_launch(&socket, &request("org.example.a"))
        .await
        .unwrap();
    let second = wrt_launchpad::request_launch(&socket, &request("org.example.b"))
        .await
        .unwrap();
    assert_ne!(first, own_pid());
    assert_ne!(first, second);

    let cold: Vec<String> = launchpad
        .cold
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.app_id.as_str().to_owned())
        .collect();
    assert_eq!(cold, vec!["org.example.a", "org.example.b"]);
    assert_eq!(launchpad.spawned.load(Ordering::SeqCst), 0);

    launchpad.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_candidate_dying_before_handoff_is_replaced() {
    let mut launchpad = Launchpad::start(true, true);

    // The first candidate registers and disconnects; its reap schedules
    // exactly one replacement.
    launchpad.wait_for_spawns(2).await;
    let pid = launchpad.launch_warm(&request("org.example.clock")).await;
    assert_eq!(pid, own_pid());
    assert_eq!(launchpad.next_outcome().await.state, WidgetState::Hidden);

    launchpad.shutdown().await;
}
