//! Unit tests for the per-client admission controller

use imagechat_gateway::admission::{
    AdmissionConfig, AdmissionController, ClientIdentity, Decision, ManualClock, RejectReason,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn controller_with_clock() -> (AdmissionController, ManualClock) {
    let clock = ManualClock::new();
    let controller =
        AdmissionController::with_clock(AdmissionConfig::default(), Arc::new(clock.clone()));
    (controller, clock)
}

fn rejection(decision: Decision) -> (RejectReason, u64) {
    match decision {
        Decision::Rejected(rejection) => (rejection.reason, rejection.retry_after_secs()),
        Decision::Admitted(_) => panic!("expected rejection"),
    }
}

#[test]
fn test_requests_spaced_beyond_window_are_admitted() {
    let (controller, clock) = controller_with_clock();
    let client = ClientIdentity::new("1.2.3.4");

    for _ in 0..5 {
        assert!(controller.admit(&client).is_admitted());
        clock.advance(Duration::from_secs(61));
    }
}

#[test]
fn test_request_inside_window_is_rejected_repeatedly() {
    let (controller, clock) = controller_with_clock();
    let client = ClientIdentity::new("1.2.3.4");

    drop(controller.admit(&client));

    for _ in 0..5 {
        clock.advance(Duration::from_secs(5));
        assert_eq!(rejection(controller.admit(&client)), (RejectReason::Interval, 60));
    }
}

#[test]
fn test_exactly_one_window_later_is_admitted() {
    let (controller, clock) = controller_with_clock();
    let client = ClientIdentity::new("1.2.3.4");

    drop(controller.admit(&client));
    clock.advance(Duration::from_secs(60));
    assert!(controller.admit(&client).is_admitted());
}

#[test]
fn test_rejections_do_not_extend_the_window() {
    let (controller, clock) = controller_with_clock();
    let client = ClientIdentity::new("1.2.3.4");

    drop(controller.admit(&client));
    clock.advance(Duration::from_secs(59));
    assert!(!controller.admit(&client).is_admitted());
    clock.advance(Duration::from_secs(1));
    assert!(controller.admit(&client).is_admitted());
}

#[test]
fn test_in_flight_request_blocks_even_after_window() {
    let (controller, clock) = controller_with_clock();
    let client = ClientIdentity::new("1.2.3.4");

    let held = controller.admit(&client);
    assert!(held.is_admitted());

    clock.advance(Duration::from_secs(600));
    assert_eq!(rejection(controller.admit(&client)), (RejectReason::Concurrency, 60));

    drop(held);
    assert!(controller.admit(&client).is_admitted());
}

#[test]
fn test_distinct_identities_are_independent() {
    let (controller, _) = controller_with_clock();
    let a = ClientIdentity::new("10.0.0.1");
    let b = ClientIdentity::new("10.0.0.2");

    let first = controller.admit(&a);
    let second = controller.admit(&b);

    assert!(first.is_admitted());
    assert!(second.is_admitted());
    assert_eq!(controller.tracked_clients(), 2);
}

#[test]
fn test_anonymous_clients_share_one_bucket() {
    let (controller, _) = controller_with_clock();

    drop(controller.admit(&ClientIdentity::anonymous()));
    assert!(!controller.admit(&ClientIdentity::anonymous()).is_admitted());
}

#[test]
fn test_end_to_end_timeline() {
    let (controller, clock) = controller_with_clock();
    let client = ClientIdentity::new("1.2.3.4");

    drop(controller.admit(&client));

    clock.advance(Duration::from_secs(30));
    assert_eq!(rejection(controller.admit(&client)), (RejectReason::Interval, 60));

    clock.advance(Duration::from_secs(31));
    assert!(controller.admit(&client).is_admitted());
}

#[test]
fn test_new_controller_starts_empty() {
    let (controller, _) = controller_with_clock();
    let client = ClientIdentity::new("1.2.3.4");

    drop(controller.admit(&client));
    assert!(!controller.admit(&client).is_admitted());

    let (restarted, _) = controller_with_clock();
    assert_eq!(restarted.tracked_clients(), 0);
    assert!(restarted.admit(&client).is_admitted());
}

#[test]
fn test_concurrent_admits_take_single_slot() {
    let controller = AdmissionController::new(AdmissionConfig::default());
    let client = ClientIdentity::new("1.2.3.4");

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let controller = controller.clone();
            let client = client.clone();
            thread::spawn(move || match controller.admit(&client) {
                // Keep the slot so losers cannot sneak in after release
                Decision::Admitted(permit) => Some(permit),
                Decision::Rejected(_) => None,
            })
        })
        .collect();

    let permits: Vec<_> = handles
        .into_iter()
        .filter_map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(permits.len(), 1);
    assert_eq!(controller.in_flight(&client), 1);
}

#[test]
fn test_higher_concurrency_cap() {
    let clock = ManualClock::new();
    let config = AdmissionConfig {
        min_interval: Duration::ZERO,
        max_in_flight: 2,
        ..AdmissionConfig::default()
    };
    let controller = AdmissionController::with_clock(config, Arc::new(clock));
    let client = ClientIdentity::new("1.2.3.4");

    let first = controller.admit(&client);
    let second = controller.admit(&client);
    assert!(first.is_admitted() && second.is_admitted());
    assert_eq!(rejection(controller.admit(&client)).0, RejectReason::Concurrency);
}

#[test]
fn test_sweep_evicts_only_idle_entries() {
    let (controller, clock) = controller_with_clock();

    for i in 0..10 {
        drop(controller.admit(&ClientIdentity::new(format!("10.0.0.{}", i))));
    }
    let active = ClientIdentity::new("10.0.1.1");
    let _held = controller.admit(&active);

    assert_eq!(controller.sweep(), 0);
    clock.advance(Duration::from_secs(301));
    assert_eq!(controller.sweep(), 10);
    assert_eq!(controller.tracked_clients(), 1);

    // Evicted clients come back fresh
    assert!(controller.admit(&ClientIdentity::new("10.0.0.1")).is_admitted());
}

#[tokio::test]
async fn test_sweeper_task_runs() {
    let config = AdmissionConfig {
        min_interval: Duration::from_millis(10),
        idle_ttl: Duration::from_millis(10),
        ..AdmissionConfig::default()
    };
    let controller = AdmissionController::new(config);
    drop(controller.admit(&ClientIdentity::new("1.2.3.4")));
    assert_eq!(controller.tracked_clients(), 1);

    let sweeper = controller.spawn_sweeper(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(200)).await;
    sweeper.abort();

    assert_eq!(controller.tracked_clients(), 0);
}
