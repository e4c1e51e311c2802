use std::sync::Arc;
use std::time::Duration;

use crate::blocking::BlockingBridge;
use crate::fleet::FleetError;
use crate::testing::{test_credentials, FakeConnector, FakeFleet};

use super::{SessionManager, SessionState};

fn manager(fleet: &FakeFleet) -> Arc<SessionManager<FakeConnector>> {
    manager_with_timeout(fleet, Duration::from_secs(5))
}

fn manager_with_timeout(
    fleet: &FakeFleet,
    timeout: Duration,
) -> Arc<SessionManager<FakeConnector>> {
    Arc::new(SessionManager::new(
        fleet.connector(),
        test_credentials(),
        BlockingBridge::new(4, timeout),
    ))
}

async fn wait_for_state(manager: &SessionManager<FakeConnector>, state: SessionState) {
    for _ in 0..200 {
        if manager.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("manager never reached {}", state);
}

#[tokio::test]
async fn test_starts_uninitialized_without_connecting() {
    let fleet = FakeFleet::new();
    let manager = manager(&fleet);

    assert_eq!(manager.state(), SessionState::Uninitialized);
    assert_eq!(fleet.connects(), 0);
}

#[tokio::test]
async fn test_concurrent_acquire_connects_once() {
    let fleet = FakeFleet::new().with_connect_delay(Duration::from_millis(50));
    let manager = manager(&fleet);

    let handles = futures::future::join_all((0..16).map(|_| manager.acquire_session())).await;

    assert_eq!(fleet.connects(), 1);
    let first = handles[0].as_ref().unwrap();
    for handle in &handles {
        assert!(Arc::ptr_eq(first, handle.as_ref().unwrap()));
    }
    assert_eq!(manager.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_ready_fast_path_does_not_reconnect() {
    let fleet = FakeFleet::new();
    let manager = manager(&fleet);

    let first = manager.acquire_session().await.unwrap();
    let second = manager.acquire_session().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.id, 1);
    assert_eq!(fleet.connects(), 1);
}

#[tokio::test]
async fn test_failed_connect_shared_by_all_waiters_then_retryable() {
    let fleet = FakeFleet::new().with_connect_delay(Duration::from_millis(50));
    fleet.fail_next_connects(1);
    let manager = manager(&fleet);

    let results = futures::future::join_all((0..8).map(|_| manager.acquire_session())).await;

    assert_eq!(fleet.connects(), 1);
    for result in &results {
        assert_eq!(
            result.as_ref().err(),
            Some(&FleetError::connection("service unreachable"))
        );
    }
    assert_eq!(manager.state(), SessionState::Uninitialized);

    // A later call retries
    let handle = manager.acquire_session().await.unwrap();
    assert_eq!(handle.id, 2);
    assert_eq!(fleet.connects(), 2);
    assert_eq!(manager.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_connect_timeout_is_connection_failure() {
    let fleet = FakeFleet::new().with_connect_delay(Duration::from_millis(300));
    let manager = manager_with_timeout(&fleet, Duration::from_millis(30));

    let result = manager.acquire_session().await;

    match result {
        Err(FleetError::ConnectionFailure(msg)) => assert!(msg.contains("timed out")),
        other => panic!("expected connection failure, got {:?}", other.map(|s| s.id)),
    }
    assert_eq!(manager.state(), SessionState::Uninitialized);
}

#[tokio::test]
async fn test_connect_finishing_after_timeout_is_closed() {
    let fleet = FakeFleet::new().with_connect_delay(Duration::from_millis(150));
    let manager = manager_with_timeout(&fleet, Duration::from_millis(30));

    let result = manager.acquire_session().await;
    assert!(matches!(result, Err(FleetError::ConnectionFailure(_))));

    // The retry opens a fresh session while the first connect is still running
    fleet.set_connect_delay(Duration::ZERO);
    let handle = manager.acquire_session().await.unwrap();
    assert_eq!(handle.id, 2);
    drop(handle);

    for _ in 0..100 {
        if fleet.closes() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(fleet.closes(), 1);
    assert_eq!(manager.state(), SessionState::Ready);

    manager.shutdown().await;

    assert_eq!(fleet.connects(), 2);
    assert_eq!(fleet.closes(), 2);
}

#[tokio::test]
async fn test_cancelled_initiator_does_not_strand_connecting() {
    let fleet = FakeFleet::new().with_connect_delay(Duration::from_millis(50));
    let manager = manager(&fleet);

    let initiator = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.acquire_session().await.map(|s| s.id) }
    });
    wait_for_state(&manager, SessionState::Connecting).await;
    initiator.abort();

    let handle = manager.acquire_session().await.unwrap();
    assert_eq!(handle.id, 1);
    assert_eq!(fleet.connects(), 1);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let fleet = FakeFleet::new();
    let manager = manager(&fleet);
    manager.acquire_session().await.unwrap();

    manager.shutdown().await;
    manager.shutdown().await;

    assert_eq!(manager.state(), SessionState::Closed);
    assert_eq!(fleet.closes(), 1);
}

#[tokio::test]
async fn test_acquire_after_shutdown_is_session_closed() {
    let fleet = FakeFleet::new();
    let manager = manager(&fleet);
    manager.acquire_session().await.unwrap();
    manager.shutdown().await;

    for _ in 0..3 {
        let result = manager.acquire_session().await;
        assert_eq!(result.err(), Some(FleetError::SessionClosed));
    }
    assert_eq!(fleet.connects(), 1);
}

#[tokio::test]
async fn test_shutdown_before_connect_closes_without_teardown() {
    let fleet = FakeFleet::new();
    let manager = manager(&fleet);

    manager.shutdown().await;

    assert_eq!(manager.state(), SessionState::Closed);
    assert_eq!(fleet.closes(), 0);
    assert_eq!(
        manager.acquire_session().await.err(),
        Some(FleetError::SessionClosed)
    );
    assert_eq!(fleet.connects(), 0);
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_connect_then_tears_down() {
    let fleet = FakeFleet::new().with_connect_delay(Duration::from_millis(80));
    let manager = manager(&fleet);

    let waiter = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.acquire_session().await.map(|s| s.id) }
    });
    wait_for_state(&manager, SessionState::Connecting).await;

    manager.shutdown().await;

    // The attempt completed and was released exactly once
    assert_eq!(fleet.connects(), 1);
    assert_eq!(fleet.closes(), 1);
    assert_eq!(manager.state(), SessionState::Closed);

    // The caller queued on that attempt never sees the torn-down session
    assert_eq!(waiter.await.unwrap(), Err(FleetError::SessionClosed));

    assert_eq!(
        manager.acquire_session().await.err(),
        Some(FleetError::SessionClosed)
    );
}

#[tokio::test]
async fn test_shutdown_during_failing_connect_closes_cleanly() {
    let fleet = FakeFleet::new().with_connect_delay(Duration::from_millis(50));
    fleet.fail_next_connects(1);
    let manager = manager(&fleet);

    let waiter = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.acquire_session().await.map(|s| s.id) }
    });
    wait_for_state(&manager, SessionState::Connecting).await;

    manager.shutdown().await;

    assert_eq!(manager.state(), SessionState::Closed);
    assert_eq!(fleet.closes(), 0);
    assert!(matches!(
        waiter.await.unwrap(),
        Err(FleetError::ConnectionFailure(_))
    ));
    assert_eq!(fleet.connects(), 1);
}

#[tokio::test]
async fn test_state_display() {
    assert_eq!(SessionState::Ready.to_string(), "ready");
    assert_eq!(SessionState::Uninitialized.to_string(), "uninitialized");
}
