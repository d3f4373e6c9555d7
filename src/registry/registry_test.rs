use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{joined_outcome, Attempt, Registry};
use crate::lifecycle::SpawnError;
use crate::model::{SessionKey, WorkloadRecord};

fn key() -> SessionKey {
    SessionKey::new("alice", "")
}

#[test]
fn test_slot_is_shared_and_pruned_when_vacant() {
    let registry = Registry::new(CancellationToken::new());
    let a = registry.slot(&key());
    let b = registry.slot(&key());
    assert!(Arc::ptr_eq(&a, &b));

    // still referenced
    registry.release(&key());
    assert_eq!(registry.len(), 1);

    drop(a);
    drop(b);
    registry.release(&key());
    assert!(registry.is_empty());
}

#[test]
fn test_slot_with_record_survives_release() {
    let registry = Registry::new(CancellationToken::new());
    let slot = registry.slot(&key());
    slot.set_record(WorkloadRecord::new(&key(), "jupyter-x-1", Utc::now()));
    drop(slot);

    registry.release(&key());
    assert_eq!(registry.record(&key()).unwrap().service_name, "jupyter-x-1");
    assert_eq!(registry.records().len(), 1);
}

#[test]
fn test_cancel_and_renew_follow_shutdown_parent() {
    let shutdown = CancellationToken::new();
    let registry = Registry::new(shutdown.clone());
    let slot = registry.slot(&key());

    let first = slot.cancel_token();
    slot.cancel();
    assert!(first.is_cancelled());

    slot.renew_token(registry.shutdown_token());
    let second = slot.cancel_token();
    assert!(!second.is_cancelled());

    shutdown.cancel();
    assert!(second.is_cancelled());
}

#[tokio::test]
async fn test_joiners_receive_leader_outcome() {
    let registry = Registry::new(CancellationToken::new());
    let slot = registry.slot(&key());

    let leader = match slot.attempt() {
        Attempt::Lead(l) => l,
        Attempt::Join(_) => panic!("first attempt must lead"),
    };
    let rx = match slot.attempt() {
        Attempt::Join(rx) => rx,
        Attempt::Lead(_) => panic!("second attempt must join"),
    };
    assert!(slot.is_in_flight());

    let waiter = tokio::spawn(async move { joined_outcome(rx, &key()).await });
    leader.publish(&Ok("10.0.0.5:8888".to_string()));
    drop(leader);

    assert_eq!(waiter.await.unwrap(), Ok("10.0.0.5:8888".to_string()));
    assert!(!slot.is_in_flight());
}

#[tokio::test]
async fn test_abandoned_attempt_reports_cancelled() {
    let registry = Registry::new(CancellationToken::new());
    let slot = registry.slot(&key());

    let leader = match slot.attempt() {
        Attempt::Lead(l) => l,
        Attempt::Join(_) => unreachable!(),
    };
    let Attempt::Join(rx) = slot.attempt() else {
        panic!("expected join");
    };
    drop(leader);

    assert!(matches!(
        joined_outcome(rx, &key()).await,
        Err(SpawnError::Cancelled(_))
    ));
}
