// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tlk_core::{FakeClock, SequentialTokens};

fn key(name: &str) -> LockKey {
    LockKey::new(name)
}

fn fake_client() -> (FakeClock, MemoryLockClient<FakeClock, SequentialTokens>) {
    let clock = FakeClock::new();
    let client = MemoryLockClient::with_parts(clock.clone(), SequentialTokens::new("m"))
        .with_lease_ttl(Duration::from_secs(30))
        .with_poll_interval(Duration::from_millis(5));
    (clock, client)
}

#[tokio::test]
async fn held_key_is_unavailable_until_released() {
    let client = MemoryLockClient::new();

    let handle = client
        .acquire(&key("events"), AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();
    assert!(client
        .acquire(&key("events"), AcquireMode::NonBlocking)
        .await
        .unwrap()
        .is_none());

    client.release(handle).await.unwrap();
    assert!(client.holder(&key("events")).is_none());
    let again = client
        .acquire(&key("events"), AcquireMode::NonBlocking)
        .await
        .unwrap();
    assert!(again.is_some());
}

#[tokio::test]
async fn clones_share_leases() {
    let client = MemoryLockClient::new();
    let other = client.clone();

    let handle = client
        .acquire(&key("events"), AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(other.holder(&key("events")).as_ref(), Some(handle.token()));
    assert!(other
        .acquire(&key("events"), AcquireMode::NonBlocking)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn different_keys_do_not_contend() {
    let client = MemoryLockClient::new();
    let a = client.acquire(&key("a"), AcquireMode::NonBlocking).await.unwrap();
    let b = client.acquire(&key("b"), AcquireMode::NonBlocking).await.unwrap();
    assert!(a.is_some());
    assert!(b.is_some());
}

#[tokio::test]
async fn releasing_a_released_key_is_not_held() {
    let (_clock, client) = fake_client();
    let handle = client
        .acquire(&key("events"), AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();
    let copy = LockHandle::new(handle.key().clone(), handle.token().clone());

    client.release(handle).await.unwrap();
    let err = client.release(copy).await.unwrap_err();

    assert!(matches!(err, LockError::NotHeld { key } if key == "events"));
}

#[tokio::test]
async fn expired_lease_is_reclaimed_and_old_release_is_rejected() {
    let (clock, client) = fake_client();
    let first = client
        .acquire(&key("events"), AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();

    clock.advance(Duration::from_secs(31));
    let second = client
        .acquire(&key("events"), AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.token().as_str(), "m-2");

    let err = client.release(first).await.unwrap_err();
    assert!(matches!(err, LockError::NotOwned { .. }));
    assert_eq!(client.holder(&key("events")).as_ref(), Some(second.token()));
    client.release(second).await.unwrap();
}

#[tokio::test]
async fn owner_releasing_a_lapsed_lease_is_rejected_and_frees_it() {
    let (clock, client) = fake_client();
    let handle = client
        .acquire(&key("events"), AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();

    clock.advance(Duration::from_secs(30));
    let err = client.release(handle).await.unwrap_err();

    assert!(matches!(err, LockError::NotOwned { .. }));
    assert!(client.holder(&key("events")).is_none());
}

#[tokio::test]
async fn tick_frees_lapsed_leases() {
    let (clock, client) = fake_client();
    let _held = client
        .acquire(&key("a"), AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();
    assert!(client.tick().is_empty());

    clock.advance(Duration::from_secs(60));
    assert_eq!(client.tick(), vec![key("a")]);
    assert!(client.holder(&key("a")).is_none());
}

#[tokio::test]
async fn blocking_waiter_wakes_on_release() {
    let client = MemoryLockClient::new().with_poll_interval(Duration::from_secs(60));
    let handle = client
        .acquire(&key("events"), AcquireMode::Blocking)
        .await
        .unwrap()
        .unwrap();

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.acquire(&key("events"), AcquireMode::Blocking).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    client.release(handle).await.unwrap();
    let granted = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(granted.is_some());
}

#[tokio::test]
async fn blocking_waiter_reclaims_an_expired_lease() {
    let (clock, client) = fake_client();
    let _abandoned = client
        .acquire(&key("events"), AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.acquire(&key("events"), AcquireMode::Blocking).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    clock.advance(Duration::from_secs(31));
    let granted = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(granted.token().as_str(), "m-2");
}

#[tokio::test]
async fn blocking_timeout_gives_up() {
    let client = MemoryLockClient::new()
        .with_poll_interval(Duration::from_millis(5))
        .with_blocking_timeout(Duration::from_millis(30));
    let _held = client
        .acquire(&key("events"), AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();

    let result = client
        .acquire(&key("events"), AcquireMode::Blocking)
        .await
        .unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn empty_key_is_invalid() {
    let client = MemoryLockClient::new();
    let err = client
        .acquire(&key(""), AcquireMode::NonBlocking)
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::InvalidKey(_)));
}
