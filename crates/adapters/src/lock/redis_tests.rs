// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tlk_core::LockToken;
use std::sync::atomic::{AtomicUsize, Ordering};
use yare::parameterized;

fn config() -> RedisConfig {
    RedisConfig {
        host: "127.0.0.1".to_string(),
        // Nothing listens on port 1
        port: 1,
        ..RedisConfig::default()
    }
}

#[parameterized(
    bare = { None, "events" },
    namespaced = { Some("tlk"), "tlk:events" },
    empty_namespace = { Some(""), "events" },
)]
fn redis_keys_carry_the_namespace(namespace: Option<&str>, expected: &str) {
    let client = RedisLockClient::from_config(&config(), namespace).unwrap();
    assert_eq!(client.redis_key(&LockKey::new("events")), expected);
}

#[parameterized(
    deleted = { 1, None },
    other_owner = { 0, Some("no longer owned") },
    unset = { -1, Some("not held") },
)]
fn release_replies_map_to_results(reply: i64, error: Option<&str>) {
    let result = release_outcome(reply, &LockKey::new("events"));
    match error {
        None => assert!(result.is_ok()),
        Some(text) => {
            let err = result.unwrap_err();
            assert!(err.to_string().contains(text), "{}", err);
        }
    }
}

#[test]
fn unexpected_release_reply_is_a_transport_error() {
    let err = release_outcome(7, &LockKey::new("events")).unwrap_err();
    assert!(matches!(err, LockError::Transport(_)));
}

#[test]
fn release_script_compares_before_deleting() {
    let get = RELEASE_SCRIPT.find("\"get\"").unwrap();
    let del = RELEASE_SCRIPT.find("\"del\"").unwrap();
    assert!(get < del);
    assert!(RELEASE_SCRIPT.contains("current == ARGV[1]"));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let client = RedisLockClient::from_config(&config(), None).unwrap();

    let err = client
        .acquire(&LockKey::new("events"), AcquireMode::NonBlocking)
        .await
        .unwrap_err();

    assert!(matches!(err, LockError::Transport(_)), "{:?}", err);
}

#[tokio::test]
async fn empty_key_is_rejected_before_connecting() {
    let client = RedisLockClient::from_config(&config(), None).unwrap();
    let err = client
        .acquire(&LockKey::new(""), AcquireMode::NonBlocking)
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::InvalidKey(_)));
}

// The tests below need a live server; they skip unless REDIS_URL is set

fn live_redis() -> Option<String> {
    match std::env::var("REDIS_URL") {
        Ok(url) if !url.is_empty() => Some(url),
        _ => {
            eprintln!("Skipping: REDIS_URL not set. Point it at a disposable redis server.");
            None
        }
    }
}

fn live_client(url: &str) -> RedisLockClient {
    RedisLockClient::from_url(url, Some("tlk-test"))
        .unwrap()
        .with_poll_interval(Duration::from_millis(5))
}

/// A key no other test run will touch
fn fresh_key(label: &str) -> LockKey {
    LockKey::new(format!("{}-{}", label, RandomTokens.next_token()))
}

#[tokio::test]
async fn live_held_key_is_unavailable_without_waiting() {
    let Some(url) = live_redis() else { return };
    let client = live_client(&url);
    let key = fresh_key("held");

    let first = client
        .acquire(&key, AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();
    let started = std::time::Instant::now();
    let second = client.acquire(&key, AcquireMode::NonBlocking).await.unwrap();
    assert!(second.is_none());
    assert!(started.elapsed() < Duration::from_secs(1));

    client.release(first).await.unwrap();
    let third = client.acquire(&key, AcquireMode::NonBlocking).await.unwrap();
    assert!(third.is_some());
    client.release(third.unwrap()).await.unwrap();
}

#[tokio::test]
async fn live_blocking_holders_never_overlap() {
    let Some(url) = live_redis() else { return };
    let key = fresh_key("exclusive");
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let client = live_client(&url);
        let key = key.clone();
        let inside = inside.clone();
        let overlaps = overlaps.clone();
        tasks.push(tokio::spawn(async move {
            let handle = client
                .acquire(&key, AcquireMode::Blocking)
                .await
                .unwrap()
                .unwrap();
            if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                overlaps.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            inside.fetch_sub(1, Ordering::SeqCst);
            client.release(handle).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn live_blocking_timeout_gives_up() {
    let Some(url) = live_redis() else { return };
    let holder = live_client(&url);
    let waiter = live_client(&url).with_blocking_timeout(Duration::from_millis(50));
    let key = fresh_key("timeout");

    let held = holder
        .acquire(&key, AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();
    let waited = waiter.acquire(&key, AcquireMode::Blocking).await.unwrap();
    assert!(waited.is_none());

    holder.release(held).await.unwrap();
}

#[tokio::test]
async fn live_release_with_foreign_token_is_not_owned() {
    let Some(url) = live_redis() else { return };
    let client = live_client(&url);
    let key = fresh_key("foreign");

    let held = client
        .acquire(&key, AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();
    let forged = LockHandle::new(key.clone(), LockToken::new("someone-else"));
    let err = client.release(forged).await.unwrap_err();
    assert!(matches!(err, LockError::NotOwned { .. }), "{:?}", err);

    // The real holder still owns the key
    assert!(client
        .acquire(&key, AcquireMode::NonBlocking)
        .await
        .unwrap()
        .is_none());
    client.release(held).await.unwrap();
}

#[tokio::test]
async fn live_expired_lease_taken_over_is_not_owned_by_first_holder() {
    let Some(url) = live_redis() else { return };
    let first = live_client(&url).with_lease_ttl(Duration::from_millis(100));
    let second = live_client(&url);
    let key = fresh_key("lease");

    let stale = first
        .acquire(&key, AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let fresh = second
        .acquire(&key, AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();
    let err = first.release(stale).await.unwrap_err();
    assert!(matches!(err, LockError::NotOwned { .. }), "{:?}", err);

    second.release(fresh).await.unwrap();
}

#[tokio::test]
async fn live_double_release_is_not_held() {
    let Some(url) = live_redis() else { return };
    let client = live_client(&url);
    let key = fresh_key("twice");

    let held = client
        .acquire(&key, AcquireMode::NonBlocking)
        .await
        .unwrap()
        .unwrap();
    let again = LockHandle::new(held.key().clone(), held.token().clone());
    client.release(held).await.unwrap();

    let err = client.release(again).await.unwrap_err();
    assert!(matches!(err, LockError::NotHeld { .. }), "{:?}", err);
}
