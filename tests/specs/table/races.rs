// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commit race specs
//!
//! Without the lock, the transaction log itself still refuses to let two
//! writers publish the same version.

use crate::prelude::*;
use std::sync::Barrier;
use std::thread;
use tlk_core::WriteOptions;
use tlk_storage::{Action, CommitInfo, TableError, TransactionLog};

const RACERS: usize = 8;

#[test]
fn exactly_one_commit_wins_a_version() {
    let store = Store::new();
    let dir = store.table("events").dir().to_path_buf();
    let barrier = Arc::new(Barrier::new(RACERS));

    let handles: Vec<_> = (0..RACERS)
        .map(|i| {
            let dir = dir.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let log = TransactionLog::new(&dir);
                let actions = vec![Action::CommitInfo(
                    CommitInfo::new("WRITE", 0).with_parameter("racer", i),
                )];
                barrier.wait();
                log.commit(0, &actions)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let losers = results
        .iter()
        .filter(|r| matches!(r, Err(TableError::ConcurrentModification { version: 0, .. })))
        .count();
    assert_eq!(winners, 1, "results: {:?}", results);
    assert_eq!(losers, RACERS - 1);
    assert_eq!(TransactionLog::new(&dir).versions().unwrap(), vec![0]);
}

#[test]
fn unlocked_writers_never_lose_a_committed_row() {
    let store = Store::new();
    let dir = store.table("events").dir().to_path_buf();
    let barrier = Arc::new(Barrier::new(RACERS));

    let handles: Vec<_> = (0..RACERS as i64)
        .map(|i| {
            let dir = dir.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let table = Table::at(&dir);
                let records = rows(json!([{ "id": i }]));
                barrier.wait();
                table
                    .write(&records, WriteMode::Append, &WriteOptions::default())
                    .map(|_| i)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let mut committed: Vec<i64> = Vec::new();
    for result in results {
        match result {
            Ok(id) => committed.push(id),
            Err(TableError::ConcurrentModification { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    committed.sort();

    let table = store.table("events");
    assert!(!committed.is_empty());
    similar_asserts::assert_eq!(ids(&table), committed);
    assert_eq!(table.version().unwrap() as usize, committed.len() - 1);
}
