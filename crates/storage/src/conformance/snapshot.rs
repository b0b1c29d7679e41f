//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted writes are discarded.

use std::future::Future;

use super::{make_deployed_version, make_pacticipant, TestResult};
use crate::{BrokerStorage, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "snapshot",
            "uncommitted_insert_invisible",
            uncommitted_insert_invisible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "abort_discards_all_writes",
            abort_discards_all_writes(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "sequential_snapshots_see_prior_commits",
            sequential_snapshots_see_prior_commits(factory).await,
        ),
    ]
}

async fn uncommitted_insert_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_pacticipant(&mut snap, make_pacticipant("Foo"))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let outside = storage.get_pacticipant("Foo").await;
    let listed = storage
        .list_pacticipants()
        .await
        .map_err(|e| format!("list: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    match outside {
        Err(StorageError::NotFound { .. }) => {}
        Err(e) => return Err(format!("expected NotFound before commit, got {e}")),
        Ok(_) => return Err("uncommitted pacticipant visible to get".to_string()),
    }
    if !listed.is_empty() {
        return Err("uncommitted pacticipant visible to list".to_string());
    }
    storage
        .get_pacticipant("Foo")
        .await
        .map_err(|e| format!("committed pacticipant not visible: {e}"))?;
    Ok(())
}

/// A snapshot that inserts a pacticipant AND a deployment, then aborts,
/// must leave neither behind.
async fn abort_discards_all_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_pacticipant(&mut snap, make_pacticipant("Bar"))
        .await
        .map_err(|e| format!("insert pacticipant: {e}"))?;
    storage
        .insert_deployed_version(&mut snap, make_deployed_version("dv-1", "1"))
        .await
        .map_err(|e| format!("insert deployed version: {e}"))?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    if storage.get_pacticipant("Bar").await.is_ok() {
        return Err("aborted pacticipant visible".to_string());
    }
    if storage.get_deployed_version("dv-1").await.is_ok() {
        return Err("aborted deployed version visible".to_string());
    }
    Ok(())
}

async fn sequential_snapshots_see_prior_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut first = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin first: {e}"))?;
    storage
        .insert_pacticipant(&mut first, make_pacticipant("Foo"))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    storage
        .commit_snapshot(first)
        .await
        .map_err(|e| format!("commit first: {e}"))?;

    let mut second = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin second: {e}"))?;
    let seen = storage
        .get_pacticipant_for_update(&mut second, "Foo")
        .await
        .map_err(|e| format!("get_for_update: {e}"))?;
    storage
        .abort_snapshot(second)
        .await
        .map_err(|e| format!("abort second: {e}"))?;
    if seen.is_none() {
        return Err("second snapshot did not see first snapshot's commit".to_string());
    }
    Ok(())
}
