use std::future::Future;

use super::{make_pacticipant, TestResult};
use crate::{BrokerStorage, StorageError, VersionRecord};

pub(super) async fn run_pacticipant_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "pacticipant",
            "inserted_pacticipant_readable_after_commit",
            inserted_pacticipant_readable_after_commit(factory).await,
        ),
        TestResult::from_result(
            "pacticipant",
            "duplicate_insert_rejected",
            duplicate_insert_rejected(factory).await,
        ),
        TestResult::from_result(
            "pacticipant",
            "update_overwrites_fields",
            update_overwrites_fields(factory).await,
        ),
        TestResult::from_result(
            "pacticipant",
            "update_missing_returns_not_found",
            update_missing_returns_not_found(factory).await,
        ),
        TestResult::from_result(
            "pacticipant",
            "get_missing_returns_not_found",
            get_missing_returns_not_found(factory).await,
        ),
        TestResult::from_result(
            "pacticipant",
            "list_is_ordered_by_name",
            list_is_ordered_by_name(factory).await,
        ),
        TestResult::from_result(
            "pacticipant",
            "duplicate_version_rejected",
            duplicate_version_rejected(factory).await,
        ),
    ]
}

async fn inserted_pacticipant_readable_after_commit<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
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
    let in_snapshot = storage
        .get_pacticipant_for_update(&mut snap, "Foo")
        .await
        .map_err(|e| format!("get_for_update: {e}"))?;
    if in_snapshot.is_none() {
        return Err("insert not visible inside its own snapshot".to_string());
    }
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let record = storage
        .get_pacticipant("Foo")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if record.name != "Foo" {
        return Err(format!("expected name Foo, got {}", record.name));
    }
    Ok(())
}

async fn duplicate_insert_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage
        .insert_pacticipant(&mut snap, make_pacticipant("Foo"))
        .await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AlreadyExists { kind, key }) => {
            if kind != "pacticipant" || key != "Foo" {
                return Err(format!("unexpected error fields: {kind}/{key}"));
            }
            Ok(())
        }
        Err(e) => Err(format!("expected AlreadyExists, got {e}")),
        Ok(()) => Err("duplicate insert succeeded".to_string()),
    }
}

async fn update_overwrites_fields<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let mut record = make_pacticipant("Foo");
    record.repository_name = Some("foo-repo".to_string());
    storage
        .insert_pacticipant(&mut snap, record.clone())
        .await
        .map_err(|e| format!("insert: {e}"))?;
    record.repository_name = None;
    record.repository_url = Some("http://foo".to_string());
    storage
        .update_pacticipant(&mut snap, record)
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let stored = storage
        .get_pacticipant("Foo")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.repository_name.is_some() {
        return Err("repository_name was not cleared".to_string());
    }
    if stored.repository_url.as_deref() != Some("http://foo") {
        return Err(format!(
            "expected repository_url http://foo, got {:?}",
            stored.repository_url
        ));
    }
    Ok(())
}

async fn update_missing_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage
        .update_pacticipant(&mut snap, make_pacticipant("Ghost"))
        .await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::NotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected NotFound, got {e}")),
        Ok(()) => Err("update of missing pacticipant succeeded".to_string()),
    }
}

async fn get_missing_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    match storage.get_pacticipant("Ghost").await {
        Err(StorageError::NotFound { kind, key }) => {
            if kind != "pacticipant" || key != "Ghost" {
                return Err(format!("unexpected error fields: {kind}/{key}"));
            }
            Ok(())
        }
        Err(e) => Err(format!("expected NotFound, got {e}")),
        Ok(_) => Err("found a pacticipant that was never inserted".to_string()),
    }
}

async fn list_is_ordered_by_name<S, F, Fut>(factory: &F) -> Result<(), String>
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
    for name in ["Zeta", "Alpha", "Mid"] {
        storage
            .insert_pacticipant(&mut snap, make_pacticipant(name))
            .await
            .map_err(|e| format!("insert {name}: {e}"))?;
    }
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let names: Vec<String> = storage
        .list_pacticipants()
        .await
        .map_err(|e| format!("list: {e}"))?
        .into_iter()
        .map(|p| p.name)
        .collect();
    if names != ["Alpha", "Mid", "Zeta"] {
        return Err(format!("unexpected order: {names:?}"));
    }
    Ok(())
}

async fn duplicate_version_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let version = VersionRecord {
        pacticipant: "Foo".to_string(),
        number: "1.0.0".to_string(),
        branch: Some("main".to_string()),
        created_at: "2026-01-01T00:00:00Z".to_string(),
    };
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_version(&mut snap, version.clone())
        .await
        .map_err(|e| format!("insert: {e}"))?;
    let result = storage.insert_version(&mut snap, version).await;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    match result {
        Err(StorageError::AlreadyExists { .. }) => {}
        Err(e) => return Err(format!("expected AlreadyExists, got {e}")),
        Ok(()) => return Err("duplicate version insert succeeded".to_string()),
    }
    let stored = storage
        .get_version("Foo", "1.0.0")
        .await
        .map_err(|e| format!("get_version: {e}"))?;
    if stored.branch.as_deref() != Some("main") {
        return Err(format!("unexpected branch {:?}", stored.branch));
    }
    Ok(())
}
