use std::future::Future;

use super::{make_deployed_version, TestResult};
use crate::{BrokerStorage, StorageError};

pub(super) async fn run_deployment_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "deployment",
            "no_current_deployment_for_empty_target",
            no_current_deployment_for_empty_target(factory).await,
        ),
        TestResult::from_result(
            "deployment",
            "current_deployment_scoped_to_target",
            current_deployment_scoped_to_target(factory).await,
        ),
        TestResult::from_result(
            "deployment",
            "record_undeployed_sets_fields",
            record_undeployed_sets_fields(factory).await,
        ),
        TestResult::from_result(
            "deployment",
            "record_undeployed_unknown_uuid",
            record_undeployed_unknown_uuid(factory).await,
        ),
        TestResult::from_result(
            "deployment",
            "duplicate_uuid_rejected",
            duplicate_uuid_rejected(factory).await,
        ),
        TestResult::from_result(
            "deployment",
            "list_filters_currently_deployed",
            list_filters_currently_deployed(factory).await,
        ),
    ]
}

async fn no_current_deployment_for_empty_target<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let current = storage
        .current_deployed_version_for_update(&mut snap, "Bar", "production")
        .await
        .map_err(|e| format!("lookup: {e}"))?;
    let _ = storage.abort_snapshot(snap).await;
    if let Some(record) = current {
        return Err(format!("expected no current deployment, got {}", record.uuid));
    }
    Ok(())
}

async fn current_deployment_scoped_to_target<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let mut test_env = make_deployed_version("dv-test", "1");
    test_env.environment = "test".to_string();
    let mut other_app = make_deployed_version("dv-other", "1");
    other_app.pacticipant = "Baz".to_string();
    for record in [test_env, other_app, make_deployed_version("dv-prod", "2")] {
        storage
            .insert_deployed_version(&mut snap, record)
            .await
            .map_err(|e| format!("insert: {e}"))?;
    }
    let current = storage
        .current_deployed_version_for_update(&mut snap, "Bar", "production")
        .await
        .map_err(|e| format!("lookup: {e}"))?;
    let _ = storage.abort_snapshot(snap).await;
    match current {
        Some(record) if record.uuid == "dv-prod" => Ok(()),
        Some(record) => Err(format!("expected dv-prod, got {}", record.uuid)),
        None => Err("expected a current deployment".to_string()),
    }
}

async fn record_undeployed_sets_fields<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .insert_deployed_version(&mut snap, make_deployed_version("dv-1", "1"))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    let updated = storage
        .record_undeployed(&mut snap, "dv-1", "2026-02-01T00:00:00Z")
        .await
        .map_err(|e| format!("record_undeployed: {e}"))?;
    let current = storage
        .current_deployed_version_for_update(&mut snap, "Bar", "production")
        .await
        .map_err(|e| format!("lookup: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    if updated.currently_deployed {
        return Err("returned record still currently deployed".to_string());
    }
    if current.is_some() {
        return Err("undeployed record still reported as current".to_string());
    }
    let stored = storage
        .get_deployed_version("dv-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.undeployed_at.as_deref() != Some("2026-02-01T00:00:00Z") {
        return Err(format!("unexpected undeployed_at {:?}", stored.undeployed_at));
    }
    Ok(())
}

async fn record_undeployed_unknown_uuid<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .record_undeployed(&mut snap, "missing", "2026-02-01T00:00:00Z")
        .await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::NotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected NotFound, got {e}")),
        Ok(_) => Err("undeployed a record that does not exist".to_string()),
    }
}

async fn duplicate_uuid_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .insert_deployed_version(&mut snap, make_deployed_version("dv-1", "1"))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    let result = storage
        .insert_deployed_version(&mut snap, make_deployed_version("dv-1", "2"))
        .await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists, got {e}")),
        Ok(()) => Err("duplicate uuid accepted".to_string()),
    }
}

async fn list_filters_currently_deployed<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let mut old = make_deployed_version("dv-1", "1");
    old.currently_deployed = false;
    old.undeployed_at = Some("2026-01-02T00:00:00Z".to_string());
    for record in [old, make_deployed_version("dv-2", "2")] {
        storage
            .insert_deployed_version(&mut snap, record)
            .await
            .map_err(|e| format!("insert: {e}"))?;
    }
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let all = storage
        .list_deployed_versions("production", Some("Bar"), false)
        .await
        .map_err(|e| format!("list all: {e}"))?;
    let current = storage
        .list_deployed_versions("production", None, true)
        .await
        .map_err(|e| format!("list current: {e}"))?;
    let all_ids: Vec<&str> = all.iter().map(|d| d.uuid.as_str()).collect();
    if all_ids != ["dv-1", "dv-2"] {
        return Err(format!("expected creation order [dv-1, dv-2], got {all_ids:?}"));
    }
    if current.len() != 1 || current[0].uuid != "dv-2" {
        return Err(format!("expected only dv-2 current, got {current:?}"));
    }
    Ok(())
}
