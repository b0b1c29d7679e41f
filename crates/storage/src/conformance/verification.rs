use std::future::Future;

use super::{make_verification, TestResult};
use crate::{BrokerStorage, PactContentRecord, PactPublicationRecord, StorageError};

pub(super) async fn run_verification_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "verification",
            "first_number_is_one",
            first_number_is_one(factory).await,
        ),
        TestResult::from_result(
            "verification",
            "numbers_increase_per_pact_version",
            numbers_increase_per_pact_version(factory).await,
        ),
        TestResult::from_result(
            "verification",
            "duplicate_number_rejected",
            duplicate_number_rejected(factory).await,
        ),
        TestResult::from_result(
            "verification",
            "pact_content_is_immutable",
            pact_content_is_immutable(factory).await,
        ),
        TestResult::from_result(
            "verification",
            "republication_replaces_publication",
            republication_replaces_publication(factory).await,
        ),
    ]
}

async fn first_number_is_one<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let next = storage
        .next_verification_number(&mut snap, "sha-a")
        .await
        .map_err(|e| format!("next: {e}"))?;
    let _ = storage.abort_snapshot(snap).await;
    if next != 1 {
        return Err(format!("expected 1, got {next}"));
    }
    Ok(())
}

async fn numbers_increase_per_pact_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    for _ in 0..3 {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        let next = storage
            .next_verification_number(&mut snap, "sha-a")
            .await
            .map_err(|e| format!("next: {e}"))?;
        storage
            .insert_verification(&mut snap, make_verification("sha-a", next))
            .await
            .map_err(|e| format!("insert: {e}"))?;
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit: {e}"))?;
    }

    let numbers: Vec<i64> = storage
        .list_verifications("sha-a")
        .await
        .map_err(|e| format!("list: {e}"))?
        .iter()
        .map(|v| v.number)
        .collect();
    if numbers != [1, 2, 3] {
        return Err(format!("expected [1, 2, 3], got {numbers:?}"));
    }

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let other = storage
        .next_verification_number(&mut snap, "sha-b")
        .await
        .map_err(|e| format!("next: {e}"))?;
    let _ = storage.abort_snapshot(snap).await;
    if other != 1 {
        return Err(format!("numbering leaked across pact versions: got {other}"));
    }
    storage
        .get_verification("sha-a", 2)
        .await
        .map_err(|e| format!("get_verification: {e}"))?;
    Ok(())
}

async fn duplicate_number_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .insert_verification(&mut snap, make_verification("sha-a", 1))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    let result = storage
        .insert_verification(&mut snap, make_verification("sha-a", 1))
        .await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists, got {e}")),
        Ok(()) => Err("duplicate verification number accepted".to_string()),
    }
}

async fn pact_content_is_immutable<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let content = |marker: &str| PactContentRecord {
        sha: "sha-a".to_string(),
        consumer: "Foo".to_string(),
        provider: "Bar".to_string(),
        content: serde_json::json!({ "marker": marker }),
        created_at: "2026-01-01T00:00:00Z".to_string(),
    };
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let first = storage
        .insert_pact_content(&mut snap, content("first"))
        .await
        .map_err(|e| format!("insert first: {e}"))?;
    let second = storage
        .insert_pact_content(&mut snap, content("second"))
        .await
        .map_err(|e| format!("insert second: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    if !first || second {
        return Err(format!("expected (true, false), got ({first}, {second})"));
    }
    let stored = storage
        .get_pact_content("sha-a")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.content["marker"] != "first" {
        return Err("pact content was overwritten".to_string());
    }
    Ok(())
}

async fn republication_replaces_publication<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let publication = |sha: &str| PactPublicationRecord {
        consumer: "Foo".to_string(),
        provider: "Bar".to_string(),
        consumer_version: "1".to_string(),
        pact_version_sha: sha.to_string(),
        created_at: "2026-01-01T00:00:00Z".to_string(),
    };
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let first = storage
        .put_pact_publication(&mut snap, publication("sha-a"))
        .await
        .map_err(|e| format!("put first: {e}"))?;
    let second = storage
        .put_pact_publication(&mut snap, publication("sha-b"))
        .await
        .map_err(|e| format!("put second: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    if first.is_some() {
        return Err("first publication reported a predecessor".to_string());
    }
    if second.map(|p| p.pact_version_sha).as_deref() != Some("sha-a") {
        return Err("second publication did not return the replaced one".to_string());
    }
    let all = storage
        .list_pact_publications("Bar", "Foo", None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if all.len() != 1 || all[0].pact_version_sha != "sha-b" {
        return Err(format!("expected one publication of sha-b, got {all:?}"));
    }
    Ok(())
}
