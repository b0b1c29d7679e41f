use std::future::Future;
use std::sync::Arc;

use super::{make_deployed_version, make_verification, TestResult};
use crate::{BrokerStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_deployments_leave_one_current",
            concurrent_deployments_leave_one_current(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_verifications_get_distinct_numbers",
            concurrent_verifications_get_distinct_numbers(factory).await,
        ),
    ]
}

// ── Concurrent deployments: one current record ──────────────────────────────

/// N tasks each replace the current deployment of the same target. With
/// serialised snapshots every task sees its predecessor's record, so exactly
/// one record stays current and every other one carries `undeployed_at`.
async fn concurrent_deployments_leave_one_current<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let result = async {
                let current = s
                    .current_deployed_version_for_update(&mut snap, "Bar", "production")
                    .await?;
                let mut record = make_deployed_version(&format!("dv-{i}"), &i.to_string());
                if let Some(previous) = current {
                    s.record_undeployed(&mut snap, &previous.uuid, "2026-01-02T00:00:00Z")
                        .await?;
                    record.replaced_previous_deployed_version = true;
                }
                s.insert_deployed_version(&mut snap, record).await
            }
            .await;
            match result {
                Ok(()) => s.commit_snapshot(snap).await,
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let all = storage
        .list_deployed_versions("production", Some("Bar"), false)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if all.len() != N {
        return Err(format!("expected {N} records, got {}", all.len()));
    }
    let current = all.iter().filter(|d| d.currently_deployed).count();
    if current != 1 {
        return Err(format!("expected exactly 1 current record, got {current}"));
    }
    let replaced = all
        .iter()
        .filter(|d| d.replaced_previous_deployed_version)
        .count();
    if replaced != N - 1 {
        return Err(format!("expected {} replacing records, got {replaced}", N - 1));
    }
    if all
        .iter()
        .any(|d| !d.currently_deployed && d.undeployed_at.is_none())
    {
        return Err("undeployed record without undeployed_at".to_string());
    }
    Ok(())
}

// ── Concurrent verifications: distinct numbers ──────────────────────────────

async fn concurrent_verifications_get_distinct_numbers<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let result = async {
                let number = s.next_verification_number(&mut snap, "sha-a").await?;
                s.insert_verification(&mut snap, make_verification("sha-a", number))
                    .await?;
                Ok::<i64, StorageError>(number)
            }
            .await;
            match result {
                Ok(number) => {
                    s.commit_snapshot(snap).await?;
                    Ok(number)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        let number = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        numbers.push(number);
    }
    numbers.sort_unstable();
    let expected: Vec<i64> = (1..=N as i64).collect();
    if numbers != expected {
        return Err(format!("expected numbers {expected:?}, got {numbers:?}"));
    }
    Ok(())
}
