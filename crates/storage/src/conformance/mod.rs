//! Conformance test suite for `BrokerStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `BrokerStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Pacticipants**: insert, duplicate detection, update, lookups
//! - **Snapshot isolation**: uncommitted writes invisible, aborted writes discarded
//! - **Deployments**: current-record lookup, undeploy bookkeeping
//! - **Verifications**: per-pact numbering and uniqueness
//! - **Concurrency**: serialised snapshots keep one current deployment and
//!   distinct verification numbers under contention
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use pactbroker_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod deployment;
mod pacticipant;
mod snapshot;
mod verification;

use std::fmt;
use std::future::Future;

use crate::record::{DeployedVersionRecord, PacticipantRecord, VerificationRecord};
use crate::BrokerStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "pacticipant", "snapshot", "deployment").
    pub category: String,
    /// Test name (e.g. "duplicate_insert_rejected").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in self.results.iter().filter(|r| !r.passed) {
            writeln!(
                f,
                "  FAIL [{}/{}]: {}",
                r.category,
                r.name,
                r.message.as_deref().unwrap_or("(no message)")
            )?;
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(pacticipant::run_pacticipant_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(deployment::run_deployment_tests(&factory).await);
    results.extend(verification::run_verification_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_pacticipant(name: &str) -> PacticipantRecord {
    PacticipantRecord {
        name: name.to_string(),
        display_name: None,
        repository_url: None,
        repository_name: None,
        repository_organization: None,
        main_branch: None,
        main_development_branches: Vec::new(),
        created_at: "2026-01-01T00:00:00Z".to_string(),
        updated_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

fn make_deployed_version(uuid: &str, version_number: &str) -> DeployedVersionRecord {
    DeployedVersionRecord {
        uuid: uuid.to_string(),
        pacticipant: "Bar".to_string(),
        version_number: version_number.to_string(),
        environment: "production".to_string(),
        application_instance: None,
        currently_deployed: true,
        replaced_previous_deployed_version: false,
        created_at: "2026-01-01T00:00:00Z".to_string(),
        undeployed_at: None,
    }
}

fn make_verification(sha: &str, number: i64) -> VerificationRecord {
    VerificationRecord {
        pact_version_sha: sha.to_string(),
        number,
        provider: "Bar".to_string(),
        consumer: "Foo".to_string(),
        consumer_version: Some("1".to_string()),
        provider_version: "2".to_string(),
        success: true,
        wip: false,
        build_url: None,
        extra: serde_json::Map::new(),
        execution_date: "2026-01-01T00:00:00Z".to_string(),
    }
}
