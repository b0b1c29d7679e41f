//! Verification results.
//!
//! Verifications are numbered per pact version starting at 1. The number is
//! taken inside the snapshot that inserts the record, so concurrent
//! publications of results for the same pact version never collide.

mod intake;
mod params;

use std::sync::Arc;

use pactbroker_storage::{BrokerStorage, VerificationRecord};

use crate::error::BrokerError;

pub use intake::VerificationIntake;
pub use params::VerificationParams;

/// Path of a verification result resource, with each segment percent-encoded.
pub fn verification_result_path(
    provider: &str,
    consumer: &str,
    pact_version_sha: &str,
    number: i64,
) -> String {
    format!(
        "/pacts/provider/{}/consumer/{}/pact-version/{}/verification-results/{number}",
        encode_segment(provider),
        encode_segment(consumer),
        encode_segment(pact_version_sha),
    )
}

/// Percent-encode a path segment (RFC 3986 unreserved characters pass).
pub fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

/// Read access to stored verifications.
pub struct VerificationService<S> {
    storage: Arc<S>,
}

impl<S: BrokerStorage> VerificationService<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// The number the next verification of this pact version would get,
    /// based on committed state. Informational only: the intake workflow
    /// allocates the real number inside its snapshot.
    pub async fn next_number(&self, pact_version_sha: &str) -> Result<i64, BrokerError> {
        let existing = self.storage.list_verifications(pact_version_sha).await?;
        Ok(existing.last().map_or(1, |v| v.number + 1))
    }

    pub async fn find(
        &self,
        pact_version_sha: &str,
        number: i64,
    ) -> Result<VerificationRecord, BrokerError> {
        Ok(self.storage.get_verification(pact_version_sha, number).await?)
    }

    pub async fn list(&self, pact_version_sha: &str) -> Result<Vec<VerificationRecord>, BrokerError> {
        Ok(self.storage.list_verifications(pact_version_sha).await?)
    }

    /// The highest-numbered verification of a pact version, if any.
    pub async fn latest(
        &self,
        pact_version_sha: &str,
    ) -> Result<Option<VerificationRecord>, BrokerError> {
        Ok(self.list(pact_version_sha).await?.pop())
    }
}
