//! Pact publication and lookup.
//!
//! Pact content is immutable and addressed by the SHA-256 of its serialised
//! JSON. A publication links a consumer version to a content SHA; republishing
//! for the same consumer version repoints the link.

use std::sync::Arc;

use pactbroker_storage::{BrokerStorage, PactContentRecord, PactPublicationRecord};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::BrokerError;
use crate::now_rfc3339;
use crate::pacticipants::ensure_version;

/// Identifies a pact version between a provider and a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PactLocator {
    pub provider: String,
    pub consumer: String,
    pub pact_version_sha: String,
    /// Prefer the publication made for this consumer version.
    pub consumer_version_number: Option<String>,
}

impl PactLocator {
    pub fn new(
        provider: impl Into<String>,
        consumer: impl Into<String>,
        pact_version_sha: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            consumer: consumer.into(),
            pact_version_sha: pact_version_sha.into(),
            consumer_version_number: None,
        }
    }

    pub fn with_consumer_version(mut self, number: Option<&str>) -> Self {
        self.consumer_version_number = number.map(str::to_string);
        self
    }
}

/// A resolved pact: a publication joined with its content.
#[derive(Debug, Clone, PartialEq)]
pub struct Pact {
    pub consumer: String,
    pub provider: String,
    pub consumer_version: String,
    pub pact_version_sha: String,
    pub content: Value,
    pub created_at: String,
}

/// Result of [`PactService::publish`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedPact {
    pub pact: Pact,
    /// `false` when the same content was already published for this version.
    pub created: bool,
    /// `true` when this content had never been stored before.
    pub new_content: bool,
}

/// SHA-256 hex digest of the serialised pact content.
pub fn pact_version_sha(content: &Value) -> String {
    let bytes = serde_json::to_vec(content).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn named<'a>(content: &'a Value, role: &str) -> Option<&'a str> {
    content.get(role)?.get("name")?.as_str()
}

pub struct PactService<S> {
    storage: Arc<S>,
}

impl<S: BrokerStorage> PactService<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Publish `content` as the pact between `consumer` (at
    /// `consumer_version`) and `provider`.
    ///
    /// Missing pacticipants and the consumer version are created. If the
    /// content names its consumer or provider, the names must match.
    pub async fn publish(
        &self,
        consumer: &str,
        provider: &str,
        consumer_version: &str,
        content: Value,
    ) -> Result<PublishedPact, BrokerError> {
        let mut errors = Vec::new();
        if !content.is_object() {
            errors.push("pact content must be a JSON object".to_string());
        }
        for (role, expected) in [("consumer", consumer), ("provider", provider)] {
            if let Some(actual) = named(&content, role) {
                if actual != expected {
                    errors.push(format!(
                        "{role} name in pact content ({actual}) does not match {role} name in path ({expected})"
                    ));
                }
            }
        }
        if consumer_version.trim().is_empty() {
            errors.push("consumer version number cannot be blank".to_string());
        }
        if !errors.is_empty() {
            return Err(BrokerError::Validation(errors));
        }

        let sha = pact_version_sha(&content);
        let now = now_rfc3339();
        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = async {
            let storage = self.storage.as_ref();
            ensure_version(storage, &mut snapshot, consumer, consumer_version, None).await?;
            crate::pacticipants::ensure_pacticipant(storage, &mut snapshot, provider).await?;

            let new_content = storage
                .insert_pact_content(
                    &mut snapshot,
                    PactContentRecord {
                        sha: sha.clone(),
                        consumer: consumer.to_string(),
                        provider: provider.to_string(),
                        content: content.clone(),
                        created_at: now.clone(),
                    },
                )
                .await?;
            let previous = storage
                .put_pact_publication(
                    &mut snapshot,
                    PactPublicationRecord {
                        consumer: consumer.to_string(),
                        provider: provider.to_string(),
                        consumer_version: consumer_version.to_string(),
                        pact_version_sha: sha.clone(),
                        created_at: now.clone(),
                    },
                )
                .await?;
            let created = previous.map_or(true, |p| p.pact_version_sha != sha);
            Ok::<_, BrokerError>((created, new_content))
        }
        .await;

        match result {
            Ok((created, new_content)) => {
                self.storage.commit_snapshot(snapshot).await?;
                tracing::info!(
                    consumer,
                    provider,
                    consumer_version,
                    sha = %sha,
                    created,
                    "published pact"
                );
                Ok(PublishedPact {
                    pact: Pact {
                        consumer: consumer.to_string(),
                        provider: provider.to_string(),
                        consumer_version: consumer_version.to_string(),
                        pact_version_sha: sha,
                        content,
                        created_at: now,
                    },
                    created,
                    new_content,
                })
            }
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                Err(e)
            }
        }
    }

    /// Resolve a pact by provider, consumer and content SHA.
    ///
    /// When several consumer versions share the content, the publication for
    /// `locator.consumer_version_number` wins, else the most recent one.
    /// Returns `None` when no publication matches.
    pub async fn find_pact(&self, locator: &PactLocator) -> Result<Option<Pact>, BrokerError> {
        let publications = self
            .storage
            .list_pact_publications(
                &locator.provider,
                &locator.consumer,
                Some(&locator.pact_version_sha),
            )
            .await?;
        let preferred = locator.consumer_version_number.as_deref().and_then(|number| {
            publications
                .iter()
                .rev()
                .find(|p| p.consumer_version == number)
        });
        let Some(publication) = preferred.or_else(|| publications.last()) else {
            return Ok(None);
        };
        Ok(Some(self.join(publication).await?))
    }

    /// The most recently published pact between `consumer` and `provider`.
    pub async fn latest_pact(&self, provider: &str, consumer: &str) -> Result<Pact, BrokerError> {
        let publications = self
            .storage
            .list_pact_publications(provider, consumer, None)
            .await?;
        let publication = publications
            .last()
            .ok_or_else(|| BrokerError::not_found("pact", format!("{consumer}/{provider}")))?;
        self.join(publication).await
    }

    /// The pact published for a specific consumer version.
    pub async fn pact_for_version(
        &self,
        provider: &str,
        consumer: &str,
        consumer_version: &str,
    ) -> Result<Pact, BrokerError> {
        let publications = self
            .storage
            .list_pact_publications(provider, consumer, None)
            .await?;
        let publication = publications
            .iter()
            .rev()
            .find(|p| p.consumer_version == consumer_version)
            .ok_or_else(|| {
                BrokerError::not_found("pact", format!("{consumer}/{provider}/{consumer_version}"))
            })?;
        self.join(publication).await
    }

    async fn join(&self, publication: &PactPublicationRecord) -> Result<Pact, BrokerError> {
        let content = self
            .storage
            .get_pact_content(&publication.pact_version_sha)
            .await?;
        Ok(Pact {
            consumer: publication.consumer.clone(),
            provider: publication.provider.clone(),
            consumer_version: publication.consumer_version.clone(),
            pact_version_sha: publication.pact_version_sha.clone(),
            content: content.content,
            created_at: publication.created_at.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pactbroker_storage::MemoryStorage;
    use serde_json::json;

    fn pact_json(interactions: usize) -> Value {
        json!({
            "consumer": { "name": "Consumer" },
            "provider": { "name": "Provider" },
            "interactions": vec![json!({"description": "a request"}); interactions],
        })
    }

    #[test]
    fn sha_is_stable_hex() {
        let a = pact_version_sha(&pact_json(1));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, pact_version_sha(&pact_json(1)));
        assert_ne!(a, pact_version_sha(&pact_json(2)));
    }

    #[tokio::test]
    async fn publish_then_find() {
        let svc = PactService::new(Arc::new(MemoryStorage::new()));
        let published = svc
            .publish("Consumer", "Provider", "1", pact_json(1))
            .await
            .unwrap();
        assert!(published.created && published.new_content);

        let locator = PactLocator::new("Provider", "Consumer", &published.pact.pact_version_sha);
        let found = svc.find_pact(&locator).await.unwrap().unwrap();
        assert_eq!(found.consumer_version, "1");
        assert_eq!(found.content, pact_json(1));

        let missing = PactLocator::new("Provider", "Consumer", "0000");
        assert!(svc.find_pact(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn republishing_is_idempotent() {
        let svc = PactService::new(Arc::new(MemoryStorage::new()));
        svc.publish("Consumer", "Provider", "1", pact_json(1))
            .await
            .unwrap();
        let again = svc
            .publish("Consumer", "Provider", "1", pact_json(1))
            .await
            .unwrap();
        assert!(!again.created);
        assert!(!again.new_content);
    }

    #[tokio::test]
    async fn locator_prefers_requested_consumer_version() {
        let svc = PactService::new(Arc::new(MemoryStorage::new()));
        let first = svc
            .publish("Consumer", "Provider", "1", pact_json(1))
            .await
            .unwrap();
        let second = svc
            .publish("Consumer", "Provider", "2", pact_json(1))
            .await
            .unwrap();
        assert!(!second.new_content);

        let sha = first.pact.pact_version_sha;
        let locator = PactLocator::new("Provider", "Consumer", &sha);
        let latest = svc.find_pact(&locator).await.unwrap().unwrap();
        assert_eq!(latest.consumer_version, "2");

        let pinned = locator.with_consumer_version(Some("1"));
        let found = svc.find_pact(&pinned).await.unwrap().unwrap();
        assert_eq!(found.consumer_version, "1");

        let latest = svc.latest_pact("Provider", "Consumer").await.unwrap();
        assert_eq!(latest.consumer_version, "2");

        let pinned = svc.pact_for_version("Provider", "Consumer", "1").await.unwrap();
        assert_eq!(pinned.consumer_version, "1");
        assert!(svc.pact_for_version("Provider", "Consumer", "3").await.is_err());
    }

    #[tokio::test]
    async fn mismatched_names_are_rejected() {
        let svc = PactService::new(Arc::new(MemoryStorage::new()));
        let err = svc
            .publish("Someone Else", "Provider", "1", pact_json(1))
            .await
            .unwrap_err();
        let messages = err.validation_messages().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("consumer name in pact content"));
        assert!(matches!(
            svc.latest_pact("Provider", "Someone Else").await.unwrap_err(),
            BrokerError::NotFound { .. }
        ));
    }
}
