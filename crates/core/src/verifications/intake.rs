use std::sync::Arc;

use pactbroker_storage::{BrokerStorage, VerificationRecord};
use serde_json::Value;

use super::params::{merge_wip, VerificationParams};
use super::verification_result_path;
use crate::error::BrokerError;
use crate::metadata::PactMetadata;
use crate::now_rfc3339;
use crate::pacticipants::ensure_version;
use crate::pacts::{Pact, PactLocator, PactService};
use crate::webhooks::{WebhookDispatcher, WebhookEvent, WebhookExecutionConfiguration, WebhookKind};

/// The verification intake workflow.
///
/// ```text
/// Received -> PactResolved -> Validated -> Persisted
///          \-> NotFound     \-> ValidationFailed
/// ```
///
/// Nothing is persisted unless the workflow reaches `Persisted`. A resolved
/// pact is required before the parameters are looked at, so an unknown pact
/// is reported as not found even when the parameters are also invalid.
pub struct VerificationIntake<S> {
    storage: Arc<S>,
    pacts: PactService<S>,
    dispatcher: Arc<dyn WebhookDispatcher>,
}

impl<S: BrokerStorage> VerificationIntake<S> {
    pub fn new(storage: Arc<S>, dispatcher: Arc<dyn WebhookDispatcher>) -> Self {
        Self {
            pacts: PactService::new(storage.clone()),
            storage,
            dispatcher,
        }
    }

    /// Record a verification of the pact identified by `locator`.
    ///
    /// `metadata_token` is the encoded pact metadata from the request path;
    /// `configuration` is the request's webhook execution configuration,
    /// which is enriched with the decoded metadata before dispatch.
    pub async fn create_verification(
        &self,
        locator: &PactLocator,
        raw_params: Value,
        metadata_token: Option<&str>,
        configuration: WebhookExecutionConfiguration,
    ) -> Result<VerificationRecord, BrokerError> {
        let metadata = decode_metadata(metadata_token);
        let pact = self.resolve_pact(locator, &metadata).await?;
        self.persist(pact, metadata, raw_params, configuration).await
    }

    /// Like [`create_verification`](Self::create_verification), for a request
    /// body that has not been parsed yet. The pact is resolved first, so an
    /// unknown pact is not found even when the body is not JSON. A blank body
    /// reads as `{}`.
    pub async fn create_verification_from_body(
        &self,
        locator: &PactLocator,
        body: &[u8],
        metadata_token: Option<&str>,
        configuration: WebhookExecutionConfiguration,
    ) -> Result<VerificationRecord, BrokerError> {
        let metadata = decode_metadata(metadata_token);
        let pact = self.resolve_pact(locator, &metadata).await?;
        let raw_params = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_slice(body)
                .map_err(|e| BrokerError::Validation(vec![format!("invalid JSON: {e}")]))?
        };
        self.persist(pact, metadata, raw_params, configuration).await
    }

    async fn resolve_pact(
        &self,
        locator: &PactLocator,
        metadata: &PactMetadata,
    ) -> Result<Pact, BrokerError> {
        let locator = locator
            .clone()
            .with_consumer_version(metadata.consumer_version_number());
        self.pacts.find_pact(&locator).await?.ok_or_else(|| {
            BrokerError::not_found(
                "pact",
                format!(
                    "{}/{}/{}",
                    locator.provider, locator.consumer, locator.pact_version_sha
                ),
            )
        })
    }

    async fn persist(
        &self,
        pact: Pact,
        metadata: PactMetadata,
        mut raw_params: Value,
        configuration: WebhookExecutionConfiguration,
    ) -> Result<VerificationRecord, BrokerError> {
        merge_wip(&mut raw_params, &metadata);

        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = async {
            let number = self
                .storage
                .next_verification_number(&mut snapshot, &pact.pact_version_sha)
                .await?;
            let params = VerificationParams::parse(raw_params)?;
            let storage = self.storage.as_ref();
            ensure_version(
                storage,
                &mut snapshot,
                &pact.provider,
                &params.provider_application_version,
                None,
            )
            .await?;
            let record = build_record(&pact, number, params);
            storage
                .insert_verification(&mut snapshot, record.clone())
                .await?;
            Ok::<_, BrokerError>(record)
        }
        .await;

        let record = match result {
            Ok(record) => {
                self.storage.commit_snapshot(snapshot).await?;
                record
            }
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                if let BrokerError::Validation(messages) = &e {
                    tracing::debug!(sha = %pact.pact_version_sha, ?messages, "rejected verification");
                }
                return Err(e);
            }
        };

        tracing::info!(
            provider = %record.provider,
            consumer = %record.consumer,
            sha = %record.pact_version_sha,
            number = record.number,
            success = record.success,
            "recorded verification"
        );

        let configuration = configuration.with_webhook_context(&metadata);
        self.publish_events(&record, &configuration);
        Ok(record)
    }

    fn publish_events(
        &self,
        record: &VerificationRecord,
        configuration: &WebhookExecutionConfiguration,
    ) {
        let path = verification_result_path(
            &record.provider,
            &record.consumer,
            &record.pact_version_sha,
            record.number,
        );
        let mut event = WebhookEvent::new(WebhookKind::ProviderVerificationPublished)
            .with("providerName", record.provider.as_str())
            .with("consumerName", record.consumer.as_str())
            .with("pactVersionSha", record.pact_version_sha.as_str())
            .with("providerVersionNumber", record.provider_version.as_str())
            .with("verificationNumber", record.number.to_string())
            .with("verificationSuccess", record.success.to_string());
        if let Some(consumer_version) = &record.consumer_version {
            event = event.with("consumerVersionNumber", consumer_version.as_str());
        }
        if let Some(build_url) = &record.build_url {
            event = event.with("buildUrl", build_url.as_str());
        }
        if let Some(base_url) = &configuration.base_url {
            let url = format!("{}{path}", base_url.trim_end_matches('/'));
            event = event.with("verificationResultUrl", url);
        }

        let outcome = if record.success {
            WebhookKind::ProviderVerificationSucceeded
        } else {
            WebhookKind::ProviderVerificationFailed
        };
        let outcome_event = WebhookEvent {
            kind: outcome,
            context: event.context.clone(),
        };
        self.dispatcher.dispatch(event, configuration);
        self.dispatcher.dispatch(outcome_event, configuration);
    }
}

fn decode_metadata(token: Option<&str>) -> PactMetadata {
    token.map(PactMetadata::decode).unwrap_or_default()
}

fn build_record(pact: &Pact, number: i64, params: VerificationParams) -> VerificationRecord {
    VerificationRecord {
        pact_version_sha: pact.pact_version_sha.clone(),
        number,
        provider: pact.provider.clone(),
        consumer: pact.consumer.clone(),
        consumer_version: Some(pact.consumer_version.clone()),
        provider_version: params.provider_application_version,
        success: params.success,
        wip: params.wip,
        build_url: params.build_url,
        extra: params.extra,
        execution_date: now_rfc3339(),
    }
}
