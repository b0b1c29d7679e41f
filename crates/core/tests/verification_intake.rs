//! The verification intake workflow end to end against the in-memory backend.

use std::sync::Arc;

use pactbroker_core::webhooks::RecordingDispatcher;
use pactbroker_core::{
    BrokerConfig, BrokerError, MemoryStorage, PactLocator, PactMetadata, PactService,
    VerificationIntake, VerificationService, WebhookExecutionConfiguration, WebhookKind,
};
use serde_json::{json, Value};

struct Broker {
    pacts: PactService<MemoryStorage>,
    verifications: VerificationService<MemoryStorage>,
    intake: VerificationIntake<MemoryStorage>,
    dispatcher: Arc<RecordingDispatcher>,
}

fn broker() -> Broker {
    let storage = Arc::new(MemoryStorage::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    Broker {
        pacts: PactService::new(storage.clone()),
        verifications: VerificationService::new(storage.clone()),
        intake: VerificationIntake::new(storage, dispatcher.clone()),
        dispatcher,
    }
}

fn pact_content() -> Value {
    json!({
        "consumer": { "name": "Consumer" },
        "provider": { "name": "Provider" },
        "interactions": [],
        "metadata": { "pactSpecification": { "version": "3.0.0" } }
    })
}

fn valid_params() -> Value {
    json!({ "success": true, "providerApplicationVersion": "4.5.6" })
}

fn configuration() -> WebhookExecutionConfiguration {
    let config = BrokerConfig {
        show_webhook_response: true,
        ..BrokerConfig::default()
    };
    WebhookExecutionConfiguration::from_config(&config).with_default_base_url("http://example.org")
}

async fn published(broker: &Broker) -> PactLocator {
    let published = broker
        .pacts
        .publish("Consumer", "Provider", "1", pact_content())
        .await
        .unwrap();
    PactLocator::new("Provider", "Consumer", published.pact.pact_version_sha)
}

#[tokio::test]
async fn unknown_pact_is_not_found_even_with_invalid_params() {
    let broker = broker();
    let locator = PactLocator::new("Provider", "Consumer", "1234");
    let err = broker
        .intake
        .create_verification(&locator, json!({}), Some("abcd"), configuration())
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::NotFound { kind: "pact", .. }));
}

#[tokio::test]
async fn numbers_continue_from_existing_verifications() {
    let broker = broker();
    let locator = published(&broker).await;

    let first = broker
        .intake
        .create_verification(&locator, valid_params(), None, configuration())
        .await
        .unwrap();
    assert_eq!(first.number, 1);
    assert_eq!(broker.verifications.next_number(&locator.pact_version_sha).await.unwrap(), 2);

    let second = broker
        .intake
        .create_verification(&locator, valid_params(), None, configuration())
        .await
        .unwrap();
    assert_eq!(second.number, 2);
    assert_eq!(second.provider_version, "4.5.6");

    let stored = broker
        .verifications
        .find(&locator.pact_version_sha, 2)
        .await
        .unwrap();
    assert_eq!(stored, second);
}

#[tokio::test]
async fn wip_metadata_is_persisted_as_boolean() {
    let broker = broker();
    let locator = published(&broker).await;
    let mut metadata = PactMetadata::new();
    metadata.insert("wip", "true");

    let record = broker
        .intake
        .create_verification(
            &locator,
            valid_params(),
            Some(&metadata.encode()),
            configuration(),
        )
        .await
        .unwrap();
    assert!(record.wip);
    assert!(
        broker
            .verifications
            .latest(&locator.pact_version_sha)
            .await
            .unwrap()
            .unwrap()
            .wip
    );
}

#[tokio::test]
async fn invalid_params_persist_nothing() {
    let broker = broker();
    let locator = published(&broker).await;

    let err = broker
        .intake
        .create_verification(&locator, json!({ "some": "params" }), None, configuration())
        .await
        .unwrap_err();
    let messages = err.validation_messages().unwrap();
    assert!(!messages.is_empty());

    assert!(broker
        .verifications
        .list(&locator.pact_version_sha)
        .await
        .unwrap()
        .is_empty());
    assert!(broker.dispatcher.events().is_empty());

    // The aborted snapshot did not consume a number.
    let record = broker
        .intake
        .create_verification(&locator, valid_params(), None, configuration())
        .await
        .unwrap();
    assert_eq!(record.number, 1);
}

#[tokio::test]
async fn extra_fields_and_webhook_configuration_are_kept() {
    let broker = broker();
    let locator = published(&broker).await;
    let mut params = valid_params();
    params["testResults"] = json!([{ "interactionDescription": "a request", "success": true }]);

    let record = broker
        .intake
        .create_verification(&locator, params, None, configuration())
        .await
        .unwrap();
    assert!(record.extra.contains_key("testResults"));

    let events = broker.dispatcher.events();
    assert_eq!(events.len(), 2);
    let (event, configuration) = &events[0];
    assert_eq!(event.kind, WebhookKind::ProviderVerificationPublished);
    assert_eq!(event.context["providerVersionNumber"], "4.5.6");
    assert!(configuration.show_response);
    assert_eq!(configuration.base_url.as_deref(), Some("http://example.org"));
    assert_eq!(events[1].0.kind, WebhookKind::ProviderVerificationSucceeded);
}
