//! Application state shared across request handlers.

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use pactbroker_core::{
    BrokerConfig, DeploymentTracker, EnvironmentService, MemoryStorage, PactService,
    PacticipantService, VerificationIntake, VerificationService, WebhookDispatcher, WebhookEvent,
    WebhookExecutionConfiguration,
};

pub(crate) struct AppState {
    pub(crate) config: BrokerConfig,
    pub(crate) pacticipants: PacticipantService<MemoryStorage>,
    pub(crate) environments: EnvironmentService<MemoryStorage>,
    pub(crate) deployments: DeploymentTracker<MemoryStorage>,
    pub(crate) pacts: PactService<MemoryStorage>,
    pub(crate) verifications: VerificationService<MemoryStorage>,
    pub(crate) intake: VerificationIntake<MemoryStorage>,
    dispatcher: Arc<dyn WebhookDispatcher>,
}

impl AppState {
    pub(crate) fn new(
        storage: Arc<MemoryStorage>,
        config: BrokerConfig,
        dispatcher: Arc<dyn WebhookDispatcher>,
    ) -> Self {
        Self {
            config,
            pacticipants: PacticipantService::new(storage.clone()),
            environments: EnvironmentService::new(storage.clone()),
            deployments: DeploymentTracker::new(storage.clone()),
            pacts: PactService::new(storage.clone()),
            verifications: VerificationService::new(storage.clone()),
            intake: VerificationIntake::new(storage, dispatcher.clone()),
            dispatcher,
        }
    }

    /// The configured base URL, else one built from the Host header.
    pub(crate) fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(base_url) = self.config.base_url() {
            return base_url.to_string();
        }
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or("localhost");
        format!("http://{}", host)
    }

    /// A fresh webhook execution configuration for one request.
    pub(crate) fn webhook_configuration(&self, headers: &HeaderMap) -> WebhookExecutionConfiguration {
        WebhookExecutionConfiguration::from_config(&self.config)
            .with_default_base_url(self.base_url(headers))
    }

    /// Fire a webhook event for a state change made by a handler.
    pub(crate) fn dispatch(&self, event: WebhookEvent, headers: &HeaderMap) {
        let configuration = self.webhook_configuration(headers);
        self.dispatcher.dispatch(event, &configuration);
    }
}
