//! Webhook events, targets and dispatch.
//!
//! Domain services hand a [`WebhookEvent`] and the request's
//! [`WebhookExecutionConfiguration`] to a [`WebhookDispatcher`] after their
//! snapshot commits. Dispatch never blocks the caller and never fails it.

mod context;
mod http;
mod template;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use context::WebhookExecutionConfiguration;
pub use http::HttpWebhookDispatcher;
pub use template::{render, render_url, render_value};

/// The state changes that can trigger a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookKind {
    ProviderVerificationPublished,
    ProviderVerificationSucceeded,
    ProviderVerificationFailed,
    ContractPublished,
    DeploymentRecorded,
    DeploymentUndeployed,
}

impl WebhookKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookKind::ProviderVerificationPublished => "provider_verification_published",
            WebhookKind::ProviderVerificationSucceeded => "provider_verification_succeeded",
            WebhookKind::ProviderVerificationFailed => "provider_verification_failed",
            WebhookKind::ContractPublished => "contract_published",
            WebhookKind::DeploymentRecorded => "deployment_recorded",
            WebhookKind::DeploymentUndeployed => "deployment_undeployed",
        }
    }
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change plus the values templates can refer to
/// (`consumerName`, `providerVersionNumber`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub kind: WebhookKind,
    pub context: BTreeMap<String, String>,
}

impl WebhookEvent {
    pub fn new(kind: WebhookKind) -> Self {
        Self {
            kind,
            context: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

/// An outbound webhook, as configured in `[[webhooks]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookTarget {
    pub url: String,
    /// Events this target fires for. Empty means every event.
    #[serde(default)]
    pub events: Vec<WebhookKind>,
    /// JSON body template. Defaults to the event name and its context.
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl WebhookTarget {
    pub fn accepts(&self, kind: WebhookKind) -> bool {
        self.events.is_empty() || self.events.contains(&kind)
    }
}

/// Delivers webhook events.
///
/// Implementations must return promptly: delivery happens in the background.
pub trait WebhookDispatcher: Send + Sync {
    fn dispatch(&self, event: WebhookEvent, configuration: &WebhookExecutionConfiguration);
}

/// Drops every event. Used when no targets are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDispatcher;

impl WebhookDispatcher for NoopDispatcher {
    fn dispatch(&self, event: WebhookEvent, _configuration: &WebhookExecutionConfiguration) {
        tracing::trace!(event = %event.kind, "no webhook targets configured");
    }
}

/// Keeps every dispatched event in memory.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<(WebhookEvent, WebhookExecutionConfiguration)>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything dispatched so far, oldest first.
    pub fn events(&self) -> Vec<(WebhookEvent, WebhookExecutionConfiguration)> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<WebhookKind> {
        self.events().into_iter().map(|(e, _)| e.kind).collect()
    }
}

impl WebhookDispatcher for RecordingDispatcher {
    fn dispatch(&self, event: WebhookEvent, configuration: &WebhookExecutionConfiguration) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push((event, configuration.clone()));
    }
}
