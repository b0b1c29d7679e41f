use std::collections::BTreeMap;

use crate::config::BrokerConfig;
use crate::metadata::PactMetadata;

/// Per-request settings for webhook execution.
///
/// Built from the broker configuration for each request, then enriched with
/// request-specific values before it reaches the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookExecutionConfiguration {
    /// Log the webhook response body.
    pub show_response: bool,
    /// Base URL used to build links in webhook bodies.
    pub base_url: Option<String>,
    /// Extra template values, usually the metadata of the verified pact.
    pub webhook_context: BTreeMap<String, String>,
}

impl WebhookExecutionConfiguration {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            show_response: config.show_webhook_response,
            base_url: config.base_url.clone(),
            webhook_context: BTreeMap::new(),
        }
    }

    /// Use `base_url` unless the configuration pins one.
    pub fn with_default_base_url(mut self, base_url: impl Into<String>) -> Self {
        if self.base_url.is_none() {
            self.base_url = Some(base_url.into());
        }
        self
    }

    /// Merge `metadata` into the webhook context. Metadata keys win.
    pub fn with_webhook_context(mut self, metadata: &PactMetadata) -> Self {
        for (key, value) in metadata.iter() {
            self.webhook_context
                .insert(key.to_string(), value.to_string());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_merge_keeps_existing_keys_and_overrides_duplicates() {
        let mut metadata = PactMetadata::new();
        metadata.insert("consumer_version_number", "2");
        let mut config = WebhookExecutionConfiguration::default();
        config
            .webhook_context
            .insert("consumer_version_number".to_string(), "1".to_string());
        config
            .webhook_context
            .insert("other".to_string(), "kept".to_string());

        let merged = config.with_webhook_context(&metadata);
        assert_eq!(merged.webhook_context["consumer_version_number"], "2");
        assert_eq!(merged.webhook_context["other"], "kept");
    }

    #[test]
    fn configured_base_url_wins_over_request_default() {
        let config = BrokerConfig {
            base_url: Some("https://broker.example.org".to_string()),
            show_webhook_response: true,
            ..BrokerConfig::default()
        };
        let execution = WebhookExecutionConfiguration::from_config(&config)
            .with_default_base_url("http://localhost:9292");
        assert!(execution.show_response);
        assert_eq!(execution.base_url.as_deref(), Some("https://broker.example.org"));

        let execution = WebhookExecutionConfiguration::from_config(&BrokerConfig::default())
            .with_default_base_url("http://localhost:9292");
        assert_eq!(execution.base_url.as_deref(), Some("http://localhost:9292"));
    }
}
