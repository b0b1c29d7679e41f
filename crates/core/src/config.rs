//! Broker configuration.
//!
//! Loaded once at startup from an optional TOML file, then overridden from
//! the environment, and passed explicitly to everything that needs it.
//!
//! # Example
//!
//! ```toml
//! base_url = "https://broker.example.org"
//! show_webhook_response = true
//! data_file = "/var/lib/pactbroker/data.json"
//!
//! [[webhooks]]
//! url = "https://ci.example.org/build"
//! events = ["contract_published", "provider_verification_failed"]
//! body = { consumer = "${pactbroker.consumerName}" }
//!
//! [webhooks.headers]
//! Authorization = "Bearer xyz"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::webhooks::{HttpWebhookDispatcher, NoopDispatcher, WebhookDispatcher, WebhookTarget};

pub const ENV_BASE_URL: &str = "PACTBROKER_BASE_URL";
pub const ENV_DATA_FILE: &str = "PACTBROKER_DATA_FILE";
pub const ENV_SHOW_WEBHOOK_RESPONSE: &str = "PACTBROKER_SHOW_WEBHOOK_RESPONSE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    /// Public base URL used in links. Falls back to the request's Host header.
    pub base_url: Option<String>,
    /// Log webhook response bodies.
    pub show_webhook_response: bool,
    /// Persist state to this JSON file. In-memory only when unset.
    pub data_file: Option<PathBuf>,
    pub webhooks: Vec<WebhookTarget>,
}

impl BrokerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BrokerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `PACTBROKER_*` overrides from `lookup`.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = Some(url);
        }
        if let Some(path) = lookup(ENV_DATA_FILE).filter(|v| !v.is_empty()) {
            self.data_file = Some(PathBuf::from(path));
        }
        if let Some(flag) = lookup(ENV_SHOW_WEBHOOK_RESPONSE) {
            self.show_webhook_response = crate::metadata::is_truthy(&flag);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// The base URL without a trailing slash.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref().map(|url| url.trim_end_matches('/'))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if let Some(url) = &self.base_url {
            if !is_http_url(url) {
                errors.push(format!("base_url must be an http(s) URL, got '{url}'"));
            }
        }
        for (i, target) in self.webhooks.iter().enumerate() {
            if !is_http_url(&target.url) {
                errors.push(format!(
                    "webhooks[{i}].url must be an http(s) URL, got '{}'",
                    target.url
                ));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// The dispatcher for the configured webhook targets.
    pub fn webhook_dispatcher(&self) -> Arc<dyn WebhookDispatcher> {
        if self.webhooks.is_empty() {
            Arc::new(NoopDispatcher)
        } else {
            Arc::new(HttpWebhookDispatcher::new(self.webhooks.clone()))
        }
    }
}

/// An absolute http(s) URL with a host.
pub(crate) fn is_http_url(value: &str) -> bool {
    match url::Url::parse(value) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::WebhookKind;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
base_url = "https://broker.example.org/"
show_webhook_response = true

[[webhooks]]
url = "https://ci.example.org/build"
events = ["provider_verification_published"]
body = { consumer = "${pactbroker.consumerName}" }

[webhooks.headers]
Authorization = "Bearer xyz"
"#;

    #[test]
    fn parses_full_config() {
        let config = BrokerConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.base_url(), Some("https://broker.example.org"));
        assert!(config.show_webhook_response);
        assert!(config.data_file.is_none());
        assert_eq!(config.webhooks.len(), 1);
        let target = &config.webhooks[0];
        assert_eq!(target.events, vec![WebhookKind::ProviderVerificationPublished]);
        assert_eq!(target.headers["Authorization"], "Bearer xyz");
        assert_eq!(
            target.body.as_ref().unwrap()["consumer"],
            "${pactbroker.consumerName}"
        );
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(BrokerConfig::from_toml_str("").unwrap(), BrokerConfig::default());
    }

    #[test]
    fn unknown_keys_and_bad_urls_are_rejected() {
        assert!(matches!(
            BrokerConfig::from_toml_str("bogus = 1"),
            Err(ConfigError::Parse(_))
        ));
        let err = BrokerConfig::from_toml_str("base_url = \"ftp://x\"").unwrap_err();
        assert!(err.to_string().contains("base_url must be an http(s) URL"));
    }

    #[test]
    fn http_urls_must_parse() {
        assert!(is_http_url("http://broker:9292/path?x=1"));
        assert!(is_http_url("https://ci.example.org/build/${pactbroker.providerName}"));
        assert!(!is_http_url("http://not a url"));
        assert!(!is_http_url("http://"));
        assert!(!is_http_url("mailto:someone@example.org"));
        assert!(!is_http_url("broker.example.org"));

        let err = BrokerConfig::from_toml_str("[[webhooks]]\nurl = \"http://bad host\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn environment_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_BASE_URL, "http://override:9292"),
            (ENV_DATA_FILE, "/tmp/broker.json"),
            (ENV_SHOW_WEBHOOK_RESPONSE, "false"),
        ]);
        let config = BrokerConfig::from_toml_str(SAMPLE)
            .unwrap()
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.base_url(), Some("http://override:9292"));
        assert_eq!(config.data_file, Some(PathBuf::from("/tmp/broker.json")));
        assert!(!config.show_webhook_response);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = BrokerConfig::load(Path::new("/nonexistent/pactbroker.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/pactbroker.toml"));
    }
}
