//! Pact metadata tokens.
//!
//! When the broker hands a pact to a provider for verification it embeds a
//! small key/value map in the URL (`.../metadata/{token}/verification-results`).
//! The token is the URL-safe, unpadded base64 encoding of a form-urlencoded
//! query string such as `consumer_version_number=2&wip=true`.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

#[derive(Debug, thiserror::Error)]
enum MetadataError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("invalid query string: {0}")]
    Query(#[from] serde_urlencoded::de::Error),
}

/// Decoded pact metadata. Keys are kept in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PactMetadata(BTreeMap<String, String>);

impl PactMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a token. Malformed tokens yield empty metadata.
    pub fn decode(token: &str) -> Self {
        match Self::try_decode(token) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!(token, error = %e, "ignoring malformed pact metadata");
                Self::default()
            }
        }
    }

    fn try_decode(token: &str) -> Result<Self, MetadataError> {
        let bytes = URL_SAFE_NO_PAD.decode(token.trim_end_matches('='))?;
        let query = String::from_utf8(bytes)?;
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(&query)?;
        Ok(Self(pairs.into_iter().collect()))
    }

    pub fn encode(&self) -> String {
        // Serialising string pairs cannot fail.
        let query = serde_urlencoded::to_string(&self.0).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(query)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The consumer version the verified pact was fetched for, if recorded.
    pub fn consumer_version_number(&self) -> Option<&str> {
        self.get("consumer_version_number").filter(|v| !v.is_empty())
    }

    /// Whether the pact was verified as a work-in-progress pact.
    pub fn wip(&self) -> bool {
        self.get("wip").is_some_and(is_truthy)
    }
}

impl FromIterator<(String, String)> for PactMetadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// `"true"`, `"1"` and `"yes"` (any case) are true; everything else is false.
pub(crate) fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(query: &str) -> String {
        URL_SAFE_NO_PAD.encode(query)
    }

    #[test]
    fn decodes_query_token() {
        let metadata = PactMetadata::decode(&token("consumer_version_number=2&wip=true"));
        assert_eq!(metadata.consumer_version_number(), Some("2"));
        assert!(metadata.wip());
    }

    #[test]
    fn encode_produces_decodable_token() {
        let mut metadata = PactMetadata::new();
        metadata.insert("consumer_version_number", "1.0.0+abc");
        metadata.insert("wip", "true");
        let encoded = metadata.encode();
        assert!(!encoded.contains('='));
        assert_eq!(PactMetadata::decode(&encoded), metadata);
    }

    #[test]
    fn malformed_tokens_decode_to_empty() {
        assert!(PactMetadata::decode("!!not base64!!").is_empty());
        assert!(PactMetadata::decode(&URL_SAFE_NO_PAD.encode([0xff, 0xfe])).is_empty());
        assert!(PactMetadata::decode("").is_empty());
    }

    #[test]
    fn padded_tokens_are_accepted() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode("wip=1");
        assert!(PactMetadata::decode(&padded).wip());
    }

    #[test]
    fn wip_truthiness() {
        for value in ["true", "TRUE", "1", "yes", " Yes "] {
            assert!(is_truthy(value), "{value}");
        }
        for value in ["false", "0", "no", "", "y"] {
            assert!(!is_truthy(value), "{value}");
        }
        assert!(!PactMetadata::decode(&token("consumer_version_number=2")).wip());
    }
}
