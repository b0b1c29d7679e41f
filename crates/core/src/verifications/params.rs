//! Verification request parameters and their validation.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::is_http_url;
use crate::error::BrokerError;
use crate::metadata::{is_truthy, PactMetadata};

static SCHEMA_STR: &str = include_str!("../../schema/verification-params.json");

/// Typed verification parameters. Fields the broker does not interpret
/// (test results, tool versions, ...) are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationParams {
    pub success: bool,
    pub provider_application_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_url: Option<String>,
    #[serde(default)]
    pub wip: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn validator() -> Result<&'static jsonschema::Validator, BrokerError> {
    static VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
    VALIDATOR
        .get_or_init(|| {
            let schema: Value = serde_json::from_str(SCHEMA_STR)
                .map_err(|e| format!("verification schema is not JSON: {e}"))?;
            jsonschema::validator_for(&schema)
                .map_err(|e| format!("failed to compile verification schema: {e}"))
        })
        .as_ref()
        .map_err(|e| BrokerError::Internal(e.clone()))
}

impl VerificationParams {
    /// Validation messages for raw request parameters. Empty when valid.
    pub fn errors(raw: &Value) -> Result<Vec<String>, BrokerError> {
        if !raw.is_object() {
            return Ok(vec!["verification must be a JSON object".to_string()]);
        }
        let mut errors: Vec<String> = validator()?
            .iter_errors(raw)
            .map(|e| format!("{}", e))
            .collect();

        if let Some(version) = raw.get("providerApplicationVersion").and_then(Value::as_str) {
            if !version.is_empty() && version.trim().is_empty() {
                errors.push("providerApplicationVersion cannot be blank".to_string());
            }
        }
        if let Some(url) = raw.get("buildUrl").and_then(Value::as_str) {
            if !is_http_url(url) {
                errors.push(format!("buildUrl is not a valid http(s) URL: {url}"));
            }
        }
        Ok(errors)
    }

    /// Validate and convert raw request parameters.
    pub fn parse(raw: Value) -> Result<Self, BrokerError> {
        let errors = Self::errors(&raw)?;
        if !errors.is_empty() {
            return Err(BrokerError::Validation(errors));
        }
        serde_json::from_value(raw).map_err(|e| BrokerError::Validation(vec![e.to_string()]))
    }
}

/// Set `wip` on the raw parameters to a boolean.
///
/// A `wip` entry in the pact metadata takes precedence over one in the
/// request body. Strings are read with the usual truthiness rules.
pub(crate) fn merge_wip(raw: &mut Value, metadata: &PactMetadata) {
    let Some(params) = raw.as_object_mut() else {
        return;
    };
    let wip = match metadata.get("wip") {
        Some(value) => is_truthy(value),
        None => match params.get("wip") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => is_truthy(s),
            _ => false,
        },
    };
    params.insert("wip".to_string(), Value::Bool(wip));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_params_parse_with_extras() {
        let params = VerificationParams::parse(json!({
            "success": true,
            "providerApplicationVersion": "4.5.6",
            "buildUrl": "http://ci/builds/1",
            "testResults": [{"name": "a"}],
            "verifiedBy": {"implementation": "pact-rust"}
        }))
        .unwrap();
        assert!(params.success);
        assert_eq!(params.provider_application_version, "4.5.6");
        assert!(!params.wip);
        assert_eq!(params.extra.len(), 2);
        assert!(params.extra.contains_key("testResults"));
    }

    #[test]
    fn missing_required_fields_are_reported() {
        let errors = VerificationParams::errors(&json!({ "some": "params" })).unwrap();
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("success")));
        assert!(errors.iter().any(|e| e.contains("providerApplicationVersion")));
    }

    #[test]
    fn semantic_checks() {
        let errors = VerificationParams::errors(&json!({
            "success": "yes",
            "providerApplicationVersion": "  ",
            "buildUrl": "not a url"
        }))
        .unwrap();
        assert_eq!(errors.len(), 3, "{errors:?}");
        let errors = VerificationParams::errors(&json!({
            "success": true,
            "providerApplicationVersion": "1",
            "buildUrl": "http://not a url"
        }))
        .unwrap();
        assert_eq!(errors, vec!["buildUrl is not a valid http(s) URL: http://not a url"]);
        assert!(VerificationParams::errors(&json!([1])).unwrap().len() == 1);
        assert!(matches!(
            VerificationParams::parse(json!({})),
            Err(BrokerError::Validation(_))
        ));
    }

    #[test]
    fn wip_merge_prefers_metadata() {
        let mut metadata = PactMetadata::new();
        metadata.insert("wip", "true");
        let mut raw = json!({ "wip": false });
        merge_wip(&mut raw, &metadata);
        assert_eq!(raw["wip"], json!(true));

        let mut raw = json!({ "wip": "1" });
        merge_wip(&mut raw, &PactMetadata::new());
        assert_eq!(raw["wip"], json!(true));

        let mut raw = json!({});
        merge_wip(&mut raw, &PactMetadata::new());
        assert_eq!(raw["wip"], json!(false));
    }
}
