//! HAL response models.
//!
//! Each resource struct mirrors one domain record and adds `_links` built
//! from the request's base URL. Optional properties serialise as `null`
//! rather than being omitted, so clients can tell a cleared field from an
//! unknown one.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use pactbroker_core::pacts::Pact;
use pactbroker_core::verifications::{encode_segment, verification_result_path};
use pactbroker_core::{
    DeployedVersionRecord, EnvironmentRecord, PactMetadata, PacticipantRecord, VerificationRecord,
    VersionRecord,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::error::ApiError;
use super::json_error;

pub(crate) const HAL_JSON: &str = "application/hal+json;charset=utf-8";

/// A HAL+JSON response with an explicit status.
pub(crate) struct Hal<T>(pub(crate) StatusCode, pub(crate) T);

impl<T: Serialize> IntoResponse for Hal<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.1) {
            Ok(body) => (self.0, [(header::CONTENT_TYPE, HAL_JSON)], body).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialise response");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
                    .into_response()
            }
        }
    }
}

/// Parse a JSON request body. An empty body reads as `{}`.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    let slice: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(slice).map_err(|e| ApiError::bad_request(format!("invalid JSON: {e}")))
}

#[derive(Debug, Serialize)]
pub(crate) struct Link {
    href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}

type Links = BTreeMap<&'static str, Link>;

fn link(href: String) -> Link {
    Link { href, title: None }
}

fn titled(href: String, title: impl Into<String>) -> Link {
    Link {
        href,
        title: Some(title.into()),
    }
}

pub(crate) fn pacticipant_url(base: &str, name: &str) -> String {
    format!("{base}/pacticipants/{}", encode_segment(name))
}

pub(crate) fn version_url(base: &str, pacticipant: &str, number: &str) -> String {
    format!(
        "{}/versions/{}",
        pacticipant_url(base, pacticipant),
        encode_segment(number)
    )
}

pub(crate) fn environment_url(base: &str, name: &str) -> String {
    format!("{base}/environments/{}", encode_segment(name))
}

pub(crate) fn pact_version_url(base: &str, provider: &str, consumer: &str, sha: &str) -> String {
    format!(
        "{base}/pacts/provider/{}/consumer/{}/pact-version/{}",
        encode_segment(provider),
        encode_segment(consumer),
        encode_segment(sha)
    )
}

pub(crate) fn verification_url(base: &str, record: &VerificationRecord) -> String {
    let path = verification_result_path(
        &record.provider,
        &record.consumer,
        &record.pact_version_sha,
        record.number,
    );
    format!("{base}{path}")
}

// ── Index ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct IndexResource {
    #[serde(rename = "_links")]
    links: Links,
}

impl IndexResource {
    pub(crate) fn encode(base: &str) -> Self {
        let mut links = Links::new();
        links.insert("self", titled(base.to_string(), "Index"));
        links.insert(
            "pb:pacticipants",
            titled(format!("{base}/pacticipants"), "Pacticipants"),
        );
        links.insert(
            "pb:environments",
            titled(format!("{base}/environments"), "Environments"),
        );
        links.insert(
            "pb:latest-pact",
            titled(
                format!("{base}/pacts/provider/{{provider}}/consumer/{{consumer}}/latest"),
                "Latest pact between a consumer and provider",
            ),
        );
        Self { links }
    }
}

// ── Pacticipants and versions ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PacticipantResource {
    name: String,
    display_name: Option<String>,
    repository_url: Option<String>,
    repository_name: Option<String>,
    repository_organization: Option<String>,
    main_branch: Option<String>,
    main_development_branches: Vec<String>,
    created_at: String,
    updated_at: String,
    #[serde(rename = "_links")]
    links: Links,
}

impl PacticipantResource {
    pub(crate) fn encode(record: PacticipantRecord, base: &str) -> Self {
        let mut links = Links::new();
        links.insert("self", link(pacticipant_url(base, &record.name)));
        Self {
            name: record.name,
            display_name: record.display_name,
            repository_url: record.repository_url,
            repository_name: record.repository_name,
            repository_organization: record.repository_organization,
            main_branch: record.main_branch,
            main_development_branches: record.main_development_branches,
            created_at: record.created_at,
            updated_at: record.updated_at,
            links,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PacticipantList {
    pacticipants: Vec<PacticipantResource>,
    #[serde(rename = "_links")]
    links: Links,
}

impl PacticipantList {
    pub(crate) fn encode(records: Vec<PacticipantRecord>, base: &str) -> Self {
        let mut links = Links::new();
        links.insert("self", link(format!("{base}/pacticipants")));
        Self {
            pacticipants: records
                .into_iter()
                .map(|r| PacticipantResource::encode(r, base))
                .collect(),
            links,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VersionResource {
    number: String,
    branch: Option<String>,
    created_at: String,
    #[serde(rename = "_links")]
    links: Links,
}

impl VersionResource {
    pub(crate) fn encode(record: VersionRecord, base: &str) -> Self {
        let mut links = Links::new();
        links.insert(
            "self",
            link(version_url(base, &record.pacticipant, &record.number)),
        );
        links.insert(
            "pb:pacticipant",
            titled(pacticipant_url(base, &record.pacticipant), &record.pacticipant),
        );
        Self {
            number: record.number,
            branch: record.branch,
            created_at: record.created_at,
            links,
        }
    }
}

// ── Environments and deployments ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EnvironmentResource {
    uuid: String,
    name: String,
    display_name: Option<String>,
    production: bool,
    created_at: String,
    #[serde(rename = "_links")]
    links: Links,
}

impl EnvironmentResource {
    pub(crate) fn encode(record: EnvironmentRecord, base: &str) -> Self {
        let mut links = Links::new();
        links.insert("self", link(environment_url(base, &record.name)));
        links.insert(
            "pb:currently-deployed-deployed-versions",
            link(format!(
                "{}/deployed-versions/currently-deployed",
                environment_url(base, &record.name)
            )),
        );
        Self {
            uuid: record.uuid,
            name: record.name,
            display_name: record.display_name,
            production: record.production,
            created_at: record.created_at,
            links,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EnvironmentList {
    environments: Vec<EnvironmentResource>,
}

impl EnvironmentList {
    pub(crate) fn encode(records: Vec<EnvironmentRecord>, base: &str) -> Self {
        Self {
            environments: records
                .into_iter()
                .map(|r| EnvironmentResource::encode(r, base))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeployedVersionResource {
    uuid: String,
    pacticipant_name: String,
    version_number: String,
    environment_name: String,
    application_instance: Option<String>,
    currently_deployed: bool,
    replaced_previous_deployed_version: bool,
    created_at: String,
    undeployed_at: Option<String>,
    #[serde(rename = "_links")]
    links: Links,
}

impl DeployedVersionResource {
    pub(crate) fn encode(record: DeployedVersionRecord, base: &str) -> Self {
        let mut links = Links::new();
        links.insert(
            "self",
            link(format!("{base}/deployed-versions/{}", record.uuid)),
        );
        links.insert(
            "pb:version",
            link(version_url(base, &record.pacticipant, &record.version_number)),
        );
        links.insert(
            "pb:environment",
            titled(environment_url(base, &record.environment), &record.environment),
        );
        Self {
            uuid: record.uuid,
            pacticipant_name: record.pacticipant,
            version_number: record.version_number,
            environment_name: record.environment,
            application_instance: record.application_instance,
            currently_deployed: record.currently_deployed,
            replaced_previous_deployed_version: record.replaced_previous_deployed_version,
            created_at: record.created_at,
            undeployed_at: record.undeployed_at,
            links,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeployedVersionList {
    deployed_versions: Vec<DeployedVersionResource>,
}

impl DeployedVersionList {
    pub(crate) fn encode(records: Vec<DeployedVersionRecord>, base: &str) -> Self {
        Self {
            deployed_versions: records
                .into_iter()
                .map(|r| DeployedVersionResource::encode(r, base))
                .collect(),
        }
    }
}

// ── Pacts and verifications ──────────────────────────────────────────────────

/// The pact content itself with `_links` added.
pub(crate) fn encode_pact(pact: Pact, base: &str) -> Value {
    let pact_url = pact_version_url(base, &pact.provider, &pact.consumer, &pact.pact_version_sha);
    let mut metadata = PactMetadata::new();
    metadata.insert("consumer_version_number", pact.consumer_version.as_str());

    let mut links = Map::new();
    links.insert("self".to_string(), serde_json::json!({ "href": pact_url }));
    links.insert(
        "pb:consumer-version".to_string(),
        serde_json::json!({
            "href": version_url(base, &pact.consumer, &pact.consumer_version),
            "name": pact.consumer_version,
        }),
    );
    links.insert(
        "pb:publish-verification-results".to_string(),
        serde_json::json!({
            "href": format!("{pact_url}/metadata/{}/verification-results", metadata.encode()),
            "title": "Publish verification results",
        }),
    );

    let mut document = match pact.content {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("content".to_string(), other);
            map
        }
    };
    document.insert("_links".to_string(), Value::Object(links));
    Value::Object(document)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerificationResource {
    provider_name: String,
    consumer_name: String,
    provider_application_version: String,
    consumer_version_number: Option<String>,
    success: bool,
    wip: bool,
    build_url: Option<String>,
    verification_date: String,
    number: i64,
    #[serde(flatten)]
    extra: Map<String, Value>,
    #[serde(rename = "_links")]
    links: Links,
}

impl VerificationResource {
    pub(crate) fn encode(record: VerificationRecord, base: &str) -> Self {
        let mut links = Links::new();
        links.insert("self", link(verification_url(base, &record)));
        links.insert(
            "pb:pact-version",
            link(pact_version_url(
                base,
                &record.provider,
                &record.consumer,
                &record.pact_version_sha,
            )),
        );
        Self {
            provider_name: record.provider,
            consumer_name: record.consumer,
            provider_application_version: record.provider_version,
            consumer_version_number: record.consumer_version,
            success: record.success,
            wip: record.wip,
            build_url: record.build_url,
            verification_date: record.execution_date,
            number: record.number,
            extra: record.extra,
            links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_parses_as_empty_object() {
        let value: Value = parse_body(&Bytes::from_static(b"  \n")).unwrap();
        assert_eq!(value, serde_json::json!({}));
        assert!(parse_body::<Value>(&Bytes::from_static(b"{nope")).is_err());
    }

    #[test]
    fn pacticipant_resource_keeps_nulls() {
        let record = PacticipantRecord {
            name: "Some Consumer".to_string(),
            display_name: None,
            repository_url: Some("http://foo".to_string()),
            repository_name: None,
            repository_organization: None,
            main_branch: None,
            main_development_branches: Vec::new(),
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        };
        let json = serde_json::to_value(PacticipantResource::encode(record, "http://b")).unwrap();
        assert_eq!(json["repositoryUrl"], "http://foo");
        assert!(json["repositoryName"].is_null());
        assert_eq!(
            json["_links"]["self"]["href"],
            "http://b/pacticipants/Some%20Consumer"
        );
    }
}
