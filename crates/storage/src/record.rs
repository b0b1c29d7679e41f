use serde::{Deserialize, Serialize};

/// A participant in the contract network, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacticipantRecord {
    pub name: String,
    pub display_name: Option<String>,
    pub repository_url: Option<String>,
    pub repository_name: Option<String>,
    pub repository_organization: Option<String>,
    pub main_branch: Option<String>,
    #[serde(default)]
    pub main_development_branches: Vec<String>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub updated_at: String,
}

/// A release of a pacticipant, keyed by (pacticipant, number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub pacticipant: String,
    pub number: String,
    pub branch: Option<String>,
    pub created_at: String,
}

/// A named deployment target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub uuid: String,
    pub name: String,
    pub display_name: Option<String>,
    pub production: bool,
    pub created_at: String,
}

/// A record that a version was deployed to an environment.
///
/// `pacticipant` is denormalised from the version so the current deployment
/// for a (pacticipant, environment) pair can be found without a join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedVersionRecord {
    pub uuid: String,
    pub pacticipant: String,
    pub version_number: String,
    pub environment: String,
    pub application_instance: Option<String>,
    pub currently_deployed: bool,
    pub replaced_previous_deployed_version: bool,
    pub created_at: String,
    /// Set when the record stops being the current deployment.
    pub undeployed_at: Option<String>,
}

/// Immutable pact content, addressed by its SHA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PactContentRecord {
    pub sha: String,
    pub consumer: String,
    pub provider: String,
    pub content: serde_json::Value,
    pub created_at: String,
}

/// Links a consumer version to the pact content it published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PactPublicationRecord {
    pub consumer: String,
    pub provider: String,
    pub consumer_version: String,
    pub pact_version_sha: String,
    pub created_at: String,
}

/// A provider's verification result for one pact version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub pact_version_sha: String,
    /// Per-pact-version sequence number, starting at 1.
    pub number: i64,
    pub provider: String,
    pub consumer: String,
    pub consumer_version: Option<String>,
    pub provider_version: String,
    pub success: bool,
    pub wip: bool,
    pub build_url: Option<String>,
    /// Request fields with no dedicated column.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub execution_date: String,
}
