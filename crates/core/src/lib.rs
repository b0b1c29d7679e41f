//! pactbroker-core: the pact broker's domain services.
//!
//! Every service holds an `Arc` to a [`BrokerStorage`] backend and runs each
//! logical write inside a single storage snapshot.
//!
//! # Public API
//!
//! - [`PacticipantService`] -- create, find, full replace and partial merge
//! - [`EnvironmentService`] -- deployment targets
//! - [`DeploymentTracker`] -- the single-current-deployment state machine
//! - [`PactService`] -- content-addressed pact publication and lookup
//! - [`VerificationService`] / [`VerificationIntake`] -- verification
//!   numbering, validation and the intake workflow
//! - [`metadata`] -- the pact metadata token codec
//! - [`webhooks`] -- execution configuration and dispatch
//! - [`BrokerConfig`] -- explicit, injected configuration

pub mod config;
pub mod deployments;
pub mod environments;
pub mod error;
pub mod metadata;
pub mod pacticipants;
pub mod pacts;
pub mod verifications;
pub mod webhooks;

pub use config::{BrokerConfig, ConfigError};
pub use deployments::{DeploymentOutcome, DeploymentTracker};
pub use environments::{EnvironmentService, NewEnvironment};
pub use error::BrokerError;
pub use metadata::PactMetadata;
pub use pacticipants::{PacticipantProperties, PacticipantService};
pub use pacts::{Pact, PactLocator, PactService, PublishedPact};
pub use verifications::{VerificationIntake, VerificationParams, VerificationService};
pub use webhooks::{
    WebhookDispatcher, WebhookEvent, WebhookExecutionConfiguration, WebhookKind, WebhookTarget,
};

pub use pactbroker_storage::{
    BrokerStorage, DeployedVersionRecord, EnvironmentRecord, MemoryStorage, PacticipantRecord,
    StorageError, VerificationRecord, VersionRecord,
};

/// Current UTC time as an RFC 3339 string with millisecond precision.
pub(crate) fn now_rfc3339() -> String {
    let now = time::OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.millisecond()
    )
}
