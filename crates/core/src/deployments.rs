//! Deployment state tracking.
//!
//! For every (pacticipant, environment) pair at most one deployed version is
//! current. Recording a deployment that replaces the previous one marks the
//! old record undeployed and inserts the new one inside the same storage
//! snapshot, so readers never observe zero or two current records.
//! Records are never deleted; undeployed ones form the history.

use std::sync::Arc;

use pactbroker_storage::{
    BrokerStorage, DeployedVersionRecord, EnvironmentRecord, StorageError, VersionRecord,
};
use uuid::Uuid;

use crate::error::BrokerError;
use crate::now_rfc3339;

/// Result of [`DeploymentTracker::record_deployment_replacing_current`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentOutcome {
    /// The current deployed version after the call.
    pub record: DeployedVersionRecord,
    /// `false` when the version was already the current deployment.
    pub created: bool,
    /// The record that was undeployed to make room, if any.
    pub replaced: Option<DeployedVersionRecord>,
}

pub struct DeploymentTracker<S> {
    storage: Arc<S>,
}

impl<S: BrokerStorage> DeploymentTracker<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// A fresh identifier for a deployed version. Has no side effects.
    pub fn generate_identifier() -> Uuid {
        Uuid::new_v4()
    }

    /// Record that `version` is now deployed to `environment`.
    ///
    /// When `replaces_previous` is set, the current deployment of the same
    /// pacticipant to the same environment (if there is one) is undeployed
    /// first. The flag is trusted as given: passing `false` while another
    /// version is current leaves two current records. Use
    /// [`record_deployment_replacing_current`](Self::record_deployment_replacing_current)
    /// to have the flag derived atomically.
    pub async fn record_deployment(
        &self,
        identifier: Uuid,
        version: &VersionRecord,
        environment: &EnvironmentRecord,
        replaces_previous: bool,
    ) -> Result<DeployedVersionRecord, BrokerError> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = async {
            self.require_target(&mut snapshot, version, environment)
                .await?;
            if replaces_previous {
                self.undeploy_current(&mut snapshot, &version.pacticipant, &environment.name)
                    .await?;
            }
            let record = new_record(identifier, version, environment, None, replaces_previous);
            self.storage
                .insert_deployed_version(&mut snapshot, record.clone())
                .await?;
            Ok::<_, BrokerError>(record)
        }
        .await;

        match result {
            Ok(record) => {
                self.storage.commit_snapshot(snapshot).await?;
                tracing::info!(
                    uuid = %record.uuid,
                    pacticipant = %record.pacticipant,
                    version = %record.version_number,
                    environment = %record.environment,
                    replaces_previous,
                    "recorded deployment"
                );
                Ok(record)
            }
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                Err(e)
            }
        }
    }

    /// Record a deployment, deciding inside the snapshot whether it replaces
    /// the current one.
    ///
    /// Deploying the version number that is already current (for the same
    /// application instance) returns the existing record unchanged.
    pub async fn record_deployment_replacing_current(
        &self,
        identifier: Uuid,
        version: &VersionRecord,
        environment: &EnvironmentRecord,
        application_instance: Option<&str>,
    ) -> Result<DeploymentOutcome, BrokerError> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = async {
            self.require_target(&mut snapshot, version, environment)
                .await?;
            let current = self
                .storage
                .current_deployed_version_for_update(
                    &mut snapshot,
                    &version.pacticipant,
                    &environment.name,
                )
                .await?;

            if let Some(current) = &current {
                if current.version_number == version.number
                    && current.application_instance.as_deref() == application_instance
                {
                    return Ok(DeploymentOutcome {
                        record: current.clone(),
                        created: false,
                        replaced: None,
                    });
                }
            }

            let replaced = match current {
                Some(current) => Some(
                    self.storage
                        .record_undeployed(&mut snapshot, &current.uuid, &now_rfc3339())
                        .await?,
                ),
                None => None,
            };
            let record = new_record(
                identifier,
                version,
                environment,
                application_instance,
                replaced.is_some(),
            );
            self.storage
                .insert_deployed_version(&mut snapshot, record.clone())
                .await?;
            Ok::<_, BrokerError>(DeploymentOutcome {
                record,
                created: true,
                replaced,
            })
        }
        .await;

        match result {
            Ok(outcome) => {
                self.storage.commit_snapshot(snapshot).await?;
                if outcome.created {
                    tracing::info!(
                        uuid = %outcome.record.uuid,
                        pacticipant = %outcome.record.pacticipant,
                        version = %outcome.record.version_number,
                        environment = %outcome.record.environment,
                        replaced = outcome.replaced.as_ref().map(|r| r.uuid.as_str()),
                        "recorded deployment"
                    );
                }
                Ok(outcome)
            }
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                Err(e)
            }
        }
    }

    /// Mark a deployed version as no longer deployed.
    ///
    /// Undeploying a record that is already undeployed returns it unchanged.
    pub async fn record_undeployment(
        &self,
        uuid: &str,
    ) -> Result<DeployedVersionRecord, BrokerError> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = async {
            let existing = self
                .storage
                .get_deployed_version_for_update(&mut snapshot, uuid)
                .await?
                .ok_or_else(|| BrokerError::not_found("deployed version", uuid))?;
            if !existing.currently_deployed {
                return Ok(existing);
            }
            let record = self
                .storage
                .record_undeployed(&mut snapshot, uuid, &now_rfc3339())
                .await?;
            Ok::<_, BrokerError>(record)
        }
        .await;

        match result {
            Ok(record) => {
                self.storage.commit_snapshot(snapshot).await?;
                tracing::info!(uuid, environment = %record.environment, "recorded undeployment");
                Ok(record)
            }
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                Err(e)
            }
        }
    }

    /// Current deployments to an environment, optionally for one pacticipant.
    pub async fn currently_deployed(
        &self,
        environment: &str,
        pacticipant: Option<&str>,
    ) -> Result<Vec<DeployedVersionRecord>, BrokerError> {
        self.storage.get_environment(environment).await?;
        Ok(self
            .storage
            .list_deployed_versions(environment, pacticipant, true)
            .await?)
    }

    /// Every deployment of a pacticipant to an environment, oldest first.
    pub async fn deployment_history(
        &self,
        pacticipant: &str,
        environment: &str,
    ) -> Result<Vec<DeployedVersionRecord>, BrokerError> {
        Ok(self
            .storage
            .list_deployed_versions(environment, Some(pacticipant), false)
            .await?)
    }

    pub async fn find(&self, uuid: &str) -> Result<DeployedVersionRecord, BrokerError> {
        Ok(self.storage.get_deployed_version(uuid).await?)
    }

    async fn require_target(
        &self,
        snapshot: &mut S::Snapshot,
        version: &VersionRecord,
        environment: &EnvironmentRecord,
    ) -> Result<(), BrokerError> {
        if self
            .storage
            .get_version_for_update(snapshot, &version.pacticipant, &version.number)
            .await?
            .is_none()
        {
            return Err(BrokerError::not_found(
                "version",
                format!("{}/{}", version.pacticipant, version.number),
            ));
        }
        if self
            .storage
            .get_environment_for_update(snapshot, &environment.name)
            .await?
            .is_none()
        {
            return Err(BrokerError::not_found("environment", environment.name.as_str()));
        }
        Ok(())
    }

    async fn undeploy_current(
        &self,
        snapshot: &mut S::Snapshot,
        pacticipant: &str,
        environment: &str,
    ) -> Result<Option<DeployedVersionRecord>, StorageError> {
        let Some(current) = self
            .storage
            .current_deployed_version_for_update(snapshot, pacticipant, environment)
            .await?
        else {
            return Ok(None);
        };
        let record = self
            .storage
            .record_undeployed(snapshot, &current.uuid, &now_rfc3339())
            .await?;
        Ok(Some(record))
    }
}

fn new_record(
    identifier: Uuid,
    version: &VersionRecord,
    environment: &EnvironmentRecord,
    application_instance: Option<&str>,
    replaced_previous: bool,
) -> DeployedVersionRecord {
    DeployedVersionRecord {
        uuid: identifier.to_string(),
        pacticipant: version.pacticipant.clone(),
        version_number: version.number.clone(),
        environment: environment.name.clone(),
        application_instance: application_instance.map(str::to_string),
        currently_deployed: true,
        replaced_previous_deployed_version: replaced_previous,
        created_at: now_rfc3339(),
        undeployed_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environments::{EnvironmentService, NewEnvironment};
    use crate::pacticipants::PacticipantService;
    use pactbroker_storage::MemoryStorage;

    struct Fixture {
        tracker: DeploymentTracker<MemoryStorage>,
        pacticipants: PacticipantService<MemoryStorage>,
        production: EnvironmentRecord,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let production = EnvironmentService::new(storage.clone())
            .create(NewEnvironment {
                name: "production".to_string(),
                display_name: None,
                production: true,
            })
            .await
            .unwrap();
        Fixture {
            tracker: DeploymentTracker::new(storage.clone()),
            pacticipants: PacticipantService::new(storage),
            production,
        }
    }

    impl Fixture {
        async fn version(&self, number: &str) -> VersionRecord {
            self.pacticipants
                .ensure_version("Foo", number, None)
                .await
                .unwrap()
                .0
        }
    }

    #[test]
    fn identifiers_are_unique() {
        let a = DeploymentTracker::<MemoryStorage>::generate_identifier();
        let b = DeploymentTracker::<MemoryStorage>::generate_identifier();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn replacing_deployment_undeploys_previous() {
        let f = fixture().await;
        let v1 = f.version("1").await;
        let v2 = f.version("2").await;

        let first = f
            .tracker
            .record_deployment(Uuid::new_v4(), &v1, &f.production, false)
            .await
            .unwrap();
        assert!(first.currently_deployed);

        let second = f
            .tracker
            .record_deployment(Uuid::new_v4(), &v2, &f.production, true)
            .await
            .unwrap();
        assert!(second.replaced_previous_deployed_version);

        let old = f.tracker.find(&first.uuid).await.unwrap();
        assert!(!old.currently_deployed);
        assert!(old.undeployed_at.is_some());

        let current = f
            .tracker
            .currently_deployed("production", Some("Foo"))
            .await
            .unwrap();
        assert_eq!(current, vec![second]);
    }

    #[tokio::test]
    async fn replacing_with_nothing_current_is_a_noop() {
        let f = fixture().await;
        let v1 = f.version("1").await;
        let record = f
            .tracker
            .record_deployment(Uuid::new_v4(), &v1, &f.production, true)
            .await
            .unwrap();
        assert!(record.currently_deployed);
        assert!(record.replaced_previous_deployed_version);
        let history = f.tracker.deployment_history("Foo", "production").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn sequential_deployments_leave_exactly_one_current() {
        let f = fixture().await;
        let mut uuids = Vec::new();
        for i in 0..5 {
            let version = f.version(&i.to_string()).await;
            let record = f
                .tracker
                .record_deployment(Uuid::new_v4(), &version, &f.production, i > 0)
                .await
                .unwrap();
            uuids.push(record.uuid);
        }

        let history = f.tracker.deployment_history("Foo", "production").await.unwrap();
        assert_eq!(history.len(), 5);
        let current: Vec<_> = history.iter().filter(|d| d.currently_deployed).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(&current[0].uuid, uuids.last().unwrap());
        assert!(history
            .iter()
            .filter(|d| !d.currently_deployed)
            .all(|d| d.undeployed_at.is_some()));
    }

    #[tokio::test]
    async fn unknown_version_or_environment_is_not_found() {
        let f = fixture().await;
        let v1 = f.version("1").await;
        let ghost_version = VersionRecord {
            number: "9".to_string(),
            ..v1.clone()
        };
        let err = f
            .tracker
            .record_deployment(Uuid::new_v4(), &ghost_version, &f.production, true)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotFound { kind: "version", .. }));

        let ghost_env = EnvironmentRecord {
            name: "staging".to_string(),
            ..f.production.clone()
        };
        let err = f
            .tracker
            .record_deployment(Uuid::new_v4(), &v1, &ghost_env, true)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotFound { kind: "environment", .. }));
        assert!(f
            .tracker
            .deployment_history("Foo", "production")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn derived_replacement_and_idempotent_redeploy() {
        let f = fixture().await;
        let v1 = f.version("1").await;
        let v2 = f.version("2").await;

        let first = f
            .tracker
            .record_deployment_replacing_current(Uuid::new_v4(), &v1, &f.production, None)
            .await
            .unwrap();
        assert!(first.created);
        assert!(!first.record.replaced_previous_deployed_version);
        assert!(first.replaced.is_none());

        let again = f
            .tracker
            .record_deployment_replacing_current(Uuid::new_v4(), &v1, &f.production, None)
            .await
            .unwrap();
        assert!(!again.created);
        assert_eq!(again.record.uuid, first.record.uuid);

        let second = f
            .tracker
            .record_deployment_replacing_current(Uuid::new_v4(), &v2, &f.production, None)
            .await
            .unwrap();
        assert!(second.created);
        assert!(second.record.replaced_previous_deployed_version);
        assert_eq!(
            second.replaced.map(|r| r.uuid),
            Some(first.record.uuid.clone())
        );
    }

    #[tokio::test]
    async fn undeployment_is_idempotent() {
        let f = fixture().await;
        let v1 = f.version("1").await;
        let record = f
            .tracker
            .record_deployment(Uuid::new_v4(), &v1, &f.production, false)
            .await
            .unwrap();

        let undeployed = f.tracker.record_undeployment(&record.uuid).await.unwrap();
        assert!(!undeployed.currently_deployed);
        let again = f.tracker.record_undeployment(&record.uuid).await.unwrap();
        assert_eq!(undeployed, again);
        assert!(f
            .tracker
            .currently_deployed("production", None)
            .await
            .unwrap()
            .is_empty());

        let missing = f.tracker.record_undeployment("nope").await.unwrap_err();
        assert!(matches!(missing, BrokerError::NotFound { .. }));
    }
}
