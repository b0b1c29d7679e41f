//! Pacticipants (the services in the contract network) and their versions.
//!
//! Two update semantics exist over the same entity: [`PacticipantService::replace`]
//! resets every recognised property the caller did not supply, while
//! [`PacticipantService::merge`] only touches the supplied ones.

use std::sync::Arc;

use pactbroker_storage::{BrokerStorage, PacticipantRecord, StorageError, VersionRecord};
use serde::{Deserialize, Deserializer};

use crate::error::BrokerError;
use crate::now_rfc3339;

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// The recognised, updatable properties of a pacticipant as supplied in a
/// request body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacticipantProperties {
    #[serde(default, deserialize_with = "explicit_null")]
    pub display_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub repository_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub repository_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub repository_organization: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub main_branch: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub main_development_branches: Option<Option<Vec<String>>>,
}

impl PacticipantProperties {
    /// Overwrite every recognised property; unsupplied ones become empty.
    fn replace_into(self, record: &mut PacticipantRecord) {
        record.display_name = self.display_name.flatten();
        record.repository_url = self.repository_url.flatten();
        record.repository_name = self.repository_name.flatten();
        record.repository_organization = self.repository_organization.flatten();
        record.main_branch = self.main_branch.flatten();
        record.main_development_branches = self
            .main_development_branches
            .flatten()
            .unwrap_or_default();
    }

    /// Overwrite only the supplied properties (an explicit null clears).
    fn merge_into(self, record: &mut PacticipantRecord) {
        if let Some(v) = self.display_name {
            record.display_name = v;
        }
        if let Some(v) = self.repository_url {
            record.repository_url = v;
        }
        if let Some(v) = self.repository_name {
            record.repository_name = v;
        }
        if let Some(v) = self.repository_organization {
            record.repository_organization = v;
        }
        if let Some(v) = self.main_branch {
            record.main_branch = v;
        }
        if let Some(v) = self.main_development_branches {
            record.main_development_branches = v.unwrap_or_default();
        }
    }
}

fn blank_pacticipant(name: &str, now: &str) -> PacticipantRecord {
    PacticipantRecord {
        name: name.to_string(),
        display_name: None,
        repository_url: None,
        repository_name: None,
        repository_organization: None,
        main_branch: None,
        main_development_branches: Vec::new(),
        created_at: now.to_string(),
        updated_at: now.to_string(),
    }
}

fn validate_name(kind: &str, name: &str) -> Result<(), BrokerError> {
    if name.trim().is_empty() {
        return Err(BrokerError::Validation(vec![format!(
            "{kind} name cannot be blank"
        )]));
    }
    Ok(())
}

/// Find a pacticipant inside a snapshot, creating a blank one if missing.
pub(crate) async fn ensure_pacticipant<S: BrokerStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    name: &str,
) -> Result<PacticipantRecord, StorageError> {
    if let Some(existing) = storage.get_pacticipant_for_update(snapshot, name).await? {
        return Ok(existing);
    }
    let record = blank_pacticipant(name, &now_rfc3339());
    storage.insert_pacticipant(snapshot, record.clone()).await?;
    tracing::info!(pacticipant = name, "created pacticipant");
    Ok(record)
}

/// Find a version inside a snapshot, creating it (and its pacticipant) if
/// missing. Returns the record and whether it was created.
pub(crate) async fn ensure_version<S: BrokerStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    pacticipant: &str,
    number: &str,
    branch: Option<&str>,
) -> Result<(VersionRecord, bool), StorageError> {
    ensure_pacticipant(storage, snapshot, pacticipant).await?;
    if let Some(existing) = storage
        .get_version_for_update(snapshot, pacticipant, number)
        .await?
    {
        return Ok((existing, false));
    }
    let record = VersionRecord {
        pacticipant: pacticipant.to_string(),
        number: number.to_string(),
        branch: branch.map(str::to_string),
        created_at: now_rfc3339(),
    };
    storage.insert_version(snapshot, record.clone()).await?;
    tracing::debug!(pacticipant, version = number, "created version");
    Ok((record, true))
}

/// Pacticipant and version management.
pub struct PacticipantService<S> {
    storage: Arc<S>,
}

impl<S: BrokerStorage> PacticipantService<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub async fn find(&self, name: &str) -> Result<PacticipantRecord, BrokerError> {
        Ok(self.storage.get_pacticipant(name).await?)
    }

    pub async fn list(&self) -> Result<Vec<PacticipantRecord>, BrokerError> {
        Ok(self.storage.list_pacticipants().await?)
    }

    /// Create a pacticipant. Fails with `Conflict` if the name is taken.
    pub async fn create(
        &self,
        name: &str,
        properties: PacticipantProperties,
    ) -> Result<PacticipantRecord, BrokerError> {
        validate_name("pacticipant", name)?;
        let mut record = blank_pacticipant(name, &now_rfc3339());
        properties.merge_into(&mut record);

        let mut snapshot = self.storage.begin_snapshot().await?;
        if let Err(e) = self
            .storage
            .insert_pacticipant(&mut snapshot, record.clone())
            .await
        {
            let _ = self.storage.abort_snapshot(snapshot).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snapshot).await?;
        tracing::info!(pacticipant = name, "created pacticipant");
        Ok(record)
    }

    /// Full replace (PUT). Every recognised property not supplied is blanked.
    pub async fn replace(
        &self,
        name: &str,
        properties: PacticipantProperties,
    ) -> Result<PacticipantRecord, BrokerError> {
        self.update(name, properties, false).await
    }

    /// Partial merge (PATCH). Creates the pacticipant if it does not exist.
    pub async fn merge(
        &self,
        name: &str,
        properties: PacticipantProperties,
    ) -> Result<PacticipantRecord, BrokerError> {
        self.update(name, properties, true).await
    }

    async fn update(
        &self,
        name: &str,
        properties: PacticipantProperties,
        merge: bool,
    ) -> Result<PacticipantRecord, BrokerError> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = async {
            let now = now_rfc3339();
            let existing = self
                .storage
                .get_pacticipant_for_update(&mut snapshot, name)
                .await?;
            match (existing, merge) {
                (Some(mut record), true) => {
                    properties.merge_into(&mut record);
                    record.updated_at = now;
                    self.storage
                        .update_pacticipant(&mut snapshot, record.clone())
                        .await?;
                    Ok(record)
                }
                (Some(mut record), false) => {
                    properties.replace_into(&mut record);
                    record.updated_at = now;
                    self.storage
                        .update_pacticipant(&mut snapshot, record.clone())
                        .await?;
                    Ok(record)
                }
                (None, true) => {
                    validate_name("pacticipant", name)?;
                    let mut record = blank_pacticipant(name, &now);
                    properties.merge_into(&mut record);
                    self.storage
                        .insert_pacticipant(&mut snapshot, record.clone())
                        .await?;
                    Ok(record)
                }
                (None, false) => Err(BrokerError::not_found("pacticipant", name)),
            }
        }
        .await;

        match result {
            Ok(record) => {
                self.storage.commit_snapshot(snapshot).await?;
                tracing::info!(pacticipant = name, merge, "updated pacticipant");
                Ok(record)
            }
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                Err(e)
            }
        }
    }

    pub async fn find_version(
        &self,
        pacticipant: &str,
        number: &str,
    ) -> Result<VersionRecord, BrokerError> {
        Ok(self.storage.get_version(pacticipant, number).await?)
    }

    /// Create a version (and its pacticipant) if missing.
    ///
    /// Returns the version and whether it was newly created.
    pub async fn ensure_version(
        &self,
        pacticipant: &str,
        number: &str,
        branch: Option<&str>,
    ) -> Result<(VersionRecord, bool), BrokerError> {
        validate_name("pacticipant", pacticipant)?;
        validate_name("version", number)?;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let storage = self.storage.as_ref();
        match ensure_version(storage, &mut snapshot, pacticipant, number, branch).await {
            Ok(outcome) => {
                self.storage.commit_snapshot(snapshot).await?;
                Ok(outcome)
            }
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                Err(e.into())
            }
        }
    }
}
