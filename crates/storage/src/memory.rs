//! In-memory `BrokerStorage` backend with optional JSON-file durability.
//!
//! Snapshots are serialised by a writer mutex: `begin_snapshot` waits for
//! the previous snapshot to finish, then works on a private copy of the
//! committed tables. Readers outside a snapshot only ever see committed
//! state. Committing swaps the copy in (after writing it to the data file,
//! when one is configured).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::StorageError;
use crate::record::{
    DeployedVersionRecord, EnvironmentRecord, PactContentRecord, PactPublicationRecord,
    PacticipantRecord, VerificationRecord, VersionRecord,
};
use crate::traits::BrokerStorage;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    pacticipants: BTreeMap<String, PacticipantRecord>,
    /// pacticipant -> version number -> record
    versions: BTreeMap<String, BTreeMap<String, VersionRecord>>,
    environments: BTreeMap<String, EnvironmentRecord>,
    /// Creation order.
    deployed_versions: Vec<DeployedVersionRecord>,
    pact_contents: BTreeMap<String, PactContentRecord>,
    /// Creation order.
    pact_publications: Vec<PactPublicationRecord>,
    /// pact version sha -> records ordered by number
    verifications: BTreeMap<String, Vec<VerificationRecord>>,
}

/// An open transaction against [`MemoryStorage`].
pub struct MemorySnapshot {
    _writer: OwnedMutexGuard<()>,
    staged: Tables,
}

/// In-memory storage backend.
pub struct MemoryStorage {
    committed: RwLock<Tables>,
    writer: Arc<Mutex<()>>,
    data_file: Option<PathBuf>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create an empty, purely in-memory store.
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(Tables::default()),
            writer: Arc::new(Mutex::new(())),
            data_file: None,
        }
    }

    /// Open a store backed by a JSON data file.
    ///
    /// The file is loaded if it exists and rewritten on every commit.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::Backend(format!("corrupt data file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => {
                return Err(StorageError::Backend(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        tracing::info!(path = %path.display(), "opened data file");
        Ok(Self {
            committed: RwLock::new(tables),
            writer: Arc::new(Mutex::new(())),
            data_file: Some(path),
        })
    }

    /// Path of the backing data file, if any.
    pub fn data_file(&self) -> Option<&Path> {
        self.data_file.as_deref()
    }
}

/// Write the tables to `path` via a temp file + rename so a crash never
/// leaves a half-written file behind.
async fn persist(tables: &Tables, path: &Path) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(tables)
        .map_err(|e| StorageError::Backend(format!("failed to serialise tables: {}", e)))?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| StorageError::Backend(format!("failed to write {}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        StorageError::Backend(format!("failed to replace {}: {}", path.display(), e))
    })
}

fn current_for<'a>(
    tables: &'a Tables,
    pacticipant: &str,
    environment: &str,
) -> Option<&'a DeployedVersionRecord> {
    tables.deployed_versions.iter().rev().find(|d| {
        d.currently_deployed && d.pacticipant == pacticipant && d.environment == environment
    })
}

#[async_trait]
impl BrokerStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        let writer = self.writer.clone().lock_owned().await;
        let staged = self.committed.read().await.clone();
        Ok(MemorySnapshot {
            _writer: writer,
            staged,
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut committed = self.committed.write().await;
        if let Some(path) = &self.data_file {
            persist(&snapshot.staged, path).await?;
        }
        *committed = snapshot.staged;
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn insert_pacticipant(
        &self,
        snapshot: &mut MemorySnapshot,
        record: PacticipantRecord,
    ) -> Result<(), StorageError> {
        let tables = &mut snapshot.staged;
        if tables.pacticipants.contains_key(&record.name) {
            return Err(StorageError::already_exists("pacticipant", record.name));
        }
        tables.pacticipants.insert(record.name.clone(), record);
        Ok(())
    }

    async fn get_pacticipant_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        name: &str,
    ) -> Result<Option<PacticipantRecord>, StorageError> {
        Ok(snapshot.staged.pacticipants.get(name).cloned())
    }

    async fn update_pacticipant(
        &self,
        snapshot: &mut MemorySnapshot,
        record: PacticipantRecord,
    ) -> Result<(), StorageError> {
        match snapshot.staged.pacticipants.get_mut(&record.name) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(StorageError::not_found("pacticipant", record.name)),
        }
    }

    async fn insert_version(
        &self,
        snapshot: &mut MemorySnapshot,
        record: VersionRecord,
    ) -> Result<(), StorageError> {
        let versions = snapshot
            .staged
            .versions
            .entry(record.pacticipant.clone())
            .or_default();
        if versions.contains_key(&record.number) {
            return Err(StorageError::already_exists(
                "version",
                format!("{}/{}", record.pacticipant, record.number),
            ));
        }
        versions.insert(record.number.clone(), record);
        Ok(())
    }

    async fn get_version_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        pacticipant: &str,
        number: &str,
    ) -> Result<Option<VersionRecord>, StorageError> {
        Ok(snapshot
            .staged
            .versions
            .get(pacticipant)
            .and_then(|v| v.get(number))
            .cloned())
    }

    async fn insert_environment(
        &self,
        snapshot: &mut MemorySnapshot,
        record: EnvironmentRecord,
    ) -> Result<(), StorageError> {
        let tables = &mut snapshot.staged;
        if tables.environments.contains_key(&record.name) {
            return Err(StorageError::already_exists("environment", record.name));
        }
        tables.environments.insert(record.name.clone(), record);
        Ok(())
    }

    async fn get_environment_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        name: &str,
    ) -> Result<Option<EnvironmentRecord>, StorageError> {
        Ok(snapshot.staged.environments.get(name).cloned())
    }

    async fn current_deployed_version_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        pacticipant: &str,
        environment: &str,
    ) -> Result<Option<DeployedVersionRecord>, StorageError> {
        Ok(current_for(&snapshot.staged, pacticipant, environment).cloned())
    }

    async fn get_deployed_version_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        uuid: &str,
    ) -> Result<Option<DeployedVersionRecord>, StorageError> {
        Ok(snapshot
            .staged
            .deployed_versions
            .iter()
            .find(|d| d.uuid == uuid)
            .cloned())
    }

    async fn record_undeployed(
        &self,
        snapshot: &mut MemorySnapshot,
        uuid: &str,
        undeployed_at: &str,
    ) -> Result<DeployedVersionRecord, StorageError> {
        let record = snapshot
            .staged
            .deployed_versions
            .iter_mut()
            .find(|d| d.uuid == uuid)
            .ok_or_else(|| StorageError::not_found("deployed version", uuid))?;
        record.currently_deployed = false;
        record.undeployed_at = Some(undeployed_at.to_string());
        Ok(record.clone())
    }

    async fn insert_deployed_version(
        &self,
        snapshot: &mut MemorySnapshot,
        record: DeployedVersionRecord,
    ) -> Result<(), StorageError> {
        let tables = &mut snapshot.staged;
        if tables.deployed_versions.iter().any(|d| d.uuid == record.uuid) {
            return Err(StorageError::already_exists("deployed version", record.uuid));
        }
        tables.deployed_versions.push(record);
        Ok(())
    }

    async fn insert_pact_content(
        &self,
        snapshot: &mut MemorySnapshot,
        record: PactContentRecord,
    ) -> Result<bool, StorageError> {
        let contents = &mut snapshot.staged.pact_contents;
        if contents.contains_key(&record.sha) {
            return Ok(false);
        }
        contents.insert(record.sha.clone(), record);
        Ok(true)
    }

    async fn put_pact_publication(
        &self,
        snapshot: &mut MemorySnapshot,
        record: PactPublicationRecord,
    ) -> Result<Option<PactPublicationRecord>, StorageError> {
        let publications = &mut snapshot.staged.pact_publications;
        let existing = publications.iter().position(|p| {
            p.consumer == record.consumer
                && p.provider == record.provider
                && p.consumer_version == record.consumer_version
        });
        match existing {
            Some(idx) => {
                let previous = publications.remove(idx);
                publications.push(record);
                Ok(Some(previous))
            }
            None => {
                publications.push(record);
                Ok(None)
            }
        }
    }

    async fn next_verification_number(
        &self,
        snapshot: &mut MemorySnapshot,
        pact_version_sha: &str,
    ) -> Result<i64, StorageError> {
        let highest = snapshot
            .staged
            .verifications
            .get(pact_version_sha)
            .and_then(|v| v.iter().map(|r| r.number).max())
            .unwrap_or(0);
        Ok(highest + 1)
    }

    async fn insert_verification(
        &self,
        snapshot: &mut MemorySnapshot,
        record: VerificationRecord,
    ) -> Result<(), StorageError> {
        let list = snapshot
            .staged
            .verifications
            .entry(record.pact_version_sha.clone())
            .or_default();
        if list.iter().any(|v| v.number == record.number) {
            return Err(StorageError::already_exists(
                "verification",
                format!("{}/{}", record.pact_version_sha, record.number),
            ));
        }
        list.push(record);
        list.sort_by_key(|v| v.number);
        Ok(())
    }

    async fn get_pacticipant(&self, name: &str) -> Result<PacticipantRecord, StorageError> {
        self.committed
            .read()
            .await
            .pacticipants
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::not_found("pacticipant", name))
    }

    async fn list_pacticipants(&self) -> Result<Vec<PacticipantRecord>, StorageError> {
        Ok(self
            .committed
            .read()
            .await
            .pacticipants
            .values()
            .cloned()
            .collect())
    }

    async fn get_version(
        &self,
        pacticipant: &str,
        number: &str,
    ) -> Result<VersionRecord, StorageError> {
        self.committed
            .read()
            .await
            .versions
            .get(pacticipant)
            .and_then(|v| v.get(number))
            .cloned()
            .ok_or_else(|| StorageError::not_found("version", format!("{pacticipant}/{number}")))
    }

    async fn get_environment(&self, name: &str) -> Result<EnvironmentRecord, StorageError> {
        self.committed
            .read()
            .await
            .environments
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::not_found("environment", name))
    }

    async fn list_environments(&self) -> Result<Vec<EnvironmentRecord>, StorageError> {
        Ok(self
            .committed
            .read()
            .await
            .environments
            .values()
            .cloned()
            .collect())
    }

    async fn get_deployed_version(
        &self,
        uuid: &str,
    ) -> Result<DeployedVersionRecord, StorageError> {
        self.committed
            .read()
            .await
            .deployed_versions
            .iter()
            .find(|d| d.uuid == uuid)
            .cloned()
            .ok_or_else(|| StorageError::not_found("deployed version", uuid))
    }

    async fn list_deployed_versions(
        &self,
        environment: &str,
        pacticipant: Option<&str>,
        currently_deployed_only: bool,
    ) -> Result<Vec<DeployedVersionRecord>, StorageError> {
        Ok(self
            .committed
            .read()
            .await
            .deployed_versions
            .iter()
            .filter(|d| d.environment == environment)
            .filter(|d| pacticipant.map_or(true, |p| d.pacticipant == p))
            .filter(|d| !currently_deployed_only || d.currently_deployed)
            .cloned()
            .collect())
    }

    async fn list_pact_publications(
        &self,
        provider: &str,
        consumer: &str,
        pact_version_sha: Option<&str>,
    ) -> Result<Vec<PactPublicationRecord>, StorageError> {
        Ok(self
            .committed
            .read()
            .await
            .pact_publications
            .iter()
            .filter(|p| p.provider == provider && p.consumer == consumer)
            .filter(|p| pact_version_sha.map_or(true, |sha| p.pact_version_sha == sha))
            .cloned()
            .collect())
    }

    async fn get_pact_content(&self, sha: &str) -> Result<PactContentRecord, StorageError> {
        self.committed
            .read()
            .await
            .pact_contents
            .get(sha)
            .cloned()
            .ok_or_else(|| StorageError::not_found("pact", sha))
    }

    async fn get_verification(
        &self,
        pact_version_sha: &str,
        number: i64,
    ) -> Result<VerificationRecord, StorageError> {
        self.committed
            .read()
            .await
            .verifications
            .get(pact_version_sha)
            .and_then(|list| list.iter().find(|v| v.number == number))
            .cloned()
            .ok_or_else(|| {
                StorageError::not_found("verification", format!("{pact_version_sha}/{number}"))
            })
    }

    async fn list_verifications(
        &self,
        pact_version_sha: &str,
    ) -> Result<Vec<VerificationRecord>, StorageError> {
        Ok(self
            .committed
            .read()
            .await
            .verifications
            .get(pact_version_sha)
            .cloned()
            .unwrap_or_default())
    }
}
