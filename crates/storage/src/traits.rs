use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    DeployedVersionRecord, EnvironmentRecord, PactContentRecord, PactPublicationRecord,
    PacticipantRecord, VerificationRecord, VersionRecord,
};

/// The storage trait for pact broker backends.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()` -- start a transaction, returns a `Snapshot`
/// 2. Call mutating and `*_for_update` methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` -- commit and consume the transaction
///    OR `abort_snapshot(snapshot)` -- roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, its writes MUST be
/// discarded.
///
/// ## Serialisation
///
/// Two snapshots that touch the same (pacticipant, environment) pair or the
/// same pact version must not interleave: the second one observes the first
/// one's committed writes. This is what keeps a single current deployment
/// per target and collision-free verification numbers. A backend may
/// serialise all snapshots; a SQL backend would use `SELECT ... FOR UPDATE`
/// on the rows read by the `*_for_update` methods.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait BrokerStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Pacticipants and versions (within snapshot) ───────────────────────────

    /// Insert a new pacticipant.
    ///
    /// Returns `Err(StorageError::AlreadyExists)` if the name is taken.
    async fn insert_pacticipant(
        &self,
        snapshot: &mut Self::Snapshot,
        record: PacticipantRecord,
    ) -> Result<(), StorageError>;

    /// Read a pacticipant, locking it for the rest of the snapshot.
    async fn get_pacticipant_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        name: &str,
    ) -> Result<Option<PacticipantRecord>, StorageError>;

    /// Overwrite an existing pacticipant (matched by name).
    ///
    /// Returns `Err(StorageError::NotFound)` if it does not exist.
    async fn update_pacticipant(
        &self,
        snapshot: &mut Self::Snapshot,
        record: PacticipantRecord,
    ) -> Result<(), StorageError>;

    /// Insert a version. Returns `Err(StorageError::AlreadyExists)` on a
    /// duplicate (pacticipant, number).
    async fn insert_version(
        &self,
        snapshot: &mut Self::Snapshot,
        record: VersionRecord,
    ) -> Result<(), StorageError>;

    async fn get_version_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        pacticipant: &str,
        number: &str,
    ) -> Result<Option<VersionRecord>, StorageError>;

    // ── Environments (within snapshot) ────────────────────────────────────────

    /// Insert an environment. Names are unique.
    async fn insert_environment(
        &self,
        snapshot: &mut Self::Snapshot,
        record: EnvironmentRecord,
    ) -> Result<(), StorageError>;

    async fn get_environment_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        name: &str,
    ) -> Result<Option<EnvironmentRecord>, StorageError>;

    // ── Deployments (within snapshot) ─────────────────────────────────────────

    /// The most recently created record with `currently_deployed = true` for
    /// the (pacticipant, environment) pair, if any.
    async fn current_deployed_version_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        pacticipant: &str,
        environment: &str,
    ) -> Result<Option<DeployedVersionRecord>, StorageError>;

    async fn get_deployed_version_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        uuid: &str,
    ) -> Result<Option<DeployedVersionRecord>, StorageError>;

    /// Set `currently_deployed = false` and `undeployed_at` on a record.
    ///
    /// Returns the updated record, or `Err(StorageError::NotFound)`.
    async fn record_undeployed(
        &self,
        snapshot: &mut Self::Snapshot,
        uuid: &str,
        undeployed_at: &str,
    ) -> Result<DeployedVersionRecord, StorageError>;

    /// Insert a deployed version. UUIDs are unique.
    async fn insert_deployed_version(
        &self,
        snapshot: &mut Self::Snapshot,
        record: DeployedVersionRecord,
    ) -> Result<(), StorageError>;

    // ── Pacts (within snapshot) ───────────────────────────────────────────────

    /// Store pact content. Returns `false` if content with this SHA was
    /// already stored (content is immutable; the existing row is kept).
    async fn insert_pact_content(
        &self,
        snapshot: &mut Self::Snapshot,
        record: PactContentRecord,
    ) -> Result<bool, StorageError>;

    /// Insert or replace the publication for (consumer, provider,
    /// consumer_version). Returns the replaced publication, if any.
    async fn put_pact_publication(
        &self,
        snapshot: &mut Self::Snapshot,
        record: PactPublicationRecord,
    ) -> Result<Option<PactPublicationRecord>, StorageError>;

    // ── Verifications (within snapshot) ───────────────────────────────────────

    /// The number the next verification of this pact version should use:
    /// one more than the highest stored number, or 1.
    async fn next_verification_number(
        &self,
        snapshot: &mut Self::Snapshot,
        pact_version_sha: &str,
    ) -> Result<i64, StorageError>;

    /// Insert a verification. Returns `Err(StorageError::AlreadyExists)` on a
    /// duplicate (pact_version_sha, number).
    async fn insert_verification(
        &self,
        snapshot: &mut Self::Snapshot,
        record: VerificationRecord,
    ) -> Result<(), StorageError>;

    // ── Query operations (committed state only) ───────────────────────────────

    /// Returns `Err(StorageError::NotFound)` if the pacticipant does not exist.
    async fn get_pacticipant(&self, name: &str) -> Result<PacticipantRecord, StorageError>;

    /// All pacticipants ordered by name.
    async fn list_pacticipants(&self) -> Result<Vec<PacticipantRecord>, StorageError>;

    async fn get_version(
        &self,
        pacticipant: &str,
        number: &str,
    ) -> Result<VersionRecord, StorageError>;

    async fn get_environment(&self, name: &str) -> Result<EnvironmentRecord, StorageError>;

    /// All environments ordered by name.
    async fn list_environments(&self) -> Result<Vec<EnvironmentRecord>, StorageError>;

    async fn get_deployed_version(&self, uuid: &str)
        -> Result<DeployedVersionRecord, StorageError>;

    /// Deployed versions for an environment in creation order.
    ///
    /// - `pacticipant`: restrict to one pacticipant
    /// - `currently_deployed_only`: skip undeployed records
    async fn list_deployed_versions(
        &self,
        environment: &str,
        pacticipant: Option<&str>,
        currently_deployed_only: bool,
    ) -> Result<Vec<DeployedVersionRecord>, StorageError>;

    /// Publications between a consumer and provider in creation order,
    /// optionally restricted to one pact version SHA.
    async fn list_pact_publications(
        &self,
        provider: &str,
        consumer: &str,
        pact_version_sha: Option<&str>,
    ) -> Result<Vec<PactPublicationRecord>, StorageError>;

    async fn get_pact_content(&self, sha: &str) -> Result<PactContentRecord, StorageError>;

    async fn get_verification(
        &self,
        pact_version_sha: &str,
        number: i64,
    ) -> Result<VerificationRecord, StorageError>;

    /// Verifications of a pact version ordered by number.
    async fn list_verifications(
        &self,
        pact_version_sha: &str,
    ) -> Result<Vec<VerificationRecord>, StorageError>;
}
