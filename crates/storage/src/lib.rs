//! pactbroker-storage: durable state for the pact broker.
//!
//! The [`BrokerStorage`] trait is the only way the domain layer touches
//! persisted state. Every logical write goes through a snapshot
//! (transaction) so multi-record changes commit or roll back together.

pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStorage};
pub use record::{
    DeployedVersionRecord, EnvironmentRecord, PactContentRecord, PactPublicationRecord,
    PacticipantRecord, VerificationRecord, VersionRecord,
};
pub use traits::BrokerStorage;
