//! Deployment targets.

use std::sync::Arc;

use pactbroker_storage::{BrokerStorage, EnvironmentRecord};
use serde::Deserialize;

use crate::error::BrokerError;
use crate::now_rfc3339;

/// Request body for creating an environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEnvironment {
    #[serde(default)]
    pub name: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub production: bool,
}

pub struct EnvironmentService<S> {
    storage: Arc<S>,
}

impl<S: BrokerStorage> EnvironmentService<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Create an environment. Names must be non-blank, free of `/`, and unique.
    pub async fn create(&self, new: NewEnvironment) -> Result<EnvironmentRecord, BrokerError> {
        let mut errors = Vec::new();
        if new.name.trim().is_empty() {
            errors.push("name cannot be blank".to_string());
        }
        if new.name.contains('/') {
            errors.push("name cannot contain '/'".to_string());
        }
        if !errors.is_empty() {
            return Err(BrokerError::Validation(errors));
        }

        let record = EnvironmentRecord {
            uuid: uuid::Uuid::new_v4().to_string(),
            name: new.name,
            display_name: new.display_name,
            production: new.production,
            created_at: now_rfc3339(),
        };
        let mut snapshot = self.storage.begin_snapshot().await?;
        if let Err(e) = self
            .storage
            .insert_environment(&mut snapshot, record.clone())
            .await
        {
            let _ = self.storage.abort_snapshot(snapshot).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snapshot).await?;
        tracing::info!(environment = %record.name, production = record.production, "created environment");
        Ok(record)
    }

    pub async fn find(&self, name: &str) -> Result<EnvironmentRecord, BrokerError> {
        Ok(self.storage.get_environment(name).await?)
    }

    pub async fn list(&self) -> Result<Vec<EnvironmentRecord>, BrokerError> {
        Ok(self.storage.list_environments().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pactbroker_storage::MemoryStorage;

    #[tokio::test]
    async fn create_then_find() {
        let svc = EnvironmentService::new(Arc::new(MemoryStorage::new()));
        let created = svc
            .create(NewEnvironment {
                name: "production".to_string(),
                display_name: Some("Production".to_string()),
                production: true,
            })
            .await
            .unwrap();
        let found = svc.find("production").await.unwrap();
        assert_eq!(created, found);
        assert!(uuid::Uuid::parse_str(&found.uuid).is_ok());
    }

    #[tokio::test]
    async fn invalid_and_duplicate_names_rejected() {
        let svc = EnvironmentService::new(Arc::new(MemoryStorage::new()));
        let err = svc
            .create(NewEnvironment {
                name: "a/b".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.validation_messages().unwrap(),
            ["name cannot contain '/'".to_string()]
        );

        let test = || NewEnvironment {
            name: "test".to_string(),
            ..Default::default()
        };
        svc.create(test()).await.unwrap();
        assert!(matches!(
            svc.create(test()).await.unwrap_err(),
            BrokerError::Conflict(_)
        ));
    }
}
