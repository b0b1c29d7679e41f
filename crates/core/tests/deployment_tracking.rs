//! Deployment tracking across services sharing one storage backend.

use std::sync::Arc;

use pactbroker_core::{
    BrokerError, DeploymentTracker, EnvironmentService, MemoryStorage, NewEnvironment,
    PacticipantService,
};

struct Broker {
    pacticipants: PacticipantService<MemoryStorage>,
    environments: EnvironmentService<MemoryStorage>,
    tracker: DeploymentTracker<MemoryStorage>,
}

fn broker(storage: Arc<MemoryStorage>) -> Broker {
    Broker {
        pacticipants: PacticipantService::new(storage.clone()),
        environments: EnvironmentService::new(storage.clone()),
        tracker: DeploymentTracker::new(storage),
    }
}

async fn environment(broker: &Broker, name: &str) {
    broker
        .environments
        .create(NewEnvironment {
            name: name.to_string(),
            display_name: None,
            production: name == "production",
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn deployments_are_tracked_per_environment() {
    let broker = broker(Arc::new(MemoryStorage::new()));
    environment(&broker, "test").await;
    environment(&broker, "production").await;
    let test = broker.environments.find("test").await.unwrap();
    let production = broker.environments.find("production").await.unwrap();

    for number in ["1", "2", "3"] {
        let (version, _) = broker
            .pacticipants
            .ensure_version("Foo", number, Some("main"))
            .await
            .unwrap();
        broker
            .tracker
            .record_deployment_replacing_current(
                DeploymentTracker::<MemoryStorage>::generate_identifier(),
                &version,
                &test,
                None,
            )
            .await
            .unwrap();
        if number == "1" {
            broker
                .tracker
                .record_deployment_replacing_current(
                    DeploymentTracker::<MemoryStorage>::generate_identifier(),
                    &version,
                    &production,
                    None,
                )
                .await
                .unwrap();
        }
    }

    let in_test = broker.tracker.currently_deployed("test", None).await.unwrap();
    assert_eq!(in_test.len(), 1);
    assert_eq!(in_test[0].version_number, "3");

    let in_production = broker
        .tracker
        .currently_deployed("production", Some("Foo"))
        .await
        .unwrap();
    assert_eq!(in_production.len(), 1);
    assert_eq!(in_production[0].version_number, "1");

    let history = broker.tracker.deployment_history("Foo", "test").await.unwrap();
    let flags: Vec<bool> = history
        .iter()
        .map(|d| d.replaced_previous_deployed_version)
        .collect();
    assert_eq!(flags, vec![false, true, true]);
}

#[tokio::test]
async fn unknown_environment_listing_is_not_found() {
    let broker = broker(Arc::new(MemoryStorage::new()));
    let err = broker
        .tracker
        .currently_deployed("nowhere", None)
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::NotFound { kind: "environment", .. }));
}

#[tokio::test]
async fn deployments_survive_reopening_the_data_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broker.json");
    let uuid = {
        let broker = broker(Arc::new(MemoryStorage::open(&path).await.unwrap()));
        environment(&broker, "production").await;
        let production = broker.environments.find("production").await.unwrap();
        let (version, _) = broker
            .pacticipants
            .ensure_version("Foo", "1", None)
            .await
            .unwrap();
        broker
            .tracker
            .record_deployment(
                DeploymentTracker::<MemoryStorage>::generate_identifier(),
                &version,
                &production,
                true,
            )
            .await
            .unwrap()
            .uuid
    };

    let reopened = broker(Arc::new(MemoryStorage::open(&path).await.unwrap()));
    let record = reopened.tracker.find(&uuid).await.unwrap();
    assert!(record.currently_deployed);
    assert_eq!(record.pacticipant, "Foo");
}
