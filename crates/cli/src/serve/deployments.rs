//! Environment and deployed-version resources.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use pactbroker_core::{
    DeployedVersionRecord, DeploymentTracker, MemoryStorage, NewEnvironment, WebhookEvent,
    WebhookKind,
};
use serde::Deserialize;

use super::error::ApiError;
use super::hal::{
    parse_body, DeployedVersionList, DeployedVersionResource, EnvironmentList,
    EnvironmentResource, Hal,
};
use super::state::AppState;

fn deployment_event(kind: WebhookKind, record: &DeployedVersionRecord) -> WebhookEvent {
    WebhookEvent::new(kind)
        .with("pacticipantName", record.pacticipant.as_str())
        .with("pacticipantVersionNumber", record.version_number.as_str())
        .with("environmentName", record.environment.as_str())
        .with("deployedVersionUuid", record.uuid.as_str())
}

/// GET /environments
pub(crate) async fn handle_list_environments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let records = state.environments.list().await?;
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::OK, EnvironmentList::encode(records, &base)).into_response())
}

/// POST /environments
pub(crate) async fn handle_create_environment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let new: NewEnvironment = parse_body(&body)?;
    let record = state.environments.create(new).await?;
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::CREATED, EnvironmentResource::encode(record, &base)).into_response())
}

/// GET /environments/{name}
pub(crate) async fn handle_get_environment(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let record = state.environments.find(&name).await?;
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::OK, EnvironmentResource::encode(record, &base)).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentBody {
    application_instance: Option<String>,
}

/// POST /pacticipants/{name}/versions/{number}/deployed-versions/environment/{environment}
///
/// Any current deployment of the pacticipant to the environment is replaced.
/// Redeploying the current version returns it with 200.
pub(crate) async fn handle_record_deployment(
    State(state): State<Arc<AppState>>,
    Path((name, number, environment)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let deployment: DeploymentBody = parse_body(&body)?;
    let version = state.pacticipants.find_version(&name, &number).await?;
    let environment = state.environments.find(&environment).await?;

    let outcome = state
        .deployments
        .record_deployment_replacing_current(
            DeploymentTracker::<MemoryStorage>::generate_identifier(),
            &version,
            &environment,
            deployment.application_instance.as_deref(),
        )
        .await?;

    let status = if outcome.created {
        if let Some(replaced) = &outcome.replaced {
            state.dispatch(
                deployment_event(WebhookKind::DeploymentUndeployed, replaced),
                &headers,
            );
        }
        state.dispatch(
            deployment_event(WebhookKind::DeploymentRecorded, &outcome.record),
            &headers,
        );
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let base = state.base_url(&headers);
    Ok(Hal(status, DeployedVersionResource::encode(outcome.record, &base)).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentlyDeployedQuery {
    pacticipant: Option<String>,
}

/// GET /environments/{name}/deployed-versions/currently-deployed[?pacticipant=]
pub(crate) async fn handle_currently_deployed(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<CurrentlyDeployedQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let records = state
        .deployments
        .currently_deployed(&name, query.pacticipant.as_deref())
        .await?;
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::OK, DeployedVersionList::encode(records, &base)).into_response())
}

/// GET /deployed-versions/{uuid}
pub(crate) async fn handle_get_deployed_version(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let record = state.deployments.find(&uuid).await?;
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::OK, DeployedVersionResource::encode(record, &base)).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployedVersionPatch {
    currently_deployed: Option<bool>,
}

/// PATCH /deployed-versions/{uuid}: `{"currentlyDeployed": false}` undeploys.
pub(crate) async fn handle_update_deployed_version(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let patch: DeployedVersionPatch = parse_body(&body)?;
    let record = match patch.currently_deployed {
        Some(false) => {
            let before = state.deployments.find(&uuid).await?;
            let record = state.deployments.record_undeployment(&uuid).await?;
            if before.currently_deployed {
                state.dispatch(
                    deployment_event(WebhookKind::DeploymentUndeployed, &record),
                    &headers,
                );
            }
            record
        }
        Some(true) => {
            return Err(ApiError::bad_request(
                "currentlyDeployed can only be set to false",
            ))
        }
        None => state.deployments.find(&uuid).await?,
    };
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::OK, DeployedVersionResource::encode(record, &base)).into_response())
}
