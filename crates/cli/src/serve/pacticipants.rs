//! Pacticipant and version resources.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use pactbroker_core::PacticipantProperties;
use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use super::hal::{parse_body, Hal, PacticipantList, PacticipantResource, VersionResource};
use super::state::AppState;

/// GET /pacticipants
pub(crate) async fn handle_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let records = state.pacticipants.list().await?;
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::OK, PacticipantList::encode(records, &base)).into_response())
}

/// POST /pacticipants
pub(crate) async fn handle_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let value: Value = parse_body(&body)?;
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("name is required"))?;
    let properties: PacticipantProperties = serde_json::from_value(value)
        .map_err(|e| ApiError::bad_request(format!("invalid pacticipant: {e}")))?;

    let record = state.pacticipants.create(&name, properties).await?;
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::CREATED, PacticipantResource::encode(record, &base)).into_response())
}

/// GET /pacticipants/{name}
pub(crate) async fn handle_get(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let record = state.pacticipants.find(&name).await?;
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::OK, PacticipantResource::encode(record, &base)).into_response())
}

/// PUT /pacticipants/{name}: replace every recognised property.
pub(crate) async fn handle_replace(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let properties: PacticipantProperties = parse_body(&body)?;
    let record = state.pacticipants.replace(&name, properties).await?;
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::OK, PacticipantResource::encode(record, &base)).into_response())
}

/// PATCH /pacticipants/{name}: merge the supplied properties.
pub(crate) async fn handle_merge(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let properties: PacticipantProperties = parse_body(&body)?;
    let record = state.pacticipants.merge(&name, properties).await?;
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::OK, PacticipantResource::encode(record, &base)).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct VersionBody {
    branch: Option<String>,
}

/// GET /pacticipants/{name}/versions/{number}
pub(crate) async fn handle_get_version(
    State(state): State<Arc<AppState>>,
    Path((name, number)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let record = state.pacticipants.find_version(&name, &number).await?;
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::OK, VersionResource::encode(record, &base)).into_response())
}

/// PUT /pacticipants/{name}/versions/{number}: 201 when created, else 200.
pub(crate) async fn handle_put_version(
    State(state): State<Arc<AppState>>,
    Path((name, number)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let version: VersionBody = parse_body(&body)?;
    let (record, created) = state
        .pacticipants
        .ensure_version(&name, &number, version.branch.as_deref())
        .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let base = state.base_url(&headers);
    Ok(Hal(status, VersionResource::encode(record, &base)).into_response())
}
