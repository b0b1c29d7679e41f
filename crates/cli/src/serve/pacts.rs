//! Pact publication and retrieval.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use pactbroker_core::{BrokerError, PactLocator, PactMetadata, WebhookEvent, WebhookKind};
use serde_json::Value;

use super::error::ApiError;
use super::hal::{encode_pact, parse_body, Hal};
use super::state::AppState;

/// PUT /pacts/provider/{provider}/consumer/{consumer}/version/{version}
pub(crate) async fn handle_publish(
    State(state): State<Arc<AppState>>,
    Path((provider, consumer, version)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let content: Value = parse_body(&body)?;
    let published = state
        .pacts
        .publish(&consumer, &provider, &version, content)
        .await?;

    let status = if published.created {
        let pact = &published.pact;
        state.dispatch(
            WebhookEvent::new(WebhookKind::ContractPublished)
                .with("consumerName", pact.consumer.as_str())
                .with("providerName", pact.provider.as_str())
                .with("consumerVersionNumber", pact.consumer_version.as_str())
                .with("pactVersionSha", pact.pact_version_sha.as_str()),
            &headers,
        );
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let base = state.base_url(&headers);
    Ok(Hal(status, encode_pact(published.pact, &base)).into_response())
}

/// GET /pacts/provider/{provider}/consumer/{consumer}/version/{version}
pub(crate) async fn handle_get_for_version(
    State(state): State<Arc<AppState>>,
    Path((provider, consumer, version)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let pact = state
        .pacts
        .pact_for_version(&provider, &consumer, &version)
        .await?;
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::OK, encode_pact(pact, &base)).into_response())
}

/// GET /pacts/provider/{provider}/consumer/{consumer}/latest
pub(crate) async fn handle_get_latest(
    State(state): State<Arc<AppState>>,
    Path((provider, consumer)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let pact = state.pacts.latest_pact(&provider, &consumer).await?;
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::OK, encode_pact(pact, &base)).into_response())
}

async fn get_pact_version(
    state: &AppState,
    locator: PactLocator,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let Some(pact) = state.pacts.find_pact(&locator).await? else {
        return Err(BrokerError::NotFound {
            kind: "pact",
            key: format!(
                "{}/{}/{}",
                locator.provider, locator.consumer, locator.pact_version_sha
            ),
        }
        .into());
    };
    let base = state.base_url(headers);
    Ok(Hal(StatusCode::OK, encode_pact(pact, &base)).into_response())
}

/// GET /pacts/provider/{provider}/consumer/{consumer}/pact-version/{sha}
pub(crate) async fn handle_get_pact_version(
    State(state): State<Arc<AppState>>,
    Path((provider, consumer, sha)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    get_pact_version(&state, PactLocator::new(provider, consumer, sha), &headers).await
}

/// GET /pacts/provider/{provider}/consumer/{consumer}/pact-version/{sha}/metadata/{token}
///
/// The consumer version named in the token selects among publications that
/// share the content.
pub(crate) async fn handle_get_pact_version_with_metadata(
    State(state): State<Arc<AppState>>,
    Path((provider, consumer, sha, token)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let metadata = PactMetadata::decode(&token);
    let locator = PactLocator::new(provider, consumer, sha)
        .with_consumer_version(metadata.consumer_version_number());
    get_pact_version(&state, locator, &headers).await
}
