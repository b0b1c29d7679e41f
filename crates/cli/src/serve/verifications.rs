//! Verification result publication.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use pactbroker_core::{BrokerError, PactLocator};

use super::error::ApiError;
use super::hal::{verification_url, Hal, VerificationResource};
use super::state::AppState;

async fn create(
    state: &AppState,
    locator: PactLocator,
    token: Option<&str>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, ApiError> {
    let configuration = state.webhook_configuration(headers);
    let record = state
        .intake
        .create_verification_from_body(&locator, body, token, configuration)
        .await?;

    let base = state.base_url(headers);
    let location = verification_url(&base, &record);
    let mut response = Hal(StatusCode::CREATED, VerificationResource::encode(record, &base))
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    Ok(response)
}

/// POST /pacts/provider/{provider}/consumer/{consumer}/pact-version/{sha}/verification-results
pub(crate) async fn handle_create(
    State(state): State<Arc<AppState>>,
    Path((provider, consumer, sha)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let locator = PactLocator::new(provider, consumer, sha);
    create(&state, locator, None, &headers, &body).await
}

/// POST .../pact-version/{sha}/metadata/{token}/verification-results
pub(crate) async fn handle_create_with_metadata(
    State(state): State<Arc<AppState>>,
    Path((provider, consumer, sha, token)): Path<(String, String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let locator = PactLocator::new(provider, consumer, sha);
    create(&state, locator, Some(&token), &headers, &body).await
}

/// GET .../pact-version/{sha}/verification-results/{number}
pub(crate) async fn handle_get(
    State(state): State<Arc<AppState>>,
    Path((provider, consumer, sha, number)): Path<(String, String, String, i64)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let record = state.verifications.find(&sha, number).await?;
    if record.provider != provider || record.consumer != consumer {
        return Err(BrokerError::NotFound {
            kind: "verification",
            key: format!("{sha}/{number}"),
        }
        .into());
    }
    let base = state.base_url(&headers);
    Ok(Hal(StatusCode::OK, VerificationResource::encode(record, &base)).into_response())
}
