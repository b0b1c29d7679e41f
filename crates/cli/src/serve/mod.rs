//! `pactbroker serve` -- the broker's HTTP API.
//!
//! Endpoints:
//! - GET  /health
//! - GET  /                                         - index with links
//! - GET/POST /pacticipants
//! - GET/PUT/PATCH /pacticipants/{name}             - PUT replaces, PATCH merges
//! - GET/PUT /pacticipants/{name}/versions/{number}
//! - POST /pacticipants/{name}/versions/{number}/deployed-versions/environment/{env}
//! - GET/POST /environments, GET /environments/{name}
//! - GET  /environments/{name}/deployed-versions/currently-deployed
//! - GET/PATCH /deployed-versions/{uuid}
//! - GET/PUT /pacts/provider/{p}/consumer/{c}/version/{v}
//! - GET  /pacts/provider/{p}/consumer/{c}/latest
//! - GET  /pacts/provider/{p}/consumer/{c}/pact-version/{sha}[/metadata/{token}]
//! - POST /pacts/provider/{p}/consumer/{c}/pact-version/{sha}[/metadata/{token}]/verification-results
//! - GET  /pacts/provider/{p}/consumer/{c}/pact-version/{sha}/verification-results/{number}
//!
//! Successful responses use `application/hal+json;charset=utf-8`; errors are
//! plain JSON.

mod deployments;
mod error;
mod hal;
mod handlers;
mod middleware;
mod pacticipants;
mod pacts;
mod state;
mod verifications;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{middleware as axum_middleware, Json, Router};
use pactbroker_core::{BrokerConfig, MemoryStorage};
use tower_http::cors::{Any, CorsLayer};

pub(crate) use self::state::AppState;

/// Maximum request body size: 10 MB.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

pub(crate) struct ServeOptions {
    pub(crate) port: u16,
    pub(crate) config: BrokerConfig,
    pub(crate) tls_cert: Option<PathBuf>,
    pub(crate) tls_key: Option<PathBuf>,
}

/// All routes, with CORS, request logging and the body limit applied.
pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::handle_health))
        .route("/", get(handlers::handle_index))
        .route(
            "/pacticipants",
            get(pacticipants::handle_list).post(pacticipants::handle_create),
        )
        .route(
            "/pacticipants/{name}",
            get(pacticipants::handle_get)
                .put(pacticipants::handle_replace)
                .patch(pacticipants::handle_merge),
        )
        .route(
            "/pacticipants/{name}/versions/{number}",
            get(pacticipants::handle_get_version).put(pacticipants::handle_put_version),
        )
        .route(
            "/pacticipants/{name}/versions/{number}/deployed-versions/environment/{environment}",
            post(deployments::handle_record_deployment),
        )
        .route(
            "/environments",
            get(deployments::handle_list_environments).post(deployments::handle_create_environment),
        )
        .route(
            "/environments/{name}",
            get(deployments::handle_get_environment),
        )
        .route(
            "/environments/{name}/deployed-versions/currently-deployed",
            get(deployments::handle_currently_deployed),
        )
        .route(
            "/deployed-versions/{uuid}",
            get(deployments::handle_get_deployed_version)
                .patch(deployments::handle_update_deployed_version),
        )
        .route(
            "/pacts/provider/{provider}/consumer/{consumer}/version/{version}",
            put(pacts::handle_publish).get(pacts::handle_get_for_version),
        )
        .route(
            "/pacts/provider/{provider}/consumer/{consumer}/latest",
            get(pacts::handle_get_latest),
        )
        .route(
            "/pacts/provider/{provider}/consumer/{consumer}/pact-version/{sha}",
            get(pacts::handle_get_pact_version),
        )
        .route(
            "/pacts/provider/{provider}/consumer/{consumer}/pact-version/{sha}/metadata/{token}",
            get(pacts::handle_get_pact_version_with_metadata),
        )
        .route(
            "/pacts/provider/{provider}/consumer/{consumer}/pact-version/{sha}/verification-results",
            post(verifications::handle_create),
        )
        .route(
            "/pacts/provider/{provider}/consumer/{consumer}/pact-version/{sha}/metadata/{token}/verification-results",
            post(verifications::handle_create_with_metadata),
        )
        .route(
            "/pacts/provider/{provider}/consumer/{consumer}/pact-version/{sha}/verification-results/{number}",
            get(verifications::handle_get),
        )
        .fallback(handlers::handle_not_found)
        .layer(axum_middleware::from_fn(middleware::log_requests))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server.
///
/// When TLS cert/key paths are provided, the server listens over HTTPS
/// using `axum-server` with rustls. Otherwise it uses plain HTTP.
pub(crate) async fn start_server(options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let ServeOptions {
        port,
        config,
        tls_cert: _tls_cert,
        tls_key: _tls_key,
    } = options;

    let storage = match &config.data_file {
        Some(path) => MemoryStorage::open(path).await?,
        None => MemoryStorage::new(),
    };
    match storage.data_file() {
        Some(path) => tracing::info!(data_file = %path.display(), "using file-backed storage"),
        None => tracing::info!("using in-memory storage; state is lost on exit"),
    }
    if !config.webhooks.is_empty() {
        tracing::info!(targets = config.webhooks.len(), "webhooks enabled");
    }

    let dispatcher = config.webhook_dispatcher();
    let state = Arc::new(AppState::new(Arc::new(storage), config, dispatcher));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);

    // TLS support via axum-server + rustls (requires `tls` feature)
    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&_tls_cert, &_tls_key) {
        let config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        tracing::info!("Pact broker listening on https://0.0.0.0:{}", port);
        axum_server::bind_rustls(socket_addr, config)
            .serve(app.into_make_service())
            .await?;
        return Ok(());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Pact broker listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down.");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal...");
}
