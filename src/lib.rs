//! User record service kept consistent with a remote identity authority.
#![forbid(unsafe_code)]

pub mod breaker;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod crypto;
mod database;
pub mod error;
pub mod fallback;
pub mod identity;
mod router;
pub mod telemetry;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::breaker::{BreakerGuardedCall, CircuitBreaker};
use crate::cache::{CachedLookup, MokaUserCache, UserCache};
use crate::coordinator::UpdateCoordinator;
use crate::crypto::{CryptoError, PasswordManager};
use crate::identity::{HttpIdentityAuthority, IdentityAuthority};
use crate::user::{
    MemoryUserRepository, PostgresUserRepository, UserRepository, UserService,
};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
    token: Option<&str>,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub users: UserService,
    pub coordinator: UpdateCoordinator,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire services on top of a storage and an identity authority.
    pub fn new(
        config: Arc<config::Configuration>,
        repo: Arc<dyn UserRepository>,
        authority: Arc<dyn IdentityAuthority>,
    ) -> Result<Self, CryptoError> {
        let passwords = PasswordManager::new(config.argon2.clone())?;
        let cache: Arc<dyn UserCache> =
            Arc::new(MokaUserCache::from(&config.cache));
        let breaker =
            Arc::new(CircuitBreaker::new((&config.circuit_breaker).into()));
        let identity = BreakerGuardedCall::new(
            authority,
            breaker,
            config.identity.timeout(),
        );

        let lookup = CachedLookup::new(Arc::clone(&repo), Arc::clone(&cache));

        Ok(Self {
            users: UserService::new(
                Arc::clone(&repo),
                lookup,
                passwords.clone(),
            ),
            coordinator: UpdateCoordinator::new(repo, cache, identity, passwords),
            config,
            metrics: None,
        })
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `GET /metrics` goes to the Prometheus scrape.
        .route("/metrics", get(router::status::metrics))
        .nest("/users", router::users::router())
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    config: Arc<config::Configuration>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let repo: Arc<dyn UserRepository> = match config.postgres {
        Some(ref postgres) => {
            let pool = database::connect(postgres).await?;
            Arc::new(PostgresUserRepository::new(pool))
        },
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, users are kept in memory"
            );
            Arc::new(MemoryUserRepository::new())
        },
    };

    let authority = Arc::new(HttpIdentityAuthority::new(
        &config.identity.address,
        config.identity.timeout(),
    )?);
    tracing::info!(address = %config.identity.address, "identity authority configured");

    Ok(AppState::new(config, repo, authority)?)
}
