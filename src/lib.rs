// src/lib.rs

pub mod admin;
pub mod cli;
pub mod config;
pub mod error;
pub mod middleware;
pub mod pool;
pub mod recovery;
pub mod rotation;
pub mod state;
pub mod store;
pub mod upstream;

use axum::{
    body::Body,
    http::{HeaderValue, Request as AxumRequest},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::{path::PathBuf, sync::Arc, time::Duration, time::Instant};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use pool::KeyPool;
pub use recovery::{PoolStats, RecoveryReport, RecoveryService};
pub use rotation::{KeyRotator, RotationReason};
pub use state::AppState;
pub use store::{InMemoryStore, KeyRecord, KeyStore};
pub use upstream::{FailureKind, UpstreamError};

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Builds the application router: liveness plus the admin surface.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(admin::admin_routes(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(trace_requests))
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        .with_state(state)
}

/// Middleware adding a request id and a tracing span around each request.
async fn trace_requests(
    mut req: AxumRequest<Body>,
    next: axum::middleware::Next,
) -> impl IntoResponse {
    let request_id = Uuid::new_v4();
    let start_time = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        http.method = %method,
        url.path = %path,
    );

    req.extensions_mut().insert(request_id);

    async move {
        let mut response = next.run(req).await;
        let elapsed = start_time.elapsed();

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("X-Request-ID", value);
        }

        info!(
            http.response.duration = ?elapsed,
            http.status_code = response.status().as_u16(),
            "Finished processing request"
        );

        response
    }
    .instrument(span)
    .await
}

/// Loads configuration, wires up the pool services and returns the router.
pub async fn run(
    config_path_override: Option<PathBuf>,
) -> std::result::Result<(Router, AppConfig), AppError> {
    info!("Starting credential pool manager...");

    let config_path = config_path_override.unwrap_or_else(|| {
        std::env::var("CREDPOOL_CONFIG")
            .map_or_else(|_| PathBuf::from("config.yaml"), PathBuf::from)
    });

    let app_config = config::load_config(&config_path).map_err(|e| {
        error!(
            config.path = %config_path.display(),
            error = ?e,
            "Failed to load or validate configuration. Exiting."
        );
        e
    })?;

    let app_state = AppState::new(&app_config).await.map_err(|e| {
        error!(error = ?e, "Failed to initialize application state. Exiting.");
        e
    })?;
    info!("Application state initialized successfully.");

    let app = create_router(Arc::new(app_state));
    Ok((app, app_config))
}
