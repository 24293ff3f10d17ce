// src/admin.rs
//
// Operator surface: key provisioning, pool inspection, and the recovery
// trigger an external scheduler (cron) is expected to hit periodically.

use crate::{
    error::Result,
    middleware::admin_auth_middleware,
    recovery::{PoolStats, RecoveryReport},
    state::AppState,
    store::KeyRecord,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub fn admin_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new().nest(
        "/admin",
        Router::new()
            .route("/keys", get(list_keys).post(add_key))
            .route("/keys/:id/recover", post(recover_key))
            .route("/recovery/run", post(run_recovery))
            .route("/stats", get(stats))
            .layer(axum::middleware::from_fn_with_state(
                state,
                admin_auth_middleware,
            )),
    )
}

/// Redacted record view; the raw secret never leaves the process.
#[derive(Debug, Serialize)]
pub struct KeyView {
    pub id: Uuid,
    pub service_name: String,
    pub key_name: String,
    pub secret_preview: String,
    pub is_active: bool,
    pub current_usage: u64,
    pub usage_limit: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<&KeyRecord> for KeyView {
    fn from(record: &KeyRecord) -> Self {
        Self {
            id: record.id,
            service_name: record.service_name.clone(),
            key_name: record.key_name.clone(),
            secret_preview: record.secret_preview(),
            is_active: record.is_active,
            current_usage: record.current_usage,
            usage_limit: record.usage_limit,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServiceQuery {
    pub service: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddKeyRequest {
    pub service_name: Option<String>,
    pub key_name: String,
    pub secret: String,
    pub usage_limit: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RunRecoveryRequest {
    pub service: Option<String>,
    pub cooldown_hours: Option<u64>,
}

async fn resolve_service(state: &AppState, requested: Option<String>) -> String {
    match requested {
        Some(service) if !service.trim().is_empty() => service,
        _ => state.config.read().await.pool.default_service.clone(),
    }
}

async fn list_keys(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ServiceQuery>,
) -> Result<Json<Vec<KeyView>>> {
    let service = resolve_service(&state, query.service).await;
    let mut keys = state.store.list_keys(&service).await?;
    keys.sort_by(|a, b| a.key_name.cmp(&b.key_name));
    Ok(Json(keys.iter().map(KeyView::from).collect()))
}

async fn add_key(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddKeyRequest>,
) -> Result<(StatusCode, Json<KeyView>)> {
    let (service, usage_limit) = {
        let config = state.config.read().await;
        let service = request
            .service_name
            .clone()
            .unwrap_or_else(|| config.pool.default_service.clone());
        let usage_limit = request
            .usage_limit
            .unwrap_or(config.pool.default_usage_limit);
        (service, usage_limit)
    };

    if request.key_name.trim().is_empty() {
        return Err(crate::error::AppError::validation(
            "key_name",
            "must not be empty",
        ));
    }
    if request.secret.trim().is_empty() {
        return Err(crate::error::AppError::validation(
            "secret",
            "must not be empty",
        ));
    }
    if usage_limit == 0 {
        return Err(crate::error::AppError::validation(
            "usage_limit",
            "must be positive",
        ));
    }

    let record = KeyRecord::new(
        service,
        request.key_name,
        Secret::new(request.secret),
        usage_limit,
    );
    let view = KeyView::from(&record);
    state.store.insert(record).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn recover_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<KeyView>> {
    let recovered = state.recovery.recover_key(id).await?;
    Ok(Json(KeyView::from(&recovered)))
}

async fn run_recovery(
    State(state): State<Arc<AppState>>,
    request: Option<Json<RunRecoveryRequest>>,
) -> Result<Json<RecoveryReport>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let service = resolve_service(&state, request.service).await;

    let report = match request.cooldown_hours {
        Some(hours) => {
            if hours == 0 || hours > crate::config::MAX_COOLDOWN_HOURS {
                return Err(crate::error::AppError::validation(
                    "cooldown_hours",
                    format!(
                        "must be between 1 and {}",
                        crate::config::MAX_COOLDOWN_HOURS
                    ),
                ));
            }
            state
                .recovery
                .recover_inactive_keys_with(&service, Duration::hours(hours as i64))
                .await?
        }
        None => state.recovery.recover_inactive_keys(&service).await?,
    };
    Ok(Json(report))
}

async fn stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ServiceQuery>,
) -> Result<Json<PoolStats>> {
    let service = resolve_service(&state, query.service).await;
    let stats = state.recovery.recovery_stats(&service).await?;
    Ok(Json(stats))
}
