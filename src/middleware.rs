// src/middleware.rs

use crate::{error::AppError, state::AppState};
use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

/// Constant-time string comparison to prevent timing attacks.
fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }
    result == 0
}

/// Guards /admin routes with a bearer token. When no token is configured the
/// admin surface rejects everything.
pub async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let expected = {
        let config = state.config.read().await;
        config.server.admin_token.clone()
    };

    match expected {
        Some(expected) if !expected.is_empty() => {
            let presented = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "));

            match presented {
                Some(token) if secure_compare(token, &expected) => Ok(next.run(req).await),
                _ => {
                    warn!("admin authentication failed: invalid or missing token");
                    Err(AppError::Unauthorized)
                }
            }
        }
        _ => {
            warn!("admin authentication failed: no admin token configured");
            Err(AppError::Unauthorized)
        }
    }
}
