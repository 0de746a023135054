//! Shared-secret authentication for admin endpoints.

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ErrorResponse;
use crate::state::AppState;

/// Constant-time byte comparison to prevent timing attacks on the secret.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Middleware validating the `x-admin-secret` header.
///
/// - No secret configured: 403, the admin surface is disabled.
/// - Missing or wrong secret: 401. Runs before any handler work.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let expected = match &state.admin_secret {
        Some(secret) => secret,
        None => {
            let body = ErrorResponse {
                error: "forbidden".to_string(),
                message: "Admin endpoints are disabled (no TANKOBON_ADMIN_SECRET configured)"
                    .to_string(),
            };
            return (StatusCode::FORBIDDEN, axum::Json(body)).into_response();
        }
    };

    let provided = request
        .headers()
        .get("x-admin-secret")
        .and_then(|v| v.to_str().ok());

    let authenticated =
        provided.is_some_and(|secret| constant_time_eq(secret.as_bytes(), expected.as_bytes()));

    if !authenticated {
        let body = ErrorResponse {
            error: "unauthorized".to_string(),
            message: "Missing or invalid x-admin-secret header".to_string(),
        };
        return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
    }

    next.run(request).await
}
