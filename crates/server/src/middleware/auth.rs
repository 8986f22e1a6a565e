use crate::api::ErrorResponse;
use crate::config::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use toolhost_core::CallerContext;

/// Header carrying the invoking agent's identity.
pub const CALLER_HEADER: &str = "x-caller-id";

pub const ANONYMOUS_CALLER: &str = "anonymous";

/// Extract the caller identity from request headers
pub fn caller_from_headers(headers: &HeaderMap) -> CallerContext {
    let caller_id = headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(ANONYMOUS_CALLER);

    CallerContext::new(caller_id)
}

/// Extract a bearer token from the authorization header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth_str = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    auth_str.strip_prefix("Bearer ").map(str::trim)
}

/// Compare a presented key against the configured one in constant time
pub fn api_key_matches(presented: Option<&str>, expected: &str) -> bool {
    match presented {
        Some(presented) => presented.as_bytes().ct_eq(expected.as_bytes()).into(),
        None => false,
    }
}

/// Reject requests that do not present the service API key, when one is configured
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = state.service.api_key() {
        if !api_key_matches(bearer_token(request.headers()), expected) {
            tracing::info!(
                caller = %caller_from_headers(request.headers()).caller_id,
                path = %request.uri().path(),
                "Rejected request without a valid API key"
            );
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Missing or invalid API key")),
            )
                .into_response();
        }
    }

    next.run(request).await
}
