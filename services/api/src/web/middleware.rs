//! services/api/src/web/middleware.rs
//!
//! Admin middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use trivia_core::ports::PortError;

use crate::error::ApiError;
use crate::web::state::AppState;

/// Middleware that verifies the `Authorization: Bearer <ID token>` header and
/// admits only admins.
///
/// On success the `Principal` is inserted into request extensions for handlers to use.
/// A missing or invalid token is a 401, a verified non-admin a 403.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract the bearer token
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| PortError::Unauthorized("No token provided".to_string()))?
        .to_string();

    // 2. Verify it and apply the admin policy
    let principal = state.gate.authorize(&token).await?;

    // 3. Insert the principal into request extensions
    req.extensions_mut().insert(principal);

    // 4. Continue to the handler
    Ok(next.run(req).await)
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
