pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_admin;
pub use rest::ApiDoc;
pub use state::AppState;

/// Builds the API router. Everything except the health check sits behind `require_admin`.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new().route("/api/health", get(rest::health_handler));

    // Admin routes
    let admin_routes = Router::new()
        .route("/api/categories", get(rest::list_categories_handler))
        .route(
            "/api/categories/{category_id}/banks",
            get(rest::list_banks_handler),
        )
        .route(
            "/api/categories/{category_id}/bank-info",
            get(rest::bank_info_handler),
        )
        .route(
            "/api/categories/{category_id}/generate",
            post(rest::generate_questions_handler),
        )
        .route(
            "/api/categories/{category_id}/questions",
            post(rest::add_questions_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .with_state(state)
}
