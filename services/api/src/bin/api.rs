//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        google_oauth::{service_account_key, GOOGLE_TOKEN_URI},
        AuthMiddleware, FirebaseTokenVerifier, OpenAiGenerationAdapter, RealtimeDbStore,
    },
    config::{Config, ConfigError},
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trivia_core::{AdminGate, BankAllocator, QuestionGenerator};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| ApiError::Internal(format!("failed to build HTTP client: {e}")))?;

    // --- 2. Realtime Database Store ---
    let key = service_account_key(
        &config.firebase_client_email,
        &config.firebase_private_key,
        GOOGLE_TOKEN_URI,
    )
    .map_err(|e| ConfigError::InvalidValue("FIREBASE_CLIENT_EMAIL".to_string(), e.to_string()))?;
    let auth = AuthMiddleware::new(key, config.request_timeout)
        .await
        .map_err(|e| ConfigError::InvalidValue("FIREBASE_PRIVATE_KEY".to_string(), e.to_string()))?;
    let store_client = reqwest_middleware::ClientBuilder::new(http.clone())
        .with(auth)
        .build();
    let store = Arc::new(RealtimeDbStore::new(store_client, &config.database_url)?);
    info!(database = %config.database_url, "Realtime database store ready");

    // --- 3. Identity Verification & Question Generation ---
    let verifier = Arc::new(FirebaseTokenVerifier::new(
        config.firebase_project_id.clone(),
        http.clone(),
    ));

    let openai_config = OpenAIConfig::new()
        .with_api_base(&config.generation_api_base)
        .with_api_key(&config.gemini_api_key);
    let backend = Arc::new(OpenAiGenerationAdapter::new(
        Client::with_config(openai_config),
        config.request_timeout,
    ));
    info!(models = ?config.generation_models, "Generation model variants configured");

    if config.admin_emails.is_empty() {
        warn!("ADMIN_EMAILS is empty; only accounts with the admin claim will be admitted");
    }

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        allocator: Arc::new(BankAllocator::new(store)),
        generator: Arc::new(QuestionGenerator::new(
            backend,
            config.generation_models.clone(),
        )),
        gate: Arc::new(AdminGate::new(verifier, config.admin_emails.clone())),
    });

    let origin = config
        .cors_allowed_origin
        .parse::<HeaderValue>()
        .map_err(|e| ConfigError::InvalidValue("CORS_ALLOWED_ORIGIN".to_string(), e.to_string()))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
