//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;
use trivia_core::AdminAllowList;

pub const DEFAULT_GENERATION_API_BASE: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_GENERATION_MODELS: &str = "gemini-2.0-flash,gemini-1.5-flash,gemini-1.5-pro";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub firebase_project_id: String,
    pub firebase_client_email: String,
    pub firebase_private_key: String,
    pub database_url: String,
    pub gemini_api_key: String,
    pub generation_api_base: String,
    pub generation_models: Vec<String>,
    pub admin_emails: AdminAllowList,
    pub request_timeout: Duration,
    pub cors_allowed_origin: String,
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

/// Service account keys pasted into `.env` usually carry escaped newlines.
pub fn unescape_private_key(raw: &str) -> String {
    raw.replace("\\n", "\n")
}

pub fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn default_database_url(project_id: &str) -> String {
    format!("https://{project_id}-default-rtdb.firebaseio.com")
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Server Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_allowed_origin = std::env::var("CORS_ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let timeout_str =
            std::env::var("REQUEST_TIMEOUT_SECS").unwrap_or_else(|_| "30".to_string());
        let request_timeout = timeout_str
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "REQUEST_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", timeout_str),
                )
            })?;

        // --- Firebase Service Account ---
        let firebase_project_id = required("FIREBASE_PROJECT_ID")?;
        let firebase_client_email = required("FIREBASE_CLIENT_EMAIL")?;
        let firebase_private_key = unescape_private_key(&required("FIREBASE_PRIVATE_KEY")?);
        let database_url = std::env::var("FIREBASE_DATABASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| default_database_url(&firebase_project_id));

        // --- Question Generation ---
        let gemini_api_key = required("GEMINI_API_KEY")?;
        let generation_api_base = std::env::var("GENERATION_API_BASE")
            .unwrap_or_else(|_| DEFAULT_GENERATION_API_BASE.to_string());
        let generation_models = parse_model_list(
            &std::env::var("GENERATION_MODELS")
                .unwrap_or_else(|_| DEFAULT_GENERATION_MODELS.to_string()),
        );
        if generation_models.is_empty() {
            return Err(ConfigError::InvalidValue(
                "GENERATION_MODELS".to_string(),
                "at least one model name is required".to_string(),
            ));
        }

        // --- Admin Gate ---
        let admin_emails =
            AdminAllowList::from_csv(&std::env::var("ADMIN_EMAILS").unwrap_or_default());

        Ok(Self {
            bind_address,
            log_level,
            firebase_project_id,
            firebase_client_email,
            firebase_private_key,
            database_url,
            gemini_api_key,
            generation_api_base,
            generation_models,
            admin_emails,
            request_timeout,
            cors_allowed_origin,
        })
    }
}
