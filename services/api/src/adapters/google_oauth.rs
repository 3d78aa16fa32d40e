//! services/api/src/adapters/google_oauth.rs
//!
//! Service-account OAuth2 for the realtime database. `yup_oauth2` runs the
//! token exchange and caching; `AuthMiddleware` injects the token into every
//! outgoing request through a `reqwest_middleware` layer.

use reqwest::{header, Request, Response};
use reqwest_middleware::{Middleware, Next};
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::{ServiceAccountAuthenticator, ServiceAccountKey};

pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const RTDB_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/firebase.database",
    "https://www.googleapis.com/auth/userinfo.email",
];

/// The token endpoint did not answer within the configured timeout.
#[derive(Debug, thiserror::Error)]
#[error("timed out obtaining a service account token")]
pub struct TokenTimeout;

/// Builds a service account key from the configured client email and private key.
pub fn service_account_key(
    client_email: &str,
    private_key: &str,
    token_uri: &str,
) -> Result<ServiceAccountKey, serde_json::Error> {
    serde_json::from_value(json!({
        "type": "service_account",
        "client_email": client_email,
        "private_key": private_key,
        "token_uri": token_uri,
    }))
}

/// Adds `Authorization: Bearer <service account token>` to every request.
pub struct AuthMiddleware {
    authenticator: DefaultAuthenticator,
    timeout: Duration,
}

impl AuthMiddleware {
    /// Builds the authenticator up front so a malformed key fails at startup.
    pub async fn new(key: ServiceAccountKey, timeout: Duration) -> std::io::Result<Self> {
        let authenticator = ServiceAccountAuthenticator::builder(key).build().await?;
        Ok(Self {
            authenticator,
            timeout,
        })
    }

    async fn get_token(&self) -> Result<String, anyhow::Error> {
        let token = tokio::time::timeout(self.timeout, self.authenticator.token(RTDB_SCOPES))
            .await
            .map_err(|_| TokenTimeout)??;

        debug!("Service account token ready");
        Ok(token
            .token()
            .ok_or_else(|| anyhow::anyhow!("No token found"))?
            .to_string())
    }
}

#[async_trait::async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let token = self
            .get_token()
            .await
            .map_err(reqwest_middleware::Error::Middleware)?;

        let value = header::HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
            reqwest_middleware::Error::Middleware(anyhow::anyhow!("Invalid auth token: {}", e))
        })?;
        req.headers_mut().insert(header::AUTHORIZATION, value);

        next.run(req, extensions).await
    }
}
