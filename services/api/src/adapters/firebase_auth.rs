//! services/api/src/adapters/firebase_auth.rs
//!
//! Verifies Firebase ID tokens. It implements the `IdentityVerifier` port from
//! the `core` crate.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use trivia_core::domain::VerifiedIdentity;
use trivia_core::ports::{IdentityVerifier, PortError, PortResult};

pub const GOOGLE_SECURETOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Used when the key endpoint sends no `Cache-Control: max-age`.
const DEFAULT_KEY_TTL: Duration = Duration::from_secs(3600);

/// How far in the future `auth_time` may be before the token is rejected.
const AUTH_TIME_SKEW_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum TokenVerificationError {
    #[error("Key fetch error: {0}")]
    KeyFetch(#[from] reqwest::Error),
    #[error("JWT validation error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

impl From<TokenVerificationError> for PortError {
    fn from(err: TokenVerificationError) -> Self {
        match err {
            TokenVerificationError::KeyFetch(e) if e.is_timeout() => {
                PortError::Timeout(format!("fetching token signing keys: {e}"))
            }
            TokenVerificationError::KeyFetch(e) => {
                PortError::Unexpected(format!("fetching token signing keys: {e}"))
            }
            other => PortError::Unauthorized(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FirebaseTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub auth_time: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub admin: Option<serde_json::Value>,
}

struct CachedKeys {
    keys: JwkSet,
    expires_at: Instant,
}

/// Caches Google's token-signing keys for as long as the endpoint allows.
pub struct PublicKeyManager {
    client: Client,
    url: String,
    cache: RwLock<Option<CachedKeys>>,
}

impl PublicKeyManager {
    pub fn new(client: Client, url: String) -> Self {
        Self {
            client,
            url,
            cache: RwLock::new(None),
        }
    }

    pub async fn get_key(&self, kid: &str) -> Result<DecodingKey, TokenVerificationError> {
        if let Some(key) = self.cached_key(kid).await? {
            return Ok(key);
        }

        // Unknown kid or stale cache: Google may have rotated its keys.
        self.refresh_keys().await?;

        self.cached_key(kid)
            .await?
            .ok_or_else(|| TokenVerificationError::InvalidToken(format!("no signing key with kid '{kid}'")))
    }

    async fn cached_key(&self, kid: &str) -> Result<Option<DecodingKey>, TokenVerificationError> {
        let cache = self.cache.read().await;
        match &*cache {
            Some(cached) if Instant::now() < cached.expires_at => cached
                .keys
                .find(kid)
                .map(DecodingKey::from_jwk)
                .transpose()
                .map_err(TokenVerificationError::from),
            _ => Ok(None),
        }
    }

    async fn refresh_keys(&self) -> Result<(), TokenVerificationError> {
        debug!(url = %self.url, "Refreshing token signing keys");
        let response = self.client.get(&self.url).send().await?.error_for_status()?;

        let max_age = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| {
                s.split(',').find_map(|part| {
                    part.trim()
                        .strip_prefix("max-age=")
                        .and_then(|secs| secs.parse::<u64>().ok())
                })
            })
            .map_or(DEFAULT_KEY_TTL, Duration::from_secs);

        let keys: JwkSet = response.json().await?;

        let mut cache = self.cache.write().await;
        *cache = Some(CachedKeys {
            keys,
            expires_at: Instant::now() + max_age,
        });
        Ok(())
    }
}

pub struct FirebaseTokenVerifier {
    project_id: String,
    key_manager: PublicKeyManager,
}

impl FirebaseTokenVerifier {
    pub fn new(project_id: String, client: Client) -> Self {
        Self::new_with_keys_url(project_id, client, GOOGLE_SECURETOKEN_JWKS_URL.to_string())
    }

    pub fn new_with_keys_url(project_id: String, client: Client, keys_url: String) -> Self {
        Self {
            project_id,
            key_manager: PublicKeyManager::new(client, keys_url),
        }
    }

    pub async fn verify_token(&self, token: &str) -> Result<FirebaseTokenClaims, TokenVerificationError> {
        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(TokenVerificationError::InvalidToken(format!(
                "unexpected signing algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| TokenVerificationError::InvalidToken("Missing kid in header".to_string()))?;

        let key = self.key_manager.get_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);

        let claims = decode::<FirebaseTokenClaims>(token, &key, &validation)?.claims;

        if claims.sub.is_empty() {
            return Err(TokenVerificationError::InvalidToken(
                "Subject (sub) claim must not be empty".to_string(),
            ));
        }
        if claims.auth_time > chrono::Utc::now().timestamp() + AUTH_TIME_SKEW_SECS {
            return Err(TokenVerificationError::InvalidToken(
                "Auth time is in the future".to_string(),
            ));
        }

        Ok(claims)
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseTokenVerifier {
    async fn verify_id_token(&self, token: &str) -> PortResult<VerifiedIdentity> {
        let claims = self.verify_token(token).await?;
        Ok(VerifiedIdentity {
            uid: claims.sub,
            email: claims.email,
            admin_claim: claims.admin.as_ref().and_then(serde_json::Value::as_bool) == Some(true),
        })
    }
}
