//! crates/trivia_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the question bank core.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the realtime database, the identity service and the
//! text-generation API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Bank, BankId, Category, Question, VerifiedIdentity};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// Why a question generation request failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation quota exhausted or billing required: {0}")]
    QuotaExhausted(String),
    #[error("All model variants failed. Last error: {0}")]
    AllVariantsFailed(String),
    #[error("Model returned malformed output: {0}")]
    MalformedOutput(String),
}

/// The error type shared by every port and core operation.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Path-addressed storage for categories and question banks.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    async fn list_categories(&self) -> PortResult<Vec<Category>>;

    async fn get_category(&self, category_id: &str) -> PortResult<Option<Category>>;

    /// Every bank stored under the category, in no particular order.
    /// Malformed bank records come back as empty banks.
    async fn load_banks(&self, category_id: &str) -> PortResult<Vec<Bank>>;

    /// Appends `questions` to the end of the bank, creating the bank record if absent.
    async fn append_questions(
        &self,
        category_id: &str,
        bank_id: BankId,
        questions: &[Question],
        now: DateTime<Utc>,
    ) -> PortResult<()>;
}

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Runs a single completion against one model variant.
    async fn complete(&self, model: &str, system: &str, prompt: &str) -> PortResult<String>;
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verifies a bearer token and returns the identity it carries.
    async fn verify_id_token(&self, token: &str) -> PortResult<VerifiedIdentity>;
}
