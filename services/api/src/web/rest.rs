//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::{ApiError, ErrorBody};
use crate::web::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use trivia_core::domain::{Bank, BankId, BankInfo, Category, Principal, Question, QuestionDraft};
use trivia_core::ports::PortError;
use trivia_core::validation::{validate_batch, RawQuestion};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        list_categories_handler,
        list_banks_handler,
        bank_info_handler,
        generate_questions_handler,
        add_questions_handler,
    ),
    components(
        schemas(
            HealthResponse,
            CategoryResponse,
            BanksResponse,
            BankResponse,
            StoredQuestionResponse,
            BankInfoResponse,
            GeneratedQuestion,
            GenerateResponse,
            GenerateBankInfo,
            AddQuestionsRequest,
            QuestionPayload,
            AddQuestionsResponse,
            ErrorBody,
        )
    ),
    tags(
        (name = "Trivia Question Bank API", description = "Admin endpoints for generating and storing trivia question banks.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    message: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResponse {
    id: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emoji: Option<String>,
}

impl From<Category> for CategoryResponse {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            title: c.title,
            subtitle: c.subtitle,
            emoji: c.emoji,
        }
    }
}

/// A question as it is stored in a bank.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredQuestionResponse {
    id: u64,
    text: String,
    options: Vec<String>,
    correct: String,
    difficulty: String,
    category: String,
}

impl From<Question> for StoredQuestionResponse {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            text: q.text,
            options: q.options,
            correct: q.correct,
            difficulty: q.difficulty.to_string(),
            category: q.category_id,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BankResponse {
    bank_id: String,
    order: u32,
    question_count: usize,
    questions: Vec<StoredQuestionResponse>,
    /// Epoch milliseconds.
    created_at: Option<i64>,
    /// Epoch milliseconds.
    updated_at: Option<i64>,
}

impl From<Bank> for BankResponse {
    fn from(b: Bank) -> Self {
        Self {
            bank_id: b.id.to_string(),
            order: b.id.number(),
            question_count: b.len(),
            created_at: b.created_at.map(|t| t.timestamp_millis()),
            updated_at: b.updated_at.map(|t| t.timestamp_millis()),
            questions: b.questions.into_iter().map(Into::into).collect(),
        }
    }
}

/// All banks of a category in ascending order. `count` is the total number of questions.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BanksResponse {
    #[serde(rename = "type")]
    kind: String,
    banks: Vec<BankResponse>,
    count: usize,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BankInfoResponse {
    #[serde(rename = "type")]
    kind: String,
    current_bank: Option<String>,
    current_count: usize,
    needed: usize,
    can_generate: bool,
    target_bank: String,
}

impl From<BankInfo> for BankInfoResponse {
    fn from(info: BankInfo) -> Self {
        Self {
            kind: "banks".to_string(),
            current_bank: info.current_bank.map(|b| b.to_string()),
            current_count: info.current_count,
            needed: info.needed,
            can_generate: info.can_generate,
            target_bank: info.target_bank.to_string(),
        }
    }
}

/// A generated question that has not been stored yet.
#[derive(Serialize, ToSchema)]
pub struct GeneratedQuestion {
    text: String,
    options: Vec<String>,
    correct: String,
    difficulty: String,
}

impl From<QuestionDraft> for GeneratedQuestion {
    fn from(d: QuestionDraft) -> Self {
        Self {
            text: d.text,
            options: d.options,
            correct: d.correct,
            difficulty: d.difficulty.to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBankInfo {
    target_bank: String,
    current_count: usize,
    needed: usize,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    success: bool,
    questions: Vec<GeneratedQuestion>,
    count: usize,
    bank_info: GenerateBankInfo,
}

/// One question as submitted by the admin UI. Missing fields are reported by validation.
#[derive(Deserialize, ToSchema)]
pub struct QuestionPayload {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    correct: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
}

impl From<QuestionPayload> for RawQuestion {
    fn from(p: QuestionPayload) -> Self {
        RawQuestion {
            text: p.text,
            options: p.options,
            correct: p.correct,
            difficulty: p.difficulty,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddQuestionsRequest {
    #[serde(default)]
    questions: Vec<QuestionPayload>,
    /// Defaults to the category's current target bank.
    #[serde(default)]
    bank_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddQuestionsResponse {
    success: bool,
    message: String,
    added: usize,
    bank_id: String,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness check.
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "The service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Question bank service is running".to_string(),
    })
}

/// List every category.
#[utoipa::path(
    get,
    path = "/api/categories",
    responses(
        (status = 200, description = "All categories", body = [CategoryResponse]),
        (status = 401, description = "Missing or invalid ID token", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn list_categories_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategoryResponse>>, ApiError> {
    let categories = state.allocator.list_categories().await?;
    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

/// List a category's banks with their questions.
#[utoipa::path(
    get,
    path = "/api/categories/{category_id}/banks",
    params(("category_id" = String, Path, description = "The category identifier.")),
    responses(
        (status = 200, description = "Banks in ascending order", body = BanksResponse),
        (status = 401, description = "Missing or invalid ID token", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody)
    )
)]
pub async fn list_banks_handler(
    State(state): State<Arc<AppState>>,
    Path(category_id): Path<String>,
) -> Result<Json<BanksResponse>, ApiError> {
    let listing = state.allocator.list_banks(&category_id).await?;
    Ok(Json(BanksResponse {
        kind: "banks".to_string(),
        count: listing.total_questions,
        banks: listing.banks.into_iter().map(Into::into).collect(),
    }))
}

/// How many questions the category needs next and where they will go.
#[utoipa::path(
    get,
    path = "/api/categories/{category_id}/bank-info",
    params(("category_id" = String, Path, description = "The category identifier.")),
    responses(
        (status = 200, description = "Current fill state", body = BankInfoResponse),
        (status = 401, description = "Missing or invalid ID token", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody)
    )
)]
pub async fn bank_info_handler(
    State(state): State<Arc<AppState>>,
    Path(category_id): Path<String>,
) -> Result<Json<BankInfoResponse>, ApiError> {
    let info = state.allocator.compute_bank_info(&category_id).await?;
    Ok(Json(info.into()))
}

/// Generate exactly as many questions as the target bank needs. Nothing is stored.
#[utoipa::path(
    post,
    path = "/api/categories/{category_id}/generate",
    params(("category_id" = String, Path, description = "The category identifier.")),
    responses(
        (status = 200, description = "Generated, unsaved questions", body = GenerateResponse),
        (status = 401, description = "Missing or invalid ID token", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
        (status = 409, description = "The category cannot take more questions", body = ErrorBody),
        (status = 500, description = "Every model variant failed", body = ErrorBody),
        (status = 504, description = "The generation service timed out", body = ErrorBody)
    )
)]
pub async fn generate_questions_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(category_id): Path<String>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let info = state.allocator.compute_bank_info(&category_id).await?;
    if !info.can_generate {
        return Err(PortError::CapacityExceeded(
            "Cannot generate more questions. Maximum limit reached for this category.".to_string(),
        )
        .into());
    }

    let category = state.allocator.get_category(&category_id).await?;
    let (title, subtitle) = match &category {
        Some(c) => (c.title.as_str(), c.subtitle.as_deref()),
        None => (category_id.as_str(), None),
    };

    info!(
        uid = %principal.uid,
        category = %category_id,
        needed = info.needed,
        target = %info.target_bank,
        "Generating questions"
    );
    let drafts = state.generator.generate(title, subtitle, info.needed).await?;

    Ok(Json(GenerateResponse {
        success: true,
        count: drafts.len(),
        questions: drafts.into_iter().map(Into::into).collect(),
        bank_info: GenerateBankInfo {
            target_bank: info.target_bank.to_string(),
            current_count: info.current_count,
            needed: info.needed,
        },
    }))
}

/// Validate and store questions in the category's target bank (or `bankId`).
#[utoipa::path(
    post,
    path = "/api/categories/{category_id}/questions",
    params(("category_id" = String, Path, description = "The category identifier.")),
    request_body = AddQuestionsRequest,
    responses(
        (status = 200, description = "Questions stored", body = AddQuestionsResponse),
        (status = 400, description = "Invalid questions or bank id", body = ErrorBody),
        (status = 401, description = "Missing or invalid ID token", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
        (status = 409, description = "The target bank is full", body = ErrorBody)
    )
)]
pub async fn add_questions_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(category_id): Path<String>,
    payload: Result<Json<AddQuestionsRequest>, JsonRejection>,
) -> Result<Json<AddQuestionsResponse>, ApiError> {
    let Json(request) = payload?;

    if request.questions.is_empty() {
        return Err(PortError::Validation("Questions array is required".to_string()).into());
    }
    let drafts = validate_batch(request.questions.into_iter().map(Into::into).collect())
        .map_err(PortError::Validation)?;
    let target = request
        .bank_id
        .as_deref()
        .map(str::parse::<BankId>)
        .transpose()
        .map_err(|e| PortError::Validation(e.to_string()))?;

    let outcome = state
        .allocator
        .persist_questions(&category_id, drafts, target)
        .await?;

    info!(
        uid = %principal.uid,
        category = %category_id,
        bank = %outcome.bank_id,
        added = outcome.added,
        "Stored questions"
    );
    Ok(Json(AddQuestionsResponse {
        success: true,
        message: format!(
            "Successfully added {} question(s) to {}",
            outcome.added, outcome.bank_id
        ),
        added: outcome.added,
        bank_id: outcome.bank_id.to_string(),
    }))
}
