//! crates/trivia_core/src/generation.rs
//!
//! Turns a category into a validated batch of trivia questions by prompting a
//! text-generation backend. Model variants are tried in their configured order
//! and the first one that answers wins.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

use crate::domain::QuestionDraft;
use crate::ports::{GenerationError, PortError, PortResult, TextGenerationService};
use crate::validation::{validate_batch, RawQuestion};

pub const SYSTEM_INSTRUCTIONS: &str = "You are a trivia question generator. Always respond with valid JSON arrays only. Never include any text before or after the JSON array.";

const PROMPT_TEMPLATE: &str = r#"Generate {count} trivia questions for the "{title}" category{subtitle}.

Requirements:
1. Generate exactly {count} questions
2. Each question must have exactly 4 distinct options
3. One option must be the correct answer, copied verbatim into "correct"
4. Difficulty should vary: approximately 30% easy, 40% medium, 30% hard
5. Questions should be relevant to the "{title}" category
6. Make questions interesting, engaging, and educational
7. Ensure questions are factually accurate
8. Avoid overly obscure or niche questions unless appropriate for the category

Return the response as a JSON array with this exact format:
[
  {
    "text": "Question text here?",
    "options": ["Option A", "Option B", "Option C", "Option D"],
    "correct": "Option A",
    "difficulty": "easy"
  }
]

Only return the JSON array, no additional text or markdown formatting."#;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").expect("code fence pattern is valid")
});

/// Phrases in provider errors that mean retrying later or fixing billing is the only way out.
const QUOTA_MARKERS: &[&str] = &[
    "quota",
    "billing",
    "api key not valid",
    "resource_exhausted",
    "resource exhausted",
];

pub fn build_prompt(title: &str, subtitle: Option<&str>, count: usize) -> String {
    let subtitle = subtitle
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!(" ({s})"))
        .unwrap_or_default();
    PROMPT_TEMPLATE
        .replace("{count}", &count.to_string())
        .replace("{title}", title)
        .replace("{subtitle}", &subtitle)
}

/// Removes a Markdown code fence wrapped around the whole response, if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    CODE_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map_or(trimmed, |m| m.as_str())
}

/// Parses and validates a model response that should hold exactly `count` questions.
pub fn parse_questions(text: &str, count: usize) -> Result<Vec<QuestionDraft>, GenerationError> {
    let body = strip_code_fences(text);
    let raw: Vec<RawQuestion> = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedOutput(format!("response is not a JSON array of questions: {e}")))?;

    if raw.len() != count {
        return Err(GenerationError::MalformedOutput(format!(
            "Expected {count} questions, got {}",
            raw.len()
        )));
    }

    validate_batch(raw).map_err(GenerationError::MalformedOutput)
}

fn is_quota_error(err: &PortError) -> bool {
    let message = err.to_string().to_lowercase();
    QUOTA_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Generates question batches through an ordered list of model variants.
pub struct QuestionGenerator {
    backend: Arc<dyn TextGenerationService>,
    models: Vec<String>,
}

impl QuestionGenerator {
    pub fn new(backend: Arc<dyn TextGenerationService>, models: Vec<String>) -> Self {
        Self { backend, models }
    }

    pub async fn generate(
        &self,
        title: &str,
        subtitle: Option<&str>,
        count: usize,
    ) -> PortResult<Vec<QuestionDraft>> {
        if count == 0 {
            return Err(PortError::Validation(
                "Question count must be at least 1".to_string(),
            ));
        }
        if self.models.is_empty() {
            return Err(GenerationError::AllVariantsFailed("no model variants configured".to_string()).into());
        }

        let prompt = build_prompt(title, subtitle, count);
        let response = self.complete_with_fallback(&prompt).await?;
        let questions = parse_questions(&response, count)?;
        info!(category = title, count, "Generated question batch");
        Ok(questions)
    }

    async fn complete_with_fallback(&self, prompt: &str) -> PortResult<String> {
        let mut last_error = None;

        for model in &self.models {
            info!(model = %model, "Trying model variant");
            match self.backend.complete(model, SYSTEM_INSTRUCTIONS, prompt).await {
                Ok(text) => {
                    info!(model = %model, "Model variant succeeded");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Model variant failed");
                    last_error = Some(e);
                }
            }
        }

        let err = match last_error {
            // A backend that never answers in time is reported as such, not as a model failure.
            Some(PortError::Timeout(msg)) => return Err(PortError::Timeout(msg)),
            Some(e) if is_quota_error(&e) => GenerationError::QuotaExhausted(e.to_string()),
            Some(e) => GenerationError::AllVariantsFailed(e.to_string()),
            None => GenerationError::AllVariantsFailed("no model variant was attempted".to_string()),
        };
        Err(err.into())
    }
}
