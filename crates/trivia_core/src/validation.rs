//! crates/trivia_core/src/validation.rs
//!
//! Per-question invariants shared by model output parsing and the persist path.

use serde::Deserialize;
use std::collections::HashSet;

use crate::domain::{Difficulty, QuestionDraft};

pub const OPTIONS_PER_QUESTION: usize = 4;

/// A question as it arrives from an untrusted source: every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuestion {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub correct: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("must have exactly {OPTIONS_PER_QUESTION} options, got {0}")]
    OptionCount(usize),
    #[error("has duplicate option '{0}'")]
    DuplicateOption(String),
    #[error("correct answer must be one of the options")]
    CorrectNotInOptions,
    #[error("difficulty must be easy, medium, or hard (got '{0}')")]
    UnknownDifficulty(String),
}

fn required(value: Option<String>, field: &'static str) -> Result<String, DraftError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(DraftError::MissingField(field))
}

pub fn validate_draft(raw: RawQuestion) -> Result<QuestionDraft, DraftError> {
    let text = required(raw.text, "text")?;
    let options = raw
        .options
        .filter(|o| !o.is_empty())
        .ok_or(DraftError::MissingField("options"))?;
    let correct = required(raw.correct, "correct")?;
    let difficulty = required(raw.difficulty, "difficulty")?;

    if options.len() != OPTIONS_PER_QUESTION {
        return Err(DraftError::OptionCount(options.len()));
    }
    let mut seen = HashSet::with_capacity(OPTIONS_PER_QUESTION);
    for option in &options {
        if !seen.insert(option.as_str()) {
            return Err(DraftError::DuplicateOption(option.clone()));
        }
    }
    if !options.contains(&correct) {
        return Err(DraftError::CorrectNotInOptions);
    }
    let difficulty = difficulty
        .parse::<Difficulty>()
        .map_err(DraftError::UnknownDifficulty)?;

    Ok(QuestionDraft {
        text,
        options,
        correct,
        difficulty,
    })
}

/// Validates a whole batch, reporting the first failure with its 1-based position.
pub fn validate_batch(raw: Vec<RawQuestion>) -> Result<Vec<QuestionDraft>, String> {
    raw.into_iter()
        .enumerate()
        .map(|(idx, q)| validate_draft(q).map_err(|e| format!("Question {} {}", idx + 1, e)))
        .collect()
}
