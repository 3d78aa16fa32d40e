//! crates/trivia_core/src/domain.rs
//!
//! Defines the pure, core data structures for the question bank.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Maximum number of questions a single bank may hold.
pub const QUESTIONS_PER_BANK: usize = 10;

/// Category id that selects the single-bank daily quiz policy.
pub const DAILY_QUIZ_CATEGORY_ID: &str = "daily-quiz";

/// A topic questions are organized under. Managed outside this service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub emoji: Option<String>,
}

/// The allocation policy a category follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    /// Any number of banks, rolling over to `bank<N+1>` when the last is full.
    Standard,
    /// Exactly one bank (`bank1`) that never rolls over.
    DailyQuiz,
}

impl CategoryKind {
    pub fn for_category(category_id: &str) -> Self {
        if category_id == DAILY_QUIZ_CATEGORY_ID {
            CategoryKind::DailyQuiz
        } else {
            CategoryKind::Standard
        }
    }
}

/// 1-based bank number, rendered as `bank<N>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BankId(u32);

impl BankId {
    pub const FIRST: BankId = BankId(1);

    pub fn new(number: u32) -> Option<Self> {
        (number > 0).then_some(BankId(number))
    }

    pub fn number(self) -> u32 {
        self.0
    }

    /// `None` once the bank numbers are exhausted.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(BankId)
    }
}

impl fmt::Display for BankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bank{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a bank id (expected bank<N> with N >= 1)")]
pub struct InvalidBankId(pub String);

impl FromStr for BankId {
    type Err = InvalidBankId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("bank")
            .filter(|digits| {
                !digits.starts_with('0') && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
            })
            .and_then(|digits| digits.parse::<u32>().ok())
            .and_then(BankId::new)
            .ok_or_else(|| InvalidBankId(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(other.to_string()),
        }
    }
}

/// A validated question that has not been persisted yet.
///
/// Only `validation::validate_draft` builds these from untrusted input, so
/// holding one means the option and answer invariants hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDraft {
    pub text: String,
    pub options: Vec<String>,
    pub correct: String,
    pub difficulty: Difficulty,
}

/// A question stored in a bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: u64,
    pub category_id: String,
    pub text: String,
    pub options: Vec<String>,
    pub correct: String,
    pub difficulty: Difficulty,
}

impl Question {
    pub fn from_draft(draft: QuestionDraft, id: u64, category_id: &str) -> Self {
        Self {
            id,
            category_id: category_id.to_string(),
            text: draft.text,
            options: draft.options,
            correct: draft.correct,
            difficulty: draft.difficulty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bank {
    pub id: BankId,
    pub questions: Vec<Question>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Bank {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.questions.len() >= QUESTIONS_PER_BANK
    }

    pub fn remaining_capacity(&self) -> usize {
        QUESTIONS_PER_BANK.saturating_sub(self.questions.len())
    }

    pub fn max_question_id(&self) -> Option<u64> {
        self.questions.iter().map(|q| q.id).max()
    }
}

/// Where the next batch of questions for a category should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankInfo {
    pub current_bank: Option<BankId>,
    pub current_count: usize,
    pub needed: usize,
    pub can_generate: bool,
    pub target_bank: BankId,
}

/// All banks of a category, sorted by number.
#[derive(Debug, Clone)]
pub struct BankListing {
    pub banks: Vec<Bank>,
    pub total_questions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    pub added: usize,
    pub bank_id: BankId,
}

/// What the identity service vouches for after verifying a token.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: Option<String>,
    pub admin_claim: bool,
}

/// How a principal earned admin rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminGrant {
    AllowList,
    Claim,
}

/// An authorized administrator, placed in request extensions by the gate.
#[derive(Debug, Clone)]
pub struct Principal {
    pub uid: String,
    pub email: Option<String>,
    pub grant: AdminGrant,
}
