//! crates/trivia_core/src/memory.rs
//!
//! An in-memory `QuestionStore` used by tests in this workspace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::domain::{Bank, BankId, Category, Difficulty, Question};
use crate::ports::{PortError, PortResult, QuestionStore};

#[derive(Default)]
pub struct InMemoryStore {
    categories: Mutex<BTreeMap<String, Category>>,
    banks: Mutex<HashMap<String, BTreeMap<BankId, Bank>>>,
    fail_writes: std::sync::atomic::AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_category(&self, id: &str, title: &str, subtitle: Option<&str>) {
        self.categories.lock().await.insert(
            id.to_string(),
            Category {
                id: id.to_string(),
                title: title.to_string(),
                subtitle: subtitle.map(str::to_string),
                emoji: None,
            },
        );
    }

    /// Seeds a bank with `count` questions numbered from `first_id`.
    pub async fn seed_bank(&self, category_id: &str, bank: BankId, first_id: u64, count: usize) {
        let questions = (0..count as u64)
            .map(|i| sample_question(category_id, first_id + i))
            .collect();
        self.banks.lock().await.entry(category_id.to_string()).or_default().insert(
            bank,
            Bank {
                id: bank,
                questions,
                created_at: Some(Utc::now()),
                updated_at: None,
            },
        );
    }

    pub async fn bank(&self, category_id: &str, bank: BankId) -> Option<Bank> {
        self.banks
            .lock()
            .await
            .get(category_id)
            .and_then(|banks| banks.get(&bank))
            .cloned()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

pub fn sample_question(category_id: &str, id: u64) -> Question {
    Question {
        id,
        category_id: category_id.to_string(),
        text: format!("Seeded question {id}?"),
        options: ["w", "x", "y", "z"].iter().map(|o| format!("{o}{id}")).collect(),
        correct: format!("x{id}"),
        difficulty: Difficulty::Easy,
    }
}

#[async_trait]
impl QuestionStore for InMemoryStore {
    async fn list_categories(&self) -> PortResult<Vec<Category>> {
        Ok(self.categories.lock().await.values().cloned().collect())
    }

    async fn get_category(&self, category_id: &str) -> PortResult<Option<Category>> {
        Ok(self.categories.lock().await.get(category_id).cloned())
    }

    async fn load_banks(&self, category_id: &str) -> PortResult<Vec<Bank>> {
        // Reverse order so callers cannot rely on storage ordering.
        Ok(self
            .banks
            .lock()
            .await
            .get(category_id)
            .map(|banks| banks.values().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn append_questions(
        &self,
        category_id: &str,
        bank_id: BankId,
        questions: &[Question],
        now: DateTime<Utc>,
    ) -> PortResult<()> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(PortError::Store("write rejected".to_string()));
        }
        let mut banks = self.banks.lock().await;
        let bank = banks
            .entry(category_id.to_string())
            .or_default()
            .entry(bank_id)
            .or_insert_with(|| Bank {
                id: bank_id,
                questions: Vec::new(),
                created_at: Some(now),
                updated_at: None,
            });
        bank.questions.extend_from_slice(questions);
        bank.updated_at = Some(now);
        Ok(())
    }
}
