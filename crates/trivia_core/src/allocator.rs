//! crates/trivia_core/src/allocator.rs
//!
//! The bank allocation policy. Decides how many questions a category still
//! needs and which bank receives them, then appends newly generated questions
//! with category-wide sequential IDs.
//!
//! Persisting is a read-then-write against the store. A per-category lock
//! serializes persists inside this process so two admins cannot overfill a
//! bank or hand out the same ID twice.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::{
    Bank, BankId, BankInfo, BankListing, Category, CategoryKind, PersistOutcome, Question,
    QuestionDraft, QUESTIONS_PER_BANK,
};
use crate::ports::{PortError, PortResult, QuestionStore};

/// Computes bank info from a category's banks. `banks` may be in any order.
pub fn bank_info_for(kind: CategoryKind, banks: &[Bank]) -> PortResult<BankInfo> {
    let info = match kind {
        CategoryKind::DailyQuiz => {
            let count = banks
                .iter()
                .find(|b| b.id == BankId::FIRST)
                .map_or(0, Bank::len);
            let needed = QUESTIONS_PER_BANK.saturating_sub(count);
            BankInfo {
                current_bank: (count > 0).then_some(BankId::FIRST),
                current_count: count,
                needed,
                can_generate: needed > 0,
                target_bank: BankId::FIRST,
            }
        }
        CategoryKind::Standard => match banks.iter().max_by_key(|b| b.id) {
            None => BankInfo {
                current_bank: None,
                current_count: 0,
                needed: QUESTIONS_PER_BANK,
                can_generate: true,
                target_bank: BankId::FIRST,
            },
            Some(last) if last.is_full() => BankInfo {
                current_bank: Some(last.id),
                current_count: last.len(),
                needed: QUESTIONS_PER_BANK,
                can_generate: true,
                target_bank: last.id.next().ok_or_else(|| {
                    PortError::Store(format!("{} is full and no later bank number exists", last.id))
                })?,
            },
            Some(last) => BankInfo {
                current_bank: Some(last.id),
                current_count: last.len(),
                needed: last.remaining_capacity(),
                can_generate: true,
                target_bank: last.id,
            },
        },
    };
    Ok(info)
}

fn max_question_id(banks: &[Bank]) -> u64 {
    banks.iter().filter_map(Bank::max_question_id).max().unwrap_or(0)
}

/// Checks that a caller-chosen target bank keeps the category's banks gapless.
fn resolve_target(
    kind: CategoryKind,
    requested: Option<BankId>,
    banks: &[Bank],
    info: &BankInfo,
) -> PortResult<BankId> {
    let Some(requested) = requested else {
        return Ok(info.target_bank);
    };

    match kind {
        CategoryKind::DailyQuiz if requested != BankId::FIRST => Err(PortError::Validation(
            format!("Daily quiz only has bank1, cannot write to {requested}"),
        )),
        CategoryKind::DailyQuiz => Ok(requested),
        CategoryKind::Standard => {
            let last = banks.iter().map(|b| b.id.number()).max().unwrap_or(0);
            if u64::from(requested.number()) > u64::from(last) + 1 {
                Err(PortError::Validation(format!(
                    "{requested} would leave a gap after bank{last}"
                )))
            } else {
                Ok(requested)
            }
        }
    }
}

pub struct BankAllocator {
    store: Arc<dyn QuestionStore>,
    category_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BankAllocator {
    pub fn new(store: Arc<dyn QuestionStore>) -> Self {
        Self {
            store,
            category_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn list_categories(&self) -> PortResult<Vec<Category>> {
        self.store.list_categories().await
    }

    pub async fn get_category(&self, category_id: &str) -> PortResult<Option<Category>> {
        self.store.get_category(category_id).await
    }

    pub async fn list_banks(&self, category_id: &str) -> PortResult<BankListing> {
        let mut banks = self.store.load_banks(category_id).await?;
        banks.sort_by_key(|b| b.id);
        let total_questions = banks.iter().map(Bank::len).sum();
        Ok(BankListing {
            banks,
            total_questions,
        })
    }

    pub async fn compute_bank_info(&self, category_id: &str) -> PortResult<BankInfo> {
        let banks = self.store.load_banks(category_id).await?;
        bank_info_for(CategoryKind::for_category(category_id), &banks)
    }

    /// Appends validated drafts to the category, clamping to the target bank's free space.
    pub async fn persist_questions(
        &self,
        category_id: &str,
        drafts: Vec<QuestionDraft>,
        target: Option<BankId>,
    ) -> PortResult<PersistOutcome> {
        if drafts.is_empty() {
            return Err(PortError::Validation("Questions array is required".to_string()));
        }

        let lock = self.lock_for(category_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.persist_locked(category_id, drafts, target).await
        };
        self.release_lock(category_id, lock).await;
        outcome
    }

    async fn persist_locked(
        &self,
        category_id: &str,
        drafts: Vec<QuestionDraft>,
        target: Option<BankId>,
    ) -> PortResult<PersistOutcome> {
        let kind = CategoryKind::for_category(category_id);
        let banks = self.store.load_banks(category_id).await?;
        let info = bank_info_for(kind, &banks)?;
        let bank_id = resolve_target(kind, target, &banks, &info)?;

        let remaining = banks
            .iter()
            .find(|b| b.id == bank_id)
            .map_or(QUESTIONS_PER_BANK, Bank::remaining_capacity);
        if remaining == 0 {
            return Err(PortError::CapacityExceeded(format!(
                "{bank_id} of '{category_id}' is full. Maximum {QUESTIONS_PER_BANK} questions allowed."
            )));
        }

        let mut drafts = drafts;
        if drafts.len() > remaining {
            warn!(
                category = category_id,
                bank = %bank_id,
                offered = drafts.len(),
                accepted = remaining,
                "Dropping questions beyond bank capacity"
            );
            drafts.truncate(remaining);
        }

        let max_id = max_question_id(&banks);
        let (first_id, last_id) = max_id
            .checked_add(1)
            .zip(max_id.checked_add(drafts.len() as u64))
            .ok_or_else(|| {
                PortError::Store(format!(
                    "question ids in '{category_id}' are exhausted (highest stored id {max_id})"
                ))
            })?;
        let questions: Vec<Question> = drafts
            .into_iter()
            .zip(first_id..=last_id)
            .map(|(draft, id)| Question::from_draft(draft, id, category_id))
            .collect();

        self.store
            .append_questions(category_id, bank_id, &questions, Utc::now())
            .await?;

        info!(
            category = category_id,
            bank = %bank_id,
            added = questions.len(),
            first_id,
            "Persisted questions"
        );
        Ok(PersistOutcome {
            added: questions.len(),
            bank_id,
        })
    }

    async fn lock_for(&self, category_id: &str) -> Arc<Mutex<()>> {
        self.category_locks
            .lock()
            .await
            .entry(category_id.to_string())
            .or_default()
            .clone()
    }

    /// Drops the category's lock entry once no other writer holds or waits on it.
    async fn release_lock(&self, category_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.category_locks.lock().await;
        drop(lock);
        if locks
            .get(category_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(category_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Difficulty;
    use crate::memory::InMemoryStore;

    fn bank(n: u32) -> BankId {
        BankId::new(n).unwrap()
    }

    fn drafts(n: usize) -> Vec<QuestionDraft> {
        (0..n)
            .map(|i| QuestionDraft {
                text: format!("New question {i}?"),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct: "c".into(),
                difficulty: Difficulty::Hard,
            })
            .collect()
    }

    fn allocator(store: &Arc<InMemoryStore>) -> BankAllocator {
        BankAllocator::new(store.clone())
    }

    #[tokio::test]
    async fn empty_category_targets_bank1() {
        let store = Arc::new(InMemoryStore::new());
        let info = allocator(&store).compute_bank_info("sports").await.unwrap();
        assert_eq!(
            info,
            BankInfo {
                current_bank: None,
                current_count: 0,
                needed: 10,
                can_generate: true,
                target_bank: BankId::FIRST,
            }
        );
    }

    #[tokio::test]
    async fn partial_last_bank_is_topped_up() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_bank("music", bank(1), 1, 10).await;
        store.seed_bank("music", bank(2), 11, 7).await;

        let info = allocator(&store).compute_bank_info("music").await.unwrap();

        assert_eq!(info.current_bank, Some(bank(2)));
        assert_eq!(info.current_count, 7);
        assert_eq!(info.needed, 3);
        assert_eq!(info.target_bank, bank(2));
        assert!(info.can_generate);
    }

    #[tokio::test]
    async fn full_bank_rolls_over_and_ids_continue() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_bank("history", bank(1), 1, 10).await;
        let alloc = allocator(&store);

        let info = alloc.compute_bank_info("history").await.unwrap();
        assert_eq!(info.target_bank, bank(2));
        assert_eq!(info.needed, 10);

        let outcome = alloc.persist_questions("history", drafts(10), None).await.unwrap();
        assert_eq!(outcome, PersistOutcome { added: 10, bank_id: bank(2) });

        let ids: Vec<u64> = store
            .bank("history", bank(2))
            .await
            .unwrap()
            .questions
            .iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(ids, (11..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn ids_continue_from_category_max_not_target_bank() {
        let store = Arc::new(InMemoryStore::new());
        // bank2 holds the highest IDs, bank3 is partially filled with lower ones.
        store.seed_bank("art", bank(2), 40, 10).await;
        store.seed_bank("art", bank(3), 5, 4).await;

        let outcome = allocator(&store).persist_questions("art", drafts(2), None).await.unwrap();
        assert_eq!(outcome.bank_id, bank(3));

        let stored = store.bank("art", bank(3)).await.unwrap();
        let new_ids: Vec<u64> = stored.questions[4..].iter().map(|q| q.id).collect();
        assert_eq!(new_ids, vec![50, 51]);
        assert!(stored.questions[4..].iter().all(|q| q.category_id == "art"));
    }

    #[tokio::test]
    async fn standard_persist_clamps_to_remaining_capacity() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_bank("geo", bank(1), 1, 8).await;

        let outcome = allocator(&store).persist_questions("geo", drafts(5), None).await.unwrap();

        assert_eq!(outcome.added, 2);
        assert_eq!(store.bank("geo", bank(1)).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn explicit_full_bank_is_capacity_exceeded() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_bank("geo", bank(1), 1, 10).await;

        let err = allocator(&store)
            .persist_questions("geo", drafts(1), Some(bank(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::CapacityExceeded(_)));
    }

    #[tokio::test]
    async fn explicit_target_cannot_open_a_gap() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_bank("geo", bank(1), 1, 10).await;
        let alloc = allocator(&store);

        let err = alloc.persist_questions("geo", drafts(1), Some(bank(3))).await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));

        let ok = alloc.persist_questions("geo", drafts(1), Some(bank(2))).await.unwrap();
        assert_eq!(ok.bank_id, bank(2));
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_touching_the_store() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_writes(true);
        let err = allocator(&store).persist_questions("geo", vec![], None).await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[tokio::test]
    async fn store_failures_surface_as_store_errors() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_writes(true);
        let err = allocator(&store).persist_questions("geo", drafts(1), None).await.unwrap_err();
        assert!(matches!(err, PortError::Store(_)));
    }

    #[tokio::test]
    async fn daily_quiz_never_leaves_bank1() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_bank("daily-quiz", bank(1), 1, 6).await;
        let alloc = allocator(&store);

        let info = alloc.compute_bank_info("daily-quiz").await.unwrap();
        assert_eq!(info.target_bank, BankId::FIRST);
        assert_eq!(info.needed, 4);

        let outcome = alloc.persist_questions("daily-quiz", drafts(9), None).await.unwrap();
        assert_eq!(outcome, PersistOutcome { added: 4, bank_id: BankId::FIRST });

        let info = alloc.compute_bank_info("daily-quiz").await.unwrap();
        assert_eq!(info.current_count, 10);
        assert_eq!(info.needed, 0);
        assert!(!info.can_generate);
        assert_eq!(info.target_bank, BankId::FIRST);
        assert!(store.bank("daily-quiz", bank(2)).await.is_none());
    }

    #[tokio::test]
    async fn full_daily_quiz_rejects_any_persist() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_bank("daily-quiz", bank(1), 1, 10).await;

        let err = allocator(&store)
            .persist_questions("daily-quiz", drafts(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::CapacityExceeded(_)));
    }

    #[tokio::test]
    async fn daily_quiz_rejects_other_banks() {
        let store = Arc::new(InMemoryStore::new());
        let err = allocator(&store)
            .persist_questions("daily-quiz", drafts(1), Some(bank(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[test]
    fn daily_quiz_ignores_stray_banks() {
        let stray = Bank {
            id: bank(2),
            questions: vec![],
            created_at: None,
            updated_at: None,
        };
        let info = bank_info_for(CategoryKind::DailyQuiz, &[stray]).unwrap();
        assert_eq!(info.current_bank, None);
        assert_eq!(info.needed, 10);
    }

    #[tokio::test]
    async fn last_bank_number_cannot_roll_over() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_bank("trivia", bank(u32::MAX), 1, 10).await;
        let alloc = allocator(&store);

        let err = alloc.compute_bank_info("trivia").await.unwrap_err();
        assert!(matches!(err, PortError::Store(_)));
        let err = alloc.persist_questions("trivia", drafts(1), None).await.unwrap_err();
        assert!(matches!(err, PortError::Store(_)));
    }

    #[tokio::test]
    async fn exhausted_question_ids_are_a_store_error() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_bank("trivia", bank(1), u64::MAX, 1).await;

        let err = allocator(&store)
            .persist_questions("trivia", drafts(1), None)
            .await
            .unwrap_err();

        assert!(matches!(err, PortError::Store(_)));
        assert_eq!(store.bank("trivia", bank(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn highest_id_can_still_be_assigned() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_bank("trivia", bank(1), u64::MAX - 2, 1).await;

        let outcome = allocator(&store)
            .persist_questions("trivia", drafts(2), None)
            .await
            .unwrap();

        assert_eq!(outcome.added, 2);
        let ids: Vec<u64> = store
            .bank("trivia", bank(1))
            .await
            .unwrap()
            .questions
            .iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(ids, vec![u64::MAX - 2, u64::MAX - 1, u64::MAX]);
    }

    #[tokio::test]
    async fn concurrent_persists_do_not_overfill_or_share_ids() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_bank("science", bank(1), 1, 7).await;
        let alloc = Arc::new(allocator(&store));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let alloc = alloc.clone();
                tokio::spawn(async move { alloc.persist_questions("science", drafts(3), None).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let listing = alloc.list_banks("science").await.unwrap();
        assert!(listing.banks.iter().all(|b| b.len() <= QUESTIONS_PER_BANK));
        let mut ids: Vec<u64> = listing
            .banks
            .iter()
            .flat_map(|b| b.questions.iter().map(|q| q.id))
            .collect();
        let total = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert_eq!(ids, (1..=19).collect::<Vec<_>>());
        assert_eq!(listing.total_questions, 19);
        assert!(alloc.category_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn finished_writers_leave_no_category_locks() {
        let store = Arc::new(InMemoryStore::new());
        let alloc = allocator(&store);

        alloc.persist_questions("geo", drafts(2), None).await.unwrap();
        store.fail_writes(true);
        for category in ["no-such-1", "no-such-2", "geo"] {
            alloc.persist_questions(category, drafts(1), None).await.unwrap_err();
        }

        assert!(alloc.category_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn list_banks_sorts_and_counts() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_bank("film", bank(10), 30, 1).await;
        store.seed_bank("film", bank(2), 11, 10).await;
        store.seed_bank("film", bank(1), 1, 10).await;

        let listing = allocator(&store).list_banks("film").await.unwrap();

        let order: Vec<u32> = listing.banks.iter().map(|b| b.id.number()).collect();
        assert_eq!(order, vec![1, 2, 10]);
        assert_eq!(listing.total_questions, 21);
    }
}
