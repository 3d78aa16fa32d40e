//! services/api/src/adapters/rtdb.rs
//!
//! This module contains the realtime database adapter, which is the concrete
//! implementation of the `QuestionStore` port from the `core` crate. It talks to
//! the Firebase Realtime Database REST API (`<path>.json`).
//!
//! Layout:
//! - `categories/<categoryId>` holds a category record
//! - `questions/<categoryId>/bank<N>` holds `{bankId, order, questions, createdAt, updatedAt}`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;
use trivia_core::domain::{Bank, BankId, Category, Difficulty, Question};
use trivia_core::ports::{PortError, PortResult, QuestionStore};

use crate::adapters::google_oauth::TokenTimeout;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A realtime database adapter that implements the `QuestionStore` port.
#[derive(Clone)]
pub struct RealtimeDbStore {
    client: ClientWithMiddleware,
    base_url: Url,
}

impl RealtimeDbStore {
    /// Creates a new `RealtimeDbStore` rooted at `base_url`
    /// (e.g. `https://<project>-default-rtdb.firebaseio.com`).
    pub fn new(client: ClientWithMiddleware, base_url: &str) -> PortResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PortError::Unexpected(format!("invalid database URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PortError::Unexpected(format!(
                "database URL '{base_url}' cannot hold paths"
            )));
        }
        Ok(Self { client, base_url })
    }

    /// Builds `<base>/<segments...>.json`, escaping each segment.
    fn url_for(&self, segments: &[&str]) -> PortResult<Url> {
        for segment in segments {
            validate_key(segment)?;
        }
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| PortError::Unexpected("empty database path".to_string()))?;

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PortError::Unexpected("database URL cannot hold paths".to_string()))?
            .pop_if_empty()
            .extend(parents)
            .push(&format!("{last}.json"));
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> PortResult<Value> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        if !response.status().is_success() {
            return Err(PortError::Store(error_message(response).await));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| PortError::Store(format!("invalid JSON from {}: {e}", url.path())))
    }

    async fn put_json(&self, url: Url, body: &Value) -> PortResult<()> {
        let response = self
            .client
            .put(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        if !response.status().is_success() {
            return Err(PortError::Store(error_message(response).await));
        }
        Ok(())
    }
}

/// Realtime database keys may not contain `. $ # [ ] /` or be empty.
fn validate_key(key: &str) -> PortResult<()> {
    if key.is_empty() || key.contains(['.', '$', '#', '[', ']', '/']) || key.chars().any(char::is_control) {
        return Err(PortError::Validation(format!("'{key}' is not a valid database key")));
    }
    Ok(())
}

fn request_error(url: &Url, err: reqwest_middleware::Error) -> PortError {
    match err {
        reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => {
            PortError::Timeout(format!("database request to {}", url.path()))
        }
        reqwest_middleware::Error::Middleware(e) if e.downcast_ref::<TokenTimeout>().is_some() => {
            PortError::Timeout(format!("authorizing database request to {}", url.path()))
        }
        other => PortError::Store(format!("database request to {} failed: {other}", url.path())),
    }
}

async fn error_message(response: reqwest::Response) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }

    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => format!("{} (status {})", body.error, status),
        Err(_) => format!("database request failed: {}", status),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(Deserialize)]
struct CategoryRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    emoji: Option<String>,
}
impl CategoryRecord {
    fn to_domain(self, key: &str) -> Category {
        let id = self.id.unwrap_or_else(|| key.to_string());
        Category {
            title: self.title.unwrap_or_else(|| id.clone()),
            id,
            subtitle: self.subtitle.filter(|s| !s.is_empty()),
            emoji: self.emoji,
        }
    }
}

fn category_from_value(key: &str, value: Value) -> Option<Category> {
    match serde_json::from_value::<CategoryRecord>(value) {
        Ok(record) => Some(record.to_domain(key)),
        Err(e) => {
            warn!(category = key, error = %e, "Skipping malformed category record");
            None
        }
    }
}

/// Every field is loose so that a bank written by another tool never fails to load.
#[derive(Deserialize, Default)]
struct BankRecord {
    #[serde(default)]
    questions: Option<Value>,
    #[serde(default, rename = "createdAt")]
    created_at: Option<Value>,
    #[serde(default, rename = "updatedAt")]
    updated_at: Option<Value>,
}
impl BankRecord {
    fn to_domain(self, id: BankId, category_id: &str) -> Bank {
        Bank {
            id,
            questions: question_entries(self.questions)
                .into_iter()
                .map(|entry| question_from_value(entry, category_id))
                .collect(),
            created_at: self.created_at.as_ref().and_then(timestamp_from_value),
            updated_at: self.updated_at.as_ref().and_then(timestamp_from_value),
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
struct QuestionRecord {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    correct: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    category: Option<String>,
}
impl QuestionRecord {
    fn to_domain(self, category_id: &str) -> Question {
        let difficulty = match self.difficulty.as_deref().map(str::parse::<Difficulty>) {
            Some(Ok(d)) => d,
            other => {
                warn!(
                    category = category_id,
                    question = ?self.id,
                    stored = ?other.and_then(Result::err),
                    "Stored question has no recognised difficulty, reporting it as medium"
                );
                Difficulty::default()
            }
        };
        Question {
            id: self.id.unwrap_or(0),
            category_id: self.category.unwrap_or_else(|| category_id.to_string()),
            text: self.text.unwrap_or_default(),
            options: self.options.unwrap_or_default(),
            correct: self.correct.unwrap_or_default(),
            difficulty,
        }
    }
}
impl From<&Question> for QuestionRecord {
    fn from(q: &Question) -> Self {
        Self {
            id: Some(q.id),
            text: Some(q.text.clone()),
            options: Some(q.options.clone()),
            correct: Some(q.correct.clone()),
            difficulty: Some(q.difficulty.as_str().to_string()),
            category: Some(q.category_id.clone()),
        }
    }
}

fn question_from_value(value: Value, category_id: &str) -> Question {
    let id = value.get("id").and_then(Value::as_u64);
    let record = serde_json::from_value::<QuestionRecord>(value).unwrap_or_else(|e| {
        warn!(category = category_id, question = ?id, error = %e, "Malformed stored question");
        QuestionRecord {
            id,
            ..QuestionRecord::default()
        }
    });
    record.to_domain(category_id)
}

/// Flattens a stored `questions` value into its entries, in order.
///
/// The realtime database turns sparse arrays into objects keyed by index and
/// drops `null` slots, so both shapes are accepted.
fn question_entries(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.into_iter().filter(|v| !v.is_null()).collect(),
        Some(Value::Object(map)) => {
            let mut entries: Vec<(Option<u64>, Value)> = map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.parse::<u64>().ok(), v))
                .collect();
            // Numeric keys in order, anything else after them.
            entries.sort_by_key(|(index, _)| index.unwrap_or(u64::MAX));
            entries.into_iter().map(|(_, v)| v).collect()
        }
        _ => Vec::new(),
    }
}

fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    value.as_i64().and_then(DateTime::from_timestamp_millis)
}

//=========================================================================================
// `QuestionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl QuestionStore for RealtimeDbStore {
    async fn list_categories(&self) -> PortResult<Vec<Category>> {
        let url = self.url_for(&["categories"])?;
        let Value::Object(map) = self.get_json(url).await? else {
            return Ok(Vec::new());
        };
        let mut categories: Vec<Category> = map
            .into_iter()
            .filter_map(|(key, value)| category_from_value(&key, value))
            .collect();
        categories.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(categories)
    }

    async fn get_category(&self, category_id: &str) -> PortResult<Option<Category>> {
        let url = self.url_for(&["categories", category_id])?;
        match self.get_json(url).await? {
            Value::Null => Ok(None),
            value => Ok(category_from_value(category_id, value)),
        }
    }

    async fn load_banks(&self, category_id: &str) -> PortResult<Vec<Bank>> {
        let url = self.url_for(&["questions", category_id])?;
        let Value::Object(entries) = self.get_json(url).await? else {
            return Ok(Vec::new());
        };

        let banks = entries
            .into_iter()
            .filter_map(|(key, value)| {
                let id = key.parse::<BankId>().ok()?;
                let record = match value {
                    Value::Object(_) => serde_json::from_value::<BankRecord>(value).unwrap_or_default(),
                    // A bank that is not a record at all is treated as empty.
                    _ => BankRecord::default(),
                };
                Some(record.to_domain(id, category_id))
            })
            .collect();
        Ok(banks)
    }

    async fn append_questions(
        &self,
        category_id: &str,
        bank_id: BankId,
        questions: &[Question],
        now: DateTime<Utc>,
    ) -> PortResult<()> {
        let bank_key = bank_id.to_string();
        let url = self.url_for(&["questions", category_id, &bank_key])?;

        let mut record = match self.get_json(url.clone()).await? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        // Existing entries are carried over untouched so fields this service
        // does not model survive the rewrite.
        let mut entries = question_entries(record.remove("questions"));
        for question in questions {
            let value = serde_json::to_value(QuestionRecord::from(question))
                .map_err(|e| PortError::Unexpected(format!("failed to encode question: {e}")))?;
            entries.push(value);
        }

        let now_ms = now.timestamp_millis();
        record.insert("questions".to_string(), Value::Array(entries));
        record.entry("bankId").or_insert_with(|| json!(bank_key));
        record.entry("order").or_insert_with(|| json!(bank_id.number()));
        record.entry("createdAt").or_insert_with(|| json!(now_ms));
        record.insert("updatedAt".to_string(), json!(now_ms));

        self.put_json(url, &Value::Object(record)).await
    }
}
