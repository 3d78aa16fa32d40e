//! End-to-end tests of the HTTP surface against in-memory ports.

use api_lib::config::{Config, DEFAULT_GENERATION_API_BASE};
use api_lib::web::{self, state::AppState};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use trivia_core::domain::{BankId, VerifiedIdentity};
use trivia_core::memory::InMemoryStore;
use trivia_core::ports::{IdentityVerifier, PortError, PortResult, TextGenerationService};
use trivia_core::{AdminAllowList, AdminGate, BankAllocator, QuestionGenerator};

struct FakeVerifier;

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify_id_token(&self, token: &str) -> PortResult<VerifiedIdentity> {
        let email = match token {
            "admin-token" => "games@pitchtrivia.com",
            "player-token" => "player@example.com",
            _ => return Err(PortError::Unauthorized("invalid signature".to_string())),
        };
        Ok(VerifiedIdentity {
            uid: format!("uid-{token}"),
            email: Some(email.to_string()),
            admin_claim: false,
        })
    }
}

/// Answers with exactly as many questions as the prompt asks for.
#[derive(Default)]
struct CountingBackend {
    calls: AtomicUsize,
}

#[async_trait]
impl TextGenerationService for CountingBackend {
    async fn complete(&self, _model: &str, _system: &str, prompt: &str) -> PortResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let count: usize = prompt
            .split_whitespace()
            .nth(1)
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| PortError::Unexpected("prompt has no count".to_string()))?;
        let questions: Vec<Value> = (0..count)
            .map(|i| {
                json!({
                    "text": format!("Generated {i}?"),
                    "options": [format!("a{i}"), format!("b{i}"), format!("c{i}"), format!("d{i}")],
                    "correct": format!("c{i}"),
                    "difficulty": "easy"
                })
            })
            .collect();
        Ok(format!("```json\n{}\n```", Value::Array(questions)))
    }
}

struct Harness {
    app: Router,
    store: Arc<InMemoryStore>,
    backend: Arc<CountingBackend>,
}

fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        log_level: tracing::Level::INFO,
        firebase_project_id: "trivia-test".to_string(),
        firebase_client_email: "svc@trivia-test.iam.gserviceaccount.com".to_string(),
        firebase_private_key: String::new(),
        database_url: "http://localhost".to_string(),
        gemini_api_key: "test".to_string(),
        generation_api_base: DEFAULT_GENERATION_API_BASE.to_string(),
        generation_models: vec!["gemini-2.0-flash".to_string()],
        admin_emails: AdminAllowList::from_csv("games@pitchtrivia.com"),
        request_timeout: Duration::from_secs(5),
        cors_allowed_origin: "http://localhost:3000".to_string(),
    }
}

/// Never answers in time.
struct StalledBackend;

#[async_trait]
impl TextGenerationService for StalledBackend {
    async fn complete(&self, model: &str, _system: &str, _prompt: &str) -> PortResult<String> {
        Err(PortError::Timeout(format!("model {model} did not answer within 5s")))
    }
}

fn router_with(store: Arc<InMemoryStore>, backend: Arc<dyn TextGenerationService>) -> Router {
    let config = test_config();
    let state = Arc::new(AppState {
        allocator: Arc::new(BankAllocator::new(store)),
        generator: Arc::new(QuestionGenerator::new(backend, config.generation_models.clone())),
        gate: Arc::new(AdminGate::new(Arc::new(FakeVerifier), config.admin_emails.clone())),
    });
    web::router(state)
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let backend = Arc::new(CountingBackend::default());
    Harness {
        app: router_with(store.clone(), backend.clone()),
        store,
        backend,
    }
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn valid_question(i: usize) -> Value {
    json!({
        "text": format!("Question {i}?"),
        "options": ["one", "two", "three", "four"],
        "correct": "two",
        "difficulty": "hard"
    })
}

#[tokio::test]
async fn health_is_public() {
    let h = harness();
    let (status, body) = send(&h.app, Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_or_bad_token_is_401() {
    let h = harness();

    let (status, body) = send(&h.app, Method::GET, "/api/categories", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("No token provided"));

    let (status, _) = send(&h.app, Method::GET, "/api/categories", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_admin_cannot_trigger_generation() {
    let h = harness();
    let (status, body) = send(&h.app, Method::POST, "/api/categories/history/generate", Some("player-token"), None).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("Admin access required"));
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn lists_categories_for_admins() {
    let h = harness();
    h.store.insert_category("history", "History", Some("World events")).await;
    h.store.insert_category("sports", "Sports", None).await;

    let (status, body) = send(&h.app, Method::GET, "/api/categories", Some("admin-token"), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["id"], "history");
    assert_eq!(body[0]["subtitle"], "World events");
    assert!(body[1].get("subtitle").is_none());
}

#[tokio::test]
async fn bank_info_for_partial_bank() {
    let h = harness();
    h.store.seed_bank("history", BankId::FIRST, 1, 10).await;
    h.store.seed_bank("history", BankId::new(2).unwrap(), 11, 4).await;

    let (status, body) = send(&h.app, Method::GET, "/api/categories/history/bank-info", Some("admin-token"), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "type": "banks",
            "currentBank": "bank2",
            "currentCount": 4,
            "needed": 6,
            "canGenerate": true,
            "targetBank": "bank2"
        })
    );
}

#[tokio::test]
async fn generate_then_persist_fills_the_bank() {
    let h = harness();
    h.store.insert_category("history", "History", None).await;
    h.store.seed_bank("history", BankId::FIRST, 1, 7).await;

    let (status, generated) = send(&h.app, Method::POST, "/api/categories/history/generate", Some("admin-token"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(generated["count"], 3);
    assert_eq!(generated["bankInfo"]["targetBank"], "bank1");
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 1);

    let (status, stored) = send(
        &h.app,
        Method::POST,
        "/api/categories/history/questions",
        Some("admin-token"),
        Some(json!({"questions": generated["questions"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["added"], 3);
    assert_eq!(stored["bankId"], "bank1");
    assert_eq!(stored["message"], "Successfully added 3 question(s) to bank1");

    let bank = h.store.bank("history", BankId::FIRST).await.unwrap();
    let ids: Vec<u64> = bank.questions.iter().map(|q| q.id).collect();
    assert_eq!(ids, (1..=10).collect::<Vec<u64>>());

    let (_, listing) = send(&h.app, Method::GET, "/api/categories/history/banks", Some("admin-token"), None).await;
    assert_eq!(listing["type"], "banks");
    assert_eq!(listing["count"], 10);
    assert_eq!(listing["banks"][0]["bankId"], "bank1");
}

#[tokio::test]
async fn full_daily_quiz_refuses_generation() {
    let h = harness();
    h.store.seed_bank("daily-quiz", BankId::FIRST, 1, 10).await;

    let (status, body) = send(&h.app, Method::POST, "/api/categories/daily-quiz/generate", Some("admin-token"), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("Maximum limit reached"));
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_questions_are_rejected_before_storage() {
    let h = harness();
    let mut bad = valid_question(2);
    bad["correct"] = json!("five");

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/categories/history/questions",
        Some("admin-token"),
        Some(json!({"questions": [valid_question(1), bad]})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Question 2"));
    assert!(h.store.bank("history", BankId::FIRST).await.is_none());
}

#[tokio::test]
async fn empty_or_malformed_bodies_are_400() {
    let h = harness();

    let (status, _) = send(
        &h.app,
        Method::POST,
        "/api/categories/history/questions",
        Some("admin-token"),
        Some(json!({"questions": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &h.app,
        Method::POST,
        "/api/categories/history/questions",
        Some("admin-token"),
        Some(json!({"questions": [valid_question(1)], "bankId": "drawer7"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/categories/history/questions",
        Some("admin-token"),
        Some(json!({"questions": "not a list"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn explicit_full_bank_is_409() {
    let h = harness();
    h.store.seed_bank("history", BankId::FIRST, 1, 10).await;

    let (status, _) = send(
        &h.app,
        Method::POST,
        "/api/categories/history/questions",
        Some("admin-token"),
        Some(json!({"questions": [valid_question(1)], "bankId": "bank1"})),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn store_failure_is_500() {
    let h = harness();
    h.store.fail_writes(true);

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/categories/history/questions",
        Some("admin-token"),
        Some(json!({"questions": [valid_question(1)]})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn generation_timeout_is_504() {
    let app = router_with(Arc::new(InMemoryStore::new()), Arc::new(StalledBackend));

    let (status, body) = send(&app, Method::POST, "/api/categories/history/generate", Some("admin-token"), None).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body["error"].as_str().unwrap().contains("did not answer"));
}
