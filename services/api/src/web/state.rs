//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;
use trivia_core::{AdminGate, BankAllocator, QuestionGenerator};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub allocator: Arc<BankAllocator>,
    pub generator: Arc<QuestionGenerator>,
    pub gate: Arc<AdminGate>,
}
