pub mod admin;
pub mod allocator;
pub mod domain;
pub mod generation;
pub mod ports;
pub mod validation;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use admin::{AdminAllowList, AdminGate};
pub use allocator::BankAllocator;
pub use domain::{
    AdminGrant, Bank, BankId, BankInfo, BankListing, Category, CategoryKind, Difficulty,
    PersistOutcome, Principal, Question, QuestionDraft, VerifiedIdentity, QUESTIONS_PER_BANK,
};
pub use generation::QuestionGenerator;
pub use ports::{
    GenerationError, IdentityVerifier, PortError, PortResult, QuestionStore,
    TextGenerationService,
};
