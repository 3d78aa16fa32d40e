pub mod firebase_auth;
pub mod generation_llm;
pub mod google_oauth;
pub mod rtdb;

pub use firebase_auth::FirebaseTokenVerifier;
pub use generation_llm::OpenAiGenerationAdapter;
pub use google_oauth::AuthMiddleware;
pub use rtdb::RealtimeDbStore;
