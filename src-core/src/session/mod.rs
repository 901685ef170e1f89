mod cache;
mod manager;

pub use cache::{CachedToken, KeychainTokenCache, MemoryTokenCache, TokenCache};
pub use manager::{AuthOutcome, Session, SessionManager};
