pub mod admin_session;
pub mod api_key;
pub mod csrf;

pub use admin_session::AdminSessionManager;
pub use api_key::{hash_secret, verify_secret, ApiKeySummary};
pub use csrf::CsrfGuard;
