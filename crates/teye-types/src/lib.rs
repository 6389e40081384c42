pub mod auth;
pub mod envelope;
pub mod error;
pub mod eye;
pub mod pipeline_event;
pub mod session;

pub use auth::*;
pub use envelope::*;
pub use error::*;
pub use eye::*;
pub use pipeline_event::*;
pub use session::*;

pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
