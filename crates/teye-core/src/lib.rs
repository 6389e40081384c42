pub mod cancellation;
pub mod config;
pub mod pipeline_bus;
pub mod quota;
pub mod session_store;
pub mod storage;

pub use cancellation::CancellationRegistry;
pub use config::ConfigStore;
pub use pipeline_bus::PipelineBus;
pub use quota::{QuotaDecision, QuotaManager};
pub use session_store::{SessionStore, DEFAULT_SESSION_TTL_MS};
pub use storage::Storage;
