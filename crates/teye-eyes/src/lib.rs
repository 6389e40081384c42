mod builtin;
mod registry;

pub use builtin::{AmbiguityDetectorEye, DefaultClarityEye, RoutingEye};
pub use registry::{EyeHealth, EyeRegistry};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use teye_types::{EyeDescriptor, EyeResult, WorkEnvelope};

/// Errors an Eye invocation can fail with, classified the same way provider
/// calls are (spec §4.3) so the orchestrator's retry-once policy applies
/// uniformly regardless of whether the failure came from a provider call or
/// an Eye's own logic.
#[derive(Debug, Error, Clone)]
pub enum EyeError {
    #[error("eye `{0}` timed out")]
    Timeout(String),
    #[error("eye `{0}` was cancelled")]
    Cancelled(String),
    #[error("eye `{0}` failed: {1}")]
    Failed(String, String),
}

impl EyeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EyeError::Timeout(_))
    }
}

#[async_trait]
pub trait Eye: Send + Sync {
    fn describe(&self) -> EyeDescriptor;

    async fn invoke(
        &self,
        envelope: &WorkEnvelope,
        cancel: CancellationToken,
    ) -> Result<EyeResult, EyeError>;

    /// Cheap liveness probe, cached by the registry for 30s. The default
    /// impl reports healthy unconditionally — Eyes with no external
    /// dependency (most built-ins) never need to override this.
    async fn health(&self) -> Result<(), EyeError> {
        Ok(())
    }
}
