mod openai_compatible;
mod registry;

pub use openai_compatible::{LocalEchoProvider, OpenAiCompatibleProvider};
pub use registry::{ProviderHealth, ProviderRegistry};

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersConfig {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    pub default_provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub id: String,
    pub display_name: String,
    pub default_model: String,
}

/// Errors are classified so the orchestrator and the server's error taxonomy
/// can distinguish "try again" from "this call can never succeed" without
/// string-matching provider error bodies.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider rejected credentials")]
    Auth,
    #[error("provider rate limited the request")]
    RateLimited,
    #[error("provider returned a server error: {0}")]
    Upstream5xx(String),
    #[error("network error reaching provider: {0}")]
    Network(String),
    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Transport/upstream failures are worth a single retry by the
    /// orchestrator; auth and rate-limit failures are not — retrying
    /// immediately just repeats the same rejection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_) | ProviderError::Upstream5xx(_) | ProviderError::Network(_)
        )
    }
}

fn classify_reqwest_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        return ProviderError::Timeout(Duration::from_secs(0));
    }
    if err.is_connect() {
        return ProviderError::Network(err.to_string());
    }
    if let Some(status) = err.status() {
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return ProviderError::Auth;
        }
        if status.as_u16() == 429 {
            return ProviderError::RateLimited;
        }
        if status.is_server_error() {
            return ProviderError::Upstream5xx(status.to_string());
        }
    }
    ProviderError::Other(err.to_string())
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn info(&self) -> ProviderInfo;

    /// Completes a single prompt within `deadline`. Implementations are
    /// expected to honor the deadline internally (e.g. via the HTTP
    /// client's request timeout) rather than relying on the caller to
    /// race the future.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model_override: Option<&str>,
        deadline: Duration,
    ) -> Result<String, ProviderError>;

    /// Cheap liveness probe, cached by the registry for 30s (spec §4.4).
    async fn health(&self) -> Result<(), ProviderError>;
}
