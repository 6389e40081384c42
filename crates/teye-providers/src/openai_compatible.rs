use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::{classify_reqwest_error, ChatMessage, Provider, ProviderError, ProviderInfo};

/// Talks to any OpenAI-chat-completions-compatible endpoint — this covers
/// most self-hosted and third-party model providers without needing a
/// bespoke client per vendor, the same trick the teacher uses for its much
/// larger vendor list.
pub struct OpenAiCompatibleProvider {
    id: String,
    display_name: String,
    base_url: String,
    default_model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            base_url: base_url.into(),
            default_model: default_model.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            default_model: self.default_model.clone(),
        }
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        model_override: Option<&str>,
        deadline: Duration,
    ) -> Result<String, ProviderError> {
        let model = model_override.unwrap_or(&self.default_model);
        let body = json!({
            "model": model,
            "messages": messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>(),
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(deadline)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(match status.as_u16() {
                401 | 403 => ProviderError::Auth,
                429 => ProviderError::RateLimited,
                s if s >= 500 => ProviderError::Upstream5xx(status.to_string()),
                _ => ProviderError::Other(format!("unexpected status {status}")),
            });
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(e.to_string()))?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Other("malformed completion response".to_string()))
    }

    async fn health(&self) -> Result<(), ProviderError> {
        self.client
            .get(format!("{}/models", self.base_url))
            .timeout(Duration::from_secs(3))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        Ok(())
    }
}

/// Fallback provider used when no real provider is configured (spec §4.4) —
/// keeps the service usable in a default install rather than failing to
/// boot, at the cost of never producing a real model response.
pub struct LocalEchoProvider;

#[async_trait]
impl Provider for LocalEchoProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: "local-echo".to_string(),
            display_name: "Local Echo (no provider configured)".to_string(),
            default_model: "echo-1".to_string(),
        }
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _model_override: Option<&str>,
        _deadline: Duration,
    ) -> Result<String, ProviderError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("");
        Ok(format!("[no LLM provider configured] echo: {last_user}"))
    }

    async fn health(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
