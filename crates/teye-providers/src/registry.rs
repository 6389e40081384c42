use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::openai_compatible::{LocalEchoProvider, OpenAiCompatibleProvider};
use crate::{ChatMessage, Provider, ProviderError, ProviderInfo, ProvidersConfig};

const HEALTH_CACHE_TTL_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub healthy: bool,
    pub checked_at_ms: u64,
}

#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<Vec<Arc<dyn Provider>>>>,
    default_provider: Arc<RwLock<Option<String>>>,
    health_cache: Arc<RwLock<HashMap<String, ProviderHealth>>>,
}

impl ProviderRegistry {
    pub fn new(config: ProvidersConfig) -> Self {
        let providers = build_providers(&config);
        Self {
            providers: Arc::new(RwLock::new(providers)),
            default_provider: Arc::new(RwLock::new(config.default_provider)),
            health_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn reload(&self, config: ProvidersConfig) {
        *self.providers.write().await = build_providers(&config);
        *self.default_provider.write().await = config.default_provider;
        self.health_cache.write().await.clear();
    }

    pub async fn list(&self) -> Vec<ProviderInfo> {
        self.providers
            .read()
            .await
            .iter()
            .map(|p| p.info())
            .collect()
    }

    pub async fn complete(
        &self,
        provider_id: Option<&str>,
        messages: &[ChatMessage],
        model_override: Option<&str>,
        deadline: Duration,
    ) -> Result<String, ProviderError> {
        let provider = self.select_provider(provider_id).await?;
        provider.complete(messages, model_override, deadline).await
    }

    /// Returns cached health if it was checked within the last 30s,
    /// otherwise probes the provider and refreshes the cache.
    pub async fn health(&self, provider_id: &str, now_ms: u64) -> Result<ProviderHealth, ProviderError> {
        if let Some(cached) = self.health_cache.read().await.get(provider_id) {
            if now_ms.saturating_sub(cached.checked_at_ms) < HEALTH_CACHE_TTL_MS {
                return Ok(cached.clone());
            }
        }
        let provider = self.select_provider(Some(provider_id)).await?;
        let healthy = provider.health().await.is_ok();
        let status = ProviderHealth {
            healthy,
            checked_at_ms: now_ms,
        };
        self.health_cache
            .write()
            .await
            .insert(provider_id.to_string(), status.clone());
        Ok(status)
    }

    pub async fn select_provider(&self, provider_id: Option<&str>) -> Result<Arc<dyn Provider>, ProviderError> {
        let providers = self.providers.read().await;

        if let Some(id) = provider_id {
            if let Some(provider) = providers.iter().find(|p| p.info().id == id) {
                return Ok(provider.clone());
            }
            return Err(ProviderError::Other(format!("provider `{id}` is not configured")));
        }

        let configured_default = self.default_provider.read().await.clone();
        if let Some(default_id) = configured_default {
            if let Some(provider) = providers.iter().find(|p| p.info().id == default_id) {
                return Ok(provider.clone());
            }
        }

        providers
            .first()
            .cloned()
            .ok_or_else(|| ProviderError::Other("no provider configured".to_string()))
    }
}

fn build_providers(config: &ProvidersConfig) -> Vec<Arc<dyn Provider>> {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();

    let catalog: &[(&str, &str, &str, &str)] = &[
        ("openai", "OpenAI", "https://api.openai.com/v1", "gpt-4o-mini"),
        (
            "openrouter",
            "OpenRouter",
            "https://openrouter.ai/api/v1",
            "openai/gpt-4o-mini",
        ),
        (
            "anthropic",
            "Anthropic-compatible",
            "https://api.anthropic.com/v1",
            "claude-3-5-sonnet",
        ),
        (
            "ollama",
            "Ollama",
            "http://127.0.0.1:11434/v1",
            "llama3.1:8b",
        ),
    ];

    for (id, display_name, default_base_url, default_model) in catalog {
        let Some(entry) = config.providers.get(*id) else {
            continue;
        };
        if entry.api_key.is_none() && *id != "ollama" {
            continue;
        }
        providers.push(Arc::new(OpenAiCompatibleProvider::new(
            *id,
            *display_name,
            entry.base_url.clone().unwrap_or_else(|| default_base_url.to_string()),
            entry.default_model.clone().unwrap_or_else(|| default_model.to_string()),
            entry.api_key.clone(),
        )));
    }

    if providers.is_empty() {
        providers.push(Arc::new(LocalEchoProvider));
    }

    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    #[tokio::test]
    async fn falls_back_to_local_echo_when_nothing_configured() {
        let registry = ProviderRegistry::new(ProvidersConfig::default());
        let info = registry.list().await;
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].id, "local-echo");
    }

    #[tokio::test]
    async fn unknown_provider_id_is_rejected() {
        let registry = ProviderRegistry::new(ProvidersConfig::default());
        let err = registry.select_provider(Some("nonexistent")).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn health_is_cached_within_the_ttl_window() {
        let registry = ProviderRegistry::new(ProvidersConfig::default());
        let first = registry.health("local-echo", 1_000).await.unwrap();
        let second = registry.health("local-echo", 1_500).await.unwrap();
        assert_eq!(first.checked_at_ms, second.checked_at_ms);
    }

    #[tokio::test]
    async fn default_provider_config_map_is_respected() {
        let mut providers = StdHashMap::new();
        providers.insert(
            "openai".to_string(),
            crate::ProviderConfig {
                api_key: Some("sk-test".to_string()),
                base_url: None,
                default_model: None,
            },
        );
        let registry = ProviderRegistry::new(ProvidersConfig {
            providers,
            default_provider: Some("openai".to_string()),
        });
        let info = registry.list().await;
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].id, "openai");
    }
}
