use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use teye_types::{EyeDescriptor, EyeResult, WorkEnvelope};

use crate::builtin::{AmbiguityDetectorEye, DefaultClarityEye};
use crate::{Eye, EyeError};

const HEALTH_CACHE_TTL_MS: u64 = 30_000;
const DEFAULT_EYE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct EyeHealth {
    pub healthy: bool,
    pub checked_at_ms: u64,
}

#[derive(Clone)]
pub struct EyeRegistry {
    eyes: Arc<RwLock<HashMap<String, Arc<dyn Eye>>>>,
    health_cache: Arc<RwLock<HashMap<String, EyeHealth>>>,
    per_eye_timeout: Duration,
}

impl EyeRegistry {
    /// Starts with the two reference Eyes registered; callers add `routing`
    /// and any custom Eyes via `register` once a `ProviderRegistry` is
    /// available.
    pub fn new() -> Self {
        let mut map: HashMap<String, Arc<dyn Eye>> = HashMap::new();
        map.insert("default_clarity".to_string(), Arc::new(DefaultClarityEye));
        map.insert(
            "ambiguity_detector".to_string(),
            Arc::new(AmbiguityDetectorEye::default()),
        );
        Self {
            eyes: Arc::new(RwLock::new(map)),
            health_cache: Arc::new(RwLock::new(HashMap::new())),
            per_eye_timeout: DEFAULT_EYE_TIMEOUT,
        }
    }

    pub async fn register(&self, name: impl Into<String>, eye: Arc<dyn Eye>) {
        self.eyes.write().await.insert(name.into(), eye);
    }

    pub async fn list(&self) -> Vec<EyeDescriptor> {
        self.eyes.read().await.values().map(|e| e.describe()).collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.eyes.read().await.contains_key(name)
    }

    /// Invokes a named Eye with the registry's default per-Eye timeout,
    /// racing the Eye's own future against both the timeout and the
    /// caller's cancellation token (spec §4.3).
    pub async fn invoke(
        &self,
        name: &str,
        envelope: &WorkEnvelope,
        cancel: CancellationToken,
    ) -> Result<EyeResult, EyeError> {
        let eye = {
            let eyes = self.eyes.read().await;
            eyes.get(name)
                .cloned()
                .ok_or_else(|| EyeError::Failed(name.to_string(), "unknown eye".to_string()))?
        };

        if cancel.is_cancelled() {
            return Err(EyeError::Cancelled(name.to_string()));
        }

        tokio::select! {
            result = tokio::time::timeout(self.per_eye_timeout, eye.invoke(envelope, cancel.clone())) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(EyeError::Timeout(name.to_string())),
                }
            }
            _ = cancel.cancelled() => Err(EyeError::Cancelled(name.to_string())),
        }
    }

    pub async fn health(&self, name: &str, now_ms: u64) -> Result<EyeHealth, EyeError> {
        if let Some(cached) = self.health_cache.read().await.get(name) {
            if now_ms.saturating_sub(cached.checked_at_ms) < HEALTH_CACHE_TTL_MS {
                return Ok(cached.clone());
            }
        }
        let eye = {
            let eyes = self.eyes.read().await;
            eyes.get(name)
                .cloned()
                .ok_or_else(|| EyeError::Failed(name.to_string(), "unknown eye".to_string()))?
        };
        let healthy = eye.health().await.is_ok();
        if !healthy {
            warn!(eye = name, "eye health check failed");
        }
        let status = EyeHealth {
            healthy,
            checked_at_ms: now_ms,
        };
        self.health_cache
            .write()
            .await
            .insert(name.to_string(), status.clone());
        Ok(status)
    }
}

impl Default for EyeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
