use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Keyed cancellation tokens, one per session. Cancelling a session's token
/// aborts any in-flight Eye invocation or provider call for that session
/// without touching any other session's work — mirrors the teacher's use of
/// `CancellationToken` to scope abort signals to a single run rather than
/// the whole process.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token for a session, creating one if this is the first
    /// time it's been asked for.
    pub async fn token_for(&self, session_id: &str) -> CancellationToken {
        if let Some(token) = self.tokens.read().await.get(session_id) {
            return token.clone();
        }
        let mut tokens = self.tokens.write().await;
        tokens
            .entry(session_id.to_string())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// Cancels the current token for a session and immediately issues a
    /// fresh one, so a subsequent request for the same session isn't
    /// pre-cancelled.
    pub async fn cancel(&self, session_id: &str) {
        let mut tokens = self.tokens.write().await;
        if let Some(token) = tokens.get(session_id) {
            token.cancel();
        }
        tokens.insert(session_id.to_string(), CancellationToken::new());
    }

    pub async fn remove(&self, session_id: &str) {
        self.tokens.write().await.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_trips_the_previously_issued_token() {
        let registry = CancellationRegistry::new();
        let token = registry.token_for("s1").await;
        assert!(!token.is_cancelled());
        registry.cancel("s1").await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn token_after_cancel_is_fresh() {
        let registry = CancellationRegistry::new();
        let _ = registry.token_for("s1").await;
        registry.cancel("s1").await;
        let fresh = registry.token_for("s1").await;
        assert!(!fresh.is_cancelled());
    }
}
