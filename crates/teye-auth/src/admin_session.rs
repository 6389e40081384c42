use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use teye_types::AdminSession;

use crate::csrf::CsrfGuard;

/// Default lifetime of an admin session before it must be re-established via
/// `/admin/auth/login` (spec §4.7).
pub const DEFAULT_ADMIN_SESSION_TTL_MS: u64 = 3_600_000;

/// Tracks active admin sessions, each bound to the API key that created it
/// and carrying its own CSRF token. Reuses the same TTL-deadline discipline
/// as the consumer-facing session store, but keyed by a separate id space so
/// an admin session is never confused with a pipeline session.
#[derive(Clone)]
pub struct AdminSessionManager {
    sessions: Arc<RwLock<HashMap<String, AdminSession>>>,
    csrf: CsrfGuard,
    ttl_ms: u64,
}

impl AdminSessionManager {
    pub fn new(csrf: CsrfGuard, ttl_ms: u64) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            csrf,
            ttl_ms,
        }
    }

    /// Issues a new admin session for the given key id, returning the
    /// session id the caller should set as a cookie alongside the CSRF
    /// token.
    pub async fn create(&self, key_id: &str, now_ms: u64) -> anyhow::Result<(String, AdminSession)> {
        let session_id = Uuid::new_v4().to_string();
        let session = AdminSession {
            key_id: key_id.to_string(),
            created_at_ms: now_ms,
            ttl_deadline_ms: now_ms + self.ttl_ms,
            csrf_token: self.csrf.issue(now_ms)?,
        };
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session.clone());
        Ok((session_id, session))
    }

    /// Returns the session if it exists and hasn't expired. Does not extend
    /// its TTL on its own — callers that confirm the request is genuinely
    /// authenticated (e.g. `csrf_gate` after a successful CSRF check) call
    /// `touch` explicitly, so a session is only kept alive by real activity.
    pub async fn get_valid(&self, session_id: &str, now_ms: u64) -> Option<AdminSession> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(session_id)?;
        if session.is_expired(now_ms) {
            return None;
        }
        Some(session.clone())
    }

    pub async fn validate_csrf(&self, session_id: &str, presented_token: &str, now_ms: u64) -> bool {
        let Some(session) = self.get_valid(session_id, now_ms).await else {
            return false;
        };
        session.csrf_token == presented_token && self.csrf.validate(presented_token, now_ms)
    }

    /// Extends a valid session's TTL deadline (spec §4.7: every admin
    /// request touches the session record). A no-op if the session is
    /// already gone or expired — there's nothing to extend.
    pub async fn touch(&self, session_id: &str, now_ms: u64) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            if !session.is_expired(now_ms) {
                session.touch(now_ms, self.ttl_ms);
            }
        }
    }

    pub async fn expire(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    pub async fn cleanup_stale(&self, now_ms: u64) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now_ms));
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AdminSessionManager {
        AdminSessionManager::new(CsrfGuard::new(b"secret".to_vec(), 3_600_000), 3_600_000)
    }

    #[tokio::test]
    async fn freshly_created_session_is_valid() {
        let manager = manager();
        let (id, _) = manager.create("k1", 0).await.unwrap();
        assert!(manager.get_valid(&id, 1_000).await.is_some());
    }

    #[tokio::test]
    async fn session_expires_past_ttl_deadline() {
        let manager = manager();
        let (id, _) = manager.create("k1", 0).await.unwrap();
        assert!(manager.get_valid(&id, 3_600_001).await.is_none());
    }

    #[tokio::test]
    async fn csrf_validates_only_with_matching_session_token() {
        let manager = manager();
        let (id, session) = manager.create("k1", 0).await.unwrap();
        assert!(manager.validate_csrf(&id, &session.csrf_token, 10).await);
        assert!(!manager.validate_csrf(&id, "wrong-token", 10).await);
    }
}
