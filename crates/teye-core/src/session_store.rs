use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use teye_types::Session;

use crate::storage::Storage;

/// Default TTL a session is extended by on each touch, per spec §5 ("session
/// TTL 7 days").
pub const DEFAULT_SESSION_TTL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// The live, in-memory session table. Values handed back to callers are
/// always owned clones — nobody outside this module ever holds a mutable
/// reference into the table, so a connection's writer task is the only thing
/// that can change a session's state (spec §4.7's single-writer rule).
///
/// `bindings` maps a transport connection id to the session id it owns
/// (spec §3's Connection Binding); exactly one binding exists per connection
/// id at any instant, and a session row only exists while at least one
/// binding still points at it.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    bindings: Arc<RwLock<HashMap<String, String>>>,
    storage: Arc<Storage>,
    ttl_ms: u64,
}

impl SessionStore {
    pub fn new(storage: Arc<Storage>, ttl_ms: u64) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            bindings: Arc::new(RwLock::new(HashMap::new())),
            storage,
            ttl_ms,
        }
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        if let Some(session) = self.sessions.read().await.get(id).cloned() {
            return Some(session);
        }
        self.storage.get_session(id).await
    }

    /// Resolves a connection id to its session, minting a fresh session and
    /// binding on first use. Idempotent: repeated calls with the same
    /// `connection_id` and no intervening writes return equal copies of the
    /// same row rather than minting a new one each time (spec §8).
    pub async fn get_or_create(&self, connection_id: &str, now_ms: u64) -> Session {
        if let Some(session_id) = self.bindings.read().await.get(connection_id).cloned() {
            if let Some(session) = self.sessions.read().await.get(&session_id).cloned() {
                return session;
            }
        }

        let mut bindings = self.bindings.write().await;
        if let Some(session_id) = bindings.get(connection_id).cloned() {
            if let Some(session) = self.sessions.read().await.get(&session_id).cloned() {
                return session;
            }
        }

        let id = Uuid::new_v4().to_string();
        let session = Session::new(id.clone(), now_ms, self.ttl_ms);
        self.sessions
            .write()
            .await
            .insert(id.clone(), session.clone());
        bindings.insert(connection_id.to_string(), id.clone());
        drop(bindings);
        let _ = self.storage.put_session(session.clone()).await;
        session
    }

    /// Looks up the session id bound to a connection, if any, without
    /// creating one.
    pub async fn binding_for(&self, connection_id: &str) -> Option<String> {
        self.bindings.read().await.get(connection_id).cloned()
    }

    /// Extends a session's TTL deadline. Returns `None` if the session no
    /// longer exists (it may have been reclaimed between the caller's last
    /// read and this call).
    pub async fn touch(&self, id: &str, now_ms: u64) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id)?;
        session.touch(now_ms, self.ttl_ms);
        let updated = session.clone();
        drop(sessions);
        let _ = self.storage.put_session(updated.clone()).await;
        Some(updated)
    }

    pub async fn update<F>(&self, id: &str, mutate: F) -> Option<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id)?;
        mutate(session);
        let updated = session.clone();
        drop(sessions);
        let _ = self.storage.put_session(updated.clone()).await;
        Some(updated)
    }

    /// Sweeps every session whose TTL deadline has passed. Intended to be
    /// driven by a background loop on a fixed interval; returns the reclaimed
    /// session ids for logging.
    pub async fn cleanup_stale(&self, now_ms: u64) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let stale: Vec<String> = sessions
            .values()
            .filter(|s| s.is_reclaimable(now_ms))
            .map(|s| s.id.clone())
            .collect();
        for id in &stale {
            sessions.remove(id);
        }
        drop(sessions);

        if !stale.is_empty() {
            let stale_set: std::collections::HashSet<&String> = stale.iter().collect();
            self.bindings
                .write()
                .await
                .retain(|_, session_id| !stale_set.contains(session_id));
        }

        for id in &stale {
            let _ = self.storage.delete_session(id).await;
        }
        stale
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SessionStore {
        let dir = std::env::temp_dir().join(format!("teye-core-session-test-{}", Uuid::new_v4()));
        let storage = Arc::new(Storage::new(&dir).await.unwrap());
        SessionStore::new(storage, 1_000)
    }

    #[tokio::test]
    async fn touch_extends_past_original_deadline() {
        let store = store().await;
        let session = store.get_or_create("conn-1", 0).await;
        let original_deadline = session.ttl_deadline_ms;
        let touched = store.touch(&session.id, 500).await.unwrap();
        assert!(touched.ttl_deadline_ms > original_deadline);
    }

    #[tokio::test]
    async fn cleanup_stale_removes_expired_sessions_only() {
        let store = store().await;
        let fresh = store.get_or_create("conn-fresh", 0).await;
        let stale = store.get_or_create("conn-stale", 0).await;
        store.touch(&fresh.id, 900).await;

        let reclaimed = store.cleanup_stale(1_001).await;
        assert_eq!(reclaimed, vec![stale.id.clone()]);
        assert!(store.get(&stale.id).await.is_none());
        assert!(store.get(&fresh.id).await.is_some());
    }

    #[tokio::test]
    async fn touch_on_missing_session_returns_none() {
        let store = store().await;
        assert!(store.touch("unknown", 0).await.is_none());
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent_per_connection() {
        let store = store().await;
        let first = store.get_or_create("conn-1", 0).await;
        let second = store.get_or_create("conn-1", 0).await;
        let third = store.get_or_create("conn-1", 0).await;
        assert_eq!(first.id, second.id);
        assert_eq!(second.id, third.id);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn distinct_connections_never_share_a_session() {
        let store = store().await;
        let a = store.get_or_create("conn-a", 0).await;
        let b = store.get_or_create("conn-b", 0).await;
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn cleanup_stale_drops_bindings_to_reclaimed_sessions() {
        let store = store().await;
        let stale = store.get_or_create("conn-1", 0).await;
        store.cleanup_stale(1_001).await;
        assert!(store.binding_for("conn-1").await.is_none());
        let recreated = store.get_or_create("conn-1", 1_001).await;
        assert_ne!(recreated.id, stale.id);
    }
}
