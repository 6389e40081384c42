use serde::{Deserialize, Serialize};

/// Preferred response language for a session. `Auto` defers to per-request
/// detection; the orchestrator does not itself translate, it only threads
/// the preference through to Eyes that care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Auto,
    En,
    Ar,
}

impl Default for Language {
    fn default() -> Self {
        Language::Auto
    }
}

/// One logical conversation between a host and the orchestrator. Session
/// rows are owned exclusively by the session store (§4.4); every other
/// component receives value copies, never a shared mutable reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub token_budget: u64,
    pub created_at_ms: u64,
    pub last_activity_ms: u64,
    pub ttl_deadline_ms: u64,
}

impl Session {
    pub fn new(id: impl Into<String>, now_ms: u64, ttl_ms: u64) -> Self {
        Self {
            id: id.into(),
            tenant_id: None,
            user_id: None,
            language: Language::Auto,
            token_budget: 0,
            created_at_ms: now_ms,
            last_activity_ms: now_ms,
            ttl_deadline_ms: now_ms.saturating_add(ttl_ms),
        }
    }

    /// Invariant: a session whose TTL deadline has passed is reclaimable
    /// (spec §3). The reclamation loop uses this, not `last_activity_ms`
    /// directly, so a future TTL policy change (e.g. activity-based decay)
    /// stays a one-line change here.
    pub fn is_reclaimable(&self, now_ms: u64) -> bool {
        self.ttl_deadline_ms < now_ms
    }

    pub fn touch(&mut self, now_ms: u64, ttl_ms: u64) {
        self.last_activity_ms = now_ms;
        self.ttl_deadline_ms = now_ms.saturating_add(ttl_ms);
    }
}

/// Mapping from a transport's logical channel to a session id. Two
/// connections never share a session row directly — all updates route
/// through the session store so single-writer semantics hold per
/// connection (spec §3, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionBinding {
    pub connection_id: String,
    pub session_id: String,
}

/// A diff applied by `SessionStore::update`. `None` fields are left
/// untouched; this mirrors a PATCH semantics rather than a full overwrite,
/// so callers never need to re-read-then-write the whole row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionDiff {
    pub tenant_id: Option<Option<String>>,
    pub user_id: Option<Option<String>>,
    pub language: Option<Language>,
    pub token_budget: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclaimable_once_ttl_deadline_passes() {
        let session = Session::new("s1", 0, 1_000);
        assert!(!session.is_reclaimable(500));
        assert!(session.is_reclaimable(1_001));
    }

    #[test]
    fn touch_extends_ttl_from_now() {
        let mut session = Session::new("s1", 0, 1_000);
        session.touch(900, 1_000);
        assert_eq!(session.last_activity_ms, 900);
        assert_eq!(session.ttl_deadline_ms, 1_900);
    }
}
