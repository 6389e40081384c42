use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use teye_types::WorkEnvelope;

/// Holds the envelope an Eye asked for clarification or revision on, keyed by
/// session, so `/session/{id}/clarifications` can merge the caller's answers
/// back in and resume orchestration without the caller having to resend the
/// whole original request. Deliberately not part of `Storage` — work
/// artifacts are not persisted (spec §1 Non-goals), this is a short-lived,
/// in-memory handoff between two requests on the same session.
#[derive(Clone, Default)]
pub struct PendingEnvelopes {
    inner: Arc<RwLock<HashMap<String, WorkEnvelope>>>,
}

impl PendingEnvelopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session_id: impl Into<String>, envelope: WorkEnvelope) {
        self.inner.write().await.insert(session_id.into(), envelope);
    }

    pub async fn take(&self, session_id: &str) -> Option<WorkEnvelope> {
        self.inner.write().await.remove(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> WorkEnvelope {
        WorkEnvelope {
            intent: "review".to_string(),
            work: Default::default(),
            context_info: Default::default(),
            reasoning_md: String::new(),
            context: Default::default(),
            strict_mode: false,
        }
    }

    #[tokio::test]
    async fn take_removes_the_entry() {
        let pending = PendingEnvelopes::new();
        pending.insert("s1", sample_envelope()).await;
        assert!(pending.take("s1").await.is_some());
        assert!(pending.take("s1").await.is_none());
    }
}
