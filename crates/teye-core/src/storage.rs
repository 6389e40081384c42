use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

use teye_types::{ApiKey, Session, TenantQuota};

/// One entry in the append-only audit trail (spec §4.7): every admin
/// mutation and every completed orchestration gets a record here, keyed by
/// insertion order rather than by subject, so the log reads back
/// chronologically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub ts_ms: u64,
    pub actor: String,
    pub action: String,
    pub detail: serde_json::Value,
}

/// JSON-file backed store with an in-memory cache, following the same
/// pattern as the teacher's session storage: reads never touch disk, writes
/// go through `flush()` which atomically rewrites the whole snapshot.
pub struct Storage {
    base: PathBuf,
    sessions: RwLock<HashMap<String, Session>>,
    api_keys: RwLock<HashMap<String, ApiKey>>,
    tenant_quotas: RwLock<HashMap<String, TenantQuota>>,
    audit_log: RwLock<Vec<AuditEvent>>,
}

impl Storage {
    pub async fn new(base: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let base = base.into();
        fs::create_dir_all(&base).await?;

        let sessions = read_json_map(&base.join("sessions.json")).await;
        let api_keys = read_json_map(&base.join("api_keys.json")).await;
        let tenant_quotas = read_json_map(&base.join("tenant_quotas.json")).await;
        let audit_log = read_json_vec(&base.join("audit_log.json")).await;

        Ok(Self {
            base,
            sessions: RwLock::new(sessions),
            api_keys: RwLock::new(api_keys),
            tenant_quotas: RwLock::new(tenant_quotas),
            audit_log: RwLock::new(audit_log),
        })
    }

    pub async fn get_session(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn put_session(&self, session: Session) -> anyhow::Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
        self.flush_sessions().await
    }

    pub async fn delete_session(&self, id: &str) -> anyhow::Result<Option<Session>> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            self.flush_sessions().await?;
        }
        Ok(removed)
    }

    pub async fn list_sessions(&self) -> Vec<Session> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn get_api_key(&self, id: &str) -> Option<ApiKey> {
        self.api_keys.read().await.get(id).cloned()
    }

    pub async fn list_api_keys(&self) -> Vec<ApiKey> {
        self.api_keys.read().await.values().cloned().collect()
    }

    pub async fn put_api_key(&self, key: ApiKey) -> anyhow::Result<()> {
        self.api_keys.write().await.insert(key.id.clone(), key);
        self.flush_api_keys().await
    }

    pub async fn revoke_api_key(&self, id: &str) -> anyhow::Result<bool> {
        let mut keys = self.api_keys.write().await;
        let Some(key) = keys.get_mut(id) else {
            return Ok(false);
        };
        key.revoked = true;
        drop(keys);
        self.flush_api_keys().await?;
        Ok(true)
    }

    pub async fn get_tenant_quota(&self, tenant_id: &str) -> Option<TenantQuota> {
        self.tenant_quotas.read().await.get(tenant_id).cloned()
    }

    pub async fn put_tenant_quota(&self, quota: TenantQuota) -> anyhow::Result<()> {
        self.tenant_quotas
            .write()
            .await
            .insert(quota.tenant_id.clone(), quota);
        self.flush_tenant_quotas().await
    }

    pub async fn append_audit_event(&self, event: AuditEvent) -> anyhow::Result<()> {
        self.audit_log.write().await.push(event);
        self.flush_audit_log().await
    }

    pub async fn list_audit_events(&self) -> Vec<AuditEvent> {
        self.audit_log.read().await.clone()
    }

    async fn flush_sessions(&self) -> anyhow::Result<()> {
        let snapshot = self.sessions.read().await.clone();
        write_json_file(&self.base.join("sessions.json"), &snapshot).await
    }

    async fn flush_api_keys(&self) -> anyhow::Result<()> {
        let snapshot = self.api_keys.read().await.clone();
        write_json_file(&self.base.join("api_keys.json"), &snapshot).await
    }

    async fn flush_tenant_quotas(&self) -> anyhow::Result<()> {
        let snapshot = self.tenant_quotas.read().await.clone();
        write_json_file(&self.base.join("tenant_quotas.json"), &snapshot).await
    }

    async fn flush_audit_log(&self) -> anyhow::Result<()> {
        let snapshot = self.audit_log.read().await.clone();
        write_json_file(&self.base.join("audit_log.json"), &snapshot).await
    }
}

async fn read_json_map<V: for<'de> Deserialize<'de>>(path: &std::path::Path) -> HashMap<String, V> {
    match fs::read_to_string(path).await {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        Err(_) => HashMap::new(),
    }
}

async fn read_json_vec<V: for<'de> Deserialize<'de>>(path: &std::path::Path) -> Vec<V> {
    match fs::read_to_string(path).await {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

async fn write_json_file<V: Serialize>(path: &std::path::Path, value: &V) -> anyhow::Result<()> {
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use teye_types::{ApiKeyLimits, Role};

    async fn temp_storage() -> (Storage, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("teye-core-storage-test-{}", uuid::Uuid::new_v4()));
        let storage = Storage::new(&dir).await.unwrap();
        (storage, dir)
    }

    #[tokio::test]
    async fn put_then_get_session_round_trips() {
        let (storage, dir) = temp_storage().await;
        let session = Session::new("s1".to_string(), 1_000, 60_000);
        storage.put_session(session.clone()).await.unwrap();
        let fetched = storage.get_session("s1").await.unwrap();
        assert_eq!(fetched.id, session.id);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn revoking_unknown_key_returns_false() {
        let (storage, dir) = temp_storage().await;
        assert!(!storage.revoke_api_key("nope").await.unwrap());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn revoke_persists_across_reload() {
        let (storage, dir) = temp_storage().await;
        let key = ApiKey {
            id: "k1".to_string(),
            secret_hash: "h".to_string(),
            role: Role::Consumer,
            tenant_id: None,
            created_at_ms: 0,
            expires_at_ms: None,
            revoked: false,
            limits: ApiKeyLimits::default(),
        };
        storage.put_api_key(key).await.unwrap();
        storage.revoke_api_key("k1").await.unwrap();

        let reloaded = Storage::new(&dir).await.unwrap();
        let fetched = reloaded.get_api_key("k1").await.unwrap();
        assert!(fetched.revoked);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
