use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Consumer,
}

/// Per-key limits. All are optional — an absent limit means "no cap at this
/// layer", with the tenant-level quota (`TenantQuota`) as the outer bound
/// that always applies regardless (spec §4.5 invariant iii).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_minute: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_request_budget: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_budget: Option<u64>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Never exported with its secret hash intact to a caller outside the auth
/// crate; the HTTP surface only ever sees `ApiKeySummary` (teye-auth).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: String,
    pub secret_hash: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub created_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub limits: ApiKeyLimits,
}

impl ApiKey {
    /// A key denies admission if revoked or past its absolute expiry. Expiry
    /// is wall-clock, not relative — a key issued with `expires_at_ms` in the
    /// past is invalid regardless of when it is first used (spec §3).
    pub fn is_valid_at(&self, now_ms: u64) -> bool {
        if self.revoked {
            return false;
        }
        match self.expires_at_ms {
            Some(expiry) => now_ms < expiry,
            None => true,
        }
    }
}

/// Per-tenant admission configuration. The live sliding-window counters are
/// owned by the quota manager, not this struct — this is just the
/// admin-configured limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantQuota {
    pub tenant_id: String,
    pub limit: u32,
}

/// Bound to an admin API key; TTL-tracked the same way a `Session` is
/// (spec §4.7 reuses the session store's TTL discipline for admin state).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSession {
    pub key_id: String,
    pub created_at_ms: u64,
    pub ttl_deadline_ms: u64,
    pub csrf_token: String,
}

impl AdminSession {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.ttl_deadline_ms
    }

    /// Extends the TTL deadline from `now_ms` (spec §4.7: every admin request
    /// touches the session record, forcing re-login only after a true gap in
    /// activity rather than a fixed wall-clock lifetime).
    pub fn touch(&mut self, now_ms: u64, ttl_ms: u64) {
        self.ttl_deadline_ms = now_ms.saturating_add(ttl_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoked_key_is_never_valid() {
        let key = ApiKey {
            id: "k1".to_string(),
            secret_hash: "h".to_string(),
            role: Role::Consumer,
            tenant_id: None,
            created_at_ms: 0,
            expires_at_ms: None,
            revoked: true,
            limits: ApiKeyLimits::default(),
        };
        assert!(!key.is_valid_at(1_000_000));
    }

    #[test]
    fn expired_key_is_invalid_past_absolute_deadline() {
        let key = ApiKey {
            id: "k1".to_string(),
            secret_hash: "h".to_string(),
            role: Role::Consumer,
            tenant_id: None,
            created_at_ms: 0,
            expires_at_ms: Some(1_000),
            revoked: false,
            limits: ApiKeyLimits::default(),
        };
        assert!(key.is_valid_at(999));
        assert!(!key.is_valid_at(1_000));
    }
}
