use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use teye_types::{ApiKey, ApiKeyLimits, Role};

type HmacSha256 = Hmac<Sha256>;

/// A per-key random salt folded into the hash so two keys with the same
/// secret (never expected, but not impossible) don't produce the same
/// stored hash, and so a leaked hash can't be used to derive the secret for
/// any other key.
fn salted_hash(salt: &str, secret: &str) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())?;
    mac.update(secret.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Returns `(salt, secret_hash)`. Callers persist both in `ApiKey.secret_hash`
/// as `salt:hash`; the raw secret itself is returned once to the caller at
/// creation time and never stored.
pub fn hash_secret(secret: &str) -> anyhow::Result<String> {
    let salt = Uuid::new_v4().to_string();
    let hash = salted_hash(&salt, secret)?;
    Ok(format!("{salt}:{hash}"))
}

pub fn verify_secret(stored: &str, candidate: &str) -> bool {
    let Some((salt, expected_hash)) = stored.split_once(':') else {
        return false;
    };
    match salted_hash(salt, candidate) {
        Ok(actual_hash) => constant_time_eq(actual_hash.as_bytes(), expected_hash.as_bytes()),
        Err(_) => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// The admin-facing view of an `ApiKey` — never carries `secret_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySummary {
    pub id: String,
    pub role: Role,
    pub tenant_id: Option<String>,
    pub created_at_ms: u64,
    pub expires_at_ms: Option<u64>,
    pub revoked: bool,
    pub limits: ApiKeyLimits,
}

impl From<&ApiKey> for ApiKeySummary {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id.clone(),
            role: key.role,
            tenant_id: key.tenant_id.clone(),
            created_at_ms: key.created_at_ms,
            expires_at_ms: key.expires_at_ms,
            revoked: key.revoked,
            limits: key.limits.clone(),
        }
    }
}

/// Validates a presented `(key_id, secret)` pair against the stored record.
/// Returns the key only if it exists, its secret matches, and it is valid at
/// `now_ms` (not revoked, not past absolute expiry).
pub fn authenticate(stored: &ApiKey, candidate_secret: &str, now_ms: u64) -> bool {
    stored.is_valid_at(now_ms) && verify_secret(&stored.secret_hash, candidate_secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_hash_and_verify() {
        let stored = hash_secret("s3cr3t").unwrap();
        assert!(verify_secret(&stored, "s3cr3t"));
        assert!(!verify_secret(&stored, "wrong"));
    }

    #[test]
    fn two_hashes_of_same_secret_differ_by_salt() {
        let a = hash_secret("same").unwrap();
        let b = hash_secret("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn authenticate_rejects_revoked_key_even_with_correct_secret() {
        let stored = hash_secret("s3cr3t").unwrap();
        let key = ApiKey {
            id: "k1".to_string(),
            secret_hash: stored,
            role: Role::Consumer,
            tenant_id: None,
            created_at_ms: 0,
            expires_at_ms: None,
            revoked: true,
            limits: ApiKeyLimits::default(),
        };
        assert!(!authenticate(&key, "s3cr3t", 1));
    }
}
