use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Double-submit CSRF tokens signed with the server's secret. A token is a
/// `nonce:timestamp:signature` triple; the same value must arrive in both
/// the cookie and the `X-CSRF-Token` header for a mutating admin request to
/// be accepted, and the signature proves the server issued it rather than
/// the cookie and header merely matching each other.
#[derive(Clone)]
pub struct CsrfGuard {
    server_secret: Vec<u8>,
    max_age_ms: u64,
}

impl CsrfGuard {
    pub fn new(server_secret: impl Into<Vec<u8>>, max_age_ms: u64) -> Self {
        Self {
            server_secret: server_secret.into(),
            max_age_ms,
        }
    }

    fn sign(&self, nonce: &str, timestamp_ms: u64) -> anyhow::Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.server_secret)?;
        mac.update(format!("{nonce}:{timestamp_ms}").as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn issue(&self, now_ms: u64) -> anyhow::Result<String> {
        let nonce = Uuid::new_v4().to_string();
        let signature = self.sign(&nonce, now_ms)?;
        Ok(format!("{nonce}:{now_ms}:{signature}"))
    }

    /// Validates a token string: well-formed, signature matches, and not
    /// older than `max_age_ms`. Does not compare cookie vs header — the
    /// caller (the server's auth middleware) is responsible for checking
    /// both presented values are identical before calling this.
    pub fn validate(&self, token: &str, now_ms: u64) -> bool {
        let mut parts = token.splitn(3, ':');
        let (Some(nonce), Some(timestamp_str), Some(signature)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        let Ok(timestamp_ms) = timestamp_str.parse::<u64>() else {
            return false;
        };
        if now_ms < timestamp_ms || now_ms - timestamp_ms > self.max_age_ms {
            return false;
        }
        match self.sign(nonce, timestamp_ms) {
            Ok(expected) => constant_time_eq(expected.as_bytes(), signature.as_bytes()),
            Err(_) => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshly_issued_token_validates() {
        let guard = CsrfGuard::new(b"secret".to_vec(), 60_000);
        let token = guard.issue(1_000).unwrap();
        assert!(guard.validate(&token, 1_500));
    }

    #[test]
    fn token_expires_past_max_age() {
        let guard = CsrfGuard::new(b"secret".to_vec(), 60_000);
        let token = guard.issue(1_000).unwrap();
        assert!(!guard.validate(&token, 61_001));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let guard = CsrfGuard::new(b"secret".to_vec(), 60_000);
        let mut token = guard.issue(1_000).unwrap();
        token.push('f');
        assert!(!guard.validate(&token, 1_500));
    }

    #[test]
    fn token_signed_with_different_secret_is_rejected() {
        let issuer = CsrfGuard::new(b"secret-a".to_vec(), 60_000);
        let verifier = CsrfGuard::new(b"secret-b".to_vec(), 60_000);
        let token = issuer.issue(1_000).unwrap();
        assert!(!verifier.validate(&token, 1_500));
    }
}
