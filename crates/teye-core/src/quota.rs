use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use teye_types::TenantQuota;

/// The sliding window is divided into this many sub-buckets; each bucket
/// covers a 5s slice of the 60s window (spec §4.5). A request increments the
/// bucket for its current timestamp; the window total is the sum of buckets
/// whose slice start falls within the trailing 60s.
const BUCKET_COUNT: usize = 12;
const WINDOW_MS: u64 = 60_000;
const BUCKET_WIDTH_MS: u64 = WINDOW_MS / BUCKET_COUNT as u64;

#[derive(Debug, Clone, Default)]
struct TenantCounters {
    /// `buckets[i]` holds the count for the sub-window starting at
    /// `bucket_start_ms + i * BUCKET_WIDTH_MS`.
    buckets: [u32; BUCKET_COUNT],
    bucket_start_ms: u64,
}

impl TenantCounters {
    /// Rotates the ring so the bucket covering `now_ms` is at index 0,
    /// zeroing any buckets that have aged out of the window. A gap larger
    /// than the whole window just clears everything.
    fn rotate(&mut self, now_ms: u64) {
        if self.bucket_start_ms == 0 {
            self.bucket_start_ms = now_ms - (now_ms % BUCKET_WIDTH_MS);
            return;
        }
        let current_start = now_ms - (now_ms % BUCKET_WIDTH_MS);
        if current_start <= self.bucket_start_ms {
            return;
        }
        let elapsed_buckets = (current_start - self.bucket_start_ms) / BUCKET_WIDTH_MS;
        if elapsed_buckets >= BUCKET_COUNT as u64 {
            self.buckets = [0; BUCKET_COUNT];
        } else {
            self.buckets.rotate_left(elapsed_buckets as usize);
            for slot in self.buckets.iter_mut().rev().take(elapsed_buckets as usize) {
                *slot = 0;
            }
        }
        self.bucket_start_ms = current_start;
    }

    fn total(&self) -> u32 {
        self.buckets.iter().sum()
    }

    fn increment(&mut self, now_ms: u64) {
        self.rotate(now_ms);
        self.buckets[BUCKET_COUNT - 1] += 1;
    }
}

/// Outcome of an admission check (spec §4.5): whether the request was let
/// through, plus the usage and limit the caller needs to build a
/// `E_QUOTA_EXCEEDED` hint ("wait N seconds") without a second round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub admitted: bool,
    pub current_usage: u32,
    pub limit: u32,
}

/// Tracks per-tenant request volume over a trailing 60s window and enforces
/// an admin-configured cap. All mutation is funneled through a single
/// `RwLock` per tenant table so concurrent requests can't race past the
/// limit between a check and an increment.
#[derive(Clone)]
pub struct QuotaManager {
    counters: Arc<RwLock<HashMap<String, TenantCounters>>>,
    limits: Arc<RwLock<HashMap<String, u32>>>,
    default_limit: u32,
}

impl QuotaManager {
    pub fn new(default_limit: u32) -> Self {
        Self {
            counters: Arc::new(RwLock::new(HashMap::new())),
            limits: Arc::new(RwLock::new(HashMap::new())),
            default_limit,
        }
    }

    pub async fn set_limit(&self, tenant_id: impl Into<String>, limit: u32) {
        self.limits.write().await.insert(tenant_id.into(), limit);
    }

    pub async fn apply_quota(&self, quota: TenantQuota) {
        self.set_limit(quota.tenant_id, quota.limit).await;
    }

    async fn limit_for(&self, tenant_id: &str) -> u32 {
        self.limits
            .read()
            .await
            .get(tenant_id)
            .copied()
            .unwrap_or(self.default_limit)
    }

    pub async fn get_usage(&self, tenant_id: &str, now_ms: u64) -> u32 {
        let mut counters = self.counters.write().await;
        let entry = counters.entry(tenant_id.to_string()).or_default();
        entry.rotate(now_ms);
        entry.total()
    }

    /// Atomically checks the window total against the limit and, if under,
    /// increments it — the check and the increment happen under the same
    /// write lock, so this is the serialization point spec §4.5 calls for:
    /// no more than `limit` requests are ever admitted within a window
    /// regardless of how many callers race here concurrently.
    pub async fn check_and_increment(&self, tenant_id: &str, now_ms: u64) -> QuotaDecision {
        let limit = self.limit_for(tenant_id).await;
        let mut counters = self.counters.write().await;
        let entry = counters.entry(tenant_id.to_string()).or_default();
        entry.rotate(now_ms);
        let current_usage = entry.total();
        if current_usage >= limit {
            return QuotaDecision {
                admitted: false,
                current_usage,
                limit,
            };
        }
        entry.increment(now_ms);
        QuotaDecision {
            admitted: true,
            current_usage: current_usage + 1,
            limit,
        }
    }

    pub async fn reset(&self, tenant_id: &str) {
        self.counters.write().await.remove(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_requests_under_the_limit() {
        let manager = QuotaManager::new(3);
        assert!(manager.check_and_increment("t1", 0).await.admitted);
        assert!(manager.check_and_increment("t1", 0).await.admitted);
        assert!(manager.check_and_increment("t1", 0).await.admitted);
        let rejected = manager.check_and_increment("t1", 0).await;
        assert!(!rejected.admitted);
        assert_eq!(rejected.current_usage, 3);
        assert_eq!(rejected.limit, 3);
    }

    #[tokio::test]
    async fn window_rolls_off_old_requests() {
        let manager = QuotaManager::new(1);
        assert!(manager.check_and_increment("t1", 0).await.admitted);
        assert!(!manager.check_and_increment("t1", 1_000).await.admitted);
        // Past the full 60s window, the old request has aged out.
        assert!(manager.check_and_increment("t1", 61_000).await.admitted);
    }

    #[tokio::test]
    async fn per_tenant_limit_overrides_default() {
        let manager = QuotaManager::new(1);
        manager.set_limit("t1", 5).await;
        for _ in 0..5 {
            assert!(manager.check_and_increment("t1", 0).await.admitted);
        }
        assert!(!manager.check_and_increment("t1", 0).await.admitted);
    }

    #[tokio::test]
    async fn current_usage_reflects_the_admitted_count() {
        let manager = QuotaManager::new(10);
        let first = manager.check_and_increment("t1", 0).await;
        let second = manager.check_and_increment("t1", 0).await;
        assert_eq!(first.current_usage, 1);
        assert_eq!(second.current_usage, 2);
    }
}
