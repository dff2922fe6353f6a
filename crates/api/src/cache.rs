//! In-process TTL cache for job responses.
//!
//! Only jobs in a final state (`completed`, `failed`) are stored: their rows
//! never change again, so a cached copy cannot go stale before it expires.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use pressline_core::types::DbId;
use pressline_db::models::status::JobStatus;

#[derive(Debug, Clone)]
struct CachedJob {
    body: serde_json::Value,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct JobCache {
    enabled: bool,
    ttl: Duration,
    entries: RwLock<HashMap<DbId, CachedJob>>,
}

impl JobCache {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            enabled: enabled && !ttl.is_zero(),
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, Duration::ZERO)
    }

    pub async fn get(&self, job_id: DbId) -> Option<serde_json::Value> {
        if !self.enabled {
            return None;
        }
        let entries = self.entries.read().await;
        entries
            .get(&job_id)
            .filter(|cached| cached.expires_at > Instant::now())
            .map(|cached| cached.body.clone())
    }

    /// Store `body` when `status` is final. Returns whether it was stored.
    pub async fn put(&self, job_id: DbId, status: JobStatus, body: &serde_json::Value) -> bool {
        if !self.enabled || !matches!(status, JobStatus::Completed | JobStatus::Failed) {
            return false;
        }
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, cached| cached.expires_at > now);
        entries.insert(
            job_id,
            CachedJob {
                body: body.clone(),
                expires_at: now + self.ttl,
            },
        );
        true
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn only_final_states_are_cached() {
        let cache = JobCache::new(true, Duration::from_secs(60));
        let id = DbId::new_v4();

        assert!(!cache.put(id, JobStatus::Running, &json!({"status": "running"})).await);
        assert!(cache.get(id).await.is_none());

        assert!(cache.put(id, JobStatus::Completed, &json!({"status": "completed"})).await);
        assert_eq!(cache.get(id).await.unwrap()["status"], "completed");
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = JobCache::new(true, Duration::from_millis(20));
        let id = DbId::new_v4();
        cache.put(id, JobStatus::Failed, &json!({})).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(id).await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_stores_nothing() {
        let cache = JobCache::disabled();
        let id = DbId::new_v4();
        assert!(!cache.put(id, JobStatus::Completed, &json!({})).await);
        assert_eq!(cache.len().await, 0);
    }
}
