//! Worker Registry: an in-memory, TTL-expiring view of live workers.
//!
//! Advisory only -- never persisted, never consulted by task transitions.
//! Grounded in the original prototype's use of a Redis key with `SETEX`
//! (an ephemeral, TTL-expiring store): this is the same idea without an
//! external cache dependency, since the registry's own entities are never
//! durable by design (`spec.md` §3, Worker's "weak view").

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default time-to-live for a heartbeat: 30 seconds (`spec.md` §4.5).
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// A live worker, as exposed by [`WorkerRegistry::list_live`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: String,
    pub last_seen: DateTime<Utc>,
}

/// In-memory TTL cache of worker heartbeats.
pub struct WorkerRegistry {
    ttl: Duration,
    workers: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl WorkerRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Upsert `worker_id` with `last_seen = now`.
    pub fn heartbeat(&self, worker_id: &str) {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        workers.insert(worker_id.to_string(), Utc::now());
    }

    /// All workers whose most recent heartbeat is within the TTL window,
    /// as of now. Expired entries are pruned as a side effect.
    pub fn list_live(&self) -> Vec<Worker> {
        let now = Utc::now();
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        workers.retain(|_, last_seen| {
            now.signed_duration_since(*last_seen).num_milliseconds() < self.ttl.as_millis() as i64
        });
        workers
            .iter()
            .map(|(worker_id, last_seen)| Worker {
                worker_id: worker_id.clone(),
                last_seen: *last_seen,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_then_list_live_returns_worker() {
        let registry = WorkerRegistry::default();
        registry.heartbeat("w1");
        let live = registry.list_live();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].worker_id, "w1");
    }

    #[test]
    fn expired_heartbeat_is_not_live() {
        let registry = WorkerRegistry::new(Duration::from_millis(10));
        registry.heartbeat("w1");
        std::thread::sleep(Duration::from_millis(30));
        assert!(registry.list_live().is_empty());
    }

    #[test]
    fn repeated_heartbeat_within_ttl_stays_idempotent() {
        let registry = WorkerRegistry::default();
        registry.heartbeat("w1");
        registry.heartbeat("w1");
        assert_eq!(registry.list_live().len(), 1);
    }
}
