//! Request deduplication
//!
//! Wraps remote calls with a cache lookup keyed on a fingerprint of
//! (operation, actor, normalized parameters). Identical requests issued
//! while a prior result remains cached never re-invoke the remote call —
//! a deliberate staleness-for-cost tradeoff. There is no explicit
//! invalidation; staleness is bounded only by LRU eviction.

use crate::cache::BoundedCache;
use crate::services::ServiceError;
use sha2::{Digest, Sha256};
use std::future::Future;
use tokio::sync::Mutex;
use tracing::debug;

/// Computes a collision-resistant fingerprint for a request.
///
/// Deterministic and order-independent over `params`: the pairs are sorted
/// by key before hashing, so callers don't need to agree on an order.
#[must_use]
pub fn fingerprint(operation: &str, actor_id: i64, params: &[(&str, &str)]) -> String {
    let mut sorted: Vec<(&str, &str)> = params.to_vec();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(actor_id.to_string().as_bytes());
    for (key, value) in sorted {
        hasher.update(b"\x1f");
        hasher.update(key.as_bytes());
        hasher.update(b"\x1e");
        hasher.update(value.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Cache-backed wrapper around a remote call.
///
/// Owns one [`BoundedCache`] instance; each subsystem constructs its own
/// deduper, so caches are never shared across services.
pub struct RequestDeduper {
    name: &'static str,
    cache: Mutex<BoundedCache>,
}

impl RequestDeduper {
    /// Creates a deduper with its own cache of `capacity` entries.
    /// `name` only labels log lines.
    #[must_use]
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            cache: Mutex::new(BoundedCache::new(capacity)),
        }
    }

    /// Runs `remote_call` unless an identical request is already cached.
    ///
    /// On a hit the cached value is returned with no remote call and no
    /// side effects. On a miss the call runs; success is cached before
    /// returning, failure is returned uncached.
    ///
    /// # Errors
    ///
    /// Propagates the error from `remote_call`.
    pub async fn execute<F, Fut>(
        &self,
        operation: &str,
        actor_id: i64,
        params: &[(&str, &str)],
        remote_call: F,
    ) -> Result<String, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ServiceError>>,
    {
        self.execute_if(operation, actor_id, params, |_| true, remote_call)
            .await
    }

    /// Like [`execute`](Self::execute), but a cached value is only served
    /// when `still_valid` accepts it. Media services use this to drop
    /// entries whose artifact file was deleted from disk — the cache holds
    /// a weak path reference, not ownership.
    ///
    /// # Errors
    ///
    /// Propagates the error from `remote_call`.
    pub async fn execute_if<V, F, Fut>(
        &self,
        operation: &str,
        actor_id: i64,
        params: &[(&str, &str)],
        still_valid: V,
        remote_call: F,
    ) -> Result<String, ServiceError>
    where
        V: Fn(&str) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ServiceError>>,
    {
        let key = fingerprint(operation, actor_id, params);

        {
            let mut cache = self.cache.lock().await;
            if let Some(value) = cache.get(&key) {
                if still_valid(&value) {
                    debug!(cache = self.name, operation, actor_id, "cache hit");
                    return Ok(value);
                }
                debug!(cache = self.name, operation, "stale cache entry dropped");
                cache.invalidate(&key);
            }
        }

        // Lock released while the remote call runs
        let value = remote_call().await?;
        self.cache.lock().await.set(&key, value.clone());
        Ok(value)
    }

    /// Drops every cached entry.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn fingerprint_is_order_independent() {
        let a = fingerprint("img", 7, &[("prompt", "fox"), ("seed", "3")]);
        let b = fingerprint("img", 7, &[("seed", "3"), ("prompt", "fox")]);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_separates_operations_and_actors() {
        let base = fingerprint("img", 7, &[("prompt", "fox")]);
        assert_ne!(base, fingerprint("vid", 7, &[("prompt", "fox")]));
        assert_ne!(base, fingerprint("img", 8, &[("prompt", "fox")]));
        assert_ne!(base, fingerprint("img", 7, &[("prompt", "wolf")]));
    }

    #[tokio::test]
    async fn second_identical_request_skips_remote_call() {
        let deduper = RequestDeduper::new("test", 10);
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let result = deduper
                .execute("chat", 1, &[("prompt", "hi")], || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("answer".to_string())
                })
                .await;
            assert_eq!(result.ok(), Some("answer".to_string()));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let deduper = RequestDeduper::new("test", 10);
        let calls = AtomicU32::new(0);

        let first = deduper
            .execute("chat", 1, &[("prompt", "hi")], || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Network("down".to_string()))
            })
            .await;
        assert!(first.is_err());

        let second = deduper
            .execute("chat", 1, &[("prompt", "hi")], || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("recovered".to_string())
            })
            .await;
        assert_eq!(second.ok(), Some("recovered".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_cached_value_triggers_refetch() {
        let deduper = RequestDeduper::new("test", 10);
        deduper
            .execute("img", 1, &[("prompt", "fox")], || async {
                Ok("gone.png".to_string())
            })
            .await
            .expect("seed call");

        let result = deduper
            .execute_if(
                "img",
                1,
                &[("prompt", "fox")],
                |path| path != "gone.png",
                || async { Ok("fresh.png".to_string()) },
            )
            .await;
        assert_eq!(result.ok(), Some("fresh.png".to_string()));
    }
}
