//! Keyed caches with per-entry expiry and single-flight computation.
//!
//! The token cache measures an entry's lifetime from its creation, with a
//! TTL taken from the value itself; the subsystem cache measures it from the
//! most recent read with a fixed TTL. The two policies are deliberately
//! distinct and must not be unified.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::GatewayResult;

/// When an entry's age is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// TTL counted from entry creation, unaffected by reads.
    FromCreation,
    /// TTL counted from the most recent read.
    FromLastAccess,
}

struct Entry<V> {
    value: V,
    ttl: Option<Duration>,
    stamp: Instant,
}

type Slot<V> = Arc<tokio::sync::Mutex<Option<Entry<V>>>>;

/// Concurrent keyed cache. At most one computation runs per key at a time:
/// concurrent callers for the same key await the in-flight supplier instead
/// of invoking their own.
pub struct ExpiringCache<K, V> {
    policy: ExpiryPolicy,
    ttl_of: Box<dyn Fn(&V) -> Option<Duration> + Send + Sync>,
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Cache whose entries expire a value-dependent TTL after creation.
    /// A `None` TTL marks the entry as immediately expired, so such values
    /// are recomputed on every access.
    pub fn from_creation<F>(ttl_of: F) -> Self
    where
        F: Fn(&V) -> Option<Duration> + Send + Sync + 'static,
    {
        Self {
            policy: ExpiryPolicy::FromCreation,
            ttl_of: Box::new(ttl_of),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Cache whose entries expire a fixed TTL after the last read.
    pub fn from_last_access(ttl: Duration) -> Self {
        Self {
            policy: ExpiryPolicy::FromLastAccess,
            ttl_of: Box::new(move |_| Some(ttl)),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }

    /// Return the live cached value for `key`, or run `compute` to produce
    /// and store a fresh one. Supplier errors are not cached.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> GatewayResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<V>>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            slots.entry(key).or_default().clone()
        };

        let mut guard = slot.lock().await;
        if let Some(entry) = guard.as_mut() {
            let now = Instant::now();
            let live = entry
                .ttl
                .map(|ttl| now.duration_since(entry.stamp) < ttl)
                .unwrap_or(false);
            if live {
                if self.policy == ExpiryPolicy::FromLastAccess {
                    entry.stamp = now;
                }
                return Ok(entry.value.clone());
            }
        }

        let value = compute().await?;
        *guard = Some(Entry {
            ttl: (self.ttl_of)(&value),
            stamp: Instant::now(),
            value: value.clone(),
        });
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_supplier(
        counter: Arc<AtomicUsize>,
        value: &'static str,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = GatewayResult<String>> + Send>> {
        move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(value.to_string())
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_creation_ttl_expires_independent_of_reads() {
        let cache: ExpiringCache<String, String> =
            ExpiringCache::from_creation(|_| Some(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let supplier = counting_supplier(calls.clone(), "token");
        cache.get_or_compute("k".to_string(), &supplier).await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;
        cache.get_or_compute("k".to_string(), &supplier).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // reads do not extend a creation-based TTL
        tokio::time::advance(Duration::from_secs(15)).await;
        cache.get_or_compute("k".to_string(), &supplier).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_ttl_means_no_caching() {
        let cache: ExpiringCache<String, String> = ExpiringCache::from_creation(|_| None);
        let calls = Arc::new(AtomicUsize::new(0));
        let supplier = counting_supplier(calls.clone(), "token");

        cache.get_or_compute("k".to_string(), &supplier).await.unwrap();
        cache.get_or_compute("k".to_string(), &supplier).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_access_ttl_is_refreshed_by_reads() {
        let cache: ExpiringCache<String, String> =
            ExpiringCache::from_last_access(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let supplier = counting_supplier(calls.clone(), "subsystem");

        cache.get_or_compute("k".to_string(), &supplier).await.unwrap();
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(45)).await;
            cache.get_or_compute("k".to_string(), &supplier).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        cache.get_or_compute("k".to_string(), &supplier).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_flight_per_key() {
        let cache: Arc<ExpiringCache<String, String>> =
            Arc::new(ExpiringCache::from_creation(|_| Some(Duration::from_secs(60))));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_compute("k".to_string(), || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok("token".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), "token");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_supplier_errors_are_not_cached() {
        let cache: ExpiringCache<String, String> =
            ExpiringCache::from_creation(|_| Some(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let result = cache
            .get_or_compute("k".to_string(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(crate::error::GatewayError::General("boom".into()))
            })
            .await;
        assert!(result.is_err());

        let calls_after = calls.clone();
        cache
            .get_or_compute("k".to_string(), || async {
                calls_after.fetch_add(1, Ordering::SeqCst);
                Ok("token".to_string())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
