//! Response cache for GET requests (spec §3 "Cache entry", §4.3 step 1/7).
//!
//! Keyed by a fingerprint of (method, service, path, body digest). TTL-only;
//! this spec deliberately does not require invalidation (§9 open question).
//! Capped at a configurable number of entries with LRU eviction; concurrent
//! writers for the same key race and last write wins (spec §5).

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

struct Entry {
    response: CachedResponse,
    expires_at: Instant,
}

/// Build the cache fingerprint for a request.
pub fn fingerprint(method: &str, service: &str, path: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"|");
    hasher.update(service.as_bytes());
    hasher.update(b"|");
    hasher.update(path.as_bytes());
    hasher.update(b"|");
    hasher.update(body);
    hex::encode(hasher.finalize())
}

pub struct ResponseCache {
    max_entries: usize,
    entries: Mutex<HashMap<String, Entry>>,
    order: Mutex<VecDeque<String>>,
}

impl ResponseCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: Mutex::new(HashMap::new()),
            order: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                let response = entry.response.clone();
                drop(entries);
                self.touch(key).await;
                Some(response)
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, key: String, response: CachedResponse, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.clone(),
            Entry {
                response,
                expires_at: Instant::now() + ttl,
            },
        );
        drop(entries);
        self.touch(key).await;
        self.evict_if_over_capacity().await;
    }

    async fn touch(&self, key: &str) {
        let mut order = self.order.lock().await;
        order.retain(|k| k != key);
        order.push_back(key.to_string());
    }

    async fn evict_if_over_capacity(&self) {
        let mut entries = self.entries.lock().await;
        let mut order = self.order.lock().await;
        while entries.len() > self.max_entries {
            if let Some(oldest) = order.pop_front() {
                entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_hits() {
        let cache = ResponseCache::new(10);
        let key = fingerprint("GET", "inventory-service", "/items/1", b"");
        cache
            .put(
                key.clone(),
                CachedResponse {
                    status: 200,
                    headers: vec![],
                    body: b"ok".to_vec(),
                },
                Duration::from_secs(60),
            )
            .await;
        let hit = cache.get(&key).await;
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn expired_entry_misses() {
        let cache = ResponseCache::new(10);
        let key = "k".to_string();
        cache
            .put(
                key.clone(),
                CachedResponse {
                    status: 200,
                    headers: vec![],
                    body: vec![],
                },
                Duration::from_millis(1),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn evicts_oldest_over_capacity() {
        let cache = ResponseCache::new(2);
        for i in 0..3 {
            cache
                .put(
                    format!("k{i}"),
                    CachedResponse {
                        status: 200,
                        headers: vec![],
                        body: vec![],
                    },
                    Duration::from_secs(60),
                )
                .await;
        }
        assert!(cache.get("k0").await.is_none());
        assert!(cache.get("k2").await.is_some());
    }
}
