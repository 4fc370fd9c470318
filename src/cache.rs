//! Response cache for the text chat flow.
//!
//! Keyed by a digest of (mode id, normalized query text) so trivial
//! punctuation/casing differences hit the same entry. Capacity-bounded with
//! oldest-timestamp eviction; entries expire on read after the TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use sha2::{Digest, Sha256};

/// A cached chat response: the full text plus any tool results, in order.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub response_text: String,
    pub tool_results: Vec<(String, Value)>,
}

struct CacheEntry {
    response: CachedResponse,
    inserted_at: Instant,
}

/// TTL + capacity-bounded response cache.
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
    ttl: Duration,
}

/// Normalize a query for cache lookup: lowercase, alphanumerics and
/// single-spaced words only ("What's my balance?" == "whats my balance").
pub fn normalize_query(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn cache_key(mode_id: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(mode_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(normalize_query(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

impl ResponseCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            ttl,
        }
    }

    /// Look up a cached response; expired entries are dropped and miss.
    pub fn get(&mut self, mode_id: &str, text: &str) -> Option<CachedResponse> {
        let key = cache_key(mode_id, text);
        match self.entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                Some(entry.response.clone())
            }
            Some(_) => {
                self.entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Insert a response, evicting the oldest entry first when at capacity.
    pub fn put(&mut self, mode_id: &str, text: &str, response: CachedResponse) {
        if self.capacity == 0 {
            return;
        }
        let key = cache_key(mode_id, text);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest_key) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest_key);
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                response,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
