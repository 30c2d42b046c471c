//! Content-addressed response cache and a prefix-KV cache, both process-local.
//! The source treats the semantic cache as process-wide but never
//! synchronises it across processes, so neither do we.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex as AsyncMutex;

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A cached LLM response, optionally carrying an opaque KV artefact handle
/// for provider-side prefix reuse.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub response: String,
    pub kv_handle: Option<String>,
}

struct SemanticCacheState {
    entries: BTreeMap<String, CachedResponse>,
    order: VecDeque<String>,
    hits: u64,
}

/// Keyed by SHA-256 of the full prompt text. Evicts least-recently-inserted
/// entries once `max_entries` is exceeded.
pub struct SemanticCache {
    max_entries: usize,
    state: std::sync::Mutex<SemanticCacheState>,
    inflight: std::sync::Mutex<BTreeMap<String, Arc<AsyncMutex<()>>>>,
}

impl SemanticCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            state: std::sync::Mutex::new(SemanticCacheState {
                entries: BTreeMap::new(),
                order: VecDeque::new(),
                hits: 0,
            }),
            inflight: std::sync::Mutex::new(BTreeMap::new()),
        }
    }

    pub fn fingerprint(prompt: &str) -> String {
        sha256_hex(prompt)
    }

    pub fn get(&self, prompt: &str) -> Option<CachedResponse> {
        let fingerprint = Self::fingerprint(prompt);
        let mut state = self.state.lock().unwrap();
        let hit = state.entries.get(&fingerprint).cloned();
        if hit.is_some() {
            state.hits += 1;
        }
        hit
    }

    pub fn insert(&self, prompt: &str, value: CachedResponse) {
        let fingerprint = Self::fingerprint(prompt);
        let mut state = self.state.lock().unwrap();
        if !state.entries.contains_key(&fingerprint) {
            state.order.push_back(fingerprint.clone());
        }
        state.entries.insert(fingerprint, value);

        while state.entries.len() > self.max_entries {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    pub fn hits(&self) -> u64 {
        self.state.lock().unwrap().hits
    }

    /// Per-fingerprint async mutex: concurrent `cached_call_llm` calls for
    /// the same prompt serialize here, so the second caller observes the
    /// first's cache write instead of triggering a duplicate LLM call.
    /// This is a single-flight guarantee within one process only.
    pub fn lock_for(&self, prompt: &str) -> Arc<AsyncMutex<()>> {
        let fingerprint = Self::fingerprint(prompt);
        let mut inflight = self.inflight.lock().unwrap();
        inflight.entry(fingerprint).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

struct PrefixCacheState {
    entries: BTreeMap<String, String>,
    order: VecDeque<String>,
}

/// Keyed by SHA-256 of the first `n_tokens` whitespace-separated tokens of a
/// prompt, value is an opaque provider KV-artefact handle.
pub struct PrefixCache {
    max_entries: usize,
    state: std::sync::Mutex<PrefixCacheState>,
}

impl PrefixCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            state: std::sync::Mutex::new(PrefixCacheState {
                entries: BTreeMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn fingerprint(prompt: &str, n_tokens: usize) -> String {
        let prefix: Vec<&str> = prompt.split_whitespace().take(n_tokens).collect();
        sha256_hex(&prefix.join(" "))
    }

    pub fn get(&self, prompt: &str, n_tokens: usize) -> Option<String> {
        let fingerprint = Self::fingerprint(prompt, n_tokens);
        self.state.lock().unwrap().entries.get(&fingerprint).cloned()
    }

    pub fn insert(&self, prompt: &str, n_tokens: usize, kv_handle: String) {
        let fingerprint = Self::fingerprint(prompt, n_tokens);
        let mut state = self.state.lock().unwrap();
        if !state.entries.contains_key(&fingerprint) {
            state.order.push_back(fingerprint.clone());
        }
        state.entries.insert(fingerprint, kv_handle);

        while state.entries.len() > self.max_entries {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_cache_hits_after_insert() {
        let cache = SemanticCache::new(4);
        assert!(cache.get("hello").is_none());
        cache.insert(
            "hello",
            CachedResponse {
                response: "world".into(),
                kv_handle: None,
            },
        );
        let hit = cache.get("hello").unwrap();
        assert_eq!(hit.response, "world");
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn semantic_cache_evicts_oldest_beyond_capacity() {
        let cache = SemanticCache::new(2);
        for prompt in ["a", "b", "c"] {
            cache.insert(
                prompt,
                CachedResponse {
                    response: prompt.to_string(),
                    kv_handle: None,
                },
            );
        }
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn prefix_cache_fingerprints_only_first_n_tokens() {
        let fp_a = PrefixCache::fingerprint("one two three four", 2);
        let fp_b = PrefixCache::fingerprint("one two five six", 2);
        assert_eq!(fp_a, fp_b);
    }
}
