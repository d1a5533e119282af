//! Semantic response cache keyed by embedding similarity.
//!
//! Lookups embed the query and compare it against stored entries by
//! cosine similarity, so paraphrased repeats of an earlier question can
//! hit without an exact text match. Entries expire by TTL; capacity
//! overflow keeps the most-hit entries, not the most recent ones.

mod embed;

pub use embed::{Embedder, EmbedderConfig, HttpEmbedder};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Minimum cosine similarity for a hit, in `[0, 1]`.
    pub similarity_threshold: f32,
    pub max_entries: usize,
    pub ttl_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.95,
            max_entries: 1000,
            ttl_hours: 24,
        }
    }
}

/// One cached query/response pair.
#[derive(Debug, Clone)]
struct CacheEntry {
    #[allow(dead_code)]
    query: String,
    embedding: Vec<f32>,
    response: String,
    timestamp: DateTime<Utc>,
    hits: u64,
}

/// Snapshot of cache state for analytics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_entries: usize,
    pub total_hits: u64,
    pub avg_hits: f64,
    pub similarity_threshold: f32,
    pub ttl_hours: i64,
    pub enabled: bool,
}

/// Embedding-keyed response cache with TTL and frequency-based eviction.
///
/// Without an embedder the cache is a first-class disabled mode: every
/// `get` misses and every `put` is a no-op. That is configuration, not an
/// error path.
pub struct SemanticCache {
    config: CacheConfig,
    entries: Vec<CacheEntry>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl SemanticCache {
    pub fn new(config: CacheConfig, embedder: Option<Arc<dyn Embedder>>) -> Self {
        if embedder.is_none() {
            tracing::warn!("no embedder configured, semantic cache disabled (always-miss)");
        }
        Self {
            config,
            entries: Vec::new(),
            embedder,
        }
    }

    pub fn enabled(&self) -> bool {
        self.embedder.is_some()
    }

    /// Look up a response for a semantically similar earlier query.
    ///
    /// Expired entries are pruned first; among survivors the highest
    /// similarity at or above the threshold wins and its hit counter is
    /// incremented.
    pub async fn get(&mut self, query: &str) -> Option<String> {
        let embedder = self.embedder.clone()?;
        self.prune();

        let query_embedding = match embedder.embed(query).await {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("embedding failed, treating as cache miss: {}", e);
                return None;
            }
        };

        let mut best: Option<(usize, f32)> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            let similarity = cosine_similarity(&query_embedding, &entry.embedding);
            if similarity >= self.config.similarity_threshold
                && best.map_or(true, |(_, s)| similarity > s)
            {
                best = Some((idx, similarity));
            }
        }

        if let Some((idx, similarity)) = best {
            let entry = &mut self.entries[idx];
            entry.hits += 1;
            tracing::info!(
                "semantic cache hit (similarity {:.3}, {} hits)",
                similarity,
                entry.hits
            );
            return Some(entry.response.clone());
        }

        tracing::debug!("semantic cache miss");
        None
    }

    /// Store a response. No deduplication: repeated misses on similar
    /// queries create multiple entries.
    pub async fn put(&mut self, query: &str, response: &str) {
        let Some(embedder) = self.embedder.clone() else {
            return;
        };
        let embedding = match embedder.embed(query).await {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("embedding failed, skipping cache store: {}", e);
                return;
            }
        };
        self.entries.push(CacheEntry {
            query: query.to_string(),
            embedding,
            response: response.to_string(),
            timestamp: Utc::now(),
            hits: 0,
        });
        self.prune();
        tracing::debug!("cached response ({} entries)", self.entries.len());
    }

    /// Drop expired entries, then enforce capacity keeping the most-hit
    /// entries.
    fn prune(&mut self) {
        let ttl = Duration::hours(self.config.ttl_hours);
        let now = Utc::now();
        self.entries.retain(|e| now - e.timestamp < ttl);

        if self.entries.len() > self.config.max_entries {
            self.entries.sort_by(|a, b| b.hits.cmp(&a.hits));
            self.entries.truncate(self.config.max_entries);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let total_hits: u64 = self.entries.iter().map(|e| e.hits).sum();
        let avg_hits = if self.entries.is_empty() {
            0.0
        } else {
            total_hits as f64 / self.entries.len() as f64
        };
        CacheStats {
            size: self.entries.len(),
            max_entries: self.config.max_entries,
            total_hits,
            avg_hits,
            similarity_threshold: self.config.similarity_threshold,
            ttl_hours: self.config.ttl_hours,
            enabled: self.enabled(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        tracing::info!("semantic cache cleared");
    }

    /// Age every entry, standing in for elapsed wall-clock time.
    #[cfg(test)]
    fn age_entries(&mut self, hours: i64) {
        for entry in &mut self.entries {
            entry.timestamp -= Duration::hours(hours);
        }
    }

    /// Set hit counters directly, for eviction-order tests.
    #[cfg(test)]
    fn set_hits(&mut self, hits: &[u64]) {
        for (entry, &h) in self.entries.iter_mut().zip(hits) {
            entry.hits = h;
        }
    }
}

/// Cosine similarity; zero-norm vectors compare as 0 rather than NaN.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    use crate::error::ProviderError;

    /// Embedder returning canned vectors per query.
    struct StubEmbedder {
        vectors: HashMap<String, Vec<f32>>,
    }

    impl StubEmbedder {
        fn new(pairs: &[(&str, &[f32])]) -> Arc<Self> {
            Arc::new(Self {
                vectors: pairs
                    .iter()
                    .map(|(q, v)| (q.to_string(), v.to_vec()))
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.vectors
                .get(text)
                .cloned()
                .ok_or_else(|| ProviderError::Parse(format!("no stub vector for {text:?}")))
        }
    }

    fn cache_with(
        embedder: Arc<StubEmbedder>,
        threshold: f32,
        max_entries: usize,
    ) -> SemanticCache {
        SemanticCache::new(
            CacheConfig {
                similarity_threshold: threshold,
                max_entries,
                ttl_hours: 24,
            },
            Some(embedder),
        )
    }

    #[tokio::test]
    async fn test_identical_query_hits() {
        let embedder = StubEmbedder::new(&[("what is rust", &[1.0, 0.0, 0.0])]);
        let mut cache = cache_with(embedder, 0.95, 10);

        cache.put("what is rust", "a systems language").await;
        let hit = cache.get("what is rust").await;
        assert_eq!(hit.as_deref(), Some("a systems language"));
        assert_eq!(cache.stats().total_hits, 1);
    }

    #[tokio::test]
    async fn test_similar_query_hits_dissimilar_misses() {
        let embedder = StubEmbedder::new(&[
            ("what is rust", &[1.0, 0.0]),
            ("tell me about rust", &[0.999, 0.04]),
            ("pasta recipe", &[0.0, 1.0]),
        ]);
        let mut cache = cache_with(embedder, 0.95, 10);
        cache.put("what is rust", "a systems language").await;

        assert_eq!(
            cache.get("tell me about rust").await.as_deref(),
            Some("a systems language")
        );
        assert_eq!(cache.get("pasta recipe").await, None);
    }

    #[tokio::test]
    async fn test_best_match_wins() {
        let embedder = StubEmbedder::new(&[
            ("a", &[1.0, 0.0]),
            ("b", &[0.98, 0.199]),
            ("query", &[0.999, 0.045]),
        ]);
        let mut cache = cache_with(embedder, 0.9, 10);
        cache.put("b", "response b").await;
        cache.put("a", "response a").await;

        // Both clear the threshold; the higher similarity is returned.
        assert_eq!(cache.get("query").await.as_deref(), Some("response a"));
    }

    #[tokio::test]
    async fn test_expired_entries_never_returned() {
        let embedder = StubEmbedder::new(&[("q", &[1.0, 0.0])]);
        let mut cache = cache_with(embedder, 0.95, 10);
        cache.put("q", "stale").await;
        cache.age_entries(25);

        // Similarity would be 1.0, but the entry is past TTL.
        assert_eq!(cache.get("q").await, None);
        assert_eq!(cache.stats().size, 0);
    }

    #[tokio::test]
    async fn test_capacity_eviction_keeps_most_hit() {
        let embedder = StubEmbedder::new(&[
            ("a", &[1.0, 0.0, 0.0]),
            ("b", &[0.0, 1.0, 0.0]),
            ("c", &[0.0, 0.0, 1.0]),
        ]);
        let mut cache = cache_with(embedder, 0.95, 2);
        cache.put("a", "ra").await;
        cache.put("b", "rb").await;
        cache.set_hits(&[5, 1]);

        // Third entry overflows capacity; the least-hit entry (the fresh
        // zero-hit one) goes.
        cache.put("c", "rc").await;
        assert_eq!(cache.stats().size, 2);
        assert_eq!(cache.get("a").await.as_deref(), Some("ra"));
        assert_eq!(cache.get("b").await.as_deref(), Some("rb"));
        assert_eq!(cache.get("c").await, None);
    }

    #[tokio::test]
    async fn test_no_dedup_on_put() {
        let embedder = StubEmbedder::new(&[("q", &[1.0])]);
        let mut cache = cache_with(embedder, 0.95, 10);
        cache.put("q", "first").await;
        cache.put("q", "second").await;
        assert_eq!(cache.stats().size, 2);
    }

    #[tokio::test]
    async fn test_disabled_mode_misses_and_noops() {
        let mut cache = SemanticCache::new(CacheConfig::default(), None);
        assert!(!cache.enabled());
        cache.put("q", "r").await;
        assert_eq!(cache.get("q").await, None);
        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert!(!stats.enabled);
    }

    #[tokio::test]
    async fn test_clear() {
        let embedder = StubEmbedder::new(&[("q", &[1.0])]);
        let mut cache = cache_with(embedder, 0.95, 10);
        cache.put("q", "r").await;
        cache.clear();
        assert_eq!(cache.stats().size, 0);
        assert_eq!(cache.get("q").await, None);
    }

    #[test]
    fn test_cosine_similarity_zero_norm() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }
}
