//! Embedding backends, cosine similarity and the caller-owned similarity cache

use crate::config::{CacheConfig, EmbeddingConfig};
use crate::error::{CreditAlignerError, Result};
use log::debug;
use ndarray::Array2;
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use unicode_segmentation::UnicodeSegmentation;

/// Embedding collaborator: one fixed-length vector per input string.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}

/// Calculate cosine similarity between two embeddings.
///
/// Mismatched or empty inputs and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// Deterministic feature-hashing embedder (word unigrams plus character trigrams).
///
/// Needs no model files, so it is the default representation and the one
/// the test suite runs against.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

const WORD_WEIGHT: f32 = 2.0;
const TRIGRAM_WEIGHT: f32 = 1.0;

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();

        for word in lowered.unicode_words() {
            self.add_feature(&mut vector, word.as_bytes(), WORD_WEIGHT);

            let padded: Vec<char> = format!("#{}#", word).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, trigram.as_bytes(), TRIGRAM_WEIGHT);
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], bytes: &[u8], weight: f32) {
        let hash = fnv1a(bytes);
        let index = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Static Model2Vec embeddings
#[cfg(feature = "model2vec")]
pub struct Model2VecEmbedder {
    model: model2vec_rs::model::StaticModel,
    model_name: String,
}

#[cfg(feature = "model2vec")]
impl Model2VecEmbedder {
    /// Load from a local folder or a hub id
    pub fn load(model: &str) -> Result<Self> {
        let start_time = Instant::now();
        log::info!("Loading Model2Vec embedding model from: {}", model);

        let static_model = model2vec_rs::model::StaticModel::from_pretrained(
            model, None, // token
            None, // normalize
            None, // subfolder
        )
        .map_err(|e| CreditAlignerError::Embedding(format!("Failed to load model: {}", e)))?;

        log::info!("Model loaded in {:.2?}", start_time.elapsed());
        Ok(Self {
            model: static_model,
            model_name: model.to_string(),
        })
    }
}

#[cfg(feature = "model2vec")]
impl Embedder for Model2VecEmbedder {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.model.encode(texts))
    }
}

/// Embedding strategy, resolved once from a configured identifier
#[derive(Clone)]
pub enum EmbeddingBackend {
    Hashing(HashingEmbedder),
    #[cfg(feature = "model2vec")]
    Model2Vec(Arc<Model2VecEmbedder>),
    External(Arc<dyn Embedder>),
}

impl EmbeddingBackend {
    fn as_embedder(&self) -> &dyn Embedder {
        match self {
            EmbeddingBackend::Hashing(embedder) => embedder,
            #[cfg(feature = "model2vec")]
            EmbeddingBackend::Model2Vec(embedder) => embedder.as_ref(),
            EmbeddingBackend::External(embedder) => embedder.as_ref(),
        }
    }

    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.as_embedder().embed(texts)?;
        if vectors.len() != texts.len() {
            return Err(CreditAlignerError::Embedding(format!(
                "Embedder returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        self.as_embedder().similarity(a, b)
    }
}

impl fmt::Debug for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingBackend::Hashing(e) => write!(f, "Hashing({})", e.dimensions()),
            #[cfg(feature = "model2vec")]
            EmbeddingBackend::Model2Vec(e) => write!(f, "Model2Vec({})", e.name()),
            EmbeddingBackend::External(e) => write!(f, "External({})", e.name()),
        }
    }
}

/// Named embedding backends available to the grid search
#[derive(Debug, Clone, Default)]
pub struct EmbeddingRegistry {
    backends: BTreeMap<String, EmbeddingBackend>,
}

impl EmbeddingRegistry {
    /// Registry with the built-in backends for this configuration
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let mut registry = Self::default();
        registry.backends.insert(
            "hashing".to_string(),
            EmbeddingBackend::Hashing(HashingEmbedder::new(config.hashing_dimensions)),
        );

        #[cfg(feature = "model2vec")]
        if let Some(model) = &config.model2vec_model {
            let embedder = Model2VecEmbedder::load(model)?;
            registry.backends.insert(
                "model2vec".to_string(),
                EmbeddingBackend::Model2Vec(Arc::new(embedder)),
            );
        }

        #[cfg(not(feature = "model2vec"))]
        if config.model2vec_model.is_some() {
            log::warn!("model2vec_model is set but the crate was built without the model2vec feature");
        }

        Ok(registry)
    }

    /// Register a caller-provided embedder under a name
    pub fn register(&mut self, name: impl Into<String>, embedder: Arc<dyn Embedder>) {
        let name = name.into();
        debug!("Registering external embedder '{}'", name);
        self.backends
            .insert(name, EmbeddingBackend::External(embedder));
    }

    pub fn get(&self, name: &str) -> Option<&EmbeddingBackend> {
        self.backends.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    /// Resolve identifiers in order, failing on the first unknown one
    pub fn resolve(&self, names: &[String]) -> Result<Vec<(String, EmbeddingBackend)>> {
        names
            .iter()
            .map(|name| {
                self.backends
                    .get(name)
                    .cloned()
                    .map(|backend| (name.clone(), backend))
                    .ok_or_else(|| {
                        CreditAlignerError::Configuration(format!(
                            "Unknown embedding representation '{}' (available: {})",
                            name,
                            self.names().join(", ")
                        ))
                    })
            })
            .collect()
    }
}

/// One embedding representation of the texts under comparison, row per text
#[derive(Debug, Clone)]
pub struct RepresentationMatrix {
    pub name: String,
    pub matrix: Array2<f32>,
}

impl RepresentationMatrix {
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<f32>>) -> Result<Self> {
        let name = name.into();
        let n = rows.len();
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != dim) {
            return Err(CreditAlignerError::Embedding(format!(
                "Representation '{}' has rows of differing length",
                name
            )));
        }
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        let matrix = Array2::from_shape_vec((n, dim), flat)
            .map_err(|e| CreditAlignerError::Embedding(e.to_string()))?;
        Ok(Self { name, matrix })
    }

    pub fn row(&self, index: usize) -> Vec<f32> {
        self.matrix.row(index).to_vec()
    }

    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.nrows() == 0
    }

    pub fn dim(&self) -> usize {
        self.matrix.ncols()
    }
}

/// One side of a cached pair: the text and a fingerprint of its vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheItem<'a> {
    pub text: &'a str,
    /// Zero when the caller does not distinguish vectors
    pub content: u64,
}

impl<'a> CacheItem<'a> {
    pub fn new(text: &'a str, vector: &[f32]) -> Self {
        Self {
            text,
            content: content_hash(vector),
        }
    }
}

impl<'a> From<&'a str> for CacheItem<'a> {
    fn from(text: &'a str) -> Self {
        Self { text, content: 0 }
    }
}

/// Fingerprint of a vector's exact bit pattern
pub fn content_hash<'v>(vector: impl IntoIterator<Item = &'v f32>) -> u64 {
    let mut hasher = DefaultHasher::new();
    let mut len = 0usize;
    for value in vector {
        value.to_bits().hash(&mut hasher);
        len += 1;
    }
    len.hash(&mut hasher);
    hasher.finish()
}

type CacheKey = (String, (String, u64), (String, u64));

struct CacheInner {
    entries: HashMap<CacheKey, (f32, Instant)>,
    order: VecDeque<CacheKey>,
}

/// Pairwise similarity cache owned by the caller and shared across comparisons.
///
/// Keys are `(representation, item, item)` with the item pair order-normalised;
/// an item is a text plus the fingerprint of the vector it was embedded as.
/// Oldest entries are evicted first once `max_entries` is reached; entries
/// older than the TTL are treated as misses.
pub struct SimilarityCache {
    inner: RwLock<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    max_entries: usize,
    ttl: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl SimilarityCache {
    pub fn new(max_entries: usize, ttl: Option<Duration>) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl_secs.map(Duration::from_secs))
    }

    fn key(representation: &str, a: CacheItem<'_>, b: CacheItem<'_>) -> CacheKey {
        let (first, second) = if (a.text, a.content) <= (b.text, b.content) {
            (a, b)
        } else {
            (b, a)
        };
        (
            representation.to_string(),
            (first.text.to_string(), first.content),
            (second.text.to_string(), second.content),
        )
    }

    pub fn get<'a>(
        &self,
        representation: &str,
        a: impl Into<CacheItem<'a>>,
        b: impl Into<CacheItem<'a>>,
    ) -> Option<f32> {
        let key = Self::key(representation, a.into(), b.into());
        let found = self.inner.read().entries.get(&key).and_then(|(value, stored_at)| {
            match self.ttl {
                Some(ttl) if stored_at.elapsed() > ttl => None,
                _ => Some(*value),
            }
        });

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert<'a>(
        &self,
        representation: &str,
        a: impl Into<CacheItem<'a>>,
        b: impl Into<CacheItem<'a>>,
        value: f32,
    ) {
        let key = Self::key(representation, a.into(), b.into());
        let mut inner = self.inner.write();

        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        }
        while inner.entries.len() >= self.max_entries {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, (value, Instant::now()));
    }

    /// Cached similarity, computing and storing it on a miss
    pub fn get_or_compute<'a, F>(
        &self,
        representation: &str,
        a: impl Into<CacheItem<'a>>,
        b: impl Into<CacheItem<'a>>,
        compute: F,
    ) -> f32
    where
        F: FnOnce() -> f32,
    {
        let (a, b) = (a.into(), b.into());
        if let Some(value) = self.get(representation, a, b) {
            return value;
        }
        let value = compute();
        self.insert(representation, a, b, value);
        value
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.inner.read().entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Clear the similarity cache
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.order.clear();
    }
}

impl Default for SimilarityCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(128);
        let a = embedder.embed_one("network configuration");
        let b = embedder.embed_one("Network Configuration");
        assert_eq!(a.len(), 128);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_separates_unrelated_text() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed_one("bricklaying");
        let b = embedder.embed_one("quantum chromodynamics");
        let c = embedder.embed_one("bricklaying techniques");
        assert!(cosine_similarity(&a, &c) > cosine_similarity(&a, &b));
    }

    #[test]
    fn test_registry_rejects_unknown_identifier() {
        let registry = EmbeddingRegistry::from_config(&EmbeddingConfig::default()).unwrap();
        assert!(registry.resolve(&["hashing".to_string()]).is_ok());
        assert!(matches!(
            registry.resolve(&["word2vec".to_string()]),
            Err(CreditAlignerError::Configuration(_))
        ));
    }

    #[test]
    fn test_registry_accepts_external_embedder() {
        let mut registry = EmbeddingRegistry::from_config(&EmbeddingConfig::default()).unwrap();
        registry.register("small-hash", Arc::new(HashingEmbedder::new(32)));
        let resolved = registry.resolve(&["small-hash".to_string()]).unwrap();
        let vectors = resolved[0].1.embed(&["abc".to_string()]).unwrap();
        assert_eq!(vectors[0].len(), 32);
    }

    #[test]
    fn test_representation_matrix_rejects_ragged_rows() {
        assert!(RepresentationMatrix::from_rows("x", vec![vec![1.0, 2.0], vec![1.0]]).is_err());
        let m = RepresentationMatrix::from_rows("x", vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.dim(), 2);
        assert_eq!(m.row(1), vec![3.0, 4.0]);
    }

    #[test]
    fn test_cache_pair_order_and_eviction() {
        let cache = SimilarityCache::new(2, None);
        cache.insert("hashing", "b", "a", 0.5);
        assert_eq!(cache.get("hashing", "a", "b"), Some(0.5));
        assert_eq!(cache.get("other", "a", "b"), None);

        cache.insert("hashing", "c", "d", 0.1);
        cache.insert("hashing", "e", "f", 0.2);
        assert_eq!(cache.get("hashing", "a", "b"), None);
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_cache_ttl_expiry() {
        let cache = SimilarityCache::new(10, Some(Duration::from_millis(0)));
        cache.insert("hashing", "a", "b", 0.9);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("hashing", "a", "b"), None);
    }

    #[test]
    fn test_cache_separates_vectors_under_one_name() {
        let cache = SimilarityCache::default();
        let (x1, y1) = ([1.0, 0.0], [0.0, 1.0]);
        let x2 = [0.6, 0.8];

        let first = cache.get_or_compute(
            "custom",
            CacheItem::new("x", &x1),
            CacheItem::new("y", &y1),
            || cosine_similarity(&x1, &y1),
        );
        let second = cache.get_or_compute(
            "custom",
            CacheItem::new("x", &x2),
            CacheItem::new("y", &y1),
            || cosine_similarity(&x2, &y1),
        );
        assert!(first.abs() < 1e-6);
        assert!((second - 0.8).abs() < 1e-6);
        assert_eq!(cache.stats().misses, 2);

        let again = cache.get("custom", CacheItem::new("y", &y1), CacheItem::new("x", &x2));
        assert_eq!(again, Some(second));
    }

    #[test]
    fn test_concurrent_lookups_count_every_hit() {
        let cache = Arc::new(SimilarityCache::default());
        cache.insert("hashing", "a", "b", 0.4);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(cache.get("hashing", "a", "b"), Some(0.4));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.stats().hits, 400);
    }

    #[test]
    fn test_get_or_compute_counts_hits() {
        let cache = SimilarityCache::default();
        let first = cache.get_or_compute("hashing", "x", "y", || 0.3);
        let second = cache.get_or_compute("hashing", "y", "x", || 0.9);
        assert_eq!(first, 0.3);
        assert_eq!(second, 0.3);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
