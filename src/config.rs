//! Configuration management for the credit aligner

use crate::error::{CreditAlignerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub clustering: ClusteringConfig,
    pub matching: MatchingConfig,
    pub scoring: ScoringConfig,
    pub edge_cases: EdgeCaseConfig,
    pub ensemble: EnsembleConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Dimensionality of the built-in hashing embedder
    pub hashing_dimensions: usize,
    /// Local folder or hub id of a Model2Vec model (only with the `model2vec` feature)
    pub model2vec_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Embedding representation identifiers tried by the grid search
    pub embeddings: Vec<String>,
    /// Clustering algorithm identifiers tried by the grid search
    pub algorithms: Vec<String>,
    pub min_valid_skills: usize,
    pub max_clusters: usize,
    pub reduce_above_dim: usize,
    pub target_dim: usize,
    pub silhouette_sample_size: usize,
    pub seed: u64,
    pub kmeans_n_init: usize,
    pub estimation_n_init: usize,
    pub max_iterations: usize,
    pub stability_fraction: f32,
    pub parallel: bool,
    /// Clusters whose mean pairwise similarity falls below this are not match candidates
    pub min_cluster_similarity: f32,
    pub quality_weights: QualityWeights,
}

/// Weights of the composite clustering-quality score
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub silhouette: f32,
    pub separation: f32,
    pub balance: f32,
    pub coherence: f32,
    pub stability: f32,
    pub size_penalty: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub level_weight: f32,
    pub accept_level_alignment: f32,
    pub split_level_compatibility: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ComponentWeights,
    pub penalties: PenaltyMagnitudes,
    pub context_imbalance_trigger: f32,
    pub major_level_gap: f32,
    pub minor_level_gap: f32,
    pub max_size_ratio: f32,
    pub min_size_ratio: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentWeights {
    pub coverage: f32,
    pub quality: f32,
    pub level: f32,
    pub context: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyMagnitudes {
    pub context_imbalance: f32,
    pub outdated_content: f32,
    pub missing_prerequisites: f32,
    pub major_level_gap: f32,
    pub minor_level_gap: f32,
    pub excessive_size_mismatch: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeCaseConfig {
    pub context_gap_threshold: f32,
    pub hours_per_credit_point: f32,
    pub insufficient_hours_ratio: f32,
    pub excessive_hours_ratio: f32,
    pub granularity_ratio: f32,
    pub combination_coverage_threshold: f32,
    pub max_combination_size: usize,
    pub lexical_similarity_threshold: f32,
    /// Source mean level must reach this share of the target mean
    pub depth_adequacy_ratio: f32,
    pub insufficient_breadth_ratio: f32,
    pub broad_breadth_ratio: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub runs: usize,
    pub similarity_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl_secs: Option<u64>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            hashing_dimensions: 256,
            model2vec_model: None,
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            embeddings: vec!["hashing".to_string()],
            algorithms: vec![
                "kmeans".to_string(),
                "gmm".to_string(),
                "agglomerative".to_string(),
            ],
            min_valid_skills: 10,
            max_clusters: 50,
            reduce_above_dim: 512,
            target_dim: 100,
            silhouette_sample_size: 2000,
            seed: 42,
            kmeans_n_init: 10,
            estimation_n_init: 5,
            max_iterations: 300,
            stability_fraction: 0.8,
            parallel: true,
            min_cluster_similarity: 0.45,
            quality_weights: QualityWeights::default(),
        }
    }
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            silhouette: 0.25,
            separation: 0.20,
            balance: 0.15,
            coherence: 0.15,
            stability: 0.10,
            size_penalty: 0.15,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            level_weight: 0.3,
            accept_level_alignment: 0.5,
            split_level_compatibility: 0.4,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ComponentWeights::default(),
            penalties: PenaltyMagnitudes::default(),
            context_imbalance_trigger: 0.4,
            major_level_gap: 2.0,
            minor_level_gap: 1.0,
            max_size_ratio: 2.5,
            min_size_ratio: 0.4,
        }
    }
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            coverage: 0.40,
            quality: 0.25,
            level: 0.20,
            context: 0.10,
            confidence: 0.05,
        }
    }
}

impl Default for PenaltyMagnitudes {
    fn default() -> Self {
        Self {
            context_imbalance: 0.15,
            outdated_content: 0.25,
            missing_prerequisites: 0.30,
            major_level_gap: 0.20,
            minor_level_gap: 0.05,
            excessive_size_mismatch: 0.10,
        }
    }
}

impl Default for EdgeCaseConfig {
    fn default() -> Self {
        Self {
            context_gap_threshold: 0.3,
            hours_per_credit_point: 12.5,
            insufficient_hours_ratio: 0.7,
            excessive_hours_ratio: 1.5,
            granularity_ratio: 1.5,
            combination_coverage_threshold: 0.7,
            max_combination_size: 3,
            lexical_similarity_threshold: 0.7,
            depth_adequacy_ratio: 0.8,
            insufficient_breadth_ratio: 0.7,
            broad_breadth_ratio: 1.5,
        }
    }
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            runs: 3,
            similarity_threshold: 0.9,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            ttl_secs: None,
        }
    }
}

impl ComponentWeights {
    pub fn sum(&self) -> f32 {
        self.coverage + self.quality + self.level + self.context + self.confidence
    }
}

impl QualityWeights {
    pub fn sum(&self) -> f32 {
        self.silhouette
            + self.separation
            + self.balance
            + self.coherence
            + self.stability
            + self.size_penalty
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            CreditAlignerError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("credit-aligner")
            .join("config.toml")
    }

    /// Structural checks that do not depend on which embedders are registered.
    pub fn validate(&self) -> Result<()> {
        let weight_sum = self.scoring.weights.sum();
        if (weight_sum - 1.0).abs() > 1e-4 {
            return Err(CreditAlignerError::Configuration(format!(
                "Scoring weights must sum to 1.0, got {:.4}",
                weight_sum
            )));
        }

        let quality_sum = self.clustering.quality_weights.sum();
        if (quality_sum - 1.0).abs() > 1e-4 {
            return Err(CreditAlignerError::Configuration(format!(
                "Clustering quality weights must sum to 1.0, got {:.4}",
                quality_sum
            )));
        }

        if self.clustering.embeddings.is_empty() {
            return Err(CreditAlignerError::Configuration(
                "At least one embedding representation is required".to_string(),
            ));
        }

        if self.clustering.algorithms.is_empty() {
            return Err(CreditAlignerError::Configuration(
                "At least one clustering algorithm is required".to_string(),
            ));
        }

        let unit_interval = [
            ("matching.level_weight", self.matching.level_weight),
            ("matching.accept_level_alignment", self.matching.accept_level_alignment),
            ("matching.split_level_compatibility", self.matching.split_level_compatibility),
            ("clustering.min_cluster_similarity", self.clustering.min_cluster_similarity),
            ("clustering.stability_fraction", self.clustering.stability_fraction),
            ("ensemble.similarity_threshold", self.ensemble.similarity_threshold),
        ];
        for (key, value) in unit_interval {
            if !(0.0..=1.0).contains(&value) {
                return Err(CreditAlignerError::Configuration(format!(
                    "{} must lie in [0, 1], got {}",
                    key, value
                )));
            }
        }

        if self.ensemble.runs == 0 {
            return Err(CreditAlignerError::Configuration(
                "ensemble.runs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
