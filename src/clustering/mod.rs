//! Semantic clustering search over (embedding representation x algorithm) trials
//!
//! Every trial is an independent pure function of the prepared data and its own
//! seed, so the sweep is a plain map followed by a max-reduction. Trials run on
//! the rayon pool when `clustering.parallel` is set.

pub mod algorithms;
pub mod metrics;
pub mod reduction;

use crate::config::ClusteringConfig;
use crate::error::{CreditAlignerError, Result};
use crate::processing::embeddings::{
    content_hash, CacheItem, RepresentationMatrix, SimilarityCache,
};
use crate::processing::skill::{Side, SkillSet};
use crate::processing::text::SkillTextProcessor;
use algorithms::{ClusteringAlgorithm, Clusterer, FitParams};
use log::{debug, info, warn};
use metrics::QualityMetrics;
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// One valid skill name taking part in clustering
#[derive(Debug, Clone, PartialEq)]
pub struct SkillPoint {
    pub side: Side,
    /// Index into the skill set of `side`
    pub index: usize,
    /// Position in the source-then-target union
    pub position: usize,
    /// Normalised name
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub side: Side,
    pub index: usize,
    /// Row in the clustering matrices
    pub point: usize,
}

/// Skills from both sides judged semantically equivalent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub members: Vec<ClusterMember>,
    /// Mean pairwise similarity over all members
    pub mean_similarity: f32,
    /// Mean similarity over source x target member pairs
    pub cross_similarity: f32,
}

impl Cluster {
    pub fn members_on(&self, side: Side) -> Vec<ClusterMember> {
        self.members
            .iter()
            .filter(|m| m.side == side)
            .copied()
            .collect()
    }

    pub fn has_both_origins(&self) -> bool {
        self.members.iter().any(|m| m.side == Side::Source)
            && self.members.iter().any(|m| m.side == Side::Target)
    }
}

/// Optional limits on the sweep
#[derive(Debug, Clone, Default)]
pub struct SearchBudget {
    pub max_trials: Option<usize>,
    /// Trials not started before this instant are skipped
    pub deadline: Option<Instant>,
}

impl SearchBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_trials(mut self, max_trials: usize) -> Self {
        self.max_trials = Some(max_trials);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialStatus {
    Completed {
        k: usize,
        composite: f32,
        metrics: QualityMetrics,
    },
    Failed {
        reason: String,
    },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub index: usize,
    pub embedding: String,
    pub algorithm: ClusteringAlgorithm,
    pub status: TrialStatus,
}

impl TrialRecord {
    pub fn composite(&self) -> Option<f32> {
        match &self.status {
            TrialStatus::Completed { composite, .. } => Some(*composite),
            _ => None,
        }
    }
}

/// What the sweep tried and which trial won
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub valid_points: usize,
    pub trials: Vec<TrialRecord>,
    pub winner: Option<usize>,
    pub discarded_single_origin: usize,
    pub discarded_low_similarity: usize,
}

impl SearchReport {
    pub fn best(&self) -> Option<&TrialRecord> {
        self.winner.and_then(|w| self.trials.iter().find(|t| t.index == w))
    }

    pub fn failed_trials(&self) -> usize {
        self.trials
            .iter()
            .filter(|t| matches!(t.status, TrialStatus::Failed { .. }))
            .count()
    }
}

/// Pairwise similarity between clustering points under the winning representation
#[derive(Debug, Clone)]
pub struct PointSimilarity {
    representation: String,
    names: Vec<String>,
    /// Per-row vector fingerprints, part of every cache key
    fingerprints: Vec<u64>,
    matrix: Array2<f32>,
}

impl PointSimilarity {
    pub fn new(representation: impl Into<String>, names: Vec<String>, matrix: Array2<f32>) -> Self {
        let matrix = reduction::l2_normalize_rows(&matrix);
        let fingerprints = matrix
            .rows()
            .into_iter()
            .map(|row| content_hash(row.iter()))
            .collect();
        Self {
            representation: representation.into(),
            names,
            fingerprints,
            matrix,
        }
    }

    pub fn representation(&self) -> &str {
        &self.representation
    }

    pub fn between(&self, a: usize, b: usize, cache: Option<&SimilarityCache>) -> f32 {
        if a == b {
            return 1.0;
        }
        let compute = || {
            let value = self.matrix.row(a).dot(&self.matrix.row(b));
            value.clamp(-1.0, 1.0)
        };
        match cache {
            Some(cache) => cache.get_or_compute(
                &self.representation,
                CacheItem {
                    text: &self.names[a],
                    content: self.fingerprints[a],
                },
                CacheItem {
                    text: &self.names[b],
                    content: self.fingerprints[b],
                },
                compute,
            ),
            None => compute(),
        }
    }

    /// Mean over every pair drawn from `sources` x `targets`
    pub fn mean_cross(
        &self,
        sources: &[usize],
        targets: &[usize],
        cache: Option<&SimilarityCache>,
    ) -> f32 {
        if sources.is_empty() || targets.is_empty() {
            return 0.0;
        }
        let mut total = 0.0f32;
        for &s in sources {
            for &t in targets {
                total += self.between(s, t, cache);
            }
        }
        total / (sources.len() * targets.len()) as f32
    }

    /// Mean over unordered pairs; 1 for a single member
    pub fn mean_pairwise(&self, members: &[usize], cache: Option<&SimilarityCache>) -> f32 {
        if members.len() < 2 {
            return 1.0;
        }
        let mut total = 0.0f32;
        let mut count = 0usize;
        for (a, &i) in members.iter().enumerate() {
            for &j in &members[a + 1..] {
                total += self.between(i, j, cache);
                count += 1;
            }
        }
        total / count as f32
    }
}

#[derive(Debug, Clone)]
pub enum ClusterOutcome {
    Clustered {
        clusters: Vec<Cluster>,
        similarity: PointSimilarity,
        report: SearchReport,
    },
    /// Too few usable names, or every trial failed
    InsufficientData {
        valid_points: usize,
        required: usize,
        report: Option<SearchReport>,
    },
}

impl ClusterOutcome {
    pub fn clusters(&self) -> &[Cluster] {
        match self {
            ClusterOutcome::Clustered { clusters, .. } => clusters,
            ClusterOutcome::InsufficientData { .. } => &[],
        }
    }

    pub fn report(&self) -> Option<&SearchReport> {
        match self {
            ClusterOutcome::Clustered { report, .. } => Some(report),
            ClusterOutcome::InsufficientData { report, .. } => report.as_ref(),
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, ClusterOutcome::InsufficientData { .. })
    }
}

/// Normalise the names of both sets and keep the ones usable for clustering
pub fn collect_points(source: &SkillSet, target: &SkillSet) -> Vec<SkillPoint> {
    let processor = SkillTextProcessor::shared();
    source
        .iter()
        .enumerate()
        .map(|(index, skill)| (Side::Source, index, index, skill))
        .chain(
            target
                .iter()
                .enumerate()
                .map(|(index, skill)| (Side::Target, index, source.len() + index, skill)),
        )
        .filter_map(|(side, index, position, skill)| {
            let name = processor.normalize_name(&skill.name);
            if name.is_empty() {
                debug!("Skipping {} skill '{}' with no usable name", side, skill.name);
                None
            } else {
                Some(SkillPoint {
                    side,
                    index,
                    position,
                    name,
                })
            }
        })
        .collect()
}

struct PreparedRepresentation {
    name: String,
    full: Array2<f32>,
    reduced: Array2<f32>,
    distinct_rows: usize,
}

struct TrialRun {
    record: TrialRecord,
    labels: Option<Vec<usize>>,
}

/// Grid search over embedding representations and clustering algorithms
#[derive(Debug, Clone)]
pub struct ClusteringSearch {
    algorithms: Vec<ClusteringAlgorithm>,
    config: ClusteringConfig,
}

impl ClusteringSearch {
    /// Resolves algorithm identifiers; unknown ones fail here
    pub fn new(config: &ClusteringConfig) -> Result<Self> {
        let algorithms = config
            .algorithms
            .iter()
            .map(|id| ClusteringAlgorithm::parse(id))
            .collect::<Result<Vec<_>>>()?;

        if algorithms.is_empty() {
            return Err(CreditAlignerError::Configuration(
                "At least one clustering algorithm is required".to_string(),
            ));
        }

        Ok(Self {
            algorithms,
            config: config.clone(),
        })
    }

    pub fn algorithms(&self) -> &[ClusteringAlgorithm] {
        &self.algorithms
    }

    /// Run the sweep. Each representation must have one row per point.
    pub fn run(
        &self,
        points: &[SkillPoint],
        representations: &[RepresentationMatrix],
        budget: &SearchBudget,
        cache: Option<&SimilarityCache>,
    ) -> Result<ClusterOutcome> {
        let required = self.config.min_valid_skills;
        if points.len() < required {
            info!(
                "Only {} valid skill names (need {}), skipping clustering",
                points.len(),
                required
            );
            return Ok(ClusterOutcome::InsufficientData {
                valid_points: points.len(),
                required,
                report: None,
            });
        }

        for representation in representations {
            if representation.len() != points.len() {
                return Err(CreditAlignerError::InvalidInput(format!(
                    "Representation '{}' has {} rows for {} skills",
                    representation.name,
                    representation.len(),
                    points.len()
                )));
            }
        }

        let names: Vec<String> = points.iter().map(|p| p.name.clone()).collect();
        let prepared: Vec<PreparedRepresentation> = representations
            .iter()
            .map(|r| self.prepare(r))
            .collect();

        let mut trials: Vec<(usize, usize, ClusteringAlgorithm)> = Vec::new();
        for (r, _) in prepared.iter().enumerate() {
            for algorithm in &self.algorithms {
                trials.push((trials.len(), r, *algorithm));
            }
        }
        if let Some(max_trials) = budget.max_trials {
            if trials.len() > max_trials {
                debug!("Truncating sweep from {} to {} trials", trials.len(), max_trials);
                trials.truncate(max_trials);
            }
        }

        let evaluate = |&(index, r, algorithm): &(usize, usize, ClusteringAlgorithm)| {
            self.run_trial(index, &prepared[r], algorithm, &names, budget.deadline)
        };
        let runs: Vec<TrialRun> = if self.config.parallel {
            trials.par_iter().map(evaluate).collect()
        } else {
            trials.iter().map(evaluate).collect()
        };

        let mut winner: Option<(usize, f32)> = None;
        for (position, run) in runs.iter().enumerate() {
            if let (Some(score), Some(_)) = (run.record.composite(), &run.labels) {
                if winner.map(|(_, best)| score > best).unwrap_or(true) {
                    winner = Some((position, score));
                }
            }
        }

        let mut report = SearchReport {
            valid_points: points.len(),
            trials: runs.iter().map(|r| r.record.clone()).collect(),
            winner: None,
            discarded_single_origin: 0,
            discarded_low_similarity: 0,
        };

        let Some((position, score)) = winner else {
            warn!("All {} clustering trials failed or were skipped", runs.len());
            return Ok(ClusterOutcome::InsufficientData {
                valid_points: points.len(),
                required,
                report: Some(report),
            });
        };

        let best = &runs[position];
        report.winner = Some(best.record.index);
        info!(
            "Best clustering: {} + {} (composite {:.4})",
            best.record.embedding, best.record.algorithm, score
        );

        let labels = best.labels.clone().unwrap_or_default();
        let representation = &prepared[trials[position].1];
        let similarity =
            PointSimilarity::new(representation.name.clone(), names, representation.full.clone());
        let clusters = self.build_clusters(points, &labels, &similarity, cache, &mut report);

        Ok(ClusterOutcome::Clustered {
            clusters,
            similarity,
            report,
        })
    }

    fn prepare(&self, representation: &RepresentationMatrix) -> PreparedRepresentation {
        let full = reduction::l2_normalize_rows(&representation.matrix);
        let reduced = reduction::l2_normalize_rows(&reduction::reduce_if_needed(
            &full,
            self.config.reduce_above_dim,
            self.config.target_dim,
        ));
        let distinct_rows = reduced
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|v| v.to_bits()).collect::<Vec<u32>>())
            .collect::<HashSet<_>>()
            .len();

        PreparedRepresentation {
            name: representation.name.clone(),
            full,
            reduced,
            distinct_rows,
        }
    }

    fn trial_seed(&self, index: usize) -> u64 {
        self.config
            .seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add((index as u64).wrapping_mul(1442695040888963407))
    }

    fn run_trial(
        &self,
        index: usize,
        prepared: &PreparedRepresentation,
        algorithm: ClusteringAlgorithm,
        names: &[String],
        deadline: Option<Instant>,
    ) -> TrialRun {
        let record = |status| TrialRecord {
            index,
            embedding: prepared.name.clone(),
            algorithm,
            status,
        };

        if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
            debug!("Trial {} ({} + {}) skipped by deadline", index, prepared.name, algorithm);
            return TrialRun {
                record: record(TrialStatus::Skipped),
                labels: None,
            };
        }

        match self.evaluate_trial(prepared, algorithm, names, self.trial_seed(index)) {
            Ok((k, labels, metrics)) => {
                let composite = metrics.composite(&self.config.quality_weights);
                debug!(
                    "Trial {} ({} + {}): k={} silhouette={:.3} composite={:.4}",
                    index, prepared.name, algorithm, k, metrics.silhouette, composite
                );
                TrialRun {
                    record: record(TrialStatus::Completed {
                        k,
                        composite,
                        metrics,
                    }),
                    labels: Some(labels),
                }
            }
            Err(e) => {
                warn!("Trial {} ({} + {}) failed: {}", index, prepared.name, algorithm, e);
                TrialRun {
                    record: record(TrialStatus::Failed {
                        reason: e.to_string(),
                    }),
                    labels: None,
                }
            }
        }
    }

    fn evaluate_trial(
        &self,
        prepared: &PreparedRepresentation,
        algorithm: ClusteringAlgorithm,
        names: &[String],
        seed: u64,
    ) -> Result<(usize, Vec<usize>, QualityMetrics)> {
        let data = &prepared.reduced;
        let clusterer = Clusterer::new(algorithm, data);
        let k = self.estimate_k(&clusterer, data, prepared.distinct_rows, seed)?;

        let params = FitParams {
            n_init: self.config.kmeans_n_init,
            max_iterations: self.config.max_iterations,
        };
        let labels = clusterer.labels(k, &params, seed)?;

        let mut rng = StdRng::seed_from_u64(seed ^ 0x5EED);
        let silhouette =
            metrics::silhouette_score(data, &labels, self.config.silhouette_sample_size, &mut rng)
                .unwrap_or(-1.0);
        let (separation_ratio, avg_intra_distance, avg_inter_distance) =
            metrics::separation(data, &labels);
        let (balance_ratio, largest_cluster_ratio, smallest_cluster_size) =
            metrics::balance(&labels);
        let coherence = metrics::lexical_coherence(names, &labels);
        let stability = self.stability(algorithm, data, &labels, k, seed);

        Ok((
            k,
            labels.clone(),
            QualityMetrics {
                n_clusters: metrics::distinct_labels(&labels),
                silhouette,
                separation_ratio,
                avg_intra_distance,
                avg_inter_distance,
                balance_ratio,
                largest_cluster_ratio,
                smallest_cluster_size,
                coherence,
                stability,
            },
        ))
    }

    /// Scan k and keep the first one with the best sampled silhouette
    fn estimate_k(
        &self,
        clusterer: &Clusterer<'_>,
        data: &Array2<f32>,
        distinct_rows: usize,
        seed: u64,
    ) -> Result<usize> {
        let n = data.nrows();
        let max_k = self
            .config
            .max_clusters
            .min(n.saturating_sub(1))
            .min(distinct_rows);
        if max_k < 2 {
            return Err(CreditAlignerError::Clustering(format!(
                "Need at least two distinct embeddings, found {}",
                distinct_rows
            )));
        }

        let params = FitParams {
            n_init: self.config.estimation_n_init,
            max_iterations: self.config.max_iterations,
        };

        let mut best: Option<(usize, f32)> = None;
        for k in 2..=max_k {
            let labels = match clusterer.labels(k, &params, seed) {
                Ok(labels) => labels,
                Err(e) => {
                    debug!("k={} failed during estimation: {}", k, e);
                    continue;
                }
            };
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(k as u64));
            if let Some(score) = metrics::silhouette_score(
                data,
                &labels,
                self.config.silhouette_sample_size,
                &mut rng,
            ) {
                if best.map(|(_, b)| score > b).unwrap_or(true) {
                    best = Some((k, score));
                }
            }
        }

        best.map(|(k, _)| k).ok_or_else(|| {
            CreditAlignerError::Clustering("No candidate cluster count produced a valid silhouette".to_string())
        })
    }

    /// Re-fit on a random subsample and compare assignments with the Rand index
    fn stability(
        &self,
        algorithm: ClusteringAlgorithm,
        data: &Array2<f32>,
        labels: &[usize],
        k: usize,
        seed: u64,
    ) -> f32 {
        let n = data.nrows();
        let size = ((n as f32) * self.config.stability_fraction).ceil() as usize;
        if size < 2 || size >= n {
            return 1.0;
        }

        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        indices.truncate(size);
        indices.sort_unstable();

        let subset = data.select(Axis(0), &indices);
        let params = FitParams {
            n_init: self.config.estimation_n_init,
            max_iterations: self.config.max_iterations,
        };
        match Clusterer::new(algorithm, &subset).labels(k.min(size), &params, seed) {
            Ok(sub_labels) => {
                let original: Vec<usize> = indices.iter().map(|&i| labels[i]).collect();
                metrics::rand_index(&original, &sub_labels)
            }
            Err(e) => {
                debug!("Stability refit failed: {}", e);
                0.5
            }
        }
    }

    fn build_clusters(
        &self,
        points: &[SkillPoint],
        labels: &[usize],
        similarity: &PointSimilarity,
        cache: Option<&SimilarityCache>,
        report: &mut SearchReport,
    ) -> Vec<Cluster> {
        let mut clusters = Vec::new();
        for (label, member_points) in metrics::group_by_label(labels) {
            let members: Vec<ClusterMember> = member_points
                .iter()
                .map(|&p| ClusterMember {
                    side: points[p].side,
                    index: points[p].index,
                    point: p,
                })
                .collect();

            let sources: Vec<usize> = members
                .iter()
                .filter(|m| m.side == Side::Source)
                .map(|m| m.point)
                .collect();
            let targets: Vec<usize> = members
                .iter()
                .filter(|m| m.side == Side::Target)
                .map(|m| m.point)
                .collect();

            if sources.is_empty() || targets.is_empty() {
                report.discarded_single_origin += 1;
                continue;
            }

            let cross_similarity = similarity.mean_cross(&sources, &targets, cache);
            if cross_similarity < self.config.min_cluster_similarity {
                debug!(
                    "Dropping cluster {} with cross similarity {:.3}",
                    label, cross_similarity
                );
                report.discarded_low_similarity += 1;
                continue;
            }

            clusters.push(Cluster {
                id: label,
                members,
                mean_similarity: similarity.mean_pairwise(&member_points, cache),
                cross_similarity,
            });
        }

        debug!(
            "{} cross-origin clusters kept, {} single-origin and {} low-similarity dropped",
            clusters.len(),
            report.discarded_single_origin,
            report.discarded_low_similarity
        );
        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::embeddings::{Embedder, HashingEmbedder};
    use crate::processing::skill::Skill;

    fn skill_set(side: Side, code: &str, names: &[&str]) -> SkillSet {
        SkillSet::new(
            code,
            names.iter().map(|n| Skill::new(*n, side, code)).collect(),
        )
    }

    fn representation(points: &[SkillPoint]) -> RepresentationMatrix {
        let names: Vec<String> = points.iter().map(|p| p.name.clone()).collect();
        let rows = HashingEmbedder::new(128).embed(&names).unwrap();
        RepresentationMatrix::from_rows("hashing", rows).unwrap()
    }

    fn config() -> ClusteringConfig {
        ClusteringConfig {
            parallel: false,
            ..ClusteringConfig::default()
        }
    }

    const NAMES: [&str; 6] = [
        "network security",
        "database design",
        "project scheduling",
        "python programming",
        "customer service",
        "financial reporting",
    ];

    #[test]
    fn test_unknown_algorithm_fails_fast() {
        let mut config = config();
        config.algorithms.push("spectral".to_string());
        assert!(matches!(
            ClusteringSearch::new(&config),
            Err(CreditAlignerError::Configuration(_))
        ));
    }

    #[test]
    fn test_too_few_names_is_insufficient_data() {
        let source = skill_set(Side::Source, "U1", &["welding", "  !! "]);
        let target = skill_set(Side::Target, "C1", &["welding"]);
        let points = collect_points(&source, &target);
        assert_eq!(points.len(), 2);

        let search = ClusteringSearch::new(&config()).unwrap();
        let outcome = search
            .run(&points, &[representation(&points)], &SearchBudget::unlimited(), None)
            .unwrap();
        assert!(outcome.is_insufficient());
        assert!(outcome.clusters().is_empty());
    }

    #[test]
    fn test_identical_sets_pair_up() {
        let source = skill_set(Side::Source, "U1", &NAMES);
        let target = skill_set(Side::Target, "C1", &NAMES);
        let points = collect_points(&source, &target);

        let search = ClusteringSearch::new(&config()).unwrap();
        let outcome = search
            .run(&points, &[representation(&points)], &SearchBudget::unlimited(), None)
            .unwrap();

        let clusters = outcome.clusters();
        assert_eq!(clusters.len(), NAMES.len());
        for cluster in clusters {
            assert!(cluster.has_both_origins());
            assert_eq!(cluster.members.len(), 2);
            assert!((cluster.cross_similarity - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_sweep_is_deterministic() {
        let source = skill_set(Side::Source, "U1", &NAMES);
        let target = skill_set(
            Side::Target,
            "C1",
            &["network security", "database modelling", "budgeting", "python", "client service"],
        );
        let points = collect_points(&source, &target);
        let reps = [representation(&points)];

        let parallel = ClusteringSearch::new(&ClusteringConfig::default()).unwrap();
        let serial = ClusteringSearch::new(&config()).unwrap();
        let a = parallel.run(&points, &reps, &SearchBudget::unlimited(), None).unwrap();
        let b = serial.run(&points, &reps, &SearchBudget::unlimited(), None).unwrap();
        assert_eq!(a.clusters(), b.clusters());
        assert_eq!(a.report(), b.report());
    }

    #[test]
    fn test_budget_truncates_trials() {
        let source = skill_set(Side::Source, "U1", &NAMES);
        let target = skill_set(Side::Target, "C1", &NAMES);
        let points = collect_points(&source, &target);

        let search = ClusteringSearch::new(&config()).unwrap();
        let outcome = search
            .run(
                &points,
                &[representation(&points)],
                &SearchBudget::unlimited().with_max_trials(1),
                None,
            )
            .unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.trials.len(), 1);
        assert_eq!(report.trials[0].algorithm, ClusteringAlgorithm::KMeans);
    }

    #[test]
    fn test_expired_deadline_skips_everything() {
        let source = skill_set(Side::Source, "U1", &NAMES);
        let target = skill_set(Side::Target, "C1", &NAMES);
        let points = collect_points(&source, &target);

        let budget = SearchBudget {
            max_trials: None,
            deadline: Some(Instant::now()),
        };
        let search = ClusteringSearch::new(&config()).unwrap();
        let outcome = search
            .run(&points, &[representation(&points)], &budget, None)
            .unwrap();
        assert!(outcome.is_insufficient());
        let report = outcome.report().unwrap();
        assert!(report
            .trials
            .iter()
            .all(|t| t.status == TrialStatus::Skipped));
    }

    #[test]
    fn test_row_count_mismatch_is_invalid_input() {
        let source = skill_set(Side::Source, "U1", &NAMES);
        let target = skill_set(Side::Target, "C1", &NAMES);
        let points = collect_points(&source, &target);
        let short = RepresentationMatrix::from_rows("hashing", vec![vec![1.0, 0.0]; 3]).unwrap();

        let search = ClusteringSearch::new(&config()).unwrap();
        assert!(matches!(
            search.run(&points, &[short], &SearchBudget::unlimited(), None),
            Err(CreditAlignerError::InvalidInput(_))
        ));
    }
}
