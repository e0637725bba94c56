//! Internal clustering-quality metrics and the composite score

use crate::config::QualityWeights;
use crate::processing::text::SkillTextProcessor;
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Clusters examined by the coherence proxy
const COHERENCE_CLUSTER_LIMIT: usize = 10;

/// Raw metrics for one label assignment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub n_clusters: usize,
    pub silhouette: f32,
    pub separation_ratio: f32,
    pub avg_intra_distance: f32,
    pub avg_inter_distance: f32,
    /// Coefficient of variation of cluster sizes (lower is better)
    pub balance_ratio: f32,
    pub largest_cluster_ratio: f32,
    pub smallest_cluster_size: usize,
    pub coherence: f32,
    pub stability: f32,
}

#[inline]
pub fn euclidean_distance_squared(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[inline]
pub fn euclidean_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    euclidean_distance_squared(a, b).sqrt()
}

/// Cosine distance, 1 for zero vectors
#[inline]
pub fn cosine_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let dot = a.dot(&b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a * norm_b)).max(0.0)
}

pub fn distinct_labels(labels: &[usize]) -> usize {
    let mut seen: Vec<usize> = labels.to_vec();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

/// Member indices per label, in label order
pub fn group_by_label(labels: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        groups.entry(*label).or_default().push(i);
    }
    groups
}

/// Mean silhouette over at most `sample_size` points (euclidean).
///
/// Singleton clusters contribute 0. `None` when fewer than two clusters exist.
pub fn silhouette_score(
    data: &Array2<f32>,
    labels: &[usize],
    sample_size: usize,
    rng: &mut StdRng,
) -> Option<f32> {
    let n = labels.len();
    if distinct_labels(labels) < 2 || n < 2 {
        return None;
    }

    let mut indices: Vec<usize> = (0..n).collect();
    if n > sample_size {
        indices.shuffle(rng);
        indices.truncate(sample_size);
        indices.sort_unstable();
    }
    let sample_labels: Vec<usize> = indices.iter().map(|&i| labels[i]).collect();
    if distinct_labels(&sample_labels) < 2 {
        return None;
    }

    let mut total = 0.0f32;
    for &i in &indices {
        let mut sums: HashMap<usize, (f32, usize)> = HashMap::new();
        for &j in &indices {
            if i == j {
                continue;
            }
            let distance = euclidean_distance(data.row(i), data.row(j));
            let entry = sums.entry(labels[j]).or_insert((0.0, 0));
            entry.0 += distance;
            entry.1 += 1;
        }

        let own = labels[i];
        let a = match sums.get(&own) {
            Some((sum, count)) if *count > 0 => sum / *count as f32,
            _ => continue, // singleton
        };
        let b = sums
            .iter()
            .filter(|(label, _)| **label != own)
            .map(|(_, (sum, count))| sum / *count as f32)
            .fold(f32::INFINITY, f32::min);
        if !b.is_finite() {
            continue;
        }
        let denominator = a.max(b);
        if denominator > 0.0 {
            total += (b - a) / denominator;
        }
    }

    Some(total / indices.len() as f32)
}

/// Mean inter-cluster over mean intra-cluster cosine distance.
///
/// Returns `(ratio, avg_intra, avg_inter)`. Perfectly tight clusters that are
/// still apart from each other get a ratio of 3, the top of the scale.
pub fn separation(data: &Array2<f32>, labels: &[usize]) -> (f32, f32, f32) {
    let groups = group_by_label(labels);
    if groups.len() < 2 {
        return (0.0, 0.0, 0.0);
    }

    let mut intra_sum = 0.0f64;
    let mut intra_count = 0usize;
    for members in groups.values() {
        for (a, &i) in members.iter().enumerate() {
            for &j in &members[a + 1..] {
                intra_sum += cosine_distance(data.row(i), data.row(j)) as f64;
                intra_count += 1;
            }
        }
    }

    let mut inter_sum = 0.0f64;
    let mut inter_count = 0usize;
    let clusters: Vec<&Vec<usize>> = groups.values().collect();
    for (a, first) in clusters.iter().enumerate() {
        for second in &clusters[a + 1..] {
            for &i in first.iter() {
                for &j in second.iter() {
                    inter_sum += cosine_distance(data.row(i), data.row(j)) as f64;
                    inter_count += 1;
                }
            }
        }
    }

    let avg_intra = if intra_count > 0 {
        (intra_sum / intra_count as f64) as f32
    } else {
        0.0
    };
    let avg_inter = if inter_count > 0 {
        (inter_sum / inter_count as f64) as f32
    } else {
        0.0
    };

    let ratio = if avg_intra > 1e-9 {
        avg_inter / avg_intra
    } else if avg_inter > 0.0 {
        3.0
    } else {
        0.0
    };
    (ratio, avg_intra, avg_inter)
}

/// `(coefficient of variation, largest cluster share, smallest cluster size)`
pub fn balance(labels: &[usize]) -> (f32, f32, usize) {
    let groups = group_by_label(labels);
    if groups.is_empty() {
        return (f32::INFINITY, 1.0, 0);
    }
    let counts: Vec<f32> = groups.values().map(|m| m.len() as f32).collect();
    let mean = counts.iter().sum::<f32>() / counts.len() as f32;
    let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f32>() / counts.len() as f32;
    let cv = if mean > 0.0 {
        variance.sqrt() / mean
    } else {
        f32::INFINITY
    };
    let largest = counts.iter().cloned().fold(0.0, f32::max) / labels.len() as f32;
    let smallest = groups.values().map(|m| m.len()).min().unwrap_or(0);
    (cv, largest, smallest)
}

/// Word-repetition proxy: `1 - unique/total` words, averaged over the first
/// clusters that have at least two members
pub fn lexical_coherence(names: &[String], labels: &[usize]) -> f32 {
    let processor = SkillTextProcessor::shared();
    let scores: Vec<f32> = group_by_label(labels)
        .values()
        .take(COHERENCE_CLUSTER_LIMIT)
        .filter(|members| members.len() >= 2)
        .filter_map(|members| {
            let words: Vec<String> = members
                .iter()
                .flat_map(|&i| processor.words(&names[i]))
                .collect();
            if words.is_empty() {
                return None;
            }
            let mut unique = words.clone();
            unique.sort_unstable();
            unique.dedup();
            Some(1.0 - unique.len() as f32 / words.len() as f32)
        })
        .collect();

    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f32>() / scores.len() as f32
    }
}

/// Rand index between two labelings of the same points
pub fn rand_index(first: &[usize], second: &[usize]) -> f32 {
    let n = first.len().min(second.len());
    if n < 2 {
        return 1.0;
    }
    let mut agree = 0u64;
    let mut total = 0u64;
    for i in 0..n {
        for j in i + 1..n {
            let same_first = first[i] == first[j];
            let same_second = second[i] == second[j];
            if same_first == same_second {
                agree += 1;
            }
            total += 1;
        }
    }
    agree as f32 / total as f32
}

impl QualityMetrics {
    /// Weighted composite in [0, 1]
    pub fn composite(&self, weights: &QualityWeights) -> f32 {
        let silhouette = self.silhouette.clamp(0.0, 1.0);
        let separation = (self.separation_ratio / 3.0).min(1.0);
        let balance = if self.balance_ratio.is_finite() {
            (1.0 - (self.balance_ratio / 2.0).min(1.0)).max(0.0)
        } else {
            0.0
        };
        let coherence = self.coherence.clamp(0.0, 1.0);
        let stability = self.stability.clamp(0.0, 1.0);
        let size_penalty = (1.0 - (self.largest_cluster_ratio - 0.5).max(0.0) * 2.0)
            * (self.smallest_cluster_size as f32 / 5.0).min(1.0);

        let score = weights.silhouette * silhouette
            + weights.separation * separation
            + weights.balance * balance
            + weights.coherence * coherence
            + weights.stability * stability
            + weights.size_penalty * size_penalty;
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn two_blobs() -> (Array2<f32>, Vec<usize>) {
        let data = array![
            [1.0f32, 0.0],
            [0.99, 0.05],
            [0.98, -0.05],
            [0.0, 1.0],
            [0.05, 0.99],
            [-0.05, 0.98]
        ];
        (data, vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn test_silhouette_prefers_true_partition() {
        let (data, labels) = two_blobs();
        let mut rng = StdRng::seed_from_u64(1);
        let good = silhouette_score(&data, &labels, 100, &mut rng).unwrap();
        let bad = silhouette_score(&data, &[0, 1, 0, 1, 0, 1], 100, &mut rng).unwrap();
        assert!(good > 0.9);
        assert!(bad < good);
        assert!(silhouette_score(&data, &[0; 6], 100, &mut rng).is_none());
    }

    #[test]
    fn test_separation_ratio() {
        let (data, labels) = two_blobs();
        let (ratio, intra, inter) = separation(&data, &labels);
        assert!(inter > intra);
        assert!(ratio > 3.0);
    }

    #[test]
    fn test_separation_of_duplicate_pairs_is_capped() {
        let data = array![[1.0f32, 0.0], [1.0, 0.0], [0.0, 1.0], [0.0, 1.0]];
        let (ratio, intra, _) = separation(&data, &[0, 0, 1, 1]);
        assert_eq!(intra, 0.0);
        assert_eq!(ratio, 3.0);
    }

    #[test]
    fn test_balance() {
        let (cv, largest, smallest) = balance(&[0, 0, 1, 1]);
        assert_eq!(cv, 0.0);
        assert_eq!(largest, 0.5);
        assert_eq!(smallest, 2);
    }

    #[test]
    fn test_lexical_coherence() {
        let names = vec![
            "data analysis".to_string(),
            "data analysis".to_string(),
            "welding".to_string(),
        ];
        let score = lexical_coherence(&names, &[0, 0, 1]);
        assert!((score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_rand_index() {
        assert_eq!(rand_index(&[0, 0, 1, 1], &[5, 5, 7, 7]), 1.0);
        assert!(rand_index(&[0, 0, 1, 1], &[0, 1, 0, 1]) < 0.5);
    }

    #[test]
    fn test_composite_bounds() {
        let weights = QualityWeights::default();
        let perfect = QualityMetrics {
            n_clusters: 4,
            silhouette: 1.0,
            separation_ratio: 3.0,
            balance_ratio: 0.0,
            largest_cluster_ratio: 0.25,
            smallest_cluster_size: 5,
            coherence: 1.0,
            stability: 1.0,
            ..Default::default()
        };
        assert!((perfect.composite(&weights) - 1.0).abs() < 1e-5);

        let degenerate = QualityMetrics {
            n_clusters: 1,
            balance_ratio: 2.0,
            largest_cluster_ratio: 1.0,
            ..Default::default()
        };
        assert_eq!(degenerate.composite(&weights), 0.0);
    }
}
