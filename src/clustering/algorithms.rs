//! Centroid, mixture and hierarchical clustering over embedding rows

use crate::clustering::metrics::{cosine_distance, euclidean_distance_squared};
use crate::error::{CreditAlignerError, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

const GMM_REG_COVAR: f64 = 1e-6;
const GMM_TOLERANCE: f64 = 1e-4;
const GMM_MAX_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusteringAlgorithm {
    /// Centroid-based (k-means++ seeded Lloyd iterations)
    KMeans,
    /// Probabilistic mixture (diagonal-covariance Gaussian EM)
    GaussianMixture,
    /// Hierarchical agglomerative, average linkage on cosine distance
    Agglomerative,
}

#[derive(Debug, Clone, Copy)]
pub struct FitParams {
    pub n_init: usize,
    pub max_iterations: usize,
}

impl ClusteringAlgorithm {
    /// Resolve a configured identifier
    pub fn parse(identifier: &str) -> Result<Self> {
        match identifier.trim().to_lowercase().as_str() {
            "kmeans" | "k-means" | "centroid" => Ok(ClusteringAlgorithm::KMeans),
            "gmm" | "gaussian-mixture" | "mixture" => Ok(ClusteringAlgorithm::GaussianMixture),
            "agglomerative" | "hierarchical" => Ok(ClusteringAlgorithm::Agglomerative),
            other => Err(CreditAlignerError::Configuration(format!(
                "Unknown clustering algorithm '{}' (expected kmeans, gmm or agglomerative)",
                other
            ))),
        }
    }

    pub fn identifier(&self) -> &'static str {
        match self {
            ClusteringAlgorithm::KMeans => "kmeans",
            ClusteringAlgorithm::GaussianMixture => "gmm",
            ClusteringAlgorithm::Agglomerative => "agglomerative",
        }
    }
}

impl fmt::Display for ClusteringAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// One algorithm bound to one data matrix; produces labels for any k.
///
/// The agglomerative hierarchy is built once and cut per k.
pub struct Clusterer<'a> {
    algorithm: ClusteringAlgorithm,
    data: &'a Array2<f32>,
    dendrogram: Option<Dendrogram>,
}

impl<'a> Clusterer<'a> {
    pub fn new(algorithm: ClusteringAlgorithm, data: &'a Array2<f32>) -> Self {
        let dendrogram = match algorithm {
            ClusteringAlgorithm::Agglomerative => Some(Dendrogram::build(data)),
            _ => None,
        };
        Self {
            algorithm,
            data,
            dendrogram,
        }
    }

    pub fn labels(&self, k: usize, params: &FitParams, seed: u64) -> Result<Vec<usize>> {
        let n = self.data.nrows();
        if k == 0 || k > n {
            return Err(CreditAlignerError::Clustering(format!(
                "Cannot form {} clusters from {} points",
                k, n
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let labels = match self.algorithm {
            ClusteringAlgorithm::KMeans => kmeans(self.data, k, params, &mut rng)?.0,
            ClusteringAlgorithm::GaussianMixture => {
                gaussian_mixture(self.data, k, params, &mut rng)?
            }
            ClusteringAlgorithm::Agglomerative => match &self.dendrogram {
                Some(tree) => tree.cut(k),
                None => Dendrogram::build(self.data).cut(k),
            },
        };
        Ok(compact_labels(&labels))
    }
}

/// Renumber labels 0.. in order of first appearance
pub fn compact_labels(labels: &[usize]) -> Vec<usize> {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    labels
        .iter()
        .map(|label| {
            let next = mapping.len();
            *mapping.entry(*label).or_insert(next)
        })
        .collect()
}

/// Best-of-`n_init` k-means, returning labels and inertia
pub fn kmeans(
    data: &Array2<f32>,
    k: usize,
    params: &FitParams,
    rng: &mut StdRng,
) -> Result<(Vec<usize>, f32)> {
    let mut best: Option<(Vec<usize>, f32)> = None;

    for _ in 0..params.n_init.max(1) {
        let mut centroids = kmeans_plus_plus_init(data, k, rng);
        let labels = lloyd(data, &mut centroids, params.max_iterations);
        let inertia = compute_inertia(data, &labels, &centroids);

        if !inertia.is_finite() {
            return Err(CreditAlignerError::Clustering(
                "k-means produced a non-finite inertia".to_string(),
            ));
        }
        if best.as_ref().map(|(_, b)| inertia < *b).unwrap_or(true) {
            best = Some((labels, inertia));
        }
    }

    best.ok_or_else(|| CreditAlignerError::Clustering("k-means did not run".to_string()))
}

/// Choose initial centroids with probability proportional to squared distance.
pub fn kmeans_plus_plus_init(data: &Array2<f32>, k: usize, rng: &mut StdRng) -> Array2<f32> {
    let n = data.nrows();
    let mut chosen: Vec<usize> = Vec::with_capacity(k);
    chosen.push(rng.gen_range(0..n));

    let mut min_distances = vec![f32::MAX; n];

    while chosen.len() < k {
        let last = chosen[chosen.len() - 1];
        for (i, distance) in min_distances.iter_mut().enumerate() {
            let d = euclidean_distance_squared(data.row(i), data.row(last));
            if d < *distance {
                *distance = d;
            }
        }

        let total: f32 = min_distances.iter().sum();
        let next = if total <= 0.0 {
            // Every point sits on a centroid, take any unused index
            (0..n).find(|i| !chosen.contains(i)).unwrap_or(0)
        } else {
            let fallback = (0..n)
                .rev()
                .find(|&i| min_distances[i] > 0.0)
                .unwrap_or(n - 1);
            let mut target = rng.gen::<f32>() * total;
            let mut pick = fallback;
            for (i, distance) in min_distances.iter().enumerate() {
                if *distance <= 0.0 {
                    continue;
                }
                target -= distance;
                if target <= 0.0 {
                    pick = i;
                    break;
                }
            }
            pick
        };
        chosen.push(next);
    }

    let dim = data.ncols();
    let mut centroids = Array2::<f32>::zeros((k, dim));
    for (c, &index) in chosen.iter().enumerate() {
        centroids.row_mut(c).assign(&data.row(index));
    }
    centroids
}

fn nearest_centroid(data: &Array2<f32>, i: usize, centroids: &Array2<f32>) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for c in 0..centroids.nrows() {
        let d = euclidean_distance_squared(data.row(i), centroids.row(c));
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

fn lloyd(data: &Array2<f32>, centroids: &mut Array2<f32>, max_iterations: usize) -> Vec<usize> {
    let n = data.nrows();
    let k = centroids.nrows();
    let mut labels = vec![usize::MAX; n];

    for _ in 0..max_iterations.max(1) {
        let mut changed = false;
        let mut distances = vec![0.0f32; n];
        for i in 0..n {
            let (label, distance) = nearest_centroid(data, i, centroids);
            distances[i] = distance;
            if labels[i] != label {
                labels[i] = label;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = Array2::<f32>::zeros(centroids.dim());
        let mut counts = vec![0usize; k];
        for (i, &label) in labels.iter().enumerate() {
            counts[label] += 1;
            let mut row = sums.row_mut(label);
            row += &data.row(i);
        }

        let mut reseeded: Vec<usize> = Vec::new();
        for c in 0..k {
            if counts[c] > 0 {
                let mean = sums.row(c).mapv(|x| x / counts[c] as f32);
                centroids.row_mut(c).assign(&mean);
            } else {
                // Empty cluster takes the point farthest from its centroid
                let far = (0..n)
                    .filter(|i| !reseeded.contains(i))
                    .max_by(|a, b| {
                        distances[*a]
                            .partial_cmp(&distances[*b])
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap_or(0);
                reseeded.push(far);
                centroids.row_mut(c).assign(&data.row(far));
            }
        }
    }

    labels
}

fn compute_inertia(data: &Array2<f32>, labels: &[usize], centroids: &Array2<f32>) -> f32 {
    labels
        .iter()
        .enumerate()
        .map(|(i, &c)| euclidean_distance_squared(data.row(i), centroids.row(c)))
        .sum()
}

/// Diagonal-covariance Gaussian mixture fitted by EM, seeded from k-means.
///
/// Returns the most likely component per point from the best of `n_init` fits.
pub fn gaussian_mixture(
    data: &Array2<f32>,
    k: usize,
    params: &FitParams,
    rng: &mut StdRng,
) -> Result<Vec<usize>> {
    let points: Vec<Vec<f64>> = data
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|&x| x as f64).collect())
        .collect();
    let n = points.len();
    let dim = data.ncols();

    let mut best: Option<(Vec<usize>, f64)> = None;
    for _ in 0..params.n_init.max(1) {
        let init = FitParams {
            n_init: 1,
            max_iterations: params.max_iterations,
        };
        let (init_labels, _) = kmeans(data, k, &init, rng)?;

        let mut resp = vec![vec![0.0f64; k]; n];
        for (i, &label) in init_labels.iter().enumerate() {
            resp[i][label] = 1.0;
        }

        let mut previous = f64::NEG_INFINITY;
        let mut log_likelihood = f64::NEG_INFINITY;
        for _ in 0..GMM_MAX_ITERATIONS.min(params.max_iterations.max(1)) {
            let (weights, means, variances) = maximization(&points, &resp, k, dim);
            log_likelihood = expectation(&points, &weights, &means, &variances, &mut resp)?;
            if (log_likelihood - previous).abs() < GMM_TOLERANCE {
                break;
            }
            previous = log_likelihood;
        }

        let labels: Vec<usize> = resp
            .iter()
            .map(|r| {
                r.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (c, &p)| {
                        if p > acc.1 {
                            (c, p)
                        } else {
                            acc
                        }
                    })
                    .0
            })
            .collect();

        if best
            .as_ref()
            .map(|(_, b)| log_likelihood > *b)
            .unwrap_or(true)
        {
            best = Some((labels, log_likelihood));
        }
    }

    best.map(|(labels, _)| labels)
        .ok_or_else(|| CreditAlignerError::Clustering("Gaussian mixture did not run".to_string()))
}

type MixtureParams = (Vec<f64>, Vec<Vec<f64>>, Vec<Vec<f64>>);

fn maximization(points: &[Vec<f64>], resp: &[Vec<f64>], k: usize, dim: usize) -> MixtureParams {
    let n = points.len();
    let mut weights = vec![0.0f64; k];
    let mut means = vec![vec![0.0f64; dim]; k];
    let mut variances = vec![vec![0.0f64; dim]; k];

    for c in 0..k {
        let nk: f64 = resp.iter().map(|r| r[c]).sum::<f64>() + 10.0 * f64::EPSILON;
        weights[c] = nk / n as f64;

        for (point, r) in points.iter().zip(resp.iter()) {
            for d in 0..dim {
                means[c][d] += r[c] * point[d];
            }
        }
        means[c].iter_mut().for_each(|m| *m /= nk);

        for (point, r) in points.iter().zip(resp.iter()) {
            for d in 0..dim {
                let diff = point[d] - means[c][d];
                variances[c][d] += r[c] * diff * diff;
            }
        }
        variances[c]
            .iter_mut()
            .for_each(|v| *v = *v / nk + GMM_REG_COVAR);
    }

    (weights, means, variances)
}

/// Update responsibilities in place and return the mean log-likelihood
fn expectation(
    points: &[Vec<f64>],
    weights: &[f64],
    means: &[Vec<f64>],
    variances: &[Vec<f64>],
    resp: &mut [Vec<f64>],
) -> Result<f64> {
    let k = weights.len();
    let log_norms: Vec<f64> = variances
        .iter()
        .map(|var| {
            var.iter()
                .map(|v| (2.0 * std::f64::consts::PI * v).ln())
                .sum::<f64>()
        })
        .collect();

    let mut total = 0.0f64;
    for (point, r) in points.iter().zip(resp.iter_mut()) {
        let mut log_probs = vec![0.0f64; k];
        for c in 0..k {
            let mahalanobis: f64 = point
                .iter()
                .zip(means[c].iter().zip(variances[c].iter()))
                .map(|(x, (m, v))| (x - m) * (x - m) / v)
                .sum();
            log_probs[c] = weights[c].ln() - 0.5 * (log_norms[c] + mahalanobis);
        }

        let max = log_probs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = log_probs.iter().map(|lp| (lp - max).exp()).sum();
        let log_sum = max + sum.ln();
        if !log_sum.is_finite() {
            return Err(CreditAlignerError::Clustering(
                "Gaussian mixture produced a non-finite likelihood".to_string(),
            ));
        }

        for c in 0..k {
            r[c] = (log_probs[c] - log_sum).exp();
        }
        total += log_sum;
    }

    Ok(total / points.len().max(1) as f64)
}

/// Average-linkage merge history over cosine distances
#[derive(Debug, Clone)]
pub struct Dendrogram {
    n: usize,
    merges: Vec<(usize, usize)>,
}

impl Dendrogram {
    pub fn build(data: &Array2<f32>) -> Self {
        let n = data.nrows();
        let mut distances = vec![vec![0.0f64; n]; n];
        for i in 0..n {
            for j in i + 1..n {
                let d = cosine_distance(data.row(i), data.row(j)) as f64;
                distances[i][j] = d;
                distances[j][i] = d;
            }
        }

        let mut active = vec![true; n];
        let mut sizes = vec![1usize; n];
        let mut merges = Vec::with_capacity(n.saturating_sub(1));

        for _ in 1..n {
            let mut best: Option<(usize, usize, f64)> = None;
            for a in 0..n {
                if !active[a] {
                    continue;
                }
                for b in a + 1..n {
                    if !active[b] {
                        continue;
                    }
                    if best.map(|(_, _, d)| distances[a][b] < d).unwrap_or(true) {
                        best = Some((a, b, distances[a][b]));
                    }
                }
            }

            let Some((a, b, _)) = best else { break };
            let (size_a, size_b) = (sizes[a] as f64, sizes[b] as f64);
            for x in 0..n {
                if !active[x] || x == a || x == b {
                    continue;
                }
                let merged = (size_a * distances[a][x] + size_b * distances[b][x]) / (size_a + size_b);
                distances[a][x] = merged;
                distances[x][a] = merged;
            }
            sizes[a] += sizes[b];
            active[b] = false;
            merges.push((a, b));
        }

        Self { n, merges }
    }

    /// Labels after replaying merges until `k` clusters remain
    pub fn cut(&self, k: usize) -> Vec<usize> {
        let mut parent: Vec<usize> = (0..self.n).collect();
        let steps = self.n.saturating_sub(k.max(1)).min(self.merges.len());
        for &(a, b) in &self.merges[..steps] {
            let root_a = find(&mut parent, a);
            let root_b = find(&mut parent, b);
            parent[root_b] = root_a;
        }
        let roots: Vec<usize> = (0..self.n).map(|i| find(&mut parent, i)).collect();
        compact_labels(&roots)
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}
