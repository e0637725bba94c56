//! Row normalisation and PCA reduction for high-dimensional embeddings

use log::debug;
use ndarray::{Array1, Array2, Axis};

const POWER_ITERATIONS: usize = 200;
const POWER_TOLERANCE: f64 = 1e-10;

/// Scale every row to unit length; zero rows stay zero
pub fn l2_normalize_rows(matrix: &Array2<f32>) -> Array2<f32> {
    let mut normalized = matrix.clone();
    for mut row in normalized.axis_iter_mut(Axis(0)) {
        let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|x| x / norm);
        }
    }
    normalized
}

/// Reduce with PCA when the embedding is wider than `reduce_above_dim`.
///
/// The component count is `min(n_samples, dim / 3, target_dim)`.
pub fn reduce_if_needed(
    matrix: &Array2<f32>,
    reduce_above_dim: usize,
    target_dim: usize,
) -> Array2<f32> {
    let (n_samples, n_features) = matrix.dim();
    if n_features <= reduce_above_dim || n_samples < 2 {
        return matrix.clone();
    }

    let components = n_samples.min(n_features / 3).min(target_dim).max(1);
    debug!(
        "Reducing {} x {} embedding to {} components",
        n_samples, n_features, components
    );
    pca(matrix, components)
}

/// Project onto the top principal components.
///
/// Works on the Gram matrix when there are fewer samples than features,
/// otherwise on the covariance matrix.
pub fn pca(matrix: &Array2<f32>, components: usize) -> Array2<f32> {
    let data = matrix.mapv(|x| x as f64);
    let (n_samples, n_features) = data.dim();
    let components = components.min(n_samples).min(n_features);

    let mean = data
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(n_features));
    let centered = &data - &mean;

    let projected = if n_samples <= n_features {
        let gram = centered.dot(&centered.t());
        let (values, vectors) = top_eigenpairs(&gram, components);
        let mut out = Array2::<f64>::zeros((n_samples, components));
        for (j, (value, vector)) in values.iter().zip(vectors.iter()).enumerate() {
            let scale = value.max(0.0).sqrt();
            for i in 0..n_samples {
                out[[i, j]] = vector[i] * scale;
            }
        }
        out
    } else {
        let covariance = centered.t().dot(&centered);
        let (_, vectors) = top_eigenpairs(&covariance, components);
        let mut basis = Array2::<f64>::zeros((n_features, components));
        for (j, vector) in vectors.iter().enumerate() {
            basis.column_mut(j).assign(vector);
        }
        centered.dot(&basis)
    };

    projected.mapv(|x| x as f32)
}

/// Leading eigenpairs of a symmetric matrix by power iteration with deflation
fn top_eigenpairs(symmetric: &Array2<f64>, count: usize) -> (Vec<f64>, Vec<Array1<f64>>) {
    let size = symmetric.nrows();
    let mut working = symmetric.clone();
    let mut values = Vec::with_capacity(count);
    let mut vectors = Vec::with_capacity(count);

    for component in 0..count {
        let mut vector = Array1::from_iter(
            (0..size).map(|i| 1.0 + ((i + component) % 7) as f64 * 0.1),
        );
        normalize(&mut vector);

        let mut eigenvalue = 0.0;
        for _ in 0..POWER_ITERATIONS {
            let mut next = working.dot(&vector);
            let norm = next.dot(&next).sqrt();
            if norm < POWER_TOLERANCE {
                eigenvalue = 0.0;
                break;
            }
            next /= norm;
            let delta = (&next - &vector).mapv(f64::abs).sum();
            vector = next;
            eigenvalue = vector.dot(&working.dot(&vector));
            if delta < POWER_TOLERANCE {
                break;
            }
        }

        for i in 0..size {
            for j in 0..size {
                working[[i, j]] -= eigenvalue * vector[i] * vector[j];
            }
        }
        values.push(eigenvalue);
        vectors.push(vector);
    }

    (values, vectors)
}

fn normalize(vector: &mut Array1<f64>) {
    let norm = vector.dot(vector).sqrt();
    if norm > 0.0 {
        *vector /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_l2_normalize_rows() {
        let m = array![[3.0f32, 4.0], [0.0, 0.0]];
        let n = l2_normalize_rows(&m);
        assert!((n[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((n[[0, 1]] - 0.8).abs() < 1e-6);
        assert_eq!(n[[1, 0]], 0.0);
    }

    #[test]
    fn test_small_embeddings_are_not_reduced() {
        let m = Array2::<f32>::ones((20, 64));
        let out = reduce_if_needed(&m, 512, 100);
        assert_eq!(out.dim(), (20, 64));
    }

    #[test]
    fn test_wide_embeddings_are_reduced() {
        let m = Array2::from_shape_fn((12, 600), |(i, j)| ((i * 31 + j * 7) % 13) as f32);
        let out = reduce_if_needed(&m, 512, 100);
        assert_eq!(out.dim(), (12, 12));
    }

    #[test]
    fn test_pca_keeps_dominant_direction() {
        // Points spread along x with small y noise
        let m = array![
            [-2.0f32, 0.1],
            [-1.0, -0.1],
            [0.0, 0.05],
            [1.0, -0.05],
            [2.0, 0.0]
        ];
        let projected = pca(&m, 1);
        let spread = projected.column(0).mapv(f32::abs).sum();
        assert!(spread > 5.5);
    }
}
