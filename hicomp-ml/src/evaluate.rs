//! Cluster evaluation metrics.

use hicomp_core::{HicompError, Result};

use crate::cluster::n_clusters;
use crate::distance::DistanceMatrix;

/// Calinski-Harabasz index computed from pairwise dissimilarities.
///
/// Uses the pairwise form of the sums of squares, exact for Euclidean input
/// and usable for any dissimilarity:
///
/// - `WGSS = Σ_c (1/n_c) Σ_{i<j ∈ c} d_ij²`
/// - `TSS  = (1/N) Σ_{i<j} d_ij²`, `BGSS = TSS - WGSS`
/// - `CH   = (BGSS / (k-1)) / (WGSS / (N-k))`
///
/// Degenerate partitions (a single cluster, all singletons, or zero
/// within-cluster spread) score 0.0. Non-Euclidean input can make the
/// score negative.
pub fn calinski_harabasz(dissimilarity: &DistanceMatrix, labels: &[usize]) -> Result<f64> {
    let n = dissimilarity.n();
    if labels.len() != n {
        return Err(HicompError::InvalidInput(format!(
            "calinski_harabasz: {} labels for {} items",
            labels.len(),
            n
        )));
    }
    let k = n_clusters(labels);
    if k < 2 || k >= n {
        return Ok(0.0);
    }

    let mut sizes = vec![0usize; k];
    for &l in labels {
        sizes[l] += 1;
    }

    let mut within = vec![0.0; k];
    let mut total = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let d2 = dissimilarity.get(i, j).powi(2);
            total += d2;
            if labels[i] == labels[j] {
                within[labels[i]] += d2;
            }
        }
    }
    let wgss: f64 = within
        .iter()
        .zip(&sizes)
        .filter(|(_, &s)| s > 0)
        .map(|(w, &s)| w / s as f64)
        .sum();
    if wgss <= 0.0 {
        return Ok(0.0);
    }
    let bgss = total / n as f64 - wgss;
    Ok((bgss / (k - 1) as f64) / (wgss / (n - k) as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_points(data: &[Vec<f64>]) -> DistanceMatrix {
        let refs: Vec<&[f64]> = data.iter().map(|v| v.as_slice()).collect();
        DistanceMatrix::from_points(&refs).unwrap()
    }

    #[test]
    fn matches_centroid_definition() {
        // 1-D points {0, 2} and {10, 12}: centroids 1 and 11, grand mean 6.
        // WGSS = 4 * 1 = 4, BGSS = 4 * 25 = 100, CH = (100/1) / (4/2) = 50.
        let dm = from_points(&[vec![0.0], vec![2.0], vec![10.0], vec![12.0]]);
        let ch = calinski_harabasz(&dm, &[0, 0, 1, 1]).unwrap();
        assert!((ch - 50.0).abs() < 1e-9, "got {}", ch);
    }

    #[test]
    fn good_partition_beats_bad() {
        let dm = from_points(&[
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 10.0],
            vec![10.0, 10.1],
        ]);
        let good = calinski_harabasz(&dm, &[0, 0, 0, 1, 1, 1]).unwrap();
        let bad = calinski_harabasz(&dm, &[0, 1, 0, 1, 0, 1]).unwrap();
        assert!(good > 100.0 * bad.max(1e-9), "good={} bad={}", good, bad);
    }

    #[test]
    fn degenerate_partitions_score_zero() {
        let dm = from_points(&[vec![0.0], vec![1.0], vec![5.0]]);
        assert_eq!(calinski_harabasz(&dm, &[0, 0, 0]).unwrap(), 0.0);
        assert_eq!(calinski_harabasz(&dm, &[0, 1, 2]).unwrap(), 0.0);
    }

    #[test]
    fn label_length_mismatch() {
        let dm = from_points(&[vec![0.0], vec![1.0]]);
        assert!(calinski_harabasz(&dm, &[0]).is_err());
    }
}
