//! Agglomerative hierarchical clustering with dendrogram cuts.
//!
//! [`linkage`] builds the full merge tree from a [`DistanceMatrix`] using
//! Lance-Williams updates. Merge heights are non-decreasing for all offered
//! criteria, so the tree can be cut either by height ([`Dendrogram::cut_at_height`],
//! "every merge at or below `t` is applied") or by cluster count.

use hicomp_core::{HicompError, Result, Summarizable};

use crate::distance::DistanceMatrix;

// ---------------------------------------------------------------------------
// Linkage
// ---------------------------------------------------------------------------

/// Linkage criterion for hierarchical clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Linkage {
    Single,
    Complete,
    Average,
    /// Minimum variance criterion. Expects Euclidean input distances;
    /// heights are reported on the same scale.
    #[default]
    Ward,
}

/// A single merge step in the dendrogram.
///
/// Cluster ids below `n_points` are leaves; the cluster created by merge
/// step `s` has id `n_points + s`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MergeStep {
    pub cluster_a: usize,
    pub cluster_b: usize,
    pub distance: f64,
    pub size: usize,
}

/// The full merge tree of `n_points` items (`n_points - 1` merges).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dendrogram {
    n_points: usize,
    merges: Vec<MergeStep>,
}

impl Summarizable for Dendrogram {
    fn summary(&self) -> String {
        format!(
            "Dendrogram: {} points, {} merges, top height {:.4}",
            self.n_points,
            self.merges.len(),
            self.merges.last().map_or(0.0, |m| m.distance),
        )
    }
}

/// Build the complete dendrogram for a precomputed distance matrix.
pub fn linkage(distances: &DistanceMatrix, method: Linkage) -> Result<Dendrogram> {
    let n = distances.n();
    if n < 2 {
        return Err(HicompError::InvalidInput(
            "linkage: need at least 2 points".into(),
        ));
    }

    let mut dist = vec![0.0; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = distances.get(i, j);
            dist[i * n + j] = d;
            dist[j * n + i] = d;
        }
    }

    // slot -> (current cluster id, size); inactive slots are None
    let mut slots: Vec<Option<(usize, usize)>> = (0..n).map(|i| Some((i, 1))).collect();
    let mut merges = Vec::with_capacity(n - 1);

    for step in 0..(n - 1) {
        let mut best = f64::INFINITY;
        let mut pair = None;
        for a in 0..n {
            if slots[a].is_none() {
                continue;
            }
            for b in (a + 1)..n {
                if slots[b].is_some() && dist[a * n + b] < best {
                    best = dist[a * n + b];
                    pair = Some((a, b));
                }
            }
        }
        let (a, b) = pair.ok_or_else(|| {
            HicompError::Numerical("linkage: no finite distance left to merge".into())
        })?;
        let (id_a, size_a) = slots[a].ok_or_else(|| HicompError::Other("inactive slot".into()))?;
        let (id_b, size_b) = slots[b].ok_or_else(|| HicompError::Other("inactive slot".into()))?;

        for c in 0..n {
            let Some((_, size_c)) = slots[c] else { continue };
            if c == a || c == b {
                continue;
            }
            let d_ac = dist[a * n + c];
            let d_bc = dist[b * n + c];
            let merged = match method {
                Linkage::Single => d_ac.min(d_bc),
                Linkage::Complete => d_ac.max(d_bc),
                Linkage::Average => {
                    (d_ac * size_a as f64 + d_bc * size_b as f64) / (size_a + size_b) as f64
                }
                Linkage::Ward => {
                    let (na, nb, nc) = (size_a as f64, size_b as f64, size_c as f64);
                    let total = na + nb + nc;
                    (((na + nc) * d_ac * d_ac + (nb + nc) * d_bc * d_bc - nc * best * best)
                        / total)
                        .max(0.0)
                        .sqrt()
                }
            };
            dist[a * n + c] = merged;
            dist[c * n + a] = merged;
        }

        merges.push(MergeStep {
            cluster_a: id_a.min(id_b),
            cluster_b: id_a.max(id_b),
            distance: best,
            size: size_a + size_b,
        });
        slots[a] = Some((n + step, size_a + size_b));
        slots[b] = None;
    }

    Ok(Dendrogram { n_points: n, merges })
}

impl Dendrogram {
    /// Number of clustered items.
    pub fn n_points(&self) -> usize {
        self.n_points
    }

    /// Merge steps in order of increasing height.
    pub fn merges(&self) -> &[MergeStep] {
        &self.merges
    }

    /// Merge heights, non-decreasing.
    pub fn heights(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.distance).collect()
    }

    /// Flat clusters obtained by applying every merge with height `<= t`.
    ///
    /// Labels are `0..k`, numbered by first appearance in item order.
    pub fn cut_at_height(&self, t: f64) -> Vec<usize> {
        let applied = self.merges.iter().take_while(|m| m.distance <= t).count();
        self.apply(applied)
    }

    /// Flat clusters with exactly `n_clusters` groups.
    pub fn cut(&self, n_clusters: usize) -> Result<Vec<usize>> {
        if n_clusters == 0 || n_clusters > self.n_points {
            return Err(HicompError::InvalidInput(format!(
                "n_clusters ({}) must be in 1..={}",
                n_clusters, self.n_points
            )));
        }
        Ok(self.apply(self.n_points - n_clusters))
    }

    fn apply(&self, n_merges: usize) -> Vec<usize> {
        let n = self.n_points;
        let mut parent: Vec<usize> = (0..n).collect();
        // representative leaf of every cluster id created so far
        let mut leaf_of: Vec<usize> = (0..n).collect();

        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for m in &self.merges[..n_merges] {
            let ra = find(&mut parent, leaf_of[m.cluster_a]);
            let rb = find(&mut parent, leaf_of[m.cluster_b]);
            parent[rb] = ra;
            leaf_of.push(ra);
        }

        let mut label_of_root = vec![usize::MAX; n];
        let mut next = 0;
        (0..n)
            .map(|i| {
                let r = find(&mut parent, i);
                if label_of_root[r] == usize::MAX {
                    label_of_root[r] = next;
                    next += 1;
                }
                label_of_root[r]
            })
            .collect()
    }
}

/// Number of distinct labels in a flat clustering.
pub fn n_clusters(labels: &[usize]) -> usize {
    labels.iter().max().map_or(0, |&m| m + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_points(xs: &[f64]) -> DistanceMatrix {
        let rows: Vec<Vec<f64>> = xs.iter().map(|&x| vec![x]).collect();
        let refs: Vec<&[f64]> = rows.iter().map(|r| r.as_slice()).collect();
        DistanceMatrix::from_points(&refs).unwrap()
    }

    #[test]
    fn single_linkage_groups() {
        let dm = line_points(&[0.0, 1.0, 2.0, 10.0]);
        let tree = linkage(&dm, Linkage::Single).unwrap();
        let labels = tree.cut(2).unwrap();
        assert_eq!(labels, vec![0, 0, 0, 1]);
    }

    #[test]
    fn complete_and_average_groups() {
        let dm = line_points(&[0.0, 1.0, 10.0, 11.0]);
        for method in [Linkage::Complete, Linkage::Average] {
            let labels = linkage(&dm, method).unwrap().cut(2).unwrap();
            assert_eq!(labels, vec![0, 0, 1, 1]);
        }
    }

    #[test]
    fn ward_heights_match_reference() {
        // Points 0, 1, 10, 11 in 1-D: first merges at 1.0 each; the final
        // height is sqrt(2·|A|·|B| / (|A|+|B|)) · |centroid gap| = sqrt(2) · 10.
        let dm = line_points(&[0.0, 1.0, 10.0, 11.0]);
        let tree = linkage(&dm, Linkage::Ward).unwrap();
        let h = tree.heights();
        assert_eq!(h.len(), 3);
        assert!((h[0] - 1.0).abs() < 1e-12);
        assert!((h[1] - 1.0).abs() < 1e-12);
        assert!((h[2] - 10.0 * 2f64.sqrt()).abs() < 1e-9);
        assert!(h.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn merge_ids_follow_creation_order() {
        let dm = line_points(&[0.0, 1.0, 10.0]);
        let tree = linkage(&dm, Linkage::Single).unwrap();
        let m = tree.merges();
        assert_eq!((m[0].cluster_a, m[0].cluster_b, m[0].size), (0, 1, 2));
        assert_eq!((m[1].cluster_a, m[1].cluster_b, m[1].size), (2, 3, 3));
    }

    #[test]
    fn cut_at_height_applies_ties() {
        let dm = line_points(&[0.0, 0.0, 5.0, 5.0]);
        let tree = linkage(&dm, Linkage::Ward).unwrap();
        assert_eq!(tree.cut_at_height(0.0), vec![0, 0, 1, 1]);
        let top = *tree.heights().last().unwrap();
        assert_eq!(n_clusters(&tree.cut_at_height(top)), 1);
        assert_eq!(n_clusters(&tree.cut_at_height(-1.0)), 4);
    }

    #[test]
    fn cut_bounds() {
        let dm = line_points(&[0.0, 1.0]);
        let tree = linkage(&dm, Linkage::Ward).unwrap();
        assert!(tree.cut(0).is_err());
        assert!(tree.cut(3).is_err());
        assert_eq!(tree.cut(1).unwrap(), vec![0, 0]);
    }

    #[test]
    fn summary_mentions_points() {
        let dm = line_points(&[0.0, 1.0, 10.0]);
        let tree = linkage(&dm, Linkage::Average).unwrap();
        assert!(tree.summary().contains("3 points"));
    }
}
