//! Compartment labeling by clustering provisional intervals.
//!
//! Every non-masked interval of a chromosome becomes one item. Items are
//! compared through their mean correlation, clustered with Ward linkage and
//! the dendrogram is cut where the Calinski-Harabasz index suggests. The
//! exponent `γ` of the score transform is swept and the partition whose
//! labels best interleave while keeping A and B densities apart wins.

use hicomp_core::{Result, Summarizable};
use hicomp_ml::{calinski_harabasz, linkage, DistanceMatrix, Linkage};
use hicomp_ml::cluster::n_clusters;
use hicomp_stats::{nan_sum, t_test_two_sample};

use crate::compartment::{CompartmentInterval, CompartmentType};
use crate::density::DensitySource;
use crate::diagnostics::Diagnostic;

/// Parameters of [`ClusterCompartmentClassifier`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterConfig {
    /// `γ` runs over `0, 1/steps, ..., 1`.
    pub gamma_steps: usize,
    /// Interleaving penalty above which two clusters are considered too
    /// segregated and three are tried.
    pub intermingling_margin: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            gamma_steps: 100,
            intermingling_margin: 7.0,
        }
    }
}

/// Score of one clustering; lower `score` is better.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterScore {
    /// Interleaving penalty plus `t_statistic`.
    pub score: f64,
    /// Pooled-variance t statistic between A and B densities.
    pub t_statistic: f64,
    /// Fraction of scored intervals labeled A.
    pub proportion_a: f64,
}

impl ClusterScore {
    /// Returned when no valid partition exists.
    pub const SENTINEL: ClusterScore = ClusterScore {
        score: f64::INFINITY,
        t_statistic: f64::INFINITY,
        proportion_a: f64::INFINITY,
    };

    pub fn is_valid(&self) -> bool {
        self.score.is_finite()
    }

    /// The interleaving part of the score.
    pub fn interleaving(&self) -> f64 {
        self.score - self.t_statistic
    }
}

impl Summarizable for ClusterScore {
    fn summary(&self) -> String {
        format!(
            "ClusterScore: {:.3} (t={:.3}, A={:.1}%)",
            self.score,
            self.t_statistic,
            self.proportion_a * 100.0
        )
    }
}

/// Outcome of clustering one chromosome.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterOutcome {
    /// Winning exponent; `None` when clustering was skipped.
    pub gamma: Option<f64>,
    pub n_clusters: usize,
    pub score: ClusterScore,
    pub diagnostics: Vec<Diagnostic>,
}

// ---------------------------------------------------------------------------
// Pair scores
// ---------------------------------------------------------------------------

/// Mean correlation between every pair of clustering items.
#[derive(Debug, Clone)]
pub struct PairScores {
    /// Indices of the items within the interval list.
    items: Vec<usize>,
    /// Row-major `m × m` block means; the diagonal is unused.
    raw: Vec<f64>,
    densities: Vec<f64>,
    lengths: Vec<usize>,
}

impl PairScores {
    /// Block means of a `len × len` correlation matrix (NaN at bad bins)
    /// over the non-masked `intervals`.
    pub fn new(correlation: &[f64], len: usize, intervals: &[CompartmentInterval]) -> Self {
        let items: Vec<usize> = intervals
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.kind.is_masked())
            .map(|(k, _)| k)
            .collect();
        let m = items.len();
        let mut raw = vec![0.0; m * m];
        for a in 0..m {
            let ca = &intervals[items[a]];
            for b in a + 1..m {
                let cb = &intervals[items[b]];
                let block: Vec<f64> = (ca.start..=ca.end)
                    .flat_map(|i| (cb.start..=cb.end).map(move |j| correlation[i * len + j]))
                    .collect();
                let x = nan_sum(&block) / cb.len() as f64 / ca.len() as f64;
                raw[a * m + b] = x;
                raw[b * m + a] = x;
            }
        }
        Self {
            items,
            raw,
            densities: items_field(intervals, |c| c.density),
            lengths: items_field(intervals, |c| c.len()),
        }
    }

    pub fn n_items(&self) -> usize {
        self.items.len()
    }

    fn x(&self, a: usize, b: usize) -> f64 {
        self.raw[a * self.items.len() + b]
    }

    /// Transformed score matrix: `-|x|^(1+γ) / x`, 0 where `x` is 0 or NaN,
    /// -1 on the diagonal.
    fn transformed(&self, gamma: f64) -> Vec<Vec<f64>> {
        let m = self.items.len();
        (0..m)
            .map(|a| {
                (0..m)
                    .map(|b| {
                        if a == b {
                            return -1.0;
                        }
                        let x = self.x(a, b);
                        if x == 0.0 || x.is_nan() {
                            0.0
                        } else {
                            -x.abs().powf(1.0 + gamma) / x
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Dissimilarity `1 - x` of the untransformed scores.
    fn dissimilarity(&self) -> Result<DistanceMatrix> {
        let m = self.items.len();
        let mut condensed = Vec::with_capacity(m * (m - 1) / 2);
        for a in 0..m {
            for b in a + 1..m {
                let x = self.x(a, b);
                condensed.push(if x.is_nan() { 1.0 } else { 1.0 - x });
            }
        }
        DistanceMatrix::from_condensed(condensed, m)
    }
}

fn items_field<T, F>(intervals: &[CompartmentInterval], f: F) -> Vec<T>
where
    F: Fn(&CompartmentInterval) -> T,
{
    intervals.iter().filter(|c| !c.kind.is_masked()).map(f).collect()
}

/// Score one `(γ, n_clusters)` combination.
///
/// Returns the score and the A/B label of every item, or the sentinel and
/// `None` when the dendrogram offers no cut with `n_clusters` groups, a label
/// is missing or the t-test is undefined.
pub fn score_partition(
    scores: &PairScores,
    gamma: f64,
    target: usize,
    density: &dyn DensitySource,
) -> (ClusterScore, Option<Vec<CompartmentType>>) {
    let m = scores.n_items();
    if m < 3 {
        return (ClusterScore::SENTINEL, None);
    }
    let labels = match cut_for(scores, gamma, target) {
        Ok(Some(labels)) => labels,
        _ => return (ClusterScore::SENTINEL, None),
    };

    let k = n_clusters(&labels);
    let mut kinds = vec![CompartmentType::Unlabeled; m];
    let mut dens_a = Vec::new();
    let mut dens_b = Vec::new();
    for cluster in 0..k {
        let members: Vec<usize> = (0..m).filter(|&i| labels[i] == cluster).collect();
        let mean = members.iter().map(|&i| scores.densities[i]).sum::<f64>() / members.len() as f64;
        let a_like = density.is_a_like(mean);
        let (kind, bucket) = if a_like {
            (CompartmentType::A, &mut dens_a)
        } else {
            (CompartmentType::B, &mut dens_b)
        };
        for &i in &members {
            kinds[i] = kind;
            if scores.lengths[i] > 2 {
                bucket.push(scores.densities[i]);
            }
        }
    }

    let tt = match t_test_two_sample(&dens_a, &dens_b, true) {
        Ok(t) if t.statistic.is_finite() => t.statistic,
        _ => return (ClusterScore::SENTINEL, None),
    };
    let proportion_a = dens_a.len() as f64 / (dens_a.len() + dens_b.len()) as f64;
    let same = kinds.windows(2).filter(|w| w[0] == w[1]).count();
    let interleave = (10.0 * (same as f64 / m as f64 - 0.4)).exp();
    (
        ClusterScore {
            score: interleave + tt,
            t_statistic: tt,
            proportion_a,
        },
        Some(kinds),
    )
}

/// Ward clustering and Calinski-Harabasz cut; `None` when no cut yields
/// `target` clusters.
fn cut_for(scores: &PairScores, gamma: f64, target: usize) -> Result<Option<Vec<usize>>> {
    let rows = scores.transformed(gamma);
    let refs: Vec<&[f64]> = rows.iter().map(|r| r.as_slice()).collect();
    let tree = linkage(&DistanceMatrix::from_points(&refs)?, Linkage::Ward)?;
    let dissimilarity = scores.dissimilarity()?;

    let heights = tree.heights();
    let mut candidates: Vec<f64> = heights[heights.len().saturating_sub(3)..].to_vec();
    candidates.dedup();

    let mut solutions = Vec::with_capacity(candidates.len());
    for h in candidates {
        let labels = tree.cut_at_height(h);
        let ch = calinski_harabasz(&dissimilarity, &labels)?;
        if ch > 0.0 {
            solutions.push((ch, labels));
        }
    }
    solutions.sort_by(|a, b| a.0.total_cmp(&b.0));

    let Some(idx) = (solutions.len() + 1).checked_sub(target) else {
        return Ok(None);
    };
    Ok(solutions
        .into_iter()
        .nth(idx)
        .map(|(_, labels)| labels)
        .filter(|labels| n_clusters(labels) == target))
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// `γ`-swept Ward clustering of provisional compartments.
#[derive(Debug, Clone, Default)]
pub struct ClusterCompartmentClassifier {
    pub config: ClusterConfig,
}

impl ClusterCompartmentClassifier {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    fn sweep(&self, scores: &PairScores, target: usize, density: &dyn DensitySource) -> (f64, ClusterScore) {
        let steps = self.config.gamma_steps.max(1);
        let gammas: Vec<f64> = (0..=steps).map(|g| g as f64 / steps as f64).collect();
        let eval = |&gamma: &f64| (gamma, score_partition(scores, gamma, target, density).0);

        #[cfg(feature = "parallel")]
        let results: Vec<(f64, ClusterScore)> = {
            use rayon::prelude::*;
            gammas.par_iter().map(eval).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results: Vec<(f64, ClusterScore)> = gammas.iter().map(eval).collect();

        // first strict minimum wins, so ties keep the lowest γ
        results
            .into_iter()
            .fold((0.0, ClusterScore::SENTINEL), |best, (gamma, s)| {
                if s.score < best.1.score {
                    (gamma, s)
                } else {
                    best
                }
            })
    }

    /// Relabel the non-masked `intervals` of `chromosome` as A or B.
    ///
    /// `correlation` is the chromosome-length correlation matrix with NaN
    /// at bad bins. Intervals keep their provisional types when no valid
    /// clustering exists.
    pub fn classify(
        &self,
        chromosome: &str,
        correlation: &[f64],
        len: usize,
        intervals: &mut [CompartmentInterval],
        density: &dyn DensitySource,
    ) -> ClusterOutcome {
        let scores = PairScores::new(correlation, len, intervals);
        let mut diagnostics = Vec::new();

        let mut target = 2;
        let (mut gamma, mut best) = self.sweep(&scores, target, density);
        if best.interleaving() > self.config.intermingling_margin {
            diagnostics.push(
                Diagnostic::LowIntermingling {
                    chromosome: chromosome.to_string(),
                }
                .emit(),
            );
            target = 3;
            (gamma, best) = self.sweep(&scores, target, density);
        }

        let (score, kinds) = score_partition(&scores, gamma, target, density);
        let Some(kinds) = kinds.filter(|_| score.is_valid()) else {
            diagnostics.push(
                Diagnostic::ClusteringSkipped {
                    chromosome: chromosome.to_string(),
                }
                .emit(),
            );
            return ClusterOutcome {
                gamma: None,
                n_clusters: target,
                score: ClusterScore::SENTINEL,
                diagnostics,
            };
        };
        for (&k, kind) in scores.items.iter().zip(kinds) {
            intervals[k].kind = kind;
        }
        log::debug!(
            "{}: {} clusters at gamma {:.2}, {}",
            chromosome,
            target,
            gamma,
            score.summary()
        );
        ClusterOutcome {
            gamma: Some(gamma),
            n_clusters: target,
            score,
            diagnostics,
        }
    }
}
