//! Bad-bin detection, bias and expected-count estimation.
//!
//! Compartment calling only consumes the results of normalization. The
//! [`NormalizationPort`] trait is the seam through which they are produced,
//! and [`BasicNormalizer`] is the built-in implementation: zero-count and
//! mean filters, iterative correction (ICE) and a distance-decay estimate
//! with signal-to-noise pooling.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use hicomp_core::{HicompError, Result};
use hicomp_stats::median;

use crate::diagnostics::Diagnostic;
use crate::matrix::{ContactMatrix, Expected};

/// Producer of normalization state for a [`ContactMatrix`].
///
/// Implementations are pure over `(matrix, bads, parameters)`; storing the
/// results is left to the caller.
pub trait NormalizationPort {
    /// Bins with too little signal.
    fn filter(
        &self,
        matrix: &ContactMatrix,
        perc_zero: f64,
        min_count: Option<f64>,
    ) -> Result<BTreeSet<usize>>;

    /// Additional bad bins among those not in `bads`.
    fn filter_by_mean(&self, matrix: &ContactMatrix, bads: &BTreeSet<usize>) -> Result<BTreeSet<usize>>;

    /// One positive factor per bin; bad bins get 1.0.
    fn estimate_bias(
        &self,
        matrix: &ContactMatrix,
        bads: &BTreeSet<usize>,
        iterations: usize,
        max_dev: f64,
    ) -> Result<Vec<f64>>;

    /// Mean contact count by bin distance.
    fn estimate_expected(
        &self,
        matrix: &ContactMatrix,
        bads: &BTreeSet<usize>,
        signal_to_noise: f64,
        per_chromosome: bool,
    ) -> Result<Expected>;
}

/// Built-in [`NormalizationPort`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BasicNormalizer {
    /// A bin is bad when its mean is below this fraction of the median bin mean.
    pub mean_fraction: f64,
}

impl Default for BasicNormalizer {
    fn default() -> Self {
        Self { mean_fraction: 0.05 }
    }
}

/// Per-bin totals and populated-cell counts.
fn column_stats(matrix: &ContactMatrix) -> (Vec<f64>, Vec<usize>) {
    let n = matrix.size();
    let mut totals = vec![0.0; n];
    let mut nonzero = vec![0usize; n];
    for (_, col, v) in matrix.triplets() {
        totals[col] += v;
        nonzero[col] += 1;
    }
    (totals, nonzero)
}

impl NormalizationPort for BasicNormalizer {
    fn filter(
        &self,
        matrix: &ContactMatrix,
        perc_zero: f64,
        min_count: Option<f64>,
    ) -> Result<BTreeSet<usize>> {
        let n = matrix.size();
        let (totals, nonzero) = column_stats(matrix);
        let bads: BTreeSet<usize> = (0..n)
            .filter(|&i| {
                let zeros = 100.0 * (n - nonzero[i]) as f64 / n as f64;
                zeros > perc_zero || min_count.is_some_and(|m| totals[i] < m)
            })
            .collect();
        log::debug!("zero-count filter: {} of {} bins removed", bads.len(), n);
        Ok(bads)
    }

    fn filter_by_mean(&self, matrix: &ContactMatrix, bads: &BTreeSet<usize>) -> Result<BTreeSet<usize>> {
        let n = matrix.size();
        let good: Vec<usize> = (0..n).filter(|i| !bads.contains(i)).collect();
        if good.is_empty() {
            return Ok(BTreeSet::new());
        }
        let mut totals = vec![0.0; n];
        for (row, col, v) in matrix.triplets() {
            if !bads.contains(&row) {
                totals[col] += v;
            }
        }
        let means: Vec<f64> = good.iter().map(|&i| totals[i] / good.len() as f64).collect();
        let cutoff = self.mean_fraction * median(&means)?;
        Ok(good
            .iter()
            .zip(&means)
            .filter(|(_, &m)| m < cutoff)
            .map(|(&i, _)| i)
            .collect())
    }

    fn estimate_bias(
        &self,
        matrix: &ContactMatrix,
        bads: &BTreeSet<usize>,
        iterations: usize,
        max_dev: f64,
    ) -> Result<Vec<f64>> {
        let n = matrix.size();
        let cells: Vec<(usize, usize, f64)> = matrix
            .triplets()
            .filter(|(i, j, _)| !bads.contains(i) && !bads.contains(j))
            .collect();
        let mut bias = vec![1.0; n];

        for round in 0..iterations.max(1) {
            let mut sums = vec![0.0; n];
            for &(i, j, v) in &cells {
                sums[i] += v / (bias[i] * bias[j]);
            }
            let active: Vec<f64> = (0..n)
                .filter(|i| !bads.contains(i) && sums[*i] > 0.0)
                .map(|i| sums[i])
                .collect();
            if active.is_empty() {
                break;
            }
            let mean = active.iter().sum::<f64>() / active.len() as f64;
            let mut dev = 0.0f64;
            for i in 0..n {
                if bads.contains(&i) || sums[i] <= 0.0 {
                    continue;
                }
                let factor = sums[i] / mean;
                dev = dev.max((factor - 1.0).abs());
                bias[i] *= factor;
            }
            log::debug!("ICE round {}: max deviation {:.6}", round + 1, dev);
            if dev < max_dev {
                break;
            }
        }

        if bias.iter().any(|b| !b.is_finite() || *b <= 0.0) {
            return Err(HicompError::Numerical(
                "iterative correction produced a non-positive bias".into(),
            ));
        }
        Ok(bias)
    }

    fn estimate_expected(
        &self,
        matrix: &ContactMatrix,
        bads: &BTreeSet<usize>,
        signal_to_noise: f64,
        per_chromosome: bool,
    ) -> Result<Expected> {
        if signal_to_noise.is_nan() || signal_to_noise <= 0.0 {
            return Err(HicompError::InvalidInput(format!(
                "signal to noise must be positive, got {}",
                signal_to_noise
            )));
        }
        let sections = matrix.sections();
        if per_chromosome {
            let mut out = HashMap::with_capacity(sections.len());
            for section in sections.iter() {
                let mut acc = DecayAccumulator::new(section.len());
                acc.add(matrix, bads, section.range());
                out.insert(section.name.clone(), acc.pool(signal_to_noise));
            }
            return Ok(Expected::PerChromosome(out));
        }
        let longest = sections.iter().map(|s| s.len()).max().unwrap_or(0);
        let mut acc = DecayAccumulator::new(longest);
        for section in sections.iter() {
            acc.add(matrix, bads, section.range());
        }
        Ok(Expected::Genome(acc.pool(signal_to_noise)))
    }
}

/// Running sums of cis contacts by distance.
struct DecayAccumulator {
    normalized: Vec<f64>,
    raw: Vec<f64>,
    pairs: Vec<f64>,
}

impl DecayAccumulator {
    fn new(len: usize) -> Self {
        Self {
            normalized: vec![0.0; len],
            raw: vec![0.0; len],
            pairs: vec![0.0; len],
        }
    }

    fn add(&mut self, matrix: &ContactMatrix, bads: &BTreeSet<usize>, bins: Range<usize>) {
        let good: Vec<usize> = bins.filter(|b| !bads.contains(b)).collect();
        let bias = matrix.bias();
        for (a, &i) in good.iter().enumerate() {
            for &j in &good[a..] {
                let d = j - i;
                let v = matrix.value(i, j);
                self.raw[d] += v;
                self.normalized[d] += match bias {
                    Some(b) => v / (b[i] * b[j]),
                    None => v,
                };
                self.pairs[d] += 1.0;
            }
        }
    }

    /// Pool successive distances until their raw total reaches the
    /// requested signal to noise, then spread the pooled mean over them.
    fn pool(self, signal_to_noise: f64) -> Vec<f64> {
        let len = self.raw.len();
        let mut out = vec![0.0; len];
        let (mut start, mut sum, mut raw, mut pairs) = (0, 0.0, 0.0, 0.0);
        for d in 0..len {
            sum += self.normalized[d];
            raw += self.raw[d];
            pairs += self.pairs[d];
            let enough = raw > 0.0 && 1.0 / raw.sqrt() <= signal_to_noise;
            if enough || d + 1 == len {
                let value = if pairs > 0.0 { sum / pairs } else { 0.0 };
                out[start..=d].iter_mut().for_each(|e| *e = value);
                start = d + 1;
                sum = 0.0;
                raw = 0.0;
                pairs = 0.0;
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Preparation before compartment calling
// ---------------------------------------------------------------------------

/// Parameters of [`prepare_normalization`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrepareConfig {
    /// Zero-cell percentage above which a bin is bad.
    pub perc_zero: f64,
    pub min_count: Option<f64>,
    pub signal_to_noise: f64,
    pub per_chromosome_expected: bool,
    /// ICE rounds; 0 runs a single round.
    pub iterations: usize,
    pub max_dev: f64,
    /// Target mean normalized count per cell.
    pub factor: Option<f64>,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            perc_zero: 99.0,
            min_count: None,
            signal_to_noise: 0.05,
            per_chromosome_expected: false,
            iterations: 0,
            max_dev: 0.1,
            factor: Some(1.0),
        }
    }
}

/// Fill in whatever normalization state `matrix` lacks.
///
/// Filters bins when no bad bins are set, then estimates expected counts
/// and bias when missing. When filtering would remove every bin the bad set
/// is left empty and [`Diagnostic::AllColumnsFiltered`] is returned.
pub fn prepare_normalization<P: NormalizationPort + ?Sized>(
    matrix: &mut ContactMatrix,
    port: &P,
    config: &PrepareConfig,
) -> Result<Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();
    if matrix.bads().is_empty() {
        let bads = port.filter(matrix, config.perc_zero, config.min_count)?;
        if matrix.size() > 0 && bads.len() == matrix.size() {
            diagnostics.push(Diagnostic::AllColumnsFiltered.emit());
        } else {
            matrix.set_bads(bads)?;
        }
    }
    if matrix.expected().is_none() {
        matrix.normalize_expected(port, config.signal_to_noise, config.per_chromosome_expected)?;
    }
    if matrix.bias().is_none() {
        matrix.normalize_hic(port, config.iterations, config.max_dev, false, config.factor)?;
    }
    Ok(diagnostics)
}
