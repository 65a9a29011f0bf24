//! Eigenvector segmentation of one chromosome.
//!
//! The observed/expected matrix of a chromosome's good bins is turned into a
//! Pearson correlation matrix whose leading eigenvectors follow the A/B
//! compartment pattern. Compartment boundaries sit where the selected
//! eigenvector changes sign.

use std::collections::HashMap;

use hicomp_core::{HicompError, Result};
use hicomp_stats::{median_filter, spearman, symmetric_eigen, CorrelationMatrix};

use crate::compartment::{CompartmentInterval, CompartmentType, EigenTrack};
use crate::density::{measure_densities, DensitySource, ReferenceTrack};
use crate::diagnostics::Diagnostic;
use crate::matrix::ContactMatrix;
use crate::sections::Section;

/// Parameters of [`CorrelationSegmenter`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmenterConfig {
    /// Number of leading eigenvectors computed.
    pub max_ev: usize,
    /// 1-based eigenvector to use, by chromosome name.
    pub ev_index: HashMap<String, usize>,
    /// Median filter window over the correlation matrix; 0 disables.
    pub smoothing_window: usize,
    /// Bound on `resolution * (segments - 1) / good bins` for the automatic
    /// eigenvector search. The first eigenvector within it is used; `None`
    /// always takes the first one.
    pub max_mean_size: Option<f64>,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_ev: 3,
            ev_index: HashMap::new(),
            smoothing_window: 0,
            max_mean_size: Some(10_000.0),
        }
    }
}

/// Result of segmenting one chromosome.
#[derive(Debug, Clone)]
pub struct ChromosomeSegmentation {
    pub track: EigenTrack,
    /// Provisionally typed intervals tiling the chromosome.
    pub intervals: Vec<CompartmentInterval>,
    /// Row-major `length × length` correlation matrix, NaN at bad bins.
    pub correlation: Vec<f64>,
    /// Chromosome length in bins.
    pub length: usize,
    /// Chromosome-local indices of the good bins.
    pub good: Vec<usize>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Outcome of [`CorrelationSegmenter::segment`].
#[derive(Debug, Clone)]
pub enum SegmentOutcome {
    Segmented(Box<ChromosomeSegmentation>),
    /// The chromosome cannot be segmented; the reason is kept for reporting.
    Degenerate(String),
}

/// Runs of constant sign as inclusive `(start, end)` pairs.
///
/// A boundary falls between `k` and `k + 1` when `v[k] * v[k + 1] < 0`, so
/// zeros never split a run.
pub fn sign_change_segments(values: &[f64]) -> Vec<(usize, usize)> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut segments = Vec::new();
    let mut start = 0;
    for k in 0..values.len() - 1 {
        if values[k] * values[k + 1] < 0.0 {
            segments.push((start, k));
            start = k + 1;
        }
    }
    segments.push((start, values.len() - 1));
    segments
}

/// First eigenvector, 1-based, whose segmentation keeps
/// `resolution * (segments - 1) / bins` within `max_mean_size`.
///
/// `bins` is the number of good bins the vectors span. `None` when every
/// candidate exceeds the bound.
pub fn select_eigenvector(vectors: &[Vec<f64>], resolution: usize, bins: usize, max_mean_size: f64) -> Option<usize> {
    if bins == 0 {
        return None;
    }
    vectors
        .iter()
        .position(|v| {
            let segments = sign_change_segments(v).len();
            let stat = resolution as f64 * segments.saturating_sub(1) as f64 / bins as f64;
            if stat > max_mean_size {
                log::debug!("{} segments over {} bins exceed the mean size bound", segments, bins);
                false
            } else {
                true
            }
        })
        .map(|k| k + 1)
}

/// Map segments over good bins back to chromosome coordinates.
///
/// `good[k]` is the chromosome bin of the `k`-th good bin. Bad bins inside a
/// segment stay in it; runs of bad bins between segments, or at either end,
/// become [`CompartmentType::Masked`] intervals. The result tiles
/// `0..len`.
pub fn reinsert_bad_bins(segments: &[(usize, usize)], good: &[usize], len: usize) -> Vec<CompartmentInterval> {
    let mut out = Vec::with_capacity(segments.len() + 2);
    let mut next = 0;
    for &(s, e) in segments {
        let (start, end) = (good[s], good[e]);
        if start > next {
            out.push(CompartmentInterval::new(next, start - 1, CompartmentType::Masked));
        }
        out.push(CompartmentInterval::new(start, end, CompartmentType::Unlabeled));
        next = end + 1;
    }
    if next < len {
        out.push(CompartmentInterval::new(next, len - 1, CompartmentType::Masked));
    }
    out
}

/// Spread values over good bins to a chromosome-length vector, NaN elsewhere.
pub fn expand_with_nan(values: &[f64], good: &[usize], len: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; len];
    for (&v, &k) in values.iter().zip(good) {
        out[k] = v;
    }
    out
}

fn expand_square(values: &[f64], good: &[usize], len: usize) -> Vec<f64> {
    let n = good.len();
    let mut out = vec![f64::NAN; len * len];
    for (a, &i) in good.iter().enumerate() {
        for (b, &j) in good.iter().enumerate() {
            out[i * len + j] = values[a * n + b];
        }
    }
    out
}

/// Eigenvector compartment segmentation.
#[derive(Debug, Clone, Default)]
pub struct CorrelationSegmenter {
    pub config: SegmenterConfig,
}

impl CorrelationSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Segment one chromosome of a normalized matrix.
    ///
    /// Errors when the matrix lacks bias or expected counts, or when an
    /// eigenvector override is out of range. Chromosomes with too few good
    /// bins, or whose decomposition fails, come back as
    /// [`SegmentOutcome::Degenerate`].
    pub fn segment(
        &self,
        matrix: &ContactMatrix,
        section: &Section,
        reference: Option<&ReferenceTrack>,
        density: &dyn DensitySource,
    ) -> Result<SegmentOutcome> {
        let bias = matrix
            .bias()
            .ok_or_else(|| HicompError::Configuration("experiment not normalized yet".into()))?;
        let expected = matrix
            .expected()
            .ok_or_else(|| HicompError::Configuration("expected counts not estimated yet".into()))?;
        let name = section.name.as_str();
        let len = section.len();
        if expected.for_chromosome(name).map_or(true, |c| c.is_empty()) {
            return Ok(SegmentOutcome::Degenerate("no expected counts".into()));
        }

        let good: Vec<usize> = (0..len).filter(|k| !matrix.is_bad(section.start + k)).collect();
        let n = good.len();
        let max_ev = self.config.max_ev.max(1);
        if n <= max_ev {
            return Ok(SegmentOutcome::Degenerate(format!("{} usable bins", n)));
        }

        // observed / expected over good bins, upper triangle mirrored
        let mut oe = vec![0.0; n * n];
        for a in 0..n {
            let i = section.start + good[a];
            for b in a..n {
                let j = section.start + good[b];
                let v = match expected.at(name, j - i) {
                    Some(e) if e > 0.0 && e.is_finite() => matrix.value(i, j) / e / bias[i] / bias[j],
                    _ => 0.0,
                };
                oe[a * n + b] = v;
                oe[b * n + a] = v;
            }
        }

        let corr = match CorrelationMatrix::from_flat(&oe, n, n) {
            Ok(c) => c.into_vec(),
            Err(e) => return Ok(SegmentOutcome::Degenerate(e.to_string())),
        };
        let corr = if self.config.smoothing_window > 1 {
            median_filter(&corr, n, self.config.smoothing_window)?
        } else {
            corr
        };
        let eigen = match symmetric_eigen(&corr, n) {
            Ok(e) => e,
            Err(e) => return Ok(SegmentOutcome::Degenerate(e.to_string())),
        };
        let leading = eigen.leading(max_ev);
        let mut vectors: Vec<Vec<f64>> = leading.iter().map(|p| p.vector.clone()).collect();
        let eigenvalues: Vec<f64> = leading.iter().map(|p| p.value).collect();

        let mut diagnostics = Vec::new();
        let selected = match self.config.ev_index.get(name) {
            Some(&k) if k == 0 || k > vectors.len() => {
                return Err(HicompError::Configuration(format!(
                    "eigenvector {} requested for {} but only {} computed",
                    k,
                    name,
                    vectors.len()
                )));
            }
            Some(&k) => k,
            None => match self.config.max_mean_size {
                Some(max) => {
                    select_eigenvector(&vectors, matrix.resolution(), n, max).unwrap_or_else(|| {
                        diagnostics.push(
                            Diagnostic::EigenvectorFallback {
                                chromosome: name.to_string(),
                            }
                            .emit(),
                        );
                        1
                    })
                }
                None => 1,
            },
        };

        let mut reference_rho = None;
        if let Some(track) = reference.filter(|t| t.has_chromosome(name)) {
            let (ev, refs): (Vec<f64>, Vec<f64>) = good
                .iter()
                .zip(&vectors[selected - 1])
                .filter_map(|(&k, &v)| track.value(name, k).map(|r| (v, r)))
                .unzip();
            if let Ok(rho) = spearman(&ev, &refs) {
                log::debug!("{}: Spearman rho against reference {:.4}", name, rho);
                if rho < 0.0 {
                    vectors.iter_mut().for_each(|v| v.iter_mut().for_each(|x| *x = -*x));
                }
                reference_rho = Some(rho);
            }
        }

        let segments = sign_change_segments(&vectors[selected - 1]);
        let mut intervals = reinsert_bad_bins(&segments, &good, len);
        measure_densities(&mut intervals, density, section, matrix.bads());
        for c in intervals.iter_mut().filter(|c| !c.kind.is_masked()) {
            c.kind = if density.is_a_like(c.density) {
                CompartmentType::A
            } else {
                CompartmentType::B
            };
        }

        let track = EigenTrack {
            chromosome: name.to_string(),
            eigenvalues,
            eigenvectors: vectors.iter().map(|v| expand_with_nan(v, &good, len)).collect(),
            selected,
            reference_rho,
        };
        log::debug!(
            "{}: {} intervals from EV{} over {} good bins",
            name,
            intervals.len(),
            selected,
            n
        );
        Ok(SegmentOutcome::Segmented(Box::new(ChromosomeSegmentation {
            track,
            intervals,
            correlation: expand_square(&corr, &good, len),
            length: len,
            good,
            diagnostics,
        })))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::density::InteractionDensity;
    use crate::normalization::{prepare_normalization, BasicNormalizer, PrepareConfig};

    /// 40 bins in blocks of 10 alternating between two compartments, with
    /// the given bins left empty.
    pub(crate) fn checkerboard(empty: &[usize]) -> ContactMatrix {
        let n = 40;
        let mut t = Vec::new();
        for i in 0..n {
            for j in 0..n {
                if empty.contains(&i) || empty.contains(&j) {
                    continue;
                }
                let same = (i / 10) % 2 == (j / 10) % 2;
                let decay = 20.0 / (1.0 + i.abs_diff(j) as f64);
                let noise = 1.0 + 0.05 * (((i * 7 + j * 13) % 11) as f64 / 10.0);
                let v = if same { 3.0 } else { 1.0 } * decay * noise;
                t.push((i.min(j), i.max(j), v));
            }
        }
        let mut m = ContactMatrix::from_triplets(t, n, 100).unwrap();
        m.add_binned_sections(&[n], Some(&["chr1"])).unwrap();
        prepare_normalization(&mut m, &BasicNormalizer::default(), &PrepareConfig::default()).unwrap();
        m
    }

    /// Marks the first and third blocks as A-rich.
    pub(crate) fn reference() -> ReferenceTrack {
        let data = "chr1\t0\t1000\t5\nchr1\t1000\t2000\t1\nchr1\t2000\t3000\t5\nchr1\t3000\t4000\t1\n";
        ReferenceTrack::from_bedgraph_str(data, 100).unwrap()
    }

    fn segmented(outcome: SegmentOutcome) -> ChromosomeSegmentation {
        match outcome {
            SegmentOutcome::Segmented(s) => *s,
            SegmentOutcome::Degenerate(r) => panic!("unexpected degenerate chromosome: {}", r),
        }
    }

    fn spans(intervals: &[CompartmentInterval]) -> Vec<(usize, usize, CompartmentType)> {
        intervals.iter().map(|c| (c.start, c.end, c.kind)).collect()
    }

    #[test]
    fn sign_changes() {
        assert_eq!(
            sign_change_segments(&[1.0, 2.0, -1.0, -3.0, 0.5]),
            vec![(0, 1), (2, 3), (4, 4)]
        );
        assert_eq!(sign_change_segments(&[1.0, 0.0, -1.0]), vec![(0, 2)]);
        assert!(sign_change_segments(&[]).is_empty());
    }

    #[test]
    fn reinsertion_masks_boundary_gaps() {
        // good bins 1, 2, 4, 5, 7 of a 9-bin chromosome
        let good = [1, 2, 4, 5, 7];
        let out = reinsert_bad_bins(&[(0, 2), (3, 4)], &good, 9);
        assert_eq!(
            spans(&out),
            vec![
                (0, 0, CompartmentType::Masked),
                (1, 4, CompartmentType::Unlabeled),
                (5, 7, CompartmentType::Unlabeled),
                (8, 8, CompartmentType::Masked),
            ]
        );
        let v = expand_with_nan(&[1.0, 2.0], &[0, 2], 3);
        assert_eq!(v[0], 1.0);
        assert!(v[1].is_nan());
    }

    #[test]
    fn sparse_and_dense_breakpoints_agree() {
        let m = checkerboard(&[]);
        let rows = m.get_matrix(None, true, false, false).unwrap().rows;
        let mut dense = ContactMatrix::from_dense(&rows, 100).unwrap();
        dense.add_binned_sections(&[40], Some(&["chr1"])).unwrap();
        dense.set_bias(m.bias().unwrap().to_vec()).unwrap();
        dense.set_expected(m.expected().unwrap().clone());

        let seg = CorrelationSegmenter::default();
        let section = m.sections().get("chr1").unwrap().clone();
        let density = InteractionDensity::new(&m, Default::default());
        let a = segmented(seg.segment(&m, &section, None, &density).unwrap());
        let b = segmented(seg.segment(&dense, &section, None, &density).unwrap());
        let bounds = |s: &ChromosomeSegmentation| -> Vec<(usize, usize)> {
            s.intervals.iter().map(|c| (c.start, c.end)).collect()
        };
        assert_eq!(bounds(&a), bounds(&b));
    }

    #[test]
    fn checkerboard_with_reference() {
        let m = checkerboard(&[15, 30]);
        assert!(m.is_bad(15) && m.is_bad(30));
        let reference = reference();
        let section = m.sections().get("chr1").unwrap().clone();
        let seg = CorrelationSegmenter::default();
        let s = segmented(seg.segment(&m, &section, Some(&reference), &reference).unwrap());

        assert_eq!(
            spans(&s.intervals),
            vec![
                (0, 9, CompartmentType::A),
                (10, 19, CompartmentType::B),
                (20, 29, CompartmentType::A),
                (30, 30, CompartmentType::Masked),
                (31, 39, CompartmentType::B),
            ]
        );
        assert!(s.track.reference_rho.unwrap() > 0.5);
        let ev = s.track.selected_vector();
        assert_eq!(ev.len(), 40);
        assert!(ev[15].is_nan());
        assert!(ev[0] > 0.0 && ev[12] < 0.0);
        assert!(s.correlation[15 * 40 + 3].is_nan());
        assert_eq!(s.good.len(), 38);
    }

    #[test]
    fn overrides_and_mean_size_search() {
        let m = checkerboard(&[]);
        let section = m.sections().get("chr1").unwrap().clone();
        let density = InteractionDensity::new(&m, Default::default());

        let mut config = SegmenterConfig::default();
        config.ev_index.insert("chr1".into(), 2);
        let s = segmented(CorrelationSegmenter::new(config.clone()).segment(&m, &section, None, &density).unwrap());
        assert_eq!(s.track.selected, 2);

        config.ev_index.insert("chr1".into(), 4);
        assert!(matches!(
            CorrelationSegmenter::new(config).segment(&m, &section, None, &density),
            Err(HicompError::Configuration(_))
        ));

        // 100 bp * 3 boundaries / 40 bins = 7.5 on the first eigenvector
        let config = SegmenterConfig {
            max_mean_size: Some(8.0),
            ..Default::default()
        };
        let s = segmented(CorrelationSegmenter::new(config).segment(&m, &section, None, &density).unwrap());
        assert_eq!(s.track.selected, 1);
        assert_eq!(s.intervals.len(), 4);
        assert!(s.diagnostics.is_empty());

        let s = segmented(CorrelationSegmenter::default().segment(&m, &section, None, &density).unwrap());
        assert_eq!(s.track.selected, 1);
        assert!(s.diagnostics.is_empty());

        // a negative bound rejects every eigenvector
        let config = SegmenterConfig {
            max_mean_size: Some(-1.0),
            ..Default::default()
        };
        let s = segmented(CorrelationSegmenter::new(config).segment(&m, &section, None, &density).unwrap());
        assert_eq!(s.track.selected, 1);
        assert_eq!(
            s.diagnostics,
            vec![Diagnostic::EigenvectorFallback { chromosome: "chr1".into() }]
        );
    }

    #[test]
    fn mean_size_search_skips_fragmented_eigenvectors() {
        let alternating: Vec<f64> = (0..20).map(|k| if k % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let halves: Vec<f64> = (0..20).map(|k| if k < 10 { 1.0 } else { -1.0 }).collect();
        let quarters: Vec<f64> = (0..20).map(|k| if (k / 5) % 2 == 0 { 1.0 } else { -1.0 }).collect();

        // 1000 bp * 19 / 20 = 950, 1000 * 1 / 20 = 50, 1000 * 3 / 20 = 150
        let vectors = vec![alternating.clone(), halves.clone(), quarters.clone()];
        assert_eq!(select_eigenvector(&vectors, 1000, 20, 100.0), Some(2));
        assert_eq!(select_eigenvector(&vectors, 1000, 20, 950.0), Some(1));

        let vectors = vec![alternating.clone(), quarters, halves];
        assert_eq!(select_eigenvector(&vectors, 1000, 20, 200.0), Some(2));
        assert_eq!(select_eigenvector(&vectors, 1000, 20, 100.0), Some(3));

        assert_eq!(select_eigenvector(&[alternating], 1000, 20, 100.0), None);
        assert_eq!(select_eigenvector(&[], 1000, 20, 100.0), None);
    }

    #[test]
    fn degenerate_and_unnormalized_chromosomes() {
        let mut m = ContactMatrix::from_dense(&[vec![1.0; 3], vec![1.0; 3], vec![1.0; 3]], 100).unwrap();
        let section = m.sections().as_slice()[0].clone();
        let density = ReferenceTrack::new();
        assert!(matches!(
            CorrelationSegmenter::default().segment(&m, &section, None, &density),
            Err(HicompError::Configuration(_))
        ));
        prepare_normalization(&mut m, &BasicNormalizer::default(), &PrepareConfig::default()).unwrap();
        let outcome = CorrelationSegmenter::default().segment(&m, &section, None, &density).unwrap();
        assert!(matches!(outcome, SegmentOutcome::Degenerate(r) if r == "3 usable bins"));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn reinsertion_tiles_the_chromosome(
            bad_mask in proptest::collection::vec(any::<bool>(), 1..60),
            signs in proptest::collection::vec(any::<bool>(), 60),
        ) {
            let len = bad_mask.len();
            let good: Vec<usize> = (0..len).filter(|&k| !bad_mask[k]).collect();
            prop_assume!(!good.is_empty());
            let values: Vec<f64> = good.iter().map(|&k| if signs[k] { 1.0 } else { -1.0 }).collect();
            let segments = sign_change_segments(&values);
            let out = reinsert_bad_bins(&segments, &good, len);

            let mut next = 0;
            for c in &out {
                prop_assert_eq!(c.start, next);
                prop_assert!(c.end >= c.start);
                if c.kind.is_masked() {
                    prop_assert!((c.start..=c.end).all(|k| bad_mask[k]));
                }
                next = c.end + 1;
            }
            prop_assert_eq!(next, len);
            prop_assert_eq!(out.iter().filter(|c| !c.kind.is_masked()).count(), segments.len());

            let expanded = expand_with_nan(&values, &good, len);
            let back: Vec<f64> = expanded.iter().copied().filter(|v| !v.is_nan()).collect();
            prop_assert_eq!(back, values);
        }
    }
}
