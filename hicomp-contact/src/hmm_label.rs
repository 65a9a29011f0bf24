//! Compartment labeling with Gaussian hidden Markov models.
//!
//! One model per state count is trained on the z-scored eigenvector tracks
//! of all chromosomes at once. Each chromosome is then decoded with every
//! model, the state count with the lowest BIC wins and the chromosome is
//! re-segmented wherever the decoded state changes.

use hicomp_core::{HicompError, Result};
use hicomp_ml::hmm::select_by_bic;
use hicomp_ml::{BaumWelchConfig, GaussianHmm, ModelScore};

use crate::compartment::{CompartmentInterval, CompartmentType};

/// Parameters of [`HmmCompartmentClassifier`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HmmConfig {
    pub min_states: usize,
    pub max_states: usize,
    pub training: BaumWelchConfig,
}

impl Default for HmmConfig {
    fn default() -> Self {
        Self {
            min_states: 2,
            max_states: 5,
            training: BaumWelchConfig::default(),
        }
    }
}

/// Best decoding of one chromosome.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HmmDecoding {
    /// State count selected by BIC.
    pub n_states: usize,
    /// Scores of every model, by increasing state count.
    pub scores: Vec<ModelScore>,
    /// Viterbi path of the selected model over good bins.
    pub path: Vec<usize>,
}

/// Trains and applies compartment HMMs.
#[derive(Debug, Clone, Default)]
pub struct HmmCompartmentClassifier {
    pub config: HmmConfig,
}

impl HmmCompartmentClassifier {
    pub fn new(config: HmmConfig) -> Self {
        Self { config }
    }

    /// Fit one model per state count on the pooled `tracks`.
    ///
    /// Models come back ordered by state count regardless of the order in
    /// which the fits finish.
    pub fn train(&self, tracks: &[&[f64]]) -> Result<Vec<GaussianHmm>> {
        let (lo, hi) = (self.config.min_states.max(2), self.config.max_states);
        if lo > hi {
            return Err(HicompError::Configuration(format!(
                "state range {}..={} is empty",
                self.config.min_states, hi
            )));
        }
        let fit = |n: usize| -> Result<GaussianHmm> {
            let mut model = GaussianHmm::compartment_prior(n)?;
            let summary = model.baum_welch(tracks, &self.config.training)?;
            log::debug!(
                "{} states: log-likelihood {:.3} after {} iterations",
                n,
                summary.log_likelihood,
                summary.iterations
            );
            Ok(model)
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            (lo..=hi).into_par_iter().map(fit).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            (lo..=hi).map(fit).collect()
        }
    }

    /// Decode a z-scored track with every model and keep the lowest BIC.
    pub fn decode(&self, models: &[GaussianHmm], track: &[f64]) -> Result<HmmDecoding> {
        let mut scores: Vec<ModelScore> = Vec::with_capacity(models.len());
        let mut paths = Vec::with_capacity(models.len());
        for model in models {
            let (path, ll) = model.viterbi(track)?;
            let score = ModelScore::new(model.n_states(), ll, track.len(), scores.last());
            scores.push(score);
            paths.push(path);
        }
        let best = select_by_bic(&scores)
            .ok_or_else(|| HicompError::Numerical("no model produced a finite BIC".into()))?;
        Ok(HmmDecoding {
            n_states: scores[best].n_states,
            path: paths.swap_remove(best),
            scores,
        })
    }
}

/// Intervals of constant state over a chromosome of `len` bins.
///
/// `path[k]` is the state of chromosome bin `good[k]`. Bad bins have no
/// state and form [`CompartmentType::Masked`] intervals of their own, so
/// they always split runs. States are returned alongside the intervals.
pub fn path_intervals(
    path: &[usize],
    good: &[usize],
    len: usize,
) -> (Vec<CompartmentInterval>, Vec<Option<usize>>) {
    let mut states = vec![None; len];
    for (&s, &k) in path.iter().zip(good) {
        states[k] = Some(s);
    }

    let mut intervals = Vec::new();
    let mut run_states = Vec::new();
    let mut start = 0;
    for k in 1..=len {
        if k == len || states[k] != states[start] {
            let kind = match states[start] {
                Some(_) => CompartmentType::Unlabeled,
                None => CompartmentType::Masked,
            };
            intervals.push(CompartmentInterval::new(start, k - 1, kind));
            run_states.push(states[start]);
            start = k;
        }
    }
    (intervals, run_states)
}

/// Turn decoded states into compartment letters.
///
/// With `M` the largest state present, states below `M/2` are A-side
/// (`A` for state 0, `a` otherwise), states above are B-side (`B` for `M`,
/// `b` otherwise) and the middle state is `I`. When the length-weighted
/// mean density of the A-side does not pass `is_a_like`, the sides swap.
pub fn assign_letters<F>(intervals: &mut [CompartmentInterval], states: &[Option<usize>], is_a_like: F)
where
    F: Fn(f64) -> bool,
{
    let max = states.iter().flatten().copied().max().unwrap_or(0);

    let (weighted, total) = intervals
        .iter()
        .zip(states)
        .filter(|(_, s)| matches!(s, Some(s) if 2 * s < max))
        .fold((0.0, 0usize), |(w, t), (c, _)| (w + c.density * c.len() as f64, t + c.len()));
    let low_density = if total == 0 { 1.0 } else { weighted / total as f64 };
    let low_is_a = is_a_like(low_density);

    for (c, s) in intervals.iter_mut().zip(states) {
        let Some(s) = *s else {
            continue;
        };
        let low_side = 2 * s < max;
        c.kind = if 2 * s == max {
            CompartmentType::Indeterminate
        } else {
            let extreme = s == 0 || s == max;
            match (low_side == low_is_a, extreme) {
                (true, true) => CompartmentType::A,
                (true, false) => CompartmentType::SubA,
                (false, true) => CompartmentType::B,
                (false, false) => CompartmentType::SubB,
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    use hicomp_stats::zscore;

    fn gaussian_noise(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            ((state >> 11) as f64 + 0.5) / (1u64 << 53) as f64
        };
        (0..n)
            .map(|_| {
                let (u1, u2) = (next(), next());
                (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
            })
            .collect()
    }

    /// +1 over `0..40` and `80..120`, -1 in between.
    fn planted_track() -> Vec<f64> {
        gaussian_noise(120, 17)
            .into_iter()
            .enumerate()
            .map(|(t, e)| if (40..80).contains(&t) { -1.0 } else { 1.0 } + 0.1 * e)
            .collect()
    }

    #[test]
    fn bic_picks_two_states_on_planted_track() {
        let z = zscore(&planted_track()).unwrap();
        let classifier = HmmCompartmentClassifier::default();
        let models = classifier.train(&[&z[..]]).unwrap();
        assert_eq!(models.len(), 4);
        assert_eq!(models[0].n_states(), 2);

        let decoding = classifier.decode(&models, &z).unwrap();
        assert_eq!(decoding.n_states, 2);
        assert_eq!(decoding.scores.len(), 4);
        assert_eq!(decoding.scores[0].degrees_of_freedom, 7);

        let good: Vec<usize> = (0..120).collect();
        let (intervals, _) = path_intervals(&decoding.path, &good, 120);
        assert_eq!(intervals.len(), 3);
        assert!(intervals[1].start.abs_diff(40) <= 1);
        assert!(intervals[2].start.abs_diff(80) <= 1);
        assert_eq!(intervals[2].end, 119);
    }

    #[test]
    fn empty_state_range_is_rejected() {
        let classifier = HmmCompartmentClassifier::new(HmmConfig {
            min_states: 4,
            max_states: 3,
            ..Default::default()
        });
        assert!(matches!(
            classifier.train(&[&[0.0, 1.0][..]]),
            Err(HicompError::Configuration(_))
        ));
    }

    #[test]
    fn bad_bins_split_runs() {
        let good = [0, 1, 3, 4, 5];
        let (intervals, states) = path_intervals(&[0, 0, 0, 1, 1], &good, 7);
        let spans: Vec<(usize, usize, CompartmentType)> =
            intervals.iter().map(|c| (c.start, c.end, c.kind)).collect();
        assert_eq!(
            spans,
            vec![
                (0, 1, CompartmentType::Unlabeled),
                (2, 2, CompartmentType::Masked),
                (3, 3, CompartmentType::Unlabeled),
                (4, 5, CompartmentType::Unlabeled),
                (6, 6, CompartmentType::Masked),
            ]
        );
        assert_eq!(states, vec![Some(0), None, Some(0), Some(1), None]);
    }

    fn letters(states: &[Option<usize>], densities: &[f64]) -> String {
        let mut intervals: Vec<CompartmentInterval> = states
            .iter()
            .enumerate()
            .map(|(k, s)| {
                let kind = if s.is_some() { CompartmentType::Unlabeled } else { CompartmentType::Masked };
                let mut c = CompartmentInterval::new(k * 5, k * 5 + 4, kind);
                c.density = densities[k];
                c
            })
            .collect();
        assign_letters(&mut intervals, states, |d| d >= 1.0);
        intervals.iter().map(|c| c.kind.letter()).collect::<Vec<_>>().join(",")
    }

    #[test]
    fn three_states_map_to_a_i_b() {
        let states = [Some(0), Some(1), Some(2), None];
        assert_eq!(letters(&states, &[1.5, 1.0, 0.5, 1.0]), "A,I,B,NA");
    }

    #[test]
    fn poor_low_side_swaps_letters() {
        let states = [Some(0), Some(1), Some(2)];
        assert_eq!(letters(&states, &[0.5, 1.0, 1.5]), "B,I,A");
    }

    #[test]
    fn four_states_use_lowercase_middles() {
        let states = [Some(0), Some(1), Some(2), Some(3)];
        assert_eq!(letters(&states, &[1.6, 1.2, 0.8, 0.4]), "A,a,b,B");
        assert_eq!(letters(&states, &[0.4, 0.8, 1.2, 1.6]), "B,b,a,A");
    }

    #[test]
    fn single_state_is_indeterminate() {
        assert_eq!(letters(&[Some(0), Some(0)], &[1.0, 1.0]), "I,I");
    }
}
