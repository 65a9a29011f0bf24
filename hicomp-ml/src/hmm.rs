//! Gaussian hidden Markov models for continuous genomic tracks.
//!
//! Each hidden state emits a one-dimensional normal distribution. The model
//! is used to segment standardized eigenvector tracks into runs of ordered
//! compartment categories; several tracks (one per chromosome) are pooled
//! during training.
//!
//! All internal computations use log-space arithmetic to avoid numerical
//! underflow on long tracks.
//!
//! # Quick start
//!
//! ```
//! use hicomp_ml::hmm::GaussianHmm;
//!
//! let model = GaussianHmm::compartment_prior(2).unwrap();
//! let track = [-1.1, -0.9, -1.0, 1.0, 0.9, 1.2];
//! let (path, log_prob) = model.viterbi(&track).unwrap();
//! assert_eq!(path, vec![0, 0, 0, 1, 1, 1]);
//! assert!(log_prob.is_finite());
//! ```

use core::f64::consts::PI;

use hicomp_core::{HicompError, Result, Scored, Summarizable};
use hicomp_stats::gammaincc;

// ---------------------------------------------------------------------------
// Log-space helpers
// ---------------------------------------------------------------------------

/// Numerically stable `log(exp(a) + exp(b))`.
fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Log-sum-exp over a slice.
fn log_sum_exp_slice(xs: &[f64]) -> f64 {
    let max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + xs.iter().map(|&x| (x - max).exp()).sum::<f64>().ln()
}

/// Keeps `ln(0)` out of initial and transition probabilities.
const EPSILON: f64 = 1e-10;

// ---------------------------------------------------------------------------
// Training configuration
// ---------------------------------------------------------------------------

/// Stopping rule and variance floor for Baum-Welch re-estimation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaumWelchConfig {
    /// Maximum number of EM iterations.
    pub max_iter: usize,
    /// Stop when the pooled log-likelihood improves by less than this.
    pub tolerance: f64,
    /// Lower bound on every state's standard deviation.
    pub min_std: f64,
}

impl Default for BaumWelchConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            tolerance: 1e-6,
            min_std: 1e-3,
        }
    }
}

/// Outcome of a Baum-Welch run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrainingSummary {
    /// Pooled log-likelihood of all sequences under the final parameters.
    pub log_likelihood: f64,
    /// EM iterations performed.
    pub iterations: usize,
    /// Whether the tolerance was reached before `max_iter`.
    pub converged: bool,
}

// ---------------------------------------------------------------------------
// GaussianHmm
// ---------------------------------------------------------------------------

/// A hidden Markov model with univariate Gaussian emissions.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GaussianHmm {
    n_states: usize,
    /// Initial state probabilities (length `n_states`).
    initial: Vec<f64>,
    /// Row-major `n_states × n_states`, `A[i][j] = P(j | i)`.
    transition: Vec<f64>,
    means: Vec<f64>,
    std_devs: Vec<f64>,
}

impl GaussianHmm {
    /// Create a model after validating dimensions and probability constraints.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no states, a vector has the wrong
    /// length, a probability row does not sum to ~1.0 (tolerance 1e-6), or a
    /// standard deviation is not strictly positive.
    pub fn new(
        initial: Vec<f64>,
        transition: Vec<f64>,
        means: Vec<f64>,
        std_devs: Vec<f64>,
    ) -> Result<Self> {
        let n_states = initial.len();
        if n_states == 0 {
            return Err(HicompError::InvalidInput("n_states must be > 0".into()));
        }
        if transition.len() != n_states * n_states {
            return Err(HicompError::InvalidInput(format!(
                "transition length {} != n_states*n_states {}",
                transition.len(),
                n_states * n_states
            )));
        }
        if means.len() != n_states || std_devs.len() != n_states {
            return Err(HicompError::InvalidInput(format!(
                "emission parameters must have {} entries (means {}, std_devs {})",
                n_states,
                means.len(),
                std_devs.len()
            )));
        }

        let tol = 1e-6;
        let pi_sum: f64 = initial.iter().sum();
        if (pi_sum - 1.0).abs() > tol || initial.iter().any(|&p| p < 0.0) {
            return Err(HicompError::InvalidInput(format!(
                "initial probabilities sum to {pi_sum}, expected ~1.0"
            )));
        }
        for i in 0..n_states {
            let row = &transition[i * n_states..(i + 1) * n_states];
            let row_sum: f64 = row.iter().sum();
            if (row_sum - 1.0).abs() > tol || row.iter().any(|&p| p < 0.0) {
                return Err(HicompError::InvalidInput(format!(
                    "transition row {i} sums to {row_sum}, expected ~1.0"
                )));
            }
        }
        if let Some(s) = std_devs.iter().find(|&&s| !(s > 0.0) || !s.is_finite()) {
            return Err(HicompError::InvalidInput(format!(
                "standard deviations must be positive, got {s}"
            )));
        }
        if means.iter().any(|m| !m.is_finite()) {
            return Err(HicompError::InvalidInput("means must be finite".into()));
        }

        Ok(Self {
            n_states,
            initial,
            transition,
            means,
            std_devs,
        })
    }

    /// Starting point for compartment segmentation with `n_states` ordered
    /// categories.
    ///
    /// - means evenly spaced over `[-1, 1]`, standard deviation `1/n`
    /// - self-transition 0.9, the remaining 0.1 shared equally
    /// - initial mass concentrated on the two extreme states:
    ///   `0.5 - ((n-2)·0.05)²` each, the middle states share the rest
    pub fn compartment_prior(n_states: usize) -> Result<Self> {
        if n_states < 2 {
            return Err(HicompError::InvalidInput(
                "compartment_prior: need at least 2 states".into(),
            ));
        }
        let n = n_states as f64;
        let spread = ((n - 2.0) * 0.05).powi(2);
        let initial = (0..n_states)
            .map(|i| {
                if i == 0 || i == n_states - 1 {
                    0.5 - spread
                } else {
                    spread * 2.0 / (n - 2.0)
                }
            })
            .collect();
        let off = 0.1 / (n - 1.0);
        let transition = (0..n_states * n_states)
            .map(|k| if k / n_states == k % n_states { 0.9 } else { off })
            .collect();
        let means = (0..n_states)
            .map(|i| -1.0 + 2.0 * i as f64 / (n - 1.0))
            .collect();
        let std_devs = vec![1.0 / n; n_states];
        Self::new(initial, transition, means, std_devs)
    }

    /// Number of hidden states.
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Initial state probabilities.
    pub fn initial(&self) -> &[f64] {
        &self.initial
    }

    /// Row-major transition matrix.
    pub fn transition(&self) -> &[f64] {
        &self.transition
    }

    /// Emission means, one per state.
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    /// Emission standard deviations, one per state.
    pub fn std_devs(&self) -> &[f64] {
        &self.std_devs
    }

    fn log_emission(&self, state: usize, x: f64) -> f64 {
        let sd = self.std_devs[state];
        let z = (x - self.means[state]) / sd;
        -0.5 * (2.0 * PI).ln() - sd.ln() - 0.5 * z * z
    }

    fn log_initial(&self) -> Vec<f64> {
        self.initial.iter().map(|p| (p + EPSILON).ln()).collect()
    }

    fn log_transition(&self) -> Vec<f64> {
        self.transition.iter().map(|p| (p + EPSILON).ln()).collect()
    }

    fn validate_observations(observations: &[f64]) -> Result<()> {
        if observations.is_empty() {
            return Err(HicompError::InvalidInput(
                "observation sequence is empty".into(),
            ));
        }
        if let Some(t) = observations.iter().position(|x| !x.is_finite()) {
            return Err(HicompError::InvalidInput(format!(
                "observation[{t}] is not finite"
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Forward / backward
    // -----------------------------------------------------------------------

    /// Run the forward algorithm in log-space.
    ///
    /// Returns `(alpha, log_likelihood)` where `alpha[t][i]` is the log
    /// probability of observing `x_0..x_t` and being in state `i` at `t`.
    pub fn forward(&self, observations: &[f64]) -> Result<(Vec<Vec<f64>>, f64)> {
        Self::validate_observations(observations)?;
        let n = self.n_states;
        let log_a = self.log_transition();
        let log_pi = self.log_initial();
        let t_len = observations.len();
        let mut alpha = vec![vec![f64::NEG_INFINITY; n]; t_len];

        for i in 0..n {
            alpha[0][i] = log_pi[i] + self.log_emission(i, observations[0]);
        }
        for t in 1..t_len {
            for j in 0..n {
                let acc = (0..n).fold(f64::NEG_INFINITY, |acc, i| {
                    log_sum_exp(acc, alpha[t - 1][i] + log_a[i * n + j])
                });
                alpha[t][j] = acc + self.log_emission(j, observations[t]);
            }
        }
        let ll = log_sum_exp_slice(&alpha[t_len - 1]);
        Ok((alpha, ll))
    }

    /// Run the backward algorithm in log-space.
    ///
    /// `beta[t][i]` is the log probability of observing `x_{t+1}..x_{T-1}`
    /// given state `i` at time `t`.
    pub fn backward(&self, observations: &[f64]) -> Result<Vec<Vec<f64>>> {
        Self::validate_observations(observations)?;
        let n = self.n_states;
        let log_a = self.log_transition();
        let t_len = observations.len();
        let mut beta = vec![vec![0.0; n]; t_len];

        for t in (0..t_len - 1).rev() {
            let emit: Vec<f64> = (0..n)
                .map(|j| self.log_emission(j, observations[t + 1]) + beta[t + 1][j])
                .collect();
            for i in 0..n {
                beta[t][i] = (0..n).fold(f64::NEG_INFINITY, |acc, j| {
                    log_sum_exp(acc, log_a[i * n + j] + emit[j])
                });
            }
        }
        Ok(beta)
    }

    /// Log-likelihood of one observation sequence.
    pub fn log_likelihood(&self, observations: &[f64]) -> Result<f64> {
        Ok(self.forward(observations)?.1)
    }

    // -----------------------------------------------------------------------
    // Viterbi
    // -----------------------------------------------------------------------

    /// Most likely state sequence and its log probability.
    pub fn viterbi(&self, observations: &[f64]) -> Result<(Vec<usize>, f64)> {
        Self::validate_observations(observations)?;
        let n = self.n_states;
        let log_a = self.log_transition();
        let log_pi = self.log_initial();
        let t_len = observations.len();

        let mut delta = vec![vec![f64::NEG_INFINITY; n]; t_len];
        let mut psi = vec![vec![0usize; n]; t_len];
        for i in 0..n {
            delta[0][i] = log_pi[i] + self.log_emission(i, observations[0]);
        }
        for t in 1..t_len {
            for j in 0..n {
                let (best_state, best_val) = (0..n)
                    .map(|i| (i, delta[t - 1][i] + log_a[i * n + j]))
                    .fold((0, f64::NEG_INFINITY), |best, cand| {
                        if cand.1 > best.1 {
                            cand
                        } else {
                            best
                        }
                    });
                delta[t][j] = best_val + self.log_emission(j, observations[t]);
                psi[t][j] = best_state;
            }
        }

        let (best_final, best_score) = delta[t_len - 1]
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            });

        let mut path = vec![0usize; t_len];
        path[t_len - 1] = best_final;
        for t in (0..t_len - 1).rev() {
            path[t] = psi[t + 1][path[t + 1]];
        }
        Ok((path, best_score))
    }

    // -----------------------------------------------------------------------
    // Baum-Welch (EM) training over several sequences
    // -----------------------------------------------------------------------

    /// Re-estimate all parameters from a pool of independent sequences.
    ///
    /// Iterates until the pooled log-likelihood improves by less than
    /// `config.tolerance` or `config.max_iter` iterations have run. States
    /// that receive no posterior mass keep their previous emission
    /// parameters; standard deviations never drop below `config.min_std`.
    pub fn baum_welch(
        &mut self,
        sequences: &[&[f64]],
        config: &BaumWelchConfig,
    ) -> Result<TrainingSummary> {
        if sequences.is_empty() {
            return Err(HicompError::InvalidInput(
                "baum_welch: no training sequences".into(),
            ));
        }
        for seq in sequences {
            Self::validate_observations(seq)?;
        }

        let n = self.n_states;
        let mut prev_ll = f64::NEG_INFINITY;
        let mut iterations = 0;

        while iterations < config.max_iter {
            let log_a = self.log_transition();

            let mut pi_acc = vec![0.0; n];
            let mut xi_acc = vec![0.0; n * n];
            let mut gamma_trans = vec![0.0; n];
            let mut gamma_all = vec![0.0; n];
            let mut weighted_x = vec![0.0; n];
            let mut weighted_x2 = vec![0.0; n];
            let mut ll = 0.0;

            // E-step
            for seq in sequences {
                let (alpha, seq_ll) = self.forward(seq)?;
                let beta = self.backward(seq)?;
                ll += seq_ll;
                let t_len = seq.len();

                for t in 0..t_len {
                    for i in 0..n {
                        let g = (alpha[t][i] + beta[t][i] - seq_ll).exp();
                        if t == 0 {
                            pi_acc[i] += g;
                        }
                        if t + 1 < t_len {
                            gamma_trans[i] += g;
                        }
                        gamma_all[i] += g;
                        weighted_x[i] += g * seq[t];
                        weighted_x2[i] += g * seq[t] * seq[t];
                    }
                }
                for t in 0..t_len.saturating_sub(1) {
                    let emit: Vec<f64> = (0..n)
                        .map(|j| self.log_emission(j, seq[t + 1]) + beta[t + 1][j])
                        .collect();
                    for i in 0..n {
                        for j in 0..n {
                            xi_acc[i * n + j] +=
                                (alpha[t][i] + log_a[i * n + j] + emit[j] - seq_ll).exp();
                        }
                    }
                }
            }

            if !ll.is_finite() {
                return Err(HicompError::Numerical(
                    "baum_welch: log-likelihood is not finite".into(),
                ));
            }
            if prev_ll != f64::NEG_INFINITY && (ll - prev_ll).abs() < config.tolerance {
                return Ok(TrainingSummary {
                    log_likelihood: ll,
                    iterations,
                    converged: true,
                });
            }
            prev_ll = ll;
            iterations += 1;

            // M-step
            let pi_sum: f64 = pi_acc.iter().map(|p| p + EPSILON).sum();
            for i in 0..n {
                self.initial[i] = (pi_acc[i] + EPSILON) / pi_sum;
            }

            for i in 0..n {
                if gamma_trans[i] > EPSILON {
                    let row: Vec<f64> = (0..n)
                        .map(|j| (xi_acc[i * n + j] + EPSILON) / (gamma_trans[i] + EPSILON))
                        .collect();
                    let row_sum: f64 = row.iter().sum();
                    for j in 0..n {
                        self.transition[i * n + j] = row[j] / row_sum;
                    }
                }
            }

            for i in 0..n {
                if gamma_all[i] > EPSILON {
                    let mean = weighted_x[i] / gamma_all[i];
                    let var = (weighted_x2[i] / gamma_all[i] - mean * mean).max(0.0);
                    self.means[i] = mean;
                    self.std_devs[i] = var.sqrt().max(config.min_std);
                }
            }
        }

        let ll = sequences
            .iter()
            .map(|seq| self.log_likelihood(seq))
            .sum::<Result<f64>>()?;
        Ok(TrainingSummary {
            log_likelihood: ll,
            iterations,
            converged: false,
        })
    }
}

impl Summarizable for GaussianHmm {
    fn summary(&self) -> String {
        let means: Vec<String> = self.means.iter().map(|m| format!("{m:.3}")).collect();
        format!(
            "GaussianHmm: {} states, means [{}]",
            self.n_states,
            means.join(", ")
        )
    }
}

// ---------------------------------------------------------------------------
// Model selection
// ---------------------------------------------------------------------------

/// Free parameters of an `n`-state Gaussian HMM:
/// `n(n-1)` transitions, `2n` emission parameters and `n-1` initial
/// probabilities.
pub fn degrees_of_freedom(n_states: usize) -> usize {
    n_states * n_states + 2 * n_states - 1
}

/// Information criteria of one decoded path.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelScore {
    pub n_states: usize,
    pub log_likelihood: f64,
    pub degrees_of_freedom: usize,
    pub aic: f64,
    pub bic: f64,
    /// Likelihood-ratio figure against the next smaller model; diagnostic only.
    pub lrt: f64,
}

impl ModelScore {
    /// Score a path of `len` observations with log-likelihood `ll`.
    ///
    /// `previous` is the score of the next smaller model, if any; without it
    /// the likelihood-ratio figure is computed against an empty model and
    /// evaluates to 0.
    pub fn new(n_states: usize, ll: f64, len: usize, previous: Option<&ModelScore>) -> Self {
        let df = degrees_of_freedom(n_states);
        let (prev_df, prev_ll) = previous.map_or((0, f64::NEG_INFINITY), |p| {
            (p.degrees_of_freedom, p.log_likelihood)
        });
        let lrt = gammaincc(
            (df as f64 - prev_df as f64) / 2.0,
            (ll - prev_ll) / 2.0,
        )
        .unwrap_or(f64::NAN);
        Self {
            n_states,
            log_likelihood: ll,
            degrees_of_freedom: df,
            aic: 2.0 * df as f64 - 2.0 * ll,
            bic: -2.0 * ll + df as f64 * (len as f64).ln(),
            lrt,
        }
    }
}

impl Scored for ModelScore {
    fn score(&self) -> f64 {
        self.bic
    }
}

/// Index of the model with minimum BIC; exact ties keep the earliest entry.
pub fn select_by_bic(scores: &[ModelScore]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, s)| match best {
            Some((_, b)) if s.bic >= b => best,
            _ if s.bic.is_nan() => best,
            _ => Some((i, s.bic)),
        })
        .map(|(i, _)| i)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic N(0, 1) samples (xorshift + Box-Muller).
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

    fn two_level_track(len: usize, change: usize, sd: f64, seed: u64) -> Vec<f64> {
        gaussian_noise(len, seed)
            .into_iter()
            .enumerate()
            .map(|(t, e)| {
                let level = if t < change { -1.0 } else { 1.0 };
                level + sd * e
            })
            .collect()
    }

    #[test]
    fn prior_parameters() {
        let m2 = GaussianHmm::compartment_prior(2).unwrap();
        assert_eq!(m2.initial(), &[0.5, 0.5]);
        assert_eq!(m2.transition(), &[0.9, 0.1, 0.1, 0.9]);
        assert_eq!(m2.means(), &[-1.0, 1.0]);
        assert_eq!(m2.std_devs(), &[0.5, 0.5]);

        let m5 = GaussianHmm::compartment_prior(5).unwrap();
        let pi = m5.initial();
        assert!((pi[0] - 0.4775).abs() < 1e-12);
        assert!((pi[2] - 0.015).abs() < 1e-12);
        assert!((pi.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((m5.transition()[1] - 0.025).abs() < 1e-12);
        assert!((m5.means()[2]).abs() < 1e-12);

        assert!(GaussianHmm::compartment_prior(1).is_err());
    }

    #[test]
    fn new_validates() {
        assert!(GaussianHmm::new(vec![], vec![], vec![], vec![]).is_err());
        assert!(GaussianHmm::new(vec![1.0], vec![1.0, 0.0], vec![0.0], vec![1.0]).is_err());
        assert!(GaussianHmm::new(vec![0.7], vec![1.0], vec![0.0], vec![1.0]).is_err());
        assert!(GaussianHmm::new(vec![1.0], vec![1.0], vec![0.0], vec![0.0]).is_err());
        assert!(GaussianHmm::new(vec![1.0], vec![1.0], vec![0.0, 1.0], vec![1.0]).is_err());
        assert!(GaussianHmm::new(vec![1.0], vec![1.0], vec![0.0], vec![1.0]).is_ok());
    }

    #[test]
    fn forward_backward_agree() {
        let model = GaussianHmm::compartment_prior(3).unwrap();
        let obs = [-0.8, -1.1, 0.1, 0.9, 1.2, -0.2];
        let (alpha, ll) = model.forward(&obs).unwrap();
        let beta = model.backward(&obs).unwrap();
        for t in 0..obs.len() {
            let terms: Vec<f64> = (0..3).map(|i| alpha[t][i] + beta[t][i]).collect();
            assert!((log_sum_exp_slice(&terms) - ll).abs() < 1e-8, "t={}", t);
        }
    }

    #[test]
    fn viterbi_bounded_by_likelihood() {
        let model = GaussianHmm::compartment_prior(2).unwrap();
        let obs = [-1.0, -0.5, 0.2, 1.0];
        let (path, best) = model.viterbi(&obs).unwrap();
        assert_eq!(path.len(), obs.len());
        assert!(best <= model.log_likelihood(&obs).unwrap() + 1e-12);
    }

    #[test]
    fn rejects_bad_observations() {
        let model = GaussianHmm::compartment_prior(2).unwrap();
        assert!(model.forward(&[]).is_err());
        assert!(model.viterbi(&[0.0, f64::NAN]).is_err());
        assert!(model.backward(&[f64::INFINITY]).is_err());
    }

    #[test]
    fn baum_welch_never_decreases_likelihood() {
        let track = two_level_track(80, 40, 0.3, 7);
        let seqs = [&track[..]];
        let mut model = GaussianHmm::compartment_prior(3).unwrap();
        let one_step = BaumWelchConfig {
            max_iter: 1,
            tolerance: 0.0,
            ..BaumWelchConfig::default()
        };
        let mut prev = model.log_likelihood(&track).unwrap();
        for _ in 0..15 {
            model.baum_welch(&seqs, &one_step).unwrap();
            let ll = model.log_likelihood(&track).unwrap();
            assert!(ll >= prev - 1e-8, "prev={prev} curr={ll}");
            prev = ll;
        }
    }

    #[test]
    fn baum_welch_recovers_levels_from_pooled_tracks() {
        let a = two_level_track(120, 60, 0.1, 3);
        let b = two_level_track(90, 30, 0.1, 11);
        let mut model = GaussianHmm::compartment_prior(2).unwrap();
        let summary = model
            .baum_welch(&[&a[..], &b[..]], &BaumWelchConfig::default())
            .unwrap();
        assert!(summary.converged);
        assert!(summary.log_likelihood.is_finite());
        assert!((model.means()[0] + 1.0).abs() < 0.05);
        assert!((model.means()[1] - 1.0).abs() < 0.05);
        assert!((model.std_devs()[0] - 0.1).abs() < 0.03);
    }

    #[test]
    fn variance_floor_applies() {
        let flat = vec![0.0; 20];
        let mut model = GaussianHmm::compartment_prior(2).unwrap();
        let config = BaumWelchConfig {
            min_std: 0.01,
            ..BaumWelchConfig::default()
        };
        model.baum_welch(&[&flat[..]], &config).unwrap();
        assert!(model.std_devs().iter().all(|&s| s >= 0.01));
    }

    #[test]
    fn degrees_of_freedom_formula() {
        assert_eq!(degrees_of_freedom(2), 7);
        assert_eq!(degrees_of_freedom(3), 14);
        assert_eq!(degrees_of_freedom(5), 34);
    }

    #[test]
    fn model_score_criteria() {
        let s2 = ModelScore::new(2, -100.0, 50, None);
        assert_eq!(s2.degrees_of_freedom, 7);
        assert!((s2.aic - 214.0).abs() < 1e-12);
        assert!((s2.bic - (200.0 + 7.0 * 50f64.ln())).abs() < 1e-12);
        assert_eq!(s2.lrt, 0.0);

        let s3 = ModelScore::new(3, -99.0, 50, Some(&s2));
        assert!(s3.lrt > 0.0 && s3.lrt <= 1.0);
        assert_eq!(s3.score(), s3.bic);
    }

    #[test]
    fn bic_selection_prefers_lowest_on_ties() {
        let a = ModelScore::new(2, -50.0, 10, None);
        let mut b = ModelScore::new(3, -50.0, 10, Some(&a));
        b.bic = a.bic;
        assert_eq!(select_by_bic(&[a.clone(), b]), Some(0));
        let better = ModelScore::new(3, 0.0, 10, Some(&a));
        assert_eq!(select_by_bic(&[a, better]), Some(1));
        assert_eq!(select_by_bic(&[]), None);
    }

    #[test]
    fn bic_picks_two_states_for_planted_track() {
        let raw = two_level_track(200, 100, 0.1, 42);
        let m = raw.iter().sum::<f64>() / raw.len() as f64;
        let sd = (raw.iter().map(|x| (x - m).powi(2)).sum::<f64>() / raw.len() as f64).sqrt();
        let track: Vec<f64> = raw.iter().map(|x| (x - m) / sd).collect();

        let mut scores: Vec<ModelScore> = Vec::new();
        let mut paths = Vec::new();
        for n in 2..=5 {
            let mut model = GaussianHmm::compartment_prior(n).unwrap();
            model
                .baum_welch(&[&track[..]], &BaumWelchConfig::default())
                .unwrap();
            let (path, ll) = model.viterbi(&track).unwrap();
            let score = ModelScore::new(n, ll, track.len(), scores.last());
            scores.push(score);
            paths.push(path);
        }
        let best = select_by_bic(&scores).unwrap();
        assert_eq!(scores[best].n_states, 2);

        let changes: Vec<usize> = paths[best]
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0] != w[1])
            .map(|(t, _)| t + 1)
            .collect();
        assert_eq!(changes.len(), 1);
        assert!((changes[0] as i64 - 100).abs() <= 1);
    }

    #[test]
    fn summary_lists_states() {
        let model = GaussianHmm::compartment_prior(2).unwrap();
        assert!(model.summary().starts_with("GaussianHmm: 2 states"));
    }
}
