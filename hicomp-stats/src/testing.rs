//! Hypothesis testing.
//!
//! Student's and Welch's two-sample t-tests, used to score how well
//! compartment densities separate between two labels.

use hicomp_core::{HicompError, Result, Scored, Summarizable};

use crate::descriptive;
use crate::distribution::betai;

/// Result of a hypothesis test.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TestResult {
    /// The test statistic.
    pub statistic: f64,
    /// Two-tailed p-value.
    pub p_value: f64,
    /// Degrees of freedom, if applicable.
    pub degrees_of_freedom: Option<f64>,
    /// Name of the test method.
    pub method: String,
}

impl Scored for TestResult {
    fn score(&self) -> f64 {
        self.p_value
    }
}

impl Summarizable for TestResult {
    fn summary(&self) -> String {
        match self.degrees_of_freedom {
            Some(df) => format!(
                "{}: statistic={:.4}, df={:.1}, p={:.6}",
                self.method, self.statistic, df, self.p_value,
            ),
            None => format!(
                "{}: statistic={:.4}, p={:.6}",
                self.method, self.statistic, self.p_value,
            ),
        }
    }
}

/// Two-tailed p-value for Student's t-distribution.
fn t_two_tailed_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return if t.is_nan() { f64::NAN } else { 0.0 };
    }
    betai(df / 2.0, 0.5, df / (df + t * t)).unwrap_or(1.0)
}

/// Two-sample t-test: test whether two populations have the same mean.
///
/// When `equal_var` is `true`, uses pooled variance (Student's t-test).
/// When `false`, uses Welch's t-test. Two samples with no spread at all
/// give a NaN statistic when their means coincide and an infinite one
/// otherwise.
pub fn t_test_two_sample(x: &[f64], y: &[f64], equal_var: bool) -> Result<TestResult> {
    if x.len() < 2 || y.len() < 2 {
        return Err(HicompError::InvalidInput(
            "t_test_two_sample: each group needs at least 2 observations".into(),
        ));
    }

    let nx = x.len() as f64;
    let ny = y.len() as f64;
    let diff = descriptive::mean(x)? - descriptive::mean(y)?;
    let var_x = descriptive::variance(x, 1)?;
    let var_y = descriptive::variance(y, 1)?;

    let (se, df) = if equal_var {
        let pooled = ((nx - 1.0) * var_x + (ny - 1.0) * var_y) / (nx + ny - 2.0);
        ((pooled * (1.0 / nx + 1.0 / ny)).sqrt(), nx + ny - 2.0)
    } else {
        let (vx, vy) = (var_x / nx, var_y / ny);
        let df = (vx + vy).powi(2) / (vx.powi(2) / (nx - 1.0) + vy.powi(2) / (ny - 1.0));
        ((vx + vy).sqrt(), df)
    };
    let t = diff / se;

    Ok(TestResult {
        statistic: t,
        p_value: t_two_tailed_p(t, df),
        degrees_of_freedom: Some(df),
        method: if equal_var {
            "Two-sample t-test (pooled)".into()
        } else {
            "Welch's t-test".into()
        },
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────
