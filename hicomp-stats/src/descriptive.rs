//! Descriptive statistics for numeric data.
//!
//! The plain functions ([`mean`], [`median`], [`variance`]) reject empty
//! input. The `nan_*` variants skip NaN values, the way masked Hi-C tracks
//! carry bad bins.

use hicomp_core::{HicompError, Result};

/// Arithmetic mean.
pub fn mean(data: &[f64]) -> Result<f64> {
    if data.is_empty() {
        return Err(HicompError::InvalidInput(
            "mean: data must not be empty".into(),
        ));
    }
    Ok(data.iter().sum::<f64>() / data.len() as f64)
}

/// Median (50th percentile, linear interpolation for even lengths).
pub fn median(data: &[f64]) -> Result<f64> {
    if data.is_empty() {
        return Err(HicompError::InvalidInput(
            "median: data must not be empty".into(),
        ));
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        Ok(sorted[n / 2])
    } else {
        Ok((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

/// Variance with given degrees-of-freedom correction.
///
/// - `ddof = 0` → population variance
/// - `ddof = 1` → sample variance (Bessel's correction)
pub fn variance(data: &[f64], ddof: usize) -> Result<f64> {
    let n = data.len();
    if n <= ddof {
        return Err(HicompError::InvalidInput(format!(
            "variance: need more than {} observations (got {})",
            ddof, n,
        )));
    }
    let m = mean(data)?;
    let ss: f64 = data.iter().map(|&x| (x - m).powi(2)).sum();
    Ok(ss / (n - ddof) as f64)
}

/// Standard deviation with given degrees-of-freedom correction.
pub fn std_dev(data: &[f64], ddof: usize) -> Result<f64> {
    Ok(variance(data, ddof)?.sqrt())
}

/// Sum ignoring NaN values (0.0 when everything is NaN).
pub fn nan_sum(data: &[f64]) -> f64 {
    data.iter().filter(|v| !v.is_nan()).sum()
}

/// Mean ignoring NaN values; NaN when no finite value is present.
pub fn nan_mean(data: &[f64]) -> f64 {
    let (sum, count) = data
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Standardize to zero mean and unit population standard deviation.
///
/// Constant input cannot be standardized and is rejected.
pub fn zscore(data: &[f64]) -> Result<Vec<f64>> {
    let m = mean(data)?;
    let sd = std_dev(data, 0)?;
    if sd == 0.0 || !sd.is_finite() {
        return Err(HicompError::InvalidInput(
            "zscore: data has zero variance".into(),
        ));
    }
    Ok(data.iter().map(|&x| (x - m) / sd).collect())
}

// ── Tests ──────────────────────────────────────────────────────────────────
