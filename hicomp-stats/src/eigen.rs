//! Symmetric eigendecomposition.
//!
//! Householder reduction to tridiagonal form followed by the implicit QL
//! algorithm with Wilkinson-style shifts. Matrices are dense row-major
//! `n × n` slices.

use hicomp_core::{HicompError, Result, Summarizable};

/// Iteration cap per eigenvalue in the QL sweep.
const MAX_QL_ITER: usize = 60;

/// One eigenvalue with its unit-norm eigenvector.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EigenPair {
    pub value: f64,
    pub vector: Vec<f64>,
}

/// Full decomposition of a symmetric matrix, eigenvalues in descending order.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    pub pairs: Vec<EigenPair>,
}

impl SymmetricEigen {
    /// The `k` leading eigenpairs (largest eigenvalues first).
    pub fn leading(&self, k: usize) -> &[EigenPair] {
        &self.pairs[..k.min(self.pairs.len())]
    }

    /// Eigenvalues in descending order.
    pub fn values(&self) -> Vec<f64> {
        self.pairs.iter().map(|p| p.value).collect()
    }
}

impl Summarizable for SymmetricEigen {
    fn summary(&self) -> String {
        match self.pairs.first() {
            Some(top) => format!(
                "SymmetricEigen: {} pairs, leading value {:.4}",
                self.pairs.len(),
                top.value
            ),
            None => "SymmetricEigen: empty".into(),
        }
    }
}

/// Decompose the symmetric row-major `n × n` matrix `matrix`.
///
/// Only the lower triangle is read. Each eigenvector's sign is fixed so that
/// its largest-magnitude component is positive. Fails with
/// [`HicompError::Numerical`] when the QL iteration does not converge or the
/// input holds non-finite values.
pub fn symmetric_eigen(matrix: &[f64], n: usize) -> Result<SymmetricEigen> {
    if matrix.len() != n * n {
        return Err(HicompError::InvalidInput(format!(
            "symmetric_eigen: expected {} values for {}x{}, got {}",
            n * n,
            n,
            n,
            matrix.len()
        )));
    }
    if n == 0 {
        return Ok(SymmetricEigen { pairs: Vec::new() });
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(HicompError::Numerical(
            "symmetric_eigen: matrix contains non-finite values".into(),
        ));
    }

    let mut v = matrix.to_vec();
    let mut d = vec![0.0; n];
    let mut e = vec![0.0; n];
    tridiagonalize(&mut v, &mut d, &mut e, n);
    tridiagonal_ql(&mut v, &mut d, &mut e, n)?;

    let mut pairs: Vec<EigenPair> = (0..n)
        .map(|j| {
            let mut vector: Vec<f64> = (0..n).map(|i| v[i * n + j]).collect();
            orient(&mut vector);
            EigenPair { value: d[j], vector }
        })
        .collect();
    pairs.sort_by(|a, b| b.value.total_cmp(&a.value));
    Ok(SymmetricEigen { pairs })
}

/// Flip `vector` so that its largest-magnitude entry is positive.
fn orient(vector: &mut [f64]) {
    let pivot = vector
        .iter()
        .copied()
        .fold(0.0_f64, |best, x| if x.abs() > best.abs() { x } else { best });
    if pivot < 0.0 {
        vector.iter_mut().for_each(|x| *x = -*x);
    }
}

/// Householder reduction of `v` (overwritten by the accumulated transform) to
/// tridiagonal form: diagonal in `d`, sub-diagonal in `e[1..]`.
fn tridiagonalize(v: &mut [f64], d: &mut [f64], e: &mut [f64], n: usize) {
    let at = |i: usize, j: usize| i * n + j;

    for j in 0..n {
        d[j] = v[at(n - 1, j)];
    }

    for i in (1..n).rev() {
        let scale: f64 = d[..i].iter().map(|x| x.abs()).sum();
        let mut h = 0.0;
        if scale == 0.0 {
            e[i] = d[i - 1];
            for j in 0..i {
                d[j] = v[at(i - 1, j)];
                v[at(i, j)] = 0.0;
                v[at(j, i)] = 0.0;
            }
        } else {
            for k in 0..i {
                d[k] /= scale;
                h += d[k] * d[k];
            }
            let mut f = d[i - 1];
            let mut g = if f > 0.0 { -h.sqrt() } else { h.sqrt() };
            e[i] = scale * g;
            h -= f * g;
            d[i - 1] = f - g;
            e[..i].iter_mut().for_each(|x| *x = 0.0);

            for j in 0..i {
                f = d[j];
                v[at(j, i)] = f;
                g = e[j] + v[at(j, j)] * f;
                for k in (j + 1)..i {
                    g += v[at(k, j)] * d[k];
                    e[k] += v[at(k, j)] * f;
                }
                e[j] = g;
            }
            f = 0.0;
            for j in 0..i {
                e[j] /= h;
                f += e[j] * d[j];
            }
            let hh = f / (h + h);
            for j in 0..i {
                e[j] -= hh * d[j];
            }
            for j in 0..i {
                f = d[j];
                g = e[j];
                for k in j..i {
                    v[at(k, j)] -= f * e[k] + g * d[k];
                }
                d[j] = v[at(i - 1, j)];
                v[at(i, j)] = 0.0;
            }
        }
        d[i] = h;
    }

    // Accumulate transformations.
    for i in 0..n.saturating_sub(1) {
        v[at(n - 1, i)] = v[at(i, i)];
        v[at(i, i)] = 1.0;
        let h = d[i + 1];
        if h != 0.0 {
            for k in 0..=i {
                d[k] = v[at(k, i + 1)] / h;
            }
            for j in 0..=i {
                let g: f64 = (0..=i).map(|k| v[at(k, i + 1)] * v[at(k, j)]).sum();
                for k in 0..=i {
                    v[at(k, j)] -= g * d[k];
                }
            }
        }
        for k in 0..=i {
            v[at(k, i + 1)] = 0.0;
        }
    }
    for j in 0..n {
        d[j] = v[at(n - 1, j)];
        v[at(n - 1, j)] = 0.0;
    }
    v[at(n - 1, n - 1)] = 1.0;
    e[0] = 0.0;
}

/// Implicit QL on the tridiagonal `(d, e)`, rotating the columns of `v`.
fn tridiagonal_ql(v: &mut [f64], d: &mut [f64], e: &mut [f64], n: usize) -> Result<()> {
    let at = |i: usize, j: usize| i * n + j;

    for i in 1..n {
        e[i - 1] = e[i];
    }
    e[n - 1] = 0.0;

    let mut f = 0.0;
    let mut tst1 = 0.0_f64;
    let eps = f64::EPSILON;

    for l in 0..n {
        tst1 = tst1.max(d[l].abs() + e[l].abs());
        let mut m = l;
        while m < n - 1 && e[m].abs() > eps * tst1 {
            m += 1;
        }

        if m > l {
            let mut iter = 0;
            loop {
                iter += 1;
                if iter > MAX_QL_ITER {
                    return Err(HicompError::Numerical(format!(
                        "symmetric_eigen: no convergence for eigenvalue {} after {} iterations",
                        l, MAX_QL_ITER
                    )));
                }

                let mut g = d[l];
                let mut p = (d[l + 1] - g) / (2.0 * e[l]);
                let mut r = p.hypot(1.0);
                if p < 0.0 {
                    r = -r;
                }
                d[l] = e[l] / (p + r);
                d[l + 1] = e[l] * (p + r);
                let dl1 = d[l + 1];
                let mut h = g - d[l];
                for x in d.iter_mut().skip(l + 2) {
                    *x -= h;
                }
                f += h;

                p = d[m];
                let mut c = 1.0;
                let mut c2 = c;
                let mut c3 = c;
                let el1 = e[l + 1];
                let mut s = 0.0;
                let mut s2 = 0.0;
                for i in (l..m).rev() {
                    c3 = c2;
                    c2 = c;
                    s2 = s;
                    g = c * e[i];
                    h = c * p;
                    r = p.hypot(e[i]);
                    e[i + 1] = s * r;
                    s = e[i] / r;
                    c = p / r;
                    p = c * d[i] - s * g;
                    d[i + 1] = h + s * (c * g + s * d[i]);
                    for k in 0..n {
                        h = v[at(k, i + 1)];
                        v[at(k, i + 1)] = s * v[at(k, i)] + c * h;
                        v[at(k, i)] = c * v[at(k, i)] - s * h;
                    }
                }
                p = -s * s2 * c3 * el1 * e[l] / dl1;
                e[l] = s * p;
                d[l] = c * p;

                if e[l].abs() <= eps * tst1 {
                    break;
                }
            }
        }
        d[l] += f;
        e[l] = 0.0;
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────
