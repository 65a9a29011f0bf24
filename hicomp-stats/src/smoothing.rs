//! 2-D median filtering of dense square matrices.

use hicomp_core::{HicompError, Result};

/// Median filter of a row-major `n × n` matrix with a `size × size` window.
///
/// Borders are handled by mirror reflection including the edge sample
/// (`d c b a | a b c d | d c b a`). The window spans offsets
/// `-(size/2) ..= size - size/2 - 1`, and for even window areas the upper of
/// the two middle values is taken. `size <= 1` returns the input unchanged.
pub fn median_filter(matrix: &[f64], n: usize, size: usize) -> Result<Vec<f64>> {
    if matrix.len() != n * n {
        return Err(HicompError::InvalidInput(format!(
            "median_filter: expected {} values for {}x{}, got {}",
            n * n,
            n,
            n,
            matrix.len()
        )));
    }
    if size <= 1 || n == 0 {
        return Ok(matrix.to_vec());
    }

    let half = (size / 2) as isize;
    let offsets: Vec<isize> = (0..size as isize).map(|k| k - half).collect();
    let mut out = vec![0.0; n * n];
    let mut window = Vec::with_capacity(size * size);

    for i in 0..n {
        for j in 0..n {
            window.clear();
            for &di in &offsets {
                let r = reflect(i as isize + di, n);
                for &dj in &offsets {
                    let c = reflect(j as isize + dj, n);
                    window.push(matrix[r * n + c]);
                }
            }
            let mid = window.len() / 2;
            let (_, median, _) = window.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            out[i * n + j] = *median;
        }
    }
    Ok(out)
}

/// Map an out-of-range index back into `[0, n)` by half-sample reflection.
fn reflect(idx: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let mut k = idx.rem_euclid(period);
    if k >= n {
        k = period - k - 1;
    }
    k as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_indices() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(2, 4), 2);
    }

    #[test]
    fn removes_isolated_spike() {
        let n = 5;
        let mut m = vec![1.0; n * n];
        m[2 * n + 2] = 100.0;
        let f = median_filter(&m, n, 3).unwrap();
        assert!(f.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn size_one_is_identity() {
        let m = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(median_filter(&m, 2, 1).unwrap(), m);
        assert_eq!(median_filter(&m, 2, 0).unwrap(), m);
    }

    #[test]
    fn constant_matrix_unchanged() {
        let m = vec![0.3; 16];
        assert_eq!(median_filter(&m, 4, 2).unwrap(), m);
    }

    #[test]
    fn length_mismatch() {
        assert!(median_filter(&[1.0, 2.0], 2, 3).is_err());
    }
}
