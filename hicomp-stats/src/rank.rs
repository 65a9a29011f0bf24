//! Ranking of numeric data.

/// Assign average ranks (1-based) to `data`; tied values share the mean of
/// the ranks they span.
///
/// Empty input produces empty output.
pub fn rank(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| data[a].total_cmp(&data[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && data[order[j]].total_cmp(&data[order[i]]).is_eq() {
            j += 1;
        }
        // positions i..j hold ranks (i+1)..=j
        let shared = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = shared;
        }
        i = j;
    }
    ranks
}
