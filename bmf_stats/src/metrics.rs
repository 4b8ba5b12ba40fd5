//! Prediction quality metrics over held-out entries
use std::cmp::Ordering;

/// Root mean squared error of `(prediction, truth)` pairs. `NaN` if empty.
///
/// # Example
///
/// ```rust
/// # use bmf_stats::metrics::rmse;
/// let pairs = vec![(1.0, 2.0), (3.0, 3.0)];
/// assert!((rmse(pairs) - 0.5_f64.sqrt()).abs() < 1E-12);
/// ```
pub fn rmse<I>(pairs: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (n, sse) = pairs.into_iter().fold((0_usize, 0.0), |(n, sse), (p, y)| {
        (n + 1, (p - y).mul_add(p - y, sse))
    });
    (sse / n as f64).sqrt()
}

/// Area under the ROC curve of `(prediction, truth)` pairs where an entry is
/// positive if its truth exceeds `threshold`.
///
/// Tied predictions count as half a correct ordering. Returns `NaN` when the
/// pairs contain only one class.
///
/// # Example
///
/// ```rust
/// # use bmf_stats::metrics::auc;
/// let perfect = vec![(0.9, 1.0), (0.8, 1.0), (0.1, 0.0)];
/// assert_eq!(auc(perfect, 0.5), 1.0);
///
/// let backwards = vec![(0.1, 1.0), (0.9, 0.0)];
/// assert_eq!(auc(backwards, 0.5), 0.0);
/// ```
pub fn auc<I>(pairs: I, threshold: f64) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut scored: Vec<(f64, bool)> = pairs
        .into_iter()
        .map(|(p, y)| (p, y > threshold))
        .collect();
    scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let n_pos = scored.iter().filter(|(_, pos)| *pos).count();
    let n_neg = scored.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return f64::NAN;
    }

    // Mann-Whitney U with mid-ranks for ties
    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < scored.len() {
        let mut end = start + 1;
        while end < scored.len() && scored[end].0 == scored[start].0 {
            end += 1;
        }
        let mid_rank = (start + end + 1) as f64 / 2.0;
        let n_pos_tied = scored[start..end].iter().filter(|(_, pos)| *pos).count();
        rank_sum += mid_rank * n_pos_tied as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    (rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::*;

    const TOL: f64 = 1E-12;

    #[test]
    fn rmse_of_exact_predictions_is_zero() {
        let pairs = vec![(1.0, 1.0), (-2.5, -2.5)];
        assert_eq!(rmse(pairs), 0.0);
    }

    #[test]
    fn rmse_of_empty_is_nan() {
        assert!(rmse(Vec::new()).is_nan());
    }

    #[test]
    fn auc_all_ties_is_half() {
        let pairs = vec![(0.5, 1.0), (0.5, 0.0), (0.5, 1.0), (0.5, 0.0)];
        assert_relative_eq!(auc(pairs, 0.5), 0.5, epsilon = TOL);
    }

    #[test]
    fn auc_single_class_is_nan() {
        let pairs = vec![(0.2, 1.0), (0.7, 1.0)];
        assert!(auc(pairs, 0.5).is_nan());
    }

    #[test]
    fn auc_counts_misordered_pairs() {
        // one of the four (pos, neg) pairs is misordered
        let pairs = vec![(0.9, 1.0), (0.3, 1.0), (0.4, 0.0), (0.1, 0.0)];
        assert_relative_eq!(auc(pairs, 0.5), 0.75, epsilon = TOL);
    }
}
