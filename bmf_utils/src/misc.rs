/// Count the occurrences of each index in `0..k`
///
/// # Example
///
/// ```rust
/// # use bmf_utils::bincount;
/// let xs: Vec<usize> = vec![0, 0, 1, 2, 2, 2, 3];
///
/// assert_eq!(bincount(&xs, 5), vec![2, 1, 3, 1, 0]);
/// ```
#[inline]
pub fn bincount(xs: &[usize], k: usize) -> Vec<usize> {
    let mut counts = vec![0; k];
    xs.iter().for_each(|&ix| counts[ix] += 1);
    counts
}

/// Exclusive prefix sum with a trailing total; `offsets(c)[n]` is where the
/// run of bin `n` starts.
///
/// # Example
///
/// ```rust
/// # use bmf_utils::offsets;
/// assert_eq!(offsets(&[2, 0, 3]), vec![0, 2, 2, 5]);
/// ```
#[inline]
pub fn offsets(counts: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(counts.len() + 1);
    let mut acc = 0;
    out.push(acc);
    counts.iter().for_each(|&ct| {
        acc += ct;
        out.push(acc);
    });
    out
}

#[inline]
pub fn dot(xs: &[f64], ys: &[f64]) -> f64 {
    xs.iter().zip(ys.iter()).map(|(x, y)| x * y).sum()
}

/// Element-wise multiply `acc` by `xs` in place
#[inline]
pub fn hadamard_into(acc: &mut [f64], xs: &[f64]) {
    acc.iter_mut().zip(xs.iter()).for_each(|(a, x)| *a *= x);
}

/// Mean of `xs`. `NaN` if `xs` is empty.
pub fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population variance of `xs`
pub fn var(xs: &[f64]) -> f64 {
    let m = mean(xs);
    xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::*;

    const TOL: f64 = 1E-10;

    // offsets
    // -------
    #[test]
    fn offsets_of_empty_is_zero() {
        assert_eq!(offsets(&[]), vec![0]);
    }

    #[test]
    fn offsets_last_is_total() {
        let counts = bincount(&[4, 1, 1, 0, 4, 4], 5);
        let offs = offsets(&counts);
        assert_eq!(offs.last(), Some(&6));
        for n in 0..5 {
            assert_eq!(offs[n + 1] - offs[n], counts[n]);
        }
    }

    // hadamard / dot
    // --------------
    #[test]
    fn hadamard_then_sum_is_dot() {
        let mut acc = vec![1.0, 2.0, 3.0];
        let xs = [0.5, -1.0, 2.0];
        hadamard_into(&mut acc, &xs);
        assert_relative_eq!(
            acc.iter().sum::<f64>(),
            dot(&[1.0, 2.0, 3.0], &xs),
            epsilon = TOL
        );
    }

    // mean / var
    // ----------
    #[test]
    fn mean_and_var_simple() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(mean(&xs), 2.5, epsilon = TOL);
        assert_relative_eq!(var(&xs), 1.25, epsilon = TOL);
    }

    #[test]
    fn mean_of_empty_is_nan() {
        assert!(mean(&[]).is_nan());
    }
}
