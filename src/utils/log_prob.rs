/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Arithmetic on natural logarithms of probabilities.
//!
//! All ranks are carried in log space, where [`f32::NEG_INFINITY`] is the
//! logarithm of zero. Sums of probabilities are computed by [`log_sum_exp`],
//! which never materializes the (possibly underflowing) probabilities.

/// Returns log(exp(`a`) + exp(`b`)) computed in a numerically stable way.
///
/// If either argument is [`f32::NEG_INFINITY`] the other one is returned
/// unchanged.
///
/// ```
/// use schimmy_rank::utils::log_sum_exp;
///
/// let one = log_sum_exp(0.3f32.ln(), 0.7f32.ln());
/// assert!((one.exp() - 1.0).abs() < 1E-6);
/// assert_eq!(log_sum_exp(-2.0, f32::NEG_INFINITY), -2.0);
/// ```
#[inline]
#[must_use]
pub fn log_sum_exp(a: f32, b: f32) -> f32 {
    if a == f32::NEG_INFINITY {
        return b;
    }
    if b == f32::NEG_INFINITY {
        return a;
    }
    if a > b {
        a + (b - a).exp().ln_1p()
    } else {
        b + (a - b).exp().ln_1p()
    }
}

/// Folds [`log_sum_exp`] over an iterator, starting from log(0).
#[must_use]
pub fn log_sum_exp_all(values: impl IntoIterator<Item = f32>) -> f32 {
    values
        .into_iter()
        .fold(f32::NEG_INFINITY, log_sum_exp)
}

/// Returns the uniform log-probability −ln(`num_nodes`).
#[must_use]
pub fn uniform_rank(num_nodes: usize) -> f32 {
    -(num_nodes as f64).ln() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commutative() {
        let pairs = [
            (-1.0f32, -2.0f32),
            (-0.5, -0.5),
            (-100.0, -1.0),
            (0.0, -30.0),
            (f32::NEG_INFINITY, -4.0),
        ];
        for (a, b) in pairs {
            assert_eq!(log_sum_exp(a, b), log_sum_exp(b, a));
        }
    }

    #[test]
    fn test_identity() {
        for a in [-0.1f32, -7.0, -1000.0, 0.0] {
            assert_eq!(log_sum_exp(a, f32::NEG_INFINITY), a);
            assert_eq!(log_sum_exp(f32::NEG_INFINITY, a), a);
        }
        assert_eq!(
            log_sum_exp(f32::NEG_INFINITY, f32::NEG_INFINITY),
            f32::NEG_INFINITY
        );
    }

    #[test]
    fn test_sums_to_one() {
        let s = log_sum_exp(0.3f32.ln(), 0.7f32.ln());
        assert!((s.exp() - 1.0).abs() < 1E-6);
    }

    #[test]
    fn test_no_underflow() {
        // exp(-200) underflows in single precision, log_sum_exp does not
        let s = log_sum_exp(-200.0, -200.0);
        assert!((s - (-200.0 + 2f32.ln())).abs() < 1E-4);
    }

    #[test]
    fn test_fold() {
        let n = 10;
        let total = log_sum_exp_all((0..n).map(|_| uniform_rank(n)));
        assert!(total.abs() < 1E-5);
        assert_eq!(log_sum_exp_all([]), f32::NEG_INFINITY);
    }
}
