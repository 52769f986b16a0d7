//! P-values from t statistics and one-sample t-tests

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::stats::{mean, std_dev};

/// Two-sided p-value from a t statistic with `df` degrees of freedom
/// R equivalent: 2 * pt(abs(stat), df = df, lower.tail = FALSE)
pub fn calculate_pvalue_t(stat: f64, df: f64) -> f64 {
    if !stat.is_finite() || df <= 0.0 {
        return f64::NAN;
    }

    match StudentsT::new(0.0, 1.0, df) {
        Ok(t_dist) => (2.0 * t_dist.cdf(-stat.abs())).min(1.0),
        Err(_) => f64::NAN,
    }
}

/// Outcome of a one-sample t-test against 0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TTest {
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
    pub t: f64,
    pub pvalue: f64,
}

/// One-sample two-sided t-test of `values` against a mean of 0
///
/// `None` when there are fewer than two values or no spread.
/// R equivalent: t.test(values, mu = 0)
pub fn one_sample_t_test(values: &[f64]) -> Option<TTest> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean(values);
    let sd = std_dev(values);
    if !(sd > 0.0) || !sd.is_finite() {
        return None;
    }
    let t = m / (sd / (n as f64).sqrt());
    let pvalue = calculate_pvalue_t(t, (n - 1) as f64);
    pvalue.is_finite().then_some(TTest {
        n,
        mean: m,
        sd,
        t,
        pvalue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pvalue_t_symmetric() {
        let p1 = calculate_pvalue_t(2.0, 5.0);
        let p2 = calculate_pvalue_t(-2.0, 5.0);
        assert!((p1 - p2).abs() < 1e-12);
        assert!((calculate_pvalue_t(0.0, 5.0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_pvalue_t_heavier_tails_with_small_df() {
        let p_t_large = calculate_pvalue_t(2.0, 1000.0);
        let p_t_small = calculate_pvalue_t(2.0, 3.0);
        assert!(p_t_small > p_t_large);
        // 2 * pnorm(-2) = 0.0455
        assert!((p_t_large - 0.0455).abs() < 0.001);
    }

    #[test]
    fn test_pvalue_t_invalid() {
        assert!(calculate_pvalue_t(f64::NAN, 3.0).is_nan());
        assert!(calculate_pvalue_t(1.0, 0.0).is_nan());
    }

    #[test]
    fn test_one_sample_t_test() {
        // mean 2, sd sqrt(2/3), n 4 -> t = 4.899, df = 3
        let result = one_sample_t_test(&[1.0, 2.0, 3.0, 2.0]).unwrap();
        assert_eq!(result.n, 4);
        assert!((result.t - 4.898979).abs() < 1e-5);
        assert!(result.pvalue > 0.0 && result.pvalue < 0.05);
    }

    #[test]
    fn test_one_sample_t_test_degenerate() {
        assert!(one_sample_t_test(&[1.0]).is_none());
        assert!(one_sample_t_test(&[2.0, 2.0, 2.0]).is_none());
        assert!(one_sample_t_test(&[]).is_none());
    }
}
