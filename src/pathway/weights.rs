//! Single-sample fold changes and their precision weights
//!
//! Each treated sample is compared against the mean of its reference
//! samples. Genes whose fold changes are noisy for their expression level are
//! down-weighted by the inverse of a LOWESS trend of fold-change variance
//! against mean log-CPM.

use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::data::Design;
use crate::error::{Result, SspaError};
use crate::stats::{lowess_fit, variance};

/// LOWESS span used for the variance trend
pub const LOWESS_SPAN: f64 = 2.0 / 3.0;
/// Robustness iterations of the variance trend
pub const LOWESS_ITERATIONS: usize = 3;

/// Fold change of one sample against the mean of a reference set
pub fn fold_change_against(log_cpm: ArrayView2<f64>, sample: usize, references: &[usize]) -> Array1<f64> {
    let reference_mean = log_cpm
        .select(Axis(1), references)
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(log_cpm.nrows()));
    &log_cpm.column(sample) - &reference_mean
}

/// Single-sample log fold changes (genes x treated samples)
///
/// Paired designs compare against the references of the sample's own block,
/// unpaired designs against all references. Columns follow
/// [`Design::treated_indices`].
pub fn single_sample_fc(log_cpm: ArrayView2<f64>, design: &Design) -> Result<Array2<f64>> {
    if log_cpm.ncols() != design.n_samples() {
        return Err(SspaError::DimensionMismatch {
            expected: format!("{} samples", design.n_samples()),
            got: format!("{} expression columns", log_cpm.ncols()),
        });
    }

    let treated = design.treated_indices();
    let mut fc = Array2::<f64>::zeros((log_cpm.nrows(), treated.len()));
    for (k, &t) in treated.iter().enumerate() {
        let references = design.references_for(t);
        fc.column_mut(k).assign(&fold_change_against(log_cpm, t, &references));
    }
    Ok(fc)
}

/// Per-gene precision weights
///
/// `mean_expression` is the mean log-CPM of each gene. The fold-change
/// variance across treated samples is smoothed against it; weights are the
/// inverse fitted variance, with fitted values floored at the smallest
/// positive fit. A single treated sample carries no variance information and
/// gets unit weights.
pub fn gene_weights(mean_expression: &[f64], ssfc: ArrayView2<f64>) -> Result<Vec<f64>> {
    let n_genes = ssfc.nrows();
    if mean_expression.len() != n_genes {
        return Err(SspaError::DimensionMismatch {
            expected: format!("{} gene means", n_genes),
            got: format!("{}", mean_expression.len()),
        });
    }
    if ssfc.ncols() < 2 {
        debug!("One treated sample; using unit gene weights");
        return Ok(vec![1.0; n_genes]);
    }

    let fc_variance: Vec<f64> = ssfc
        .axis_iter(Axis(0))
        .map(|row| variance(&row.to_vec()))
        .collect();
    let fitted = lowess_fit(mean_expression, &fc_variance, LOWESS_SPAN, LOWESS_ITERATIONS);

    let floor = fitted
        .iter()
        .copied()
        .filter(|&v| v > 0.0 && v.is_finite())
        .fold(f64::INFINITY, f64::min);
    if !floor.is_finite() {
        warn!("Fold-change variance trend is zero everywhere; using unit gene weights");
        return Ok(vec![1.0; n_genes]);
    }

    Ok(fitted
        .into_iter()
        .map(|v| 1.0 / if v.is_finite() { v.max(floor) } else { floor })
        .collect())
}

/// Fold changes scaled by their gene weights
pub fn weighted_fc(ssfc: ArrayView2<f64>, weights: &[f64]) -> Result<Array2<f64>> {
    if weights.len() != ssfc.nrows() {
        return Err(SspaError::DimensionMismatch {
            expected: format!("{} gene weights", ssfc.nrows()),
            got: format!("{}", weights.len()),
        });
    }
    let w = ArrayView1::from(weights).insert_axis(Axis(1));
    Ok(&ssfc * &w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_paired_fold_change_uses_block_reference() {
        let design = Design::new(
            strings(&["a_v", "a_t", "b_v", "b_t"]),
            strings(&["Vehicle", "DHT", "Vehicle", "DHT"]),
            "Vehicle",
            Some(strings(&["A", "A", "B", "B"])),
        )
        .unwrap();
        let log_cpm = array![[1.0, 3.0, 10.0, 11.0], [5.0, 5.0, 5.0, 2.0]];
        let fc = single_sample_fc(log_cpm.view(), &design).unwrap();
        assert_eq!(fc, array![[2.0, 1.0], [0.0, -3.0]]);
    }

    #[test]
    fn test_unpaired_fold_change_uses_all_references() {
        let design = Design::new(
            strings(&["v1", "v2", "t1"]),
            strings(&["Vehicle", "Vehicle", "Drug"]),
            "Vehicle",
            None,
        )
        .unwrap();
        let log_cpm = array![[1.0, 3.0, 4.0]];
        let fc = single_sample_fc(log_cpm.view(), &design).unwrap();
        assert_eq!(fc, array![[2.0]]);
    }

    #[test]
    fn test_single_treated_sample_unit_weights() {
        let fc = array![[1.0], [2.0]];
        assert_eq!(gene_weights(&[1.0, 2.0], fc.view()).unwrap(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_noisy_genes_are_down_weighted() {
        // Variance grows with mean expression
        let means: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let fc = Array2::from_shape_fn((20, 3), |(g, s)| (s as f64 - 1.0) * (1.0 + g as f64));
        let weights = gene_weights(&means, fc.view()).unwrap();
        assert!(weights.iter().all(|w| w.is_finite() && *w > 0.0));
        assert!(weights[0] > weights[19]);
    }

    #[test]
    fn test_weighted_fc_scales_rows() {
        let fc = array![[1.0, -2.0], [3.0, 4.0]];
        let weighted = weighted_fc(fc.view(), &[2.0, 0.5]).unwrap();
        assert_eq!(weighted, array![[2.0, -4.0], [1.5, 2.0]]);
        assert!(weighted_fc(fc.view(), &[1.0]).is_err());
    }
}
