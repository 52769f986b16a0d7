//! Counts-per-million scaling and expression filtering
//!
//! CPM and log-CPM follow the edgeR conventions: library sizes are column
//! sums and the log transform adds a prior count scaled by relative library
//! size.

use log::{debug, info};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::data::CountMatrix;
use crate::error::{Result, SspaError};

fn checked_library_sizes(counts: ArrayView2<f64>) -> Result<Vec<f64>> {
    let lib_sizes: Vec<f64> = counts.axis_iter(Axis(1)).map(|col| col.sum()).collect();
    if let Some(j) = lib_sizes.iter().position(|&l| l <= 0.0) {
        return Err(SspaError::InvalidCountMatrix {
            reason: format!("Sample column {} has no reads", j + 1),
        });
    }
    Ok(lib_sizes)
}

/// Counts per million
///
/// `CPM = counts * 1e6 / colSums(counts)`
pub fn cpm(counts: ArrayView2<f64>) -> Result<Array2<f64>> {
    let lib_sizes = checked_library_sizes(counts)?;
    let mut result = counts.to_owned();
    for (mut col, lib) in result.axis_iter_mut(Axis(1)).zip(lib_sizes) {
        col.mapv_inplace(|y| y * 1e6 / lib);
    }
    Ok(result)
}

/// Log2 counts per million with a library-size-scaled prior count
///
/// R equivalent: edgeR::cpm(y, log = TRUE, prior.count = p)
///
/// `p_j = p * L_j / mean(L)`,
/// `logCPM = log2((y + p_j) / (L_j + 2 p_j) * 1e6)`
pub fn log_cpm(counts: ArrayView2<f64>, prior_count: f64) -> Result<Array2<f64>> {
    if !(prior_count > 0.0) {
        return Err(SspaError::InvalidInput {
            reason: format!("prior_count must be positive, got {}", prior_count),
        });
    }
    let lib_sizes = checked_library_sizes(counts)?;
    let mean_lib = lib_sizes.iter().sum::<f64>() / lib_sizes.len() as f64;

    let mut result = counts.to_owned();
    for (mut col, lib) in result.axis_iter_mut(Axis(1)).zip(lib_sizes) {
        let prior = prior_count * lib / mean_lib;
        let adj_lib = lib + 2.0 * prior;
        col.mapv_inplace(|y| ((y + prior) / adj_lib * 1e6).log2());
    }
    Ok(result)
}

/// Outcome of expression filtering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSummary {
    pub input_genes: usize,
    /// Genes without a single read in any sample
    pub zero_total: usize,
    /// Genes with reads but below the CPM threshold
    pub low_expression: usize,
    pub kept: usize,
    pub min_cpm: f64,
    pub min_samples: usize,
}

/// Drop zero-total and lowly expressed genes
///
/// A gene is kept when its CPM is at least `min_cpm` in at least
/// `min_samples` samples. Zero-total genes are always removed.
pub fn filter_expressed(matrix: &CountMatrix, min_cpm: f64, min_samples: usize) -> Result<(CountMatrix, FilterSummary)> {
    let zero_total = matrix.zero_total_genes();
    let cpm_values = cpm(matrix.counts())?;

    let keep: Vec<usize> = cpm_values
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(i, row)| {
            matrix.gene_counts(*i).sum() > 0.0 && row.iter().filter(|&&c| c >= min_cpm).count() >= min_samples
        })
        .map(|(i, _)| i)
        .collect();

    if keep.is_empty() {
        return Err(SspaError::EmptyData {
            reason: format!(
                "No gene reaches {} CPM in {} samples",
                min_cpm, min_samples
            ),
        });
    }

    let summary = FilterSummary {
        input_genes: matrix.n_genes(),
        zero_total: zero_total.len(),
        low_expression: matrix.n_genes() - zero_total.len() - keep.len(),
        kept: keep.len(),
        min_cpm,
        min_samples,
    };
    debug!("Filter: {:?}", summary);
    Ok((matrix.subset_genes(&keep)?, summary))
}

/// Filtered counts together with their log-CPM values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionSet {
    pub counts: CountMatrix,
    /// log2 CPM (genes x samples), same order as `counts`
    pub log_cpm: Array2<f64>,
    pub prior_count: f64,
    pub filter: FilterSummary,
}

impl ExpressionSet {
    /// Filter the raw matrix and compute log-CPM of the retained genes
    pub fn build(raw: &CountMatrix, min_cpm: f64, min_samples: usize, prior_count: f64) -> Result<Self> {
        let (counts, filter) = filter_expressed(raw, min_cpm, min_samples)?;
        let log_cpm = log_cpm(counts.counts(), prior_count)?;
        info!(
            "Kept {} of {} genes ({} with zero reads, {} below {} CPM in {} samples)",
            filter.kept, filter.input_genes, filter.zero_total, filter.low_expression, min_cpm, min_samples
        );
        Ok(Self {
            counts,
            log_cpm,
            prior_count,
            filter,
        })
    }

    pub fn gene_ids(&self) -> &[String] {
        self.counts.gene_ids()
    }

    pub fn sample_ids(&self) -> &[String] {
        self.counts.sample_ids()
    }

    /// Mean log-CPM of each gene over all samples
    pub fn mean_log_cpm(&self) -> Vec<f64> {
        self.log_cpm
            .axis_iter(Axis(0))
            .map(|row| row.mean().unwrap_or(f64::NAN))
            .collect()
    }

    /// Restrict to the given samples, keeping gene order
    pub fn subset_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        Ok(Self {
            counts: self.counts.subset_samples(sample_indices)?,
            log_cpm: self.log_cpm.select(Axis(1), sample_indices),
            prior_count: self.prior_count,
            filter: self.filter.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn matrix() -> CountMatrix {
        CountMatrix::new(
            array![
                [100.0, 200.0, 300.0],
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [899.0, 800.0, 700.0],
            ],
            vec!["g1".into(), "g2".into(), "g3".into(), "g4".into()],
            vec!["s1".into(), "s2".into(), "s3".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_cpm_columns_sum_to_million() {
        let m = matrix();
        let values = cpm(m.counts()).unwrap();
        for col in values.axis_iter(Axis(1)) {
            assert!((col.sum() - 1e6).abs() < 1e-6);
        }
        assert!((values[[0, 0]] - 1e5).abs() < 1e-9);
    }

    #[test]
    fn test_log_cpm_matches_edger() {
        // Equal library sizes: prior is exactly prior_count
        let counts = array![[10.0, 0.0], [990.0, 1000.0]];
        let values = log_cpm(counts.view(), 2.0).unwrap();
        let expected = ((10.0 + 2.0) / (1000.0 + 4.0) * 1e6_f64).log2();
        assert!((values[[0, 0]] - expected).abs() < 1e-12);
        let expected_zero = (2.0 / 1004.0 * 1e6_f64).log2();
        assert!((values[[0, 1]] - expected_zero).abs() < 1e-12);
    }

    #[test]
    fn test_log_cpm_rejects_empty_library() {
        let counts = array![[0.0, 1.0], [0.0, 2.0]];
        assert!(log_cpm(counts.view(), 2.0).is_err());
    }

    #[test]
    fn test_filter_counts_zero_total_genes() {
        let (filtered, summary) = filter_expressed(&matrix(), 1.0, 2).unwrap();
        assert_eq!(summary.zero_total, 1);
        assert_eq!(summary.low_expression, 1);
        assert_eq!(summary.kept, 2);
        assert_eq!(filtered.gene_ids(), &["g1".to_string(), "g4".to_string()]);
    }

    #[test]
    fn test_filter_nothing_left() {
        assert!(filter_expressed(&matrix(), 1e7, 1).is_err());
    }

    #[test]
    fn test_expression_set() {
        let set = ExpressionSet::build(&matrix(), 1.0, 2, 2.0).unwrap();
        assert_eq!(set.log_cpm.dim(), (2, 3));
        assert_eq!(set.mean_log_cpm().len(), 2);
        let sub = set.subset_samples(&[2, 0]).unwrap();
        assert_eq!(sub.sample_ids(), &["s3".to_string(), "s1".to_string()]);
        assert_eq!(sub.log_cpm[[0, 1]], set.log_cpm[[0, 0]]);
    }
}
