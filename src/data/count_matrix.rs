//! Count matrix representation for RNA-seq data

use std::collections::HashSet;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SspaError};

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(names.len());
    names.iter().find(|n| !seen.insert(n.as_str())).map(|n| n.as_str())
}

/// A count matrix of RNA-seq reads
/// Rows are genes, columns are samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountMatrix {
    /// Raw count data (genes x samples)
    counts: Array2<f64>,
    /// Gene identifiers
    gene_ids: Vec<String>,
    /// Sample identifiers
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new count matrix from raw data
    ///
    /// Counts must be non-negative integers and both label sets unique.
    pub fn new(counts: Array2<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if gene_ids.len() != n_genes {
            return Err(SspaError::DimensionMismatch {
                expected: format!("{} gene IDs", n_genes),
                got: format!("{} gene IDs", gene_ids.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(SspaError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }

        if counts.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(SspaError::InvalidCountMatrix {
                reason: "Counts must be non-negative finite values".to_string(),
            });
        }

        if counts.iter().any(|&x| x != x.round()) {
            return Err(SspaError::InvalidCountMatrix {
                reason: "Counts must be integers".to_string(),
            });
        }

        if let Some(dup) = first_duplicate(&gene_ids) {
            return Err(SspaError::InvalidCountMatrix {
                reason: format!("Duplicate gene ID '{}'", dup),
            });
        }

        if let Some(dup) = first_duplicate(&sample_ids) {
            return Err(SspaError::InvalidCountMatrix {
                reason: format!("Duplicate sample ID '{}'", dup),
            });
        }

        Ok(Self {
            counts,
            gene_ids,
            sample_ids,
        })
    }

    /// Get the number of genes
    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    /// Get the number of samples
    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    /// Get the raw counts as a view
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    /// Get gene IDs
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Get sample IDs
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get counts for a specific gene
    pub fn gene_counts(&self, gene_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.row(gene_idx)
    }

    /// Get sample index by ID
    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }

    /// Sum of counts per sample (library size)
    pub fn library_sizes(&self) -> Vec<f64> {
        self.counts.axis_iter(Axis(1)).map(|col| col.sum()).collect()
    }

    /// Number of genes with at least one read, per sample
    pub fn detected_genes(&self) -> Vec<usize> {
        self.counts
            .axis_iter(Axis(1))
            .map(|col| col.iter().filter(|&&x| x > 0.0).count())
            .collect()
    }

    /// Indices of genes without a single read in any sample
    pub fn zero_total_genes(&self) -> Vec<usize> {
        self.counts
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.sum() == 0.0)
            .map(|(i, _)| i)
            .collect()
    }

    /// Subset to specific samples
    pub fn subset_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        let new_counts = self.counts.select(Axis(1), sample_indices);
        let new_sample_ids: Vec<String> = sample_indices.iter().map(|&i| self.sample_ids[i].clone()).collect();

        Self::new(new_counts, self.gene_ids.clone(), new_sample_ids)
    }

    /// Subset to specific genes
    pub fn subset_genes(&self, gene_indices: &[usize]) -> Result<Self> {
        let new_counts = self.counts.select(Axis(0), gene_indices);
        let new_gene_ids: Vec<String> = gene_indices.iter().map(|&i| self.gene_ids[i].clone()).collect();

        Self::new(new_counts, new_gene_ids, self.sample_ids.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_count_matrix_creation() {
        let counts = array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]];
        let matrix = CountMatrix::new(counts, ids("gene", 2), ids("s", 3)).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
    }

    #[test]
    fn test_negative_counts_rejected() {
        let counts = array![[10.0, -5.0], [5.0, 15.0]];
        assert!(CountMatrix::new(counts, ids("gene", 2), ids("s", 2)).is_err());
    }

    #[test]
    fn test_fractional_counts_rejected() {
        let counts = array![[10.5, 5.0], [5.0, 15.0]];
        assert!(matches!(
            CountMatrix::new(counts, ids("gene", 2), ids("s", 2)),
            Err(SspaError::InvalidCountMatrix { .. })
        ));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let counts = array![[1.0, 2.0], [3.0, 4.0]];
        let genes = vec!["g".to_string(), "g".to_string()];
        assert!(CountMatrix::new(counts.clone(), genes, ids("s", 2)).is_err());
        let samples = vec!["s".to_string(), "s".to_string()];
        assert!(CountMatrix::new(counts, ids("gene", 2), samples).is_err());
    }

    #[test]
    fn test_library_sizes_and_detection() {
        let counts = array![[10.0, 0.0], [5.0, 15.0], [0.0, 0.0]];
        let matrix = CountMatrix::new(counts, ids("gene", 3), ids("s", 2)).unwrap();
        assert_eq!(matrix.library_sizes(), vec![15.0, 15.0]);
        assert_eq!(matrix.detected_genes(), vec![2, 1]);
        assert_eq!(matrix.zero_total_genes(), vec![2]);
    }
}
