//! Principal component analysis of log-CPM expression
//!
//! Genes are centred across samples but not scaled. Because there are far
//! fewer samples than genes, the decomposition works on the samples x samples
//! Gram matrix and recovers gene loadings from it.

use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SspaError};
use crate::io::TsvRecord;

const MAX_SWEEPS: usize = 100;

/// Eigen-decomposition of a real symmetric matrix by cyclic Jacobi rotations
///
/// Returns eigenvalues in descending order and the matching unit eigenvectors
/// as columns.
pub fn symmetric_eigen(matrix: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(SspaError::DimensionMismatch {
            expected: format!("{} x {} matrix", n, n),
            got: format!("{} x {}", n, matrix.ncols()),
        });
    }

    let mut a = matrix.to_owned();
    let mut v = Array2::<f64>::eye(n);
    let scale: f64 = a.iter().map(|x| x * x).sum::<f64>().max(f64::MIN_POSITIVE);

    let mut converged = false;
    for _ in 0..MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
            .map(|(p, q)| a[[p, q]] * a[[p, q]])
            .sum();
        if off <= 1e-30 * scale {
            converged = true;
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let (akp, akq) = (a[[k, p]], a[[k, q]]);
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[[p, k]], a[[q, k]]);
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    if !converged {
        return Err(SspaError::NumericalInstability {
            operation: "Jacobi eigen-decomposition".to_string(),
            details: format!("no convergence after {} sweeps", MAX_SWEEPS),
        });
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));

    let values = Array1::from_iter(order.iter().map(|&i| a[[i, i]]));
    let vectors = v.select(Axis(1), &order);
    Ok((values, vectors))
}

/// Principal components of the sample space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaResult {
    pub sample_ids: Vec<String>,
    pub gene_ids: Vec<String>,
    /// Sample scores (samples x components)
    pub scores: Array2<f64>,
    /// Unit-norm gene loadings (genes x components)
    pub loadings: Array2<f64>,
    /// Fraction of total variance per component
    pub variance_explained: Vec<f64>,
}

impl PcaResult {
    pub fn n_components(&self) -> usize {
        self.variance_explained.len()
    }

    /// Long-format score table
    pub fn score_rows(&self) -> Vec<PcaScoreRow> {
        let mut rows = Vec::with_capacity(self.sample_ids.len() * self.n_components());
        for (i, sample) in self.sample_ids.iter().enumerate() {
            for k in 0..self.n_components() {
                rows.push(PcaScoreRow {
                    sample: sample.clone(),
                    component: k + 1,
                    score: self.scores[[i, k]],
                    variance_explained: self.variance_explained[k],
                });
            }
        }
        rows
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaScoreRow {
    pub sample: String,
    pub component: usize,
    pub score: f64,
    pub variance_explained: f64,
}

impl TsvRecord for PcaScoreRow {
    fn header() -> Vec<&'static str> {
        vec!["sample", "component", "score", "variance_explained"]
    }

    fn record(&self) -> Vec<String> {
        vec![
            self.sample.clone(),
            format!("PC{}", self.component),
            format!("{:.6}", self.score),
            format!("{:.6}", self.variance_explained),
        ]
    }
}

/// PCA of a genes x samples expression matrix
///
/// Components with (numerically) zero variance are not returned, so fewer
/// than `n_pcs` components come back for very small designs.
pub fn run_pca(
    expression: ArrayView2<f64>,
    gene_ids: &[String],
    sample_ids: &[String],
    n_pcs: usize,
) -> Result<PcaResult> {
    let (n_genes, n_samples) = expression.dim();
    if n_samples < 2 || n_genes == 0 {
        return Err(SspaError::EmptyData {
            reason: format!("PCA needs at least 2 samples and 1 gene, got {} x {}", n_genes, n_samples),
        });
    }
    if gene_ids.len() != n_genes || sample_ids.len() != n_samples {
        return Err(SspaError::DimensionMismatch {
            expected: format!("{} genes x {} samples", n_genes, n_samples),
            got: format!("{} gene IDs, {} sample IDs", gene_ids.len(), sample_ids.len()),
        });
    }

    let mut centered = expression.to_owned();
    for mut row in centered.axis_iter_mut(Axis(0)) {
        let mean = row.mean().unwrap_or(0.0);
        row.mapv_inplace(|x| x - mean);
    }

    let gram = centered.t().dot(&centered);
    let (eigenvalues, eigenvectors) = symmetric_eigen(gram.view())?;

    let total: f64 = eigenvalues.iter().filter(|&&l| l > 0.0).sum();
    if !(total > 0.0) {
        return Err(SspaError::NumericalInstability {
            operation: "PCA".to_string(),
            details: "expression has zero variance".to_string(),
        });
    }

    let tol = eigenvalues[0] * 1e-12;
    let available = eigenvalues.iter().take_while(|&&l| l > tol).count();
    let k = n_pcs.min(available);
    if k < n_pcs {
        warn!("Only {} of {} requested principal components carry variance", k, n_pcs);
    }

    let mut scores = Array2::<f64>::zeros((n_samples, k));
    let mut loadings = Array2::<f64>::zeros((n_genes, k));
    let mut variance_explained = Vec::with_capacity(k);

    for c in 0..k {
        let lambda = eigenvalues[c];
        let sd = lambda.sqrt();
        let u = eigenvectors.column(c);
        let mut loading = centered.dot(&u) / sd;
        let mut score = u.to_owned() * sd;

        let largest = loading
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(0.0);
        if largest < 0.0 {
            loading.mapv_inplace(|x| -x);
            score.mapv_inplace(|x| -x);
        }

        loadings.column_mut(c).assign(&loading);
        scores.column_mut(c).assign(&score);
        variance_explained.push(lambda / total);
    }

    debug!("PCA variance explained: {:?}", variance_explained);

    Ok(PcaResult {
        sample_ids: sample_ids.to_vec(),
        gene_ids: gene_ids.to_vec(),
        scores,
        loadings,
        variance_explained,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_symmetric_eigen_2x2() {
        let m = array![[2.0, 1.0], [1.0, 2.0]];
        let (values, vectors) = symmetric_eigen(m.view()).unwrap();
        assert!((values[0] - 3.0).abs() < 1e-12);
        assert!((values[1] - 1.0).abs() < 1e-12);
        let v0 = vectors.column(0);
        assert!((v0[0].abs() - v0[1].abs()).abs() < 1e-12);
        let reconstructed = m.dot(&v0);
        for i in 0..2 {
            assert!((reconstructed[i] - 3.0 * v0[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_symmetric_eigen_diagonal_sorted() {
        let m = array![[1.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 3.0]];
        let (values, _) = symmetric_eigen(m.view()).unwrap();
        assert_eq!(values.to_vec(), vec![5.0, 3.0, 1.0]);
    }

    #[test]
    fn test_pca_separates_groups() {
        // Two groups of samples differing in genes 1 and 2
        let expr = array![
            [1.0, 1.2, 0.8, 5.0, 5.1, 4.9],
            [6.0, 6.1, 5.9, 2.0, 2.2, 1.8],
            [3.0, 3.1, 2.9, 3.0, 2.9, 3.1],
        ];
        let pca = run_pca(expr.view(), &ids("g", 3), &ids("s", 6), 2).unwrap();
        assert_eq!(pca.n_components(), 2);
        assert!(pca.variance_explained[0] > 0.9);
        let pc1 = pca.scores.column(0);
        assert!(pc1[0].signum() != pc1[3].signum());

        // Loadings are unit norm with the largest entry positive
        let l1 = pca.loadings.column(0);
        assert!((l1.dot(&l1) - 1.0).abs() < 1e-9);
        let largest = l1.iter().copied().max_by(|a, b| a.abs().total_cmp(&b.abs())).unwrap();
        assert!(largest > 0.0);
    }

    #[test]
    fn test_pca_caps_components_at_rank() {
        let expr = array![[1.0, 2.0], [3.0, 5.0]];
        let pca = run_pca(expr.view(), &ids("g", 2), &ids("s", 2), 3).unwrap();
        assert_eq!(pca.n_components(), 1);
        assert!((pca.variance_explained[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pca_constant_expression_fails() {
        let expr = array![[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]];
        assert!(run_pca(expr.view(), &ids("g", 2), &ids("s", 3), 2).is_err());
    }
}
