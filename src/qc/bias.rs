//! GC-content and gene-length bias of principal components
//!
//! Genes are grouped by (length bin, GC bin). Within each cell the PC
//! loadings are tested against zero; a cell whose genes load consistently in
//! one direction points at a technical bias driving that component.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::pca::PcaResult;
use crate::data::AnnotationSet;
use crate::error::{Result, SspaError};
use crate::io::{fmt_opt, TsvRecord};
use crate::stats::{mean, std_dev};
use crate::testing::{adjust_optional, bonferroni, one_sample_t_test};

/// One (component, length bin, GC bin) cell of the bias grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasCell {
    /// 1-based principal component
    pub component: usize,
    pub length_bin: usize,
    pub gc_bin: usize,
    /// Number of genes in the cell
    pub n: usize,
    pub mean: Option<f64>,
    pub sd: Option<f64>,
    pub t: Option<f64>,
    pub pvalue: Option<f64>,
    /// Bonferroni-adjusted across every tested cell
    pub padj: Option<f64>,
    pub significant: bool,
}

impl TsvRecord for BiasCell {
    fn header() -> Vec<&'static str> {
        vec!["component", "length_bin", "gc_bin", "n", "mean", "sd", "t", "pvalue", "padj", "significant"]
    }

    fn record(&self) -> Vec<String> {
        vec![
            format!("PC{}", self.component),
            self.length_bin.to_string(),
            self.gc_bin.to_string(),
            self.n.to_string(),
            fmt_opt(self.mean),
            fmt_opt(self.sd),
            fmt_opt(self.t),
            fmt_opt(self.pvalue),
            fmt_opt(self.padj),
            self.significant.to_string(),
        ]
    }
}

/// Test PC loadings within every length x GC cell
///
/// The grid is complete: every component has `n_bins * n_bins` cells, in
/// component, length-bin, GC-bin order. Cells with fewer than two genes or no
/// spread carry no test.
pub fn bias_grid(pca: &PcaResult, annotation: &AnnotationSet, alpha: f64) -> Result<Vec<BiasCell>> {
    let n_bins = annotation.n_bins;
    if n_bins == 0 {
        return Err(SspaError::InvalidAnnotation {
            reason: "Annotation has no GC / length bins".to_string(),
        });
    }

    let index = annotation.index();
    let mut placed: Vec<(usize, usize, usize)> = Vec::with_capacity(pca.gene_ids.len());
    let mut unannotated = 0usize;
    for (g, gene_id) in pca.gene_ids.iter().enumerate() {
        match index.get(gene_id.as_str()) {
            Some(a) if (1..=n_bins).contains(&a.length_bin) && (1..=n_bins).contains(&a.gc_bin) => {
                placed.push((g, a.length_bin - 1, a.gc_bin - 1));
            }
            _ => unannotated += 1,
        }
    }
    if unannotated > 0 {
        warn!("{} expressed genes have no GC / length annotation and are left out of the bias grid", unannotated);
    }

    let mut cells = Vec::with_capacity(pca.n_components() * n_bins * n_bins);
    for c in 0..pca.n_components() {
        let loadings = pca.loadings.column(c);
        let mut grid: Vec<Vec<f64>> = vec![Vec::new(); n_bins * n_bins];
        for &(g, lb, gb) in &placed {
            grid[lb * n_bins + gb].push(loadings[g]);
        }

        for (idx, values) in grid.iter().enumerate() {
            let test = one_sample_t_test(values);
            cells.push(BiasCell {
                component: c + 1,
                length_bin: idx / n_bins + 1,
                gc_bin: idx % n_bins + 1,
                n: values.len(),
                mean: (!values.is_empty()).then(|| mean(values)),
                sd: (values.len() >= 2).then(|| std_dev(values)),
                t: test.map(|t| t.t),
                pvalue: test.map(|t| t.pvalue),
                padj: None,
                significant: false,
            });
        }
    }

    let raw: Vec<Option<f64>> = cells.iter().map(|c| c.pvalue).collect();
    for (cell, padj) in cells.iter_mut().zip(adjust_optional(&raw, bonferroni)) {
        cell.padj = padj;
        cell.significant = padj.is_some_and(|p| p < alpha);
    }

    let tested = raw.iter().filter(|p| p.is_some()).count();
    let significant = cells.iter().filter(|c| c.significant).count();
    info!(
        "Bias grid: {} cells, {} tested, {} significant after Bonferroni",
        cells.len(),
        tested,
        significant
    );
    Ok(cells)
}
