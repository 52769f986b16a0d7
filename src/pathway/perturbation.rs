//! Perturbation propagation through pathway graphs
//!
//! A node's perturbation is its own measured change plus the signed,
//! out-degree-normalised perturbation of its upstream neighbours:
//! `PF = dE + B * PF`. The pathway score is the summed accumulated
//! perturbation `sum(PF - dE)`.

use std::collections::HashMap;

use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use super::topology::PathwayTopology;
use crate::data::AnnotationSet;
use crate::error::{Result, SspaError};

/// Convergence tolerance of the propagation fixed point
pub const PROPAGATION_TOL: f64 = 1e-10;

/// Map expression rows to Entrez IDs
///
/// Returns Entrez ID -> row. Genes without an Entrez ID are dropped; when
/// several genes share one Entrez ID the first row wins.
pub fn entrez_rows(gene_ids: &[String], annotation: &AnnotationSet) -> HashMap<String, usize> {
    let entrez = annotation.entrez_map();
    let mut rows = HashMap::with_capacity(gene_ids.len());
    let mut unmapped = 0usize;
    let mut shared = 0usize;

    for (row, gene_id) in gene_ids.iter().enumerate() {
        match entrez.get(gene_id.as_str()) {
            Some(&id) => {
                if rows.contains_key(id) {
                    shared += 1;
                } else {
                    rows.insert(id.to_string(), row);
                }
            }
            None => unmapped += 1,
        }
    }

    if unmapped > 0 {
        warn!("{} of {} expressed genes have no Entrez ID and are dropped", unmapped, gene_ids.len());
    }
    if shared > 0 {
        warn!("{} genes share an Entrez ID with an earlier gene and are dropped", shared);
    }
    rows
}

/// Fixed-point iteration `PF = dE + B * PF`
///
/// Stops when the largest change falls below `tol` or after `max_depth`
/// iterations.
pub fn propagate(beta: ArrayView2<f64>, delta_e: ArrayView1<f64>, max_depth: usize, tol: f64) -> Array1<f64> {
    let mut pf = delta_e.to_owned();
    for _ in 0..max_depth {
        let next = &delta_e + &beta.dot(&pf);
        let change = next
            .iter()
            .zip(pf.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        pf = next;
        if !(change >= tol) {
            break;
        }
    }
    pf
}

/// A pathway prepared for scoring against one expression matrix
#[derive(Debug, Clone)]
pub struct PathwayModel {
    pub name: String,
    beta: Array2<f64>,
    /// Expression row of each node; `None` for nodes without data
    node_rows: Vec<Option<usize>>,
    max_depth: usize,
}

impl PathwayModel {
    pub fn new(topology: &PathwayTopology, rows: &HashMap<String, usize>, max_depth: usize) -> Self {
        let node_rows = topology.nodes.iter().map(|n| rows.get(n).copied()).collect();
        Self {
            name: topology.name.clone(),
            beta: topology.normalized_beta(),
            node_rows,
            max_depth,
        }
    }

    /// Nodes with expression data
    pub fn n_measured(&self) -> usize {
        self.node_rows.iter().filter(|r| r.is_some()).count()
    }

    pub fn n_nodes(&self) -> usize {
        self.node_rows.len()
    }

    /// Measured change per node; absent nodes contribute 0
    fn delta_e(&self, fold_changes: ArrayView1<f64>) -> Array1<f64> {
        self.node_rows
            .iter()
            .map(|r| r.map_or(0.0, |i| fold_changes[i]))
            .collect()
    }

    /// Raw perturbation score for one column of gene-level fold changes
    pub fn score(&self, fold_changes: ArrayView1<f64>) -> f64 {
        if self.n_measured() == 0 {
            return 0.0;
        }
        let delta_e = self.delta_e(fold_changes);
        let pf = propagate(self.beta.view(), delta_e.view(), self.max_depth, PROPAGATION_TOL);
        (&pf - &delta_e).sum()
    }
}

/// Build a scoring model for every pathway
pub fn build_models(
    topologies: &[PathwayTopology],
    rows: &HashMap<String, usize>,
    max_depth: usize,
) -> Vec<PathwayModel> {
    topologies
        .iter()
        .map(|t| {
            let model = PathwayModel::new(t, rows, max_depth);
            debug!(
                "Pathway '{}': {} nodes ({} measured), {} edges",
                t.name,
                t.n_nodes(),
                model.n_measured(),
                t.n_edges()
            );
            model
        })
        .collect()
}

/// Raw perturbation scores (pathways x samples)
///
/// `weighted_fc` is genes x samples; rows follow the expression matrix the
/// models were built against.
pub fn raw_perturbation_scores(models: &[PathwayModel], weighted_fc: ArrayView2<f64>) -> Result<Array2<f64>> {
    let n_rows = weighted_fc.nrows();
    if let Some(bad) = models
        .iter()
        .find(|m| m.node_rows.iter().flatten().any(|&r| r >= n_rows))
    {
        return Err(SspaError::DimensionMismatch {
            expected: format!("expression rows for pathway '{}'", bad.name),
            got: format!("{} rows", n_rows),
        });
    }

    let rows: Vec<Vec<f64>> = models
        .par_iter()
        .map(|model| {
            weighted_fc
                .axis_iter(Axis(1))
                .map(|column| model.score(column))
                .collect()
        })
        .collect();

    let n_samples = weighted_fc.ncols();
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((models.len(), n_samples), flat).map_err(|e| SspaError::NumericalInstability {
        operation: "perturbation scoring".to_string(),
        details: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathway::topology::Edge;
    use ndarray::array;

    fn chain() -> PathwayTopology {
        // 1 -> 2 -> 3, 1 -| 4
        PathwayTopology {
            name: "chain".to_string(),
            nodes: vec!["1".into(), "2".into(), "3".into(), "4".into()],
            edges: vec![
                Edge { from: 0, to: 1, weight: 1.0 },
                Edge { from: 1, to: 2, weight: 1.0 },
                Edge { from: 0, to: 3, weight: -1.0 },
            ],
        }
    }

    fn rows(ids: &[&str]) -> HashMap<String, usize> {
        ids.iter().enumerate().map(|(i, id)| (id.to_string(), i)).collect()
    }

    #[test]
    fn test_propagate_chain() {
        let topology = chain();
        let beta = topology.normalized_beta();
        let delta_e = array![2.0, 0.0, 0.0, 0.0];
        let pf = propagate(beta.view(), delta_e.view(), 100, PROPAGATION_TOL);
        // Node 1 splits over two targets: 2 gets +1, 4 gets -1, 3 inherits 1
        assert_eq!(pf, array![2.0, 1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_score_is_accumulated_perturbation() {
        let model = PathwayModel::new(&chain(), &rows(&["1", "2", "3", "4"]), 100);
        let fc = array![2.0, 0.0, 0.0, 0.0];
        assert!((model.score(fc.view()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unmeasured_nodes_contribute_nothing() {
        // Only node 2 has data
        let model = PathwayModel::new(&chain(), &rows(&["2"]), 100);
        assert_eq!(model.n_measured(), 1);
        let fc = array![3.0];
        // 2 -> 3 passes the full change on
        assert!((model.score(fc.view()) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_pathway_without_data_scores_zero() {
        let model = PathwayModel::new(&chain(), &HashMap::new(), 100);
        assert_eq!(model.score(array![1.0].view()), 0.0);
    }

    #[test]
    fn test_cycle_stops_at_max_depth() {
        let cycle = PathwayTopology {
            name: "cycle".to_string(),
            nodes: vec!["a".into(), "b".into()],
            edges: vec![
                Edge { from: 0, to: 1, weight: 1.0 },
                Edge { from: 1, to: 0, weight: 1.0 },
            ],
        };
        let beta = cycle.normalized_beta();
        let pf = propagate(beta.view(), array![1.0, 0.0].view(), 10, PROPAGATION_TOL);
        assert!(pf.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_raw_scores_shape() {
        let models = vec![PathwayModel::new(&chain(), &rows(&["1", "2", "3", "4"]), 100)];
        let fc = array![[2.0, 0.0], [0.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        let scores = raw_perturbation_scores(&models, fc.view()).unwrap();
        assert_eq!(scores.dim(), (1, 2));
        assert!((scores[[0, 0]] - 1.0).abs() < 1e-12);
        assert_eq!(scores[[0, 1]], 0.0);
    }
}
