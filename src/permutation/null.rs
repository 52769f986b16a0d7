//! Permuted perturbation scores

use std::collections::BTreeMap;

use log::{debug, info};
use ndarray::{Array1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{permutation_bound, select_relabelings, unrank};
use crate::error::{Result, SspaError};
use crate::io::NullSummary;
use crate::pathway::weights::fold_change_against;
use crate::pathway::PathwayModel;
use crate::stats::{mad, median};
use crate::testing::NullStats;

/// Null distribution of every pathway, one value per evaluated relabeling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermutedScores {
    pub seed: u32,
    /// Relabelings asked for in the configuration
    pub requested: u64,
    /// Number of distinct relabelings of the design
    pub bound: u64,
    /// Relabelings actually evaluated
    pub n_relabelings: usize,
    pub scores: BTreeMap<String, Vec<f64>>,
}

impl PermutedScores {
    pub fn get(&self, pathway: &str) -> Option<&[f64]> {
        self.scores.get(pathway).map(Vec::as_slice)
    }

    /// No values, or no positive spread around the median
    pub fn is_degenerate(&self, pathway: &str) -> bool {
        self.get(pathway).map_or(true, |values| NullStats::from_scores(values).is_none())
    }

    /// Whether the stored null was generated with these settings
    pub fn matches(&self, seed: u32, requested: u64) -> bool {
        self.seed == seed && self.requested == requested
    }

    /// Location and spread of each pathway's null
    pub fn summaries(&self) -> Vec<NullSummary> {
        self.scores
            .iter()
            .map(|(pathway, values)| {
                let finite = |v: f64| v.is_finite().then_some(v);
                NullSummary {
                    pathway: pathway.clone(),
                    n: values.len(),
                    median: finite(median(values)),
                    mad: finite(mad(values)),
                    min: values.iter().copied().reduce(f64::min),
                    max: values.iter().copied().reduce(f64::max),
                    degenerate: self.is_degenerate(pathway),
                }
            })
            .collect()
    }
}

/// Score every pathway under each selected relabeling
///
/// The pseudo fold change of a relabeling is the pseudo-treated sample's
/// log-CPM minus the mean of the pseudo-reference set, scaled by the observed
/// gene weights. Relabelings are scored in parallel and collected in index
/// order, so the result depends only on the inputs and the seed.
pub fn generate_null(
    log_cpm: ArrayView2<f64>,
    weights: &[f64],
    models: &[PathwayModel],
    reference_size: usize,
    requested: u64,
    seed: u32,
) -> Result<PermutedScores> {
    let n_samples = log_cpm.ncols();
    if weights.len() != log_cpm.nrows() {
        return Err(SspaError::DimensionMismatch {
            expected: format!("{} gene weights", log_cpm.nrows()),
            got: format!("{}", weights.len()),
        });
    }

    let bound = permutation_bound(n_samples, reference_size)?;
    let selected = select_relabelings(bound, requested, seed)?;
    if requested > bound {
        info!(
            "Requested {} relabelings but only {} exist; enumerating all of them",
            requested, bound
        );
    }
    info!(
        "Scoring {} pathways under {} relabelings (seed {})",
        models.len(),
        selected.len(),
        seed
    );

    let weights = Array1::from(weights.to_vec());
    let per_relabeling: Vec<Vec<f64>> = selected
        .par_iter()
        .map(|&k| -> Result<Vec<f64>> {
            let relabeling = unrank(k, n_samples, reference_size)?;
            let fc = fold_change_against(log_cpm, relabeling.treated, &relabeling.reference) * &weights;
            Ok(models.iter().map(|m| m.score(fc.view())).collect())
        })
        .collect::<Result<_>>()?;

    if per_relabeling.len() as u64 > bound {
        return Err(SspaError::PermutationBound {
            generated: per_relabeling.len() as u64,
            bound,
        });
    }

    let mut scores: BTreeMap<String, Vec<f64>> = models
        .iter()
        .map(|m| (m.name.clone(), Vec::with_capacity(per_relabeling.len())))
        .collect();
    for row in &per_relabeling {
        for (model, &value) in models.iter().zip(row) {
            if let Some(values) = scores.get_mut(&model.name) {
                values.push(value);
            }
        }
    }

    let null = PermutedScores {
        seed,
        requested,
        bound,
        n_relabelings: per_relabeling.len(),
        scores,
    };
    let degenerate = models.iter().filter(|m| null.is_degenerate(&m.name)).count();
    debug!("{} pathways have a degenerate null", degenerate);
    Ok(null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Design;
    use crate::pathway::topology::{Edge, PathwayTopology};
    use ndarray::Array2;
    use std::collections::HashMap;

    fn model(name: &str, nodes: &[&str], edges: Vec<Edge>) -> PathwayModel {
        let topology = PathwayTopology {
            name: name.to_string(),
            nodes: nodes.iter().map(|s| s.to_string()).collect(),
            edges,
        };
        let rows: HashMap<String, usize> = [("1", 0), ("2", 1), ("3", 2)]
            .iter()
            .map(|(id, r)| (id.to_string(), *r))
            .collect();
        PathwayModel::new(&topology, &rows, 100)
    }

    fn fixture() -> (Array2<f64>, Vec<PathwayModel>) {
        let log_cpm = Array2::from_shape_fn((3, 6), |(g, s)| ((g * 7 + s * 3) % 5) as f64 + 0.1 * s as f64);
        let models = vec![
            model("linked", &["1", "2", "3"], vec![
                Edge { from: 0, to: 1, weight: 1.0 },
                Edge { from: 1, to: 2, weight: -1.0 },
            ]),
            model("no_edges", &["1", "2"], vec![]),
        ];
        (log_cpm, models)
    }

    #[test]
    fn test_full_enumeration() {
        let (log_cpm, models) = fixture();
        let null = generate_null(log_cpm.view(), &[1.0; 3], &models, 3, 1000, 1).unwrap();
        assert_eq!(null.bound, 60);
        assert_eq!(null.n_relabelings, 60);
        assert_eq!(null.get("linked").unwrap().len(), 60);
        assert!(!null.is_degenerate("linked"));
        // No edges, no propagation, every score is zero
        assert!(null.is_degenerate("no_edges"));
        assert!(null.is_degenerate("unknown"));
    }

    #[test]
    fn test_same_seed_same_null() {
        let (log_cpm, models) = fixture();
        let a = generate_null(log_cpm.view(), &[1.0, 0.5, 2.0], &models, 3, 20, 42).unwrap();
        let b = generate_null(log_cpm.view(), &[1.0, 0.5, 2.0], &models, 3, 20, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n_relabelings, 20);
        assert!(a.matches(42, 20));
        assert!(!a.matches(43, 20));
    }

    #[test]
    fn test_summaries_flag_degenerate() {
        let (log_cpm, models) = fixture();
        let null = generate_null(log_cpm.view(), &[1.0; 3], &models, 3, 1000, 1).unwrap();
        let summaries = null.summaries();
        assert_eq!(summaries.len(), 2);
        let flat = summaries.iter().find(|s| s.pathway == "no_edges").unwrap();
        assert!(flat.degenerate);
        assert_eq!(flat.mad, Some(0.0));
    }

    #[test]
    fn test_paired_design_enumerates_132_relabelings() {
        let ids: Vec<String> = (1..=12).map(|i| format!("s{}", i)).collect();
        let treatments: Vec<String> = (0..12)
            .map(|i| if i % 2 == 0 { "Vehicle" } else { "Drug" }.to_string())
            .collect();
        let blocks: Vec<String> = (0..12).map(|i| format!("pair{}", i / 2)).collect();
        let design = Design::new(ids, treatments, "Vehicle", Some(blocks)).unwrap();
        assert!(design.is_paired());
        assert_eq!(design.reference_set_size(), 1);

        let log_cpm = Array2::from_shape_fn((3, 12), |(g, s)| ((g * 5 + s * 3) % 7) as f64 + 0.05 * s as f64);
        let (_, models) = fixture();
        let null = generate_null(log_cpm.view(), &[1.0; 3], &models, design.reference_set_size(), 1000, 7).unwrap();
        assert_eq!(null.bound, 132);
        assert_eq!(null.n_relabelings, 132);
        assert_eq!(null.get("linked").unwrap().len(), 132);
    }

    #[test]
    fn test_zero_mad_null_is_degenerate() {
        let mut values = vec![0.0; 30];
        values.extend([1.0, -2.0, 3.0]);
        let null = PermutedScores {
            seed: 1,
            requested: 33,
            bound: 33,
            n_relabelings: 33,
            scores: BTreeMap::from([("sparse".to_string(), values)]),
        };
        assert!(null.is_degenerate("sparse"));
        let summary = &null.summaries()[0];
        assert!(summary.degenerate);
        assert_eq!(summary.mad, Some(0.0));
        assert_eq!(summary.max, Some(3.0));
    }

    #[test]
    fn test_weight_length_checked() {
        let (log_cpm, models) = fixture();
        assert!(generate_null(log_cpm.view(), &[1.0], &models, 3, 10, 1).is_err());
    }
}
