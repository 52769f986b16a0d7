//! Robust z-scores and empirical p-values against the permuted null
//!
//! Sample level: each (pathway, treated sample) raw score is compared with
//! the pathway's null by a median/MAD z-score and a two-sided empirical
//! p-value, Bonferroni-adjusted over all evaluable tests. Group level: the
//! evaluable z-scores of a pathway are t-tested against 0 and the p-values
//! BH-adjusted over evaluable pathways.

use log::{debug, info};
use ndarray::ArrayView2;

use super::fdr::{adjust_optional, benjamini_hochberg, bonferroni};
use super::pvalue::one_sample_t_test;
use crate::error::{Result, SspaError};
use crate::io::{Direction, Evaluation, GroupLevelResult, PathwayResults, SampleLevelResult};
use crate::permutation::PermutedScores;
use crate::stats::{mad, median};

/// Centre and scale of a null distribution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NullStats {
    pub median: f64,
    pub mad: f64,
}

impl NullStats {
    /// `None` when the null is empty or its MAD is not strictly positive
    pub fn from_scores(null: &[f64]) -> Option<Self> {
        if null.is_empty() {
            return None;
        }
        let median = median(null);
        let mad = mad(null);
        (median.is_finite() && mad.is_finite() && mad > 0.0).then_some(Self { median, mad })
    }

    pub fn z(&self, raw: f64) -> f64 {
        (raw - self.median) / self.mad
    }
}

/// `(raw - median(null)) / mad(null)`; `None` when non-evaluable
pub fn robust_z(raw: f64, null: &[f64]) -> Option<f64> {
    NullStats::from_scores(null).map(|s| s.z(raw))
}

/// Two-sided empirical p-value around the null median
///
/// `(1 + #{|null_i - med| >= |raw - med|}) / (1 + N)`. Never 0. `None` for an
/// empty null.
pub fn empirical_pvalue(raw: f64, null: &[f64]) -> Option<f64> {
    if null.is_empty() || !raw.is_finite() {
        return None;
    }
    let center = median(null);
    let observed = (raw - center).abs();
    let extreme = null.iter().filter(|&&v| (v - center).abs() >= observed).count();
    Some((1 + extreme) as f64 / (1 + null.len()) as f64)
}

/// Sample-level results for every (pathway, sample) pair
///
/// `raw` is pathways x samples in the order of `pathways` and `samples`.
pub fn evaluate_samples(
    pathways: &[String],
    samples: &[String],
    raw: ArrayView2<f64>,
    null: &PermutedScores,
) -> Result<Vec<SampleLevelResult>> {
    if raw.dim() != (pathways.len(), samples.len()) {
        return Err(SspaError::DimensionMismatch {
            expected: format!("{} pathways x {} samples", pathways.len(), samples.len()),
            got: format!("{} x {}", raw.nrows(), raw.ncols()),
        });
    }

    let mut rows = Vec::with_capacity(pathways.len() * samples.len());
    for (p, pathway) in pathways.iter().enumerate() {
        let scores = null.get(pathway).unwrap_or_default();
        let stats = NullStats::from_scores(scores);
        if stats.is_none() {
            debug!("Pathway '{}' has a non-evaluable null", pathway);
        }

        for (s, sample) in samples.iter().enumerate() {
            let value = raw[[p, s]];
            let evaluable = stats.filter(|_| value.is_finite());
            rows.push(SampleLevelResult {
                pathway: pathway.clone(),
                sample: sample.clone(),
                raw_score: value,
                robust_z: evaluable.map(|st| st.z(value)),
                pvalue: evaluable.and_then(|_| empirical_pvalue(value, scores)),
                padj: None,
                status: if evaluable.is_some() {
                    Evaluation::Evaluable
                } else {
                    Evaluation::NonEvaluable
                },
            });
        }
    }

    let raw_p: Vec<Option<f64>> = rows.iter().map(|r| r.pvalue).collect();
    for (row, padj) in rows.iter_mut().zip(adjust_optional(&raw_p, bonferroni)) {
        row.padj = padj;
    }
    Ok(rows)
}

/// Group-level results, one per pathway in `pathways` order
pub fn evaluate_groups(pathways: &[String], sample_level: &[SampleLevelResult]) -> Vec<GroupLevelResult> {
    let mut groups: Vec<GroupLevelResult> = pathways
        .iter()
        .map(|pathway| {
            let z: Vec<f64> = sample_level
                .iter()
                .filter(|r| &r.pathway == pathway)
                .filter_map(|r| r.robust_z)
                .collect();
            match one_sample_t_test(&z) {
                Some(test) => GroupLevelResult {
                    pathway: pathway.clone(),
                    n: test.n,
                    mean_z: Some(test.mean),
                    t_stat: Some(test.t),
                    pvalue: Some(test.pvalue),
                    fdr: None,
                    direction: Some(Direction::from_mean(test.mean)),
                    status: Evaluation::Evaluable,
                },
                None => GroupLevelResult {
                    pathway: pathway.clone(),
                    n: z.len(),
                    mean_z: None,
                    t_stat: None,
                    pvalue: None,
                    fdr: None,
                    direction: None,
                    status: Evaluation::NonEvaluable,
                },
            }
        })
        .collect();

    let raw_p: Vec<Option<f64>> = groups.iter().map(|g| g.pvalue).collect();
    for (group, fdr) in groups.iter_mut().zip(adjust_optional(&raw_p, benjamini_hochberg)) {
        group.fdr = fdr;
    }
    groups
}

/// Sample- and group-level evaluation of all pathways
pub fn evaluate(
    pathways: &[String],
    samples: &[String],
    raw: ArrayView2<f64>,
    null: &PermutedScores,
    alpha: f64,
) -> Result<PathwayResults> {
    let sample_level = evaluate_samples(pathways, samples, raw, null)?;
    let group_level = evaluate_groups(pathways, &sample_level);
    let results = PathwayResults {
        sample_level,
        group_level,
        alpha,
    };
    let summary = results.summary();
    info!(
        "{} of {} pathways evaluable, {} significant at FDR < {}",
        summary.pathways_tested, summary.total_pathways, summary.significant, alpha
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::BTreeMap;

    fn null_of(entries: &[(&str, Vec<f64>)]) -> PermutedScores {
        PermutedScores {
            seed: 1,
            requested: 10,
            bound: 10,
            n_relabelings: entries.first().map_or(0, |e| e.1.len()),
            scores: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_robust_z_shift_invariant() {
        let null = vec![-1.0, 0.5, 0.0, 2.0, -0.3, 1.1];
        let z = robust_z(1.6, &null).unwrap();
        for shift in [-10.0, 3.5, 1e3] {
            let shifted: Vec<f64> = null.iter().map(|v| v + shift).collect();
            let z_shifted = robust_z(1.6 + shift, &shifted).unwrap();
            assert!((z - z_shifted).abs() < 1e-9);
            let p = empirical_pvalue(1.6, &null).unwrap();
            let p_shifted = empirical_pvalue(1.6 + shift, &shifted).unwrap();
            assert_eq!(p, p_shifted);
        }
    }

    #[test]
    fn test_empirical_pvalue_bounds() {
        let null = vec![0.0, 1.0, -1.0, 2.0];
        // Far outside: only the +1 term remains
        assert_eq!(empirical_pvalue(100.0, &null), Some(0.2));
        // At the median every null value is at least as extreme
        assert_eq!(empirical_pvalue(0.5, &null), Some(1.0));
        assert_eq!(empirical_pvalue(0.5, &[]), None);
    }

    #[test]
    fn test_zero_variance_null_is_non_evaluable() {
        assert_eq!(robust_z(1.0, &[0.0; 20]), None);
        assert_eq!(robust_z(1.0, &[]), None);

        let null = null_of(&[("flat", vec![0.0; 20])]);
        let raw = array![[1.0, -1.0]];
        let rows = evaluate_samples(&strings(&["flat"]), &strings(&["s1", "s2"]), raw.view(), &null).unwrap();
        for row in &rows {
            assert_eq!(row.status, Evaluation::NonEvaluable);
            assert_eq!(row.robust_z, None);
            assert_eq!(row.pvalue, None);
            assert_eq!(row.padj, None);
        }

        let groups = evaluate_groups(&strings(&["flat"]), &rows);
        assert_eq!(groups[0].status, Evaluation::NonEvaluable);
        assert_eq!(groups[0].fdr, None);
    }

    #[test]
    fn test_bonferroni_counts_only_evaluable_tests() {
        let spread: Vec<f64> = (0..19).map(|i| i as f64 - 9.0).collect();
        let null = null_of(&[("A", spread), ("B", vec![1.0; 19])]);
        let raw = array![[50.0, 0.0], [3.0, 4.0]];
        let rows = evaluate_samples(&strings(&["A", "B"]), &strings(&["s1", "s2"]), raw.view(), &null).unwrap();

        // Two evaluable tests: padj = 2 * p
        assert!((rows[0].pvalue.unwrap() - 0.05).abs() < 1e-12);
        assert!((rows[0].padj.unwrap() - 0.1).abs() < 1e-12);
        assert!(rows[2].padj.is_none());
    }

    #[test]
    fn test_group_level_direction_and_fdr() {
        let spread: Vec<f64> = (0..40).map(|i| (i as f64 - 20.0) / 10.0).collect();
        let null = null_of(&[("up", spread.clone()), ("mixed", spread)]);
        let raw = array![[3.0, 3.2, 2.9], [1.0, -1.2, 0.1]];
        let results = evaluate(
            &strings(&["up", "mixed"]),
            &strings(&["s1", "s2", "s3"]),
            raw.view(),
            &null,
            0.05,
        )
        .unwrap();

        let up = &results.group_level[0];
        assert_eq!(up.n, 3);
        assert_eq!(up.direction, Some(Direction::Activated));
        assert!(up.pvalue.unwrap().is_finite());
        assert!(up.fdr.unwrap() >= up.pvalue.unwrap());
        assert!(results.group_level[1].fdr.unwrap() >= results.group_level[1].pvalue.unwrap());
    }
}
