//! Pathway significance result tables

use serde::{Deserialize, Serialize};

use super::csv::{fmt_opt, TsvRecord};

/// Whether a test could be carried out on its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Evaluation {
    Evaluable,
    /// Empty or zero-spread null, or too few z-scores for a t-test
    NonEvaluable,
}

impl Evaluation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Evaluation::Evaluable => "evaluable",
            Evaluation::NonEvaluable => "non-evaluable",
        }
    }
}

/// Direction of a group-level pathway change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Activated,
    Inhibited,
}

impl Direction {
    pub fn from_mean(mean_z: f64) -> Self {
        if mean_z >= 0.0 {
            Direction::Activated
        } else {
            Direction::Inhibited
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Activated => "Activated",
            Direction::Inhibited => "Inhibited",
        }
    }
}

/// One pathway in one treated sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleLevelResult {
    pub pathway: String,
    pub sample: String,
    pub raw_score: f64,
    pub robust_z: Option<f64>,
    pub pvalue: Option<f64>,
    /// Bonferroni-adjusted across every evaluable (pathway, sample) test
    pub padj: Option<f64>,
    pub status: Evaluation,
}

impl SampleLevelResult {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.padj.is_some_and(|p| p < alpha)
    }
}

impl TsvRecord for SampleLevelResult {
    fn header() -> Vec<&'static str> {
        vec!["pathway", "sample", "raw_score", "robust_z", "pvalue", "padj", "status"]
    }

    fn record(&self) -> Vec<String> {
        vec![
            self.pathway.clone(),
            self.sample.clone(),
            fmt_opt(Some(self.raw_score)),
            fmt_opt(self.robust_z),
            fmt_opt(self.pvalue),
            fmt_opt(self.padj),
            self.status.as_str().to_string(),
        ]
    }
}

/// One pathway across all treated samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupLevelResult {
    pub pathway: String,
    /// Number of evaluable sample-level z-scores
    pub n: usize,
    pub mean_z: Option<f64>,
    pub t_stat: Option<f64>,
    pub pvalue: Option<f64>,
    /// Benjamini-Hochberg adjusted across evaluable pathways
    pub fdr: Option<f64>,
    pub direction: Option<Direction>,
    pub status: Evaluation,
}

impl GroupLevelResult {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.fdr.is_some_and(|p| p < alpha)
    }
}

impl TsvRecord for GroupLevelResult {
    fn header() -> Vec<&'static str> {
        vec!["pathway", "n", "mean_z", "t", "pvalue", "fdr", "direction", "status"]
    }

    fn record(&self) -> Vec<String> {
        vec![
            self.pathway.clone(),
            self.n.to_string(),
            fmt_opt(self.mean_z),
            fmt_opt(self.t_stat),
            fmt_opt(self.pvalue),
            fmt_opt(self.fdr),
            self.direction.map_or("NA", |d| d.as_str()).to_string(),
            self.status.as_str().to_string(),
        ]
    }
}

/// Location and spread of one pathway's permuted null
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullSummary {
    pub pathway: String,
    pub n: usize,
    pub median: Option<f64>,
    pub mad: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Every value identical (or no values)
    pub degenerate: bool,
}

impl TsvRecord for NullSummary {
    fn header() -> Vec<&'static str> {
        vec!["pathway", "n", "median", "mad", "min", "max", "degenerate"]
    }

    fn record(&self) -> Vec<String> {
        vec![
            self.pathway.clone(),
            self.n.to_string(),
            fmt_opt(self.median),
            fmt_opt(self.mad),
            fmt_opt(self.min),
            fmt_opt(self.max),
            self.degenerate.to_string(),
        ]
    }
}

/// Complete output of the significance evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathwayResults {
    pub sample_level: Vec<SampleLevelResult>,
    pub group_level: Vec<GroupLevelResult>,
    pub alpha: f64,
}

impl PathwayResults {
    /// Pathways significant at the group level
    pub fn significant_pathways(&self) -> Vec<&GroupLevelResult> {
        self.group_level.iter().filter(|g| g.is_significant(self.alpha)).collect()
    }

    /// Summary statistics
    pub fn summary(&self) -> ResultsSummary {
        let significant = self.significant_pathways();
        ResultsSummary {
            total_pathways: self.group_level.len(),
            pathways_tested: self
                .group_level
                .iter()
                .filter(|g| g.status == Evaluation::Evaluable)
                .count(),
            significant: significant.len(),
            activated: significant
                .iter()
                .filter(|g| g.direction == Some(Direction::Activated))
                .count(),
            inhibited: significant
                .iter()
                .filter(|g| g.direction == Some(Direction::Inhibited))
                .count(),
            sample_tests: self
                .sample_level
                .iter()
                .filter(|s| s.status == Evaluation::Evaluable)
                .count(),
            sample_significant: self
                .sample_level
                .iter()
                .filter(|s| s.is_significant(self.alpha))
                .count(),
            alpha: self.alpha,
        }
    }
}

/// Counts reported at the end of a pathway run
#[derive(Debug, Clone)]
pub struct ResultsSummary {
    pub total_pathways: usize,
    pub pathways_tested: usize,
    pub significant: usize,
    pub activated: usize,
    pub inhibited: usize,
    pub sample_tests: usize,
    pub sample_significant: usize,
    pub alpha: f64,
}

impl std::fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pathway Perturbation Summary")?;
        writeln!(f, "============================")?;
        writeln!(f, "Total pathways: {}", self.total_pathways)?;
        writeln!(f, "Pathways tested: {}", self.pathways_tested)?;
        writeln!(f, "Significant (FDR < {}): {}", self.alpha, self.significant)?;
        writeln!(f, "  Activated: {}", self.activated)?;
        writeln!(f, "  Inhibited: {}", self.inhibited)?;
        writeln!(
            f,
            "Sample-level tests: {} ({} significant after Bonferroni)",
            self.sample_tests, self.sample_significant
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, fdr: Option<f64>, mean_z: f64) -> GroupLevelResult {
        GroupLevelResult {
            pathway: name.to_string(),
            n: 3,
            mean_z: Some(mean_z),
            t_stat: Some(mean_z),
            pvalue: fdr,
            fdr,
            direction: Some(Direction::from_mean(mean_z)),
            status: if fdr.is_some() { Evaluation::Evaluable } else { Evaluation::NonEvaluable },
        }
    }

    #[test]
    fn test_summary_counts() {
        let results = PathwayResults {
            sample_level: vec![],
            group_level: vec![
                group("A", Some(0.01), 2.0),
                group("B", Some(0.02), -1.5),
                group("C", Some(0.5), 0.1),
                group("D", None, 0.0),
            ],
            alpha: 0.05,
        };
        let summary = results.summary();
        assert_eq!(summary.total_pathways, 4);
        assert_eq!(summary.pathways_tested, 3);
        assert_eq!(summary.significant, 2);
        assert_eq!(summary.activated, 1);
        assert_eq!(summary.inhibited, 1);
        assert!(summary.to_string().contains("Significant (FDR < 0.05): 2"));
    }

    #[test]
    fn test_non_evaluable_record_has_no_statistics() {
        let row = SampleLevelResult {
            pathway: "P".to_string(),
            sample: "S1".to_string(),
            raw_score: 0.0,
            robust_z: None,
            pvalue: None,
            padj: None,
            status: Evaluation::NonEvaluable,
        };
        let record = row.record();
        assert_eq!(record[3], "NA");
        assert_eq!(record[6], "non-evaluable");
        assert!(!row.is_significant(0.05));
    }
}
