//! Run configuration
//!
//! One TOML document is read once per invocation, validated, and then passed
//! by reference into every stage. Relative paths are resolved against the
//! directory that holds the configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SspaError};

/// Complete configuration of a QC / pathway run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Suffix appended to every output and cache file name
    pub tag: String,
    /// Sample sheet (CSV or TSV with a `sample` column)
    pub samples: PathBuf,
    /// Sample-sheet columns combined into the composite group label
    #[serde(default)]
    pub analysis: Vec<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(rename = "ref")]
    pub reference: ReferenceConfig,
    #[serde(rename = "featureCounts", default)]
    pub feature_counts: FeatureCountsConfig,
    #[serde(default)]
    pub qc: QcConfig,
    #[serde(default)]
    pub pathways: PathwayConfig,
}

/// Annotation snapshot selectors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceConfig {
    pub species: String,
    pub build: String,
    pub release: u32,
    #[serde(default = "default_annotation_dir")]
    pub annotation_dir: PathBuf,
}

/// Read-counting settings, reported in the QC narrative
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct FeatureCountsConfig {
    /// 0 = unstranded, 1 = stranded, 2 = reversely stranded
    pub strandedness: u8,
    pub frac_overlap: f64,
    pub min_overlap: u32,
    pub min_qual: u32,
    pub extra: String,
}

impl Default for FeatureCountsConfig {
    fn default() -> Self {
        Self {
            strandedness: 0,
            frac_overlap: 0.0,
            min_overlap: 1,
            min_qual: 0,
            extra: String::new(),
        }
    }
}

impl FeatureCountsConfig {
    /// Human-readable strandedness for the report
    pub fn strandedness_label(&self) -> &'static str {
        match self.strandedness {
            0 => "unstranded",
            1 => "stranded",
            _ => "reversely stranded",
        }
    }
}

/// QC report settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QcConfig {
    /// Directory searched recursively for aligner and read-counter logs
    pub log_dir: PathBuf,
    /// Read-counter count matrix
    pub counts: PathBuf,
    pub min_cpm: f64,
    /// Minimum samples above `min_cpm`; defaults to the smallest group size
    pub min_samples: Option<usize>,
    pub prior_count: f64,
    pub n_pcs: usize,
    pub n_bins: usize,
    pub alpha: f64,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("output"),
            counts: PathBuf::from("output/featureCounts/counts.out"),
            min_cpm: 1.0,
            min_samples: None,
            prior_count: 2.0,
            n_pcs: 3,
            n_bins: 10,
            alpha: 0.05,
        }
    }
}

/// Pathway perturbation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathwayConfig {
    /// Pathway edge list (pathway, from, to, weight)
    pub topology: PathBuf,
    /// Optional list of pathway names to retain
    pub allow_list: Option<PathBuf>,
    pub treatment_column: String,
    pub reference_level: String,
    /// Column pairing treated samples with their reference sample(s)
    pub pairing_column: Option<String>,
    /// Requested relabelings; the full enumeration is used when this exceeds it
    pub permutations: u64,
    pub seed: u32,
    pub alpha: f64,
    pub max_depth: usize,
}

impl Default for PathwayConfig {
    fn default() -> Self {
        Self {
            topology: PathBuf::from("refs/topology.tsv"),
            allow_list: None,
            treatment_column: "treatment".to_string(),
            reference_level: "Vehicle".to_string(),
            pairing_column: None,
            permutations: 1000,
            seed: 123,
            alpha: 0.05,
            max_depth: 100,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output/report")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("output/cache")
}

fn default_annotation_dir() -> PathBuf {
    PathBuf::from("refs")
}

impl Config {
    /// Read, resolve and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        Ok(config)
    }

    /// Parse and validate a configuration without touching the filesystem
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Anchor every relative path at `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        anchor(&mut self.samples);
        anchor(&mut self.output_dir);
        anchor(&mut self.cache_dir);
        anchor(&mut self.reference.annotation_dir);
        anchor(&mut self.qc.log_dir);
        anchor(&mut self.qc.counts);
        anchor(&mut self.pathways.topology);
        if let Some(allow) = self.pathways.allow_list.as_mut() {
            anchor(allow);
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(SspaError::InvalidConfig { reason });

        if self.tag.trim().is_empty() {
            return invalid("tag must not be empty".to_string());
        }
        if self.tag.contains(['/', '\\']) {
            return invalid(format!("tag '{}' must not contain path separators", self.tag));
        }
        if self.reference.species.trim().is_empty() || self.reference.build.trim().is_empty() {
            return invalid("ref.species and ref.build must not be empty".to_string());
        }
        if self.feature_counts.strandedness > 2 {
            return invalid(format!(
                "featureCounts.strandedness must be 0, 1 or 2, got {}",
                self.feature_counts.strandedness
            ));
        }
        if !(0.0..=1.0).contains(&self.feature_counts.frac_overlap) {
            return invalid(format!(
                "featureCounts.fracOverlap must lie in [0, 1], got {}",
                self.feature_counts.frac_overlap
            ));
        }
        if self.qc.min_cpm < 0.0 || !self.qc.min_cpm.is_finite() {
            return invalid(format!("qc.min_cpm must be non-negative, got {}", self.qc.min_cpm));
        }
        if self.qc.prior_count <= 0.0 || !self.qc.prior_count.is_finite() {
            return invalid(format!("qc.prior_count must be positive, got {}", self.qc.prior_count));
        }
        if self.qc.n_pcs == 0 {
            return invalid("qc.n_pcs must be at least 1".to_string());
        }
        if self.qc.n_bins < 2 {
            return invalid(format!("qc.n_bins must be at least 2, got {}", self.qc.n_bins));
        }
        for (name, alpha) in [("qc.alpha", self.qc.alpha), ("pathways.alpha", self.pathways.alpha)] {
            if !(alpha > 0.0 && alpha < 1.0) {
                return invalid(format!("{} must lie in (0, 1), got {}", name, alpha));
            }
        }
        if self.pathways.permutations == 0 {
            return invalid("pathways.permutations must be at least 1".to_string());
        }
        if self.pathways.max_depth == 0 {
            return invalid("pathways.max_depth must be at least 1".to_string());
        }
        if self.pathways.reference_level.trim().is_empty() {
            return invalid("pathways.reference_level must not be empty".to_string());
        }
        Ok(())
    }

    /// Output path `{output_dir}/{tag}_{name}`
    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}_{}", self.tag, name))
    }

    /// Cache path `{cache_dir}/{tag}_{name}`
    pub fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}_{}", self.tag, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
tag = "run1"
samples = "config/samples.tsv"
analysis = ["treatment"]

[ref]
species = "Homo sapiens"
build = "GRCh38"
release = 101
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.tag, "run1");
        assert_eq!(config.reference.release, 101);
        assert_eq!(config.pathways.reference_level, "Vehicle");
        assert_eq!(config.qc.n_bins, 10);
        assert_eq!(config.feature_counts.strandedness, 0);
    }

    #[test]
    fn test_feature_counts_keys() {
        let text = format!(
            "{}\n[featureCounts]\nstrandedness = 2\nfracOverlap = 0.5\nminOverlap = 35\nminQual = 10\nextra = \"-M\"\n",
            MINIMAL
        );
        let config = Config::from_toml_str(&text).unwrap();
        assert_eq!(config.feature_counts.strandedness, 2);
        assert_eq!(config.feature_counts.min_overlap, 35);
        assert_eq!(config.feature_counts.strandedness_label(), "reversely stranded");
    }

    #[test]
    fn test_partial_feature_counts_section() {
        let text = format!("{}\n[featureCounts]\nstrandedness = 2\n", MINIMAL);
        let config = Config::from_toml_str(&text).unwrap();
        assert_eq!(config.feature_counts.strandedness, 2);
        assert_eq!(config.feature_counts.min_overlap, 1);
        assert_eq!(config.feature_counts.frac_overlap, 0.0);
        assert!(config.feature_counts.extra.is_empty());
    }

    #[test]
    fn test_invalid_strandedness_rejected() {
        let text = format!(
            "{}\n[featureCounts]\nstrandedness = 3\nfracOverlap = 1.0\nminOverlap = 1\nminQual = 1\nextra = \"\"\n",
            MINIMAL
        );
        assert!(matches!(
            Config::from_toml_str(&text),
            Err(SspaError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let text = format!("{}\n[pathways]\nbogus = 1\n", MINIMAL);
        assert!(Config::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_relative_paths_resolved() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.resolve_paths(Path::new("/data/project"));
        assert_eq!(config.samples, PathBuf::from("/data/project/config/samples.tsv"));
        assert_eq!(
            config.output_path("qc_report.html"),
            PathBuf::from("/data/project/output/report/run1_qc_report.html")
        );
    }
}
