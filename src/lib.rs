//! rust_sspa: RNA-seq quality control and single-sample pathway perturbation
//!
//! Two batch analyses over one RNA-seq dataset:
//!
//! * QC: alignment and read-assignment rates, library sizes, logCPM PCA and a
//!   GC-content / gene-length bias grid of the principal components.
//! * Pathways: weighted single-sample fold changes propagated through pathway
//!   topologies, compared with a permutation null by robust z-scores at the
//!   sample level and a one-sample t-test at the group level.
//!
//! # Example
//!
//! ```ignore
//! use rust_sspa::prelude::*;
//!
//! let config = Config::from_file("config/sspa.toml")?;
//! let qc = run_qc(&config, false)?;
//! println!("{}", qc);
//!
//! let results = run_pathways(&config, false)?;
//! println!("{}", results.summary());
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod normalization;
pub mod pathway;
pub mod permutation;
pub mod qc;
pub mod report;
pub mod rng;
pub mod stats;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::data::{load_annotation, AnnotationSet, CountMatrix, Design, SampleSheet};
    pub use crate::error::{Result, SspaError};
    pub use crate::io::{read_featurecounts, read_sample_sheet, summarize_alignments, write_tsv, PathwayResults};
    pub use crate::normalization::{log_cpm, ExpressionSet};
    pub use crate::pathway::{build_models, load_topologies, raw_perturbation_scores, PathwayModel};
    pub use crate::permutation::{generate_null, permutation_bound, PermutedScores};
    pub use crate::qc::{bias_grid, run_pca, PcaResult};
    pub use crate::testing::{benjamini_hochberg, bonferroni, evaluate};
    pub use crate::{run_pathways, run_qc, PreparedExpression, QcSummary};
}

use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use prelude::*;
use qc::{library_stats, LibraryStats};
use report::{write_report, PathwayOverview, PathwayReport, QcReport};

/// Filtered expression plus the library statistics of the unfiltered counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedExpression {
    pub expression: ExpressionSet,
    pub libraries: Vec<LibraryStats>,
}

/// Annotation of the configured reference, reused from the cache when present
fn annotation(config: &Config, force: bool) -> Result<AnnotationSet> {
    let path = config.cache_path(cache::ANNOTATION);
    let annotation = cache::load_or_compute(&path, force, || {
        data::load_annotation(&config.reference, config.qc.n_bins)
    })?;
    if annotation.n_bins == config.qc.n_bins {
        return Ok(annotation);
    }
    warn!(
        "Cached annotation uses {} bins, configuration asks for {}; recomputing",
        annotation.n_bins, config.qc.n_bins
    );
    cache::load_or_compute(&path, true, || data::load_annotation(&config.reference, config.qc.n_bins))
}

/// Read the count matrix, restrict it to sheet samples in sheet order and filter
fn build_expression(config: &Config, sheet: &SampleSheet) -> Result<PreparedExpression> {
    let raw = read_featurecounts(&config.qc.counts)?;
    info!(
        "Read {} genes x {} samples from {}",
        raw.n_genes(),
        raw.n_samples(),
        config.qc.counts.display()
    );

    for sample in raw.sample_ids() {
        if sheet.sample_index(sample).is_none() {
            warn!("Count column '{}' not in the sample sheet; dropped", sample);
        }
    }
    let mut sheet_rows = Vec::new();
    let mut count_cols = Vec::new();
    for (i, sample) in sheet.sample_ids().iter().enumerate() {
        match raw.sample_index(sample) {
            Some(col) => {
                sheet_rows.push(i);
                count_cols.push(col);
            }
            None => warn!("Sample '{}' has no counts; left out", sample),
        }
    }
    if count_cols.is_empty() {
        return Err(SspaError::EmptyData {
            reason: "No sample of the sheet appears in the count matrix".to_string(),
        });
    }

    let raw = raw.subset_samples(&count_cols)?;
    let sheet = sheet.subset(&sheet_rows)?;
    let groups = sheet.group_labels(&config.analysis)?;
    let libraries = library_stats(&raw, &groups)?;

    let min_samples = match config.qc.min_samples {
        Some(n) => n,
        None => sheet
            .group_sizes(&config.analysis)?
            .values()
            .copied()
            .min()
            .unwrap_or(1),
    };
    let expression = ExpressionSet::build(&raw, config.qc.min_cpm, min_samples, config.qc.prior_count)?;
    if expression.counts.n_genes() == 0 {
        return Err(SspaError::EmptyData {
            reason: "No gene passes the expression filter".to_string(),
        });
    }
    Ok(PreparedExpression { expression, libraries })
}

fn prepared_expression(config: &Config, sheet: &SampleSheet, force: bool) -> Result<PreparedExpression> {
    cache::load_or_compute(&config.cache_path(cache::EXPRESSION), force, || {
        build_expression(config, sheet)
    })
}

/// Counts reported at the end of a QC run
#[derive(Debug, Clone)]
pub struct QcSummary {
    pub samples: usize,
    pub aligner_logs: usize,
    pub input_genes: usize,
    pub zero_total_genes: usize,
    pub kept_genes: usize,
    pub components: usize,
    pub tested_cells: usize,
    pub significant_cells: usize,
    pub alpha: f64,
}

impl fmt::Display for QcSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RNA-seq QC Summary")?;
        writeln!(f, "==================")?;
        writeln!(f, "Samples: {} ({} aligner logs)", self.samples, self.aligner_logs)?;
        writeln!(
            f,
            "Genes: {} kept of {} ({} without reads)",
            self.kept_genes, self.input_genes, self.zero_total_genes
        )?;
        writeln!(f, "Principal components: {}", self.components)?;
        writeln!(
            f,
            "Bias cells tested: {} ({} significant at adjusted p < {})",
            self.tested_cells, self.significant_cells, self.alpha
        )?;
        Ok(())
    }
}

/// Run the QC report: alignment summary, expression, PCA and bias grid
pub fn run_qc(config: &Config, force: bool) -> Result<QcSummary> {
    // Step 1: Sample sheet and annotation
    let sheet = read_sample_sheet(&config.samples)?;
    info!("Sample sheet lists {} samples", sheet.n_samples());
    let annotation = annotation(config, force)?;

    // Step 2: Aligner and read-counter logs
    let alignment = summarize_alignments(&config.qc.log_dir, &sheet)?;

    // Step 3: Expression matrix and PCA
    let prepared = prepared_expression(config, &sheet, force)?;
    let expression = &prepared.expression;
    let pca = run_pca(
        expression.log_cpm.view(),
        expression.gene_ids(),
        expression.sample_ids(),
        config.qc.n_pcs,
    )?;

    // Step 4: GC / length bias of the components
    let bias = bias_grid(&pca, &annotation, config.qc.alpha)?;

    write_tsv(config.output_path("alignment_summary.tsv"), &alignment.alignment)?;
    write_tsv(config.output_path("assignment_summary.tsv"), &alignment.assignment.rows())?;
    write_tsv(config.output_path("library_sizes.tsv"), &prepared.libraries)?;
    write_tsv(config.output_path("pca_scores.tsv"), &pca.score_rows())?;
    write_tsv(config.output_path("bias_grid.tsv"), &bias)?;

    let groups: Vec<String> = prepared.libraries.iter().map(|l| l.group.clone()).collect();
    let html = QcReport {
        config,
        snapshot: &annotation.snapshot,
        alignment: &alignment,
        libraries: &prepared.libraries,
        filter: &expression.filter,
        pca: &pca,
        groups: &groups,
        bias: &bias,
    }
    .render()?;
    write_report(&config.output_path("qc_report.html"), &html)?;

    Ok(QcSummary {
        samples: expression.sample_ids().len(),
        aligner_logs: alignment.alignment.len(),
        input_genes: expression.filter.input_genes,
        zero_total_genes: expression.filter.zero_total,
        kept_genes: expression.filter.kept,
        components: pca.n_components(),
        tested_cells: bias.iter().filter(|c| c.pvalue.is_some()).count(),
        significant_cells: bias.iter().filter(|c| c.significant).count(),
        alpha: config.qc.alpha,
    })
}

/// Stored null when it covers every pathway, otherwise a freshly generated one
fn permuted_scores<F>(config: &Config, models: &[PathwayModel], force: bool, generate: F) -> Result<PermutedScores>
where
    F: FnOnce() -> Result<PermutedScores>,
{
    let path = config.cache_path(cache::PERMUTED_SCORES);
    let settings = &config.pathways;
    let stored: Option<PermutedScores> = if force { None } else { cache::read_json(&path)? };

    if let Some(null) = stored {
        if models.iter().all(|m| null.scores.contains_key(&m.name)) {
            if !null.matches(settings.seed, settings.permutations) {
                warn!(
                    "Stored null was generated with seed {} and {} permutations, configuration asks for \
                     seed {} and {}; reusing it (invalidate the cache to regenerate)",
                    null.seed, null.requested, settings.seed, settings.permutations
                );
            }
            info!("Reusing cached {}", path.display());
            return Ok(null);
        }
        warn!("Stored null does not cover every pathway; regenerating");
    }

    let null = generate()?;
    cache::write_atomic(&path, &null)?;
    Ok(null)
}

/// Run the pathway report: perturbation scores, permutation null and tests
pub fn run_pathways(config: &Config, force: bool) -> Result<PathwayResults> {
    let settings = &config.pathways;

    // Step 1: Inputs shared with the QC report
    let sheet = read_sample_sheet(&config.samples)?;
    let annotation = annotation(config, force)?;
    let prepared = prepared_expression(config, &sheet, force)?;
    let expression = &prepared.expression;

    // Step 2: Design in expression sample order
    let design = Design::from_sheet(&sheet, settings)?.aligned_to(expression.sample_ids())?;
    let treated: Vec<String> = design
        .treated_indices()
        .iter()
        .map(|&i| design.sample_ids()[i].clone())
        .collect();
    let reference_size = design.reference_set_size();
    info!(
        "{} treated samples against {} reference sample(s) each ({})",
        treated.len(),
        reference_size,
        if design.is_paired() { "paired" } else { "unpaired" }
    );

    // Step 3: Weighted single-sample fold changes
    let ssfc = pathway::single_sample_fc(expression.log_cpm.view(), &design)?;
    let weights = pathway::gene_weights(&expression.mean_log_cpm(), ssfc.view())?;
    let weighted = pathway::weighted_fc(ssfc.view(), &weights)?;

    // Step 4: Topologies and raw scores
    let topologies = load_topologies(settings)?;
    let rows = pathway::entrez_rows(expression.gene_ids(), &annotation);
    let models = build_models(&topologies, &rows, settings.max_depth);
    let raw = raw_perturbation_scores(&models, weighted.view())?;

    // Step 5: Permutation null
    let null = permuted_scores(config, &models, force, || {
        generate_null(
            expression.log_cpm.view(),
            &weights,
            &models,
            reference_size,
            settings.permutations,
            settings.seed,
        )
    })?;

    // Step 6: Sample- and group-level significance
    let names: Vec<String> = models.iter().map(|m| m.name.clone()).collect();
    let results = evaluate(&names, &treated, raw.view(), &null, settings.alpha)?;

    write_tsv(config.output_path("sample_level.tsv"), &results.sample_level)?;
    write_tsv(config.output_path("group_level.tsv"), &results.group_level)?;
    write_tsv(config.output_path("null_summary.tsv"), &null.summaries())?;

    let overview: Vec<PathwayOverview> = models
        .iter()
        .map(|m| PathwayOverview {
            pathway: m.name.clone(),
            nodes: m.n_nodes(),
            measured_nodes: m.n_measured(),
        })
        .collect();
    let html = PathwayReport {
        config,
        treated: &treated,
        reference_size,
        paired: design.is_paired(),
        dropped_genes: expression.gene_ids().len().saturating_sub(rows.len()),
        pathways: &overview,
        null: &null,
        results: &results,
    }
    .render()?;
    write_report(&config.output_path("pathway_report.html"), &html)?;

    Ok(results)
}
