//! Aligner and read-counter log parsing
//!
//! Log files are discovered recursively under the QC log directory. The
//! aligner writes one `Log.final.out` per sample; the read counter writes one
//! `.summary` table per run, with a column per alignment file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::csv::{sample_name_from_path, TsvRecord};
use crate::data::SampleSheet;
use crate::error::{Result, SspaError};

const STAR_LOG_PATTERN: &str = r"Log\.final\.out$";
const SUMMARY_PATTERN: &str = r"\.summary$";

/// Log files found under a directory, sorted by path
#[derive(Debug, Clone, Default)]
pub struct LogFiles {
    pub aligner: Vec<PathBuf>,
    pub counter: Vec<PathBuf>,
}

/// Recursively collect aligner logs and read-counter summaries
pub fn find_logs(dir: &Path) -> Result<LogFiles> {
    let star = Regex::new(STAR_LOG_PATTERN)?;
    let summary = Regex::new(SUMMARY_PATTERN)?;

    let mut files = LogFiles::default();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if star.is_match(&name) {
            files.aligner.push(entry.path().to_path_buf());
        } else if summary.is_match(&name) {
            files.counter.push(entry.path().to_path_buf());
        }
    }
    files.aligner.sort();
    files.counter.sort();

    debug!(
        "Found {} aligner logs and {} read-counter summaries under {}",
        files.aligner.len(),
        files.counter.len(),
        dir.display()
    );
    Ok(files)
}

/// Mapping statistics of one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentStats {
    pub sample: String,
    pub input_reads: u64,
    pub uniquely_mapped_pct: f64,
    pub multi_mapped_pct: f64,
    pub too_many_loci_pct: f64,
    pub unmapped_mismatches_pct: f64,
    pub unmapped_short_pct: f64,
    pub unmapped_other_pct: f64,
}

impl AlignmentStats {
    /// Categories in plotting order with their percentages
    pub fn categories(&self) -> [(&'static str, f64); 6] {
        [
            ("Uniquely mapped", self.uniquely_mapped_pct),
            ("Multi-mapped", self.multi_mapped_pct),
            ("Too many loci", self.too_many_loci_pct),
            ("Unmapped: mismatches", self.unmapped_mismatches_pct),
            ("Unmapped: too short", self.unmapped_short_pct),
            ("Unmapped: other", self.unmapped_other_pct),
        ]
    }
}

impl TsvRecord for AlignmentStats {
    fn header() -> Vec<&'static str> {
        vec![
            "sample",
            "input_reads",
            "uniquely_mapped_pct",
            "multi_mapped_pct",
            "too_many_loci_pct",
            "unmapped_mismatches_pct",
            "unmapped_short_pct",
            "unmapped_other_pct",
        ]
    }

    fn record(&self) -> Vec<String> {
        let mut row = vec![self.sample.clone(), self.input_reads.to_string()];
        row.extend(self.categories().iter().map(|(_, pct)| format!("{:.2}", pct)));
        row
    }
}

/// Sample name of an aligner log: the file name without `Log.final.out`,
/// or the parent directory when the file carries no prefix
fn aligner_sample_name(path: &Path) -> String {
    let file = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = file.strip_suffix("Log.final.out").unwrap_or(&file);
    let stem = stem.trim_end_matches(['.', '_']);
    if !stem.is_empty() {
        return stem.to_string();
    }
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parse_percent(path: &Path, key: &str, value: &str) -> Result<f64> {
    value.trim_end_matches('%').trim().parse::<f64>().map_err(|_| SspaError::LogParse {
        path: path.display().to_string(),
        reason: format!("'{}' is not a percentage for '{}'", value, key),
    })
}

fn log_field<'a>(fields: &HashMap<&str, &'a str>, path: &Path, key: &str) -> Result<&'a str> {
    fields.get(key).copied().ok_or_else(|| SspaError::LogParse {
        path: path.display().to_string(),
        reason: format!("missing field '{}'", key),
    })
}

/// Parse an aligner `Log.final.out`
pub fn parse_star_log(path: &Path) -> Result<AlignmentStats> {
    let text = fs::read_to_string(path)?;
    let fields: HashMap<&str, &str> = text
        .lines()
        .filter_map(|line| line.split_once('|'))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    let pct = |key: &str| -> Result<f64> { parse_percent(path, key, log_field(&fields, path, key)?) };

    let input = log_field(&fields, path, "Number of input reads")?;
    let input_reads = input.parse::<u64>().map_err(|_| SspaError::LogParse {
        path: path.display().to_string(),
        reason: format!("'{}' is not a read count", input),
    })?;

    Ok(AlignmentStats {
        sample: aligner_sample_name(path),
        input_reads,
        uniquely_mapped_pct: pct("Uniquely mapped reads %")?,
        multi_mapped_pct: pct("% of reads mapped to multiple loci")?,
        too_many_loci_pct: pct("% of reads mapped to too many loci")?,
        unmapped_mismatches_pct: pct("% of reads unmapped: too many mismatches")?,
        unmapped_short_pct: pct("% of reads unmapped: too short")?,
        unmapped_other_pct: pct("% of reads unmapped: other")?,
    })
}

/// Read-counter assignment table: categories x samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentSummary {
    pub samples: Vec<String>,
    pub categories: Vec<String>,
    /// `counts[c][s]` is the number of reads of category `c` in sample `s`
    pub counts: Vec<Vec<u64>>,
}

impl AssignmentSummary {
    /// Total reads of each sample
    pub fn totals(&self) -> Vec<u64> {
        (0..self.samples.len())
            .map(|s| self.counts.iter().map(|row| row[s]).sum())
            .collect()
    }

    /// Append the samples of another summary; categories are unioned
    fn merge(&mut self, other: AssignmentSummary) {
        let n_old = self.samples.len();
        for cat in &other.categories {
            if !self.categories.contains(cat) {
                self.categories.push(cat.clone());
                self.counts.push(vec![0; n_old]);
            }
        }
        for row in self.counts.iter_mut() {
            row.extend(std::iter::repeat(0).take(other.samples.len()));
        }
        for (c, cat) in other.categories.iter().enumerate() {
            let target = self.categories.iter().position(|x| x == cat).unwrap_or_default();
            for s in 0..other.samples.len() {
                self.counts[target][n_old + s] = other.counts[c][s];
            }
        }
        self.samples.extend(other.samples);
    }

    /// Remove categories without reads in any sample
    fn drop_empty_categories(&mut self) {
        let keep: Vec<bool> = self.counts.iter().map(|row| row.iter().any(|&c| c > 0)).collect();
        let mut it = keep.iter();
        self.categories.retain(|_| *it.next().unwrap_or(&true));
        let mut it = keep.iter();
        self.counts.retain(|_| *it.next().unwrap_or(&true));
    }

    /// Long-format rows with percentages of each sample's total
    pub fn rows(&self) -> Vec<AssignmentRow> {
        let totals = self.totals();
        let mut rows = Vec::with_capacity(self.samples.len() * self.categories.len());
        for (s, sample) in self.samples.iter().enumerate() {
            for (c, category) in self.categories.iter().enumerate() {
                let count = self.counts[c][s];
                let percent = if totals[s] > 0 {
                    100.0 * count as f64 / totals[s] as f64
                } else {
                    0.0
                };
                rows.push(AssignmentRow {
                    sample: sample.clone(),
                    category: category.clone(),
                    count,
                    percent,
                });
            }
        }
        rows
    }
}

/// One (sample, category) cell of the assignment summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRow {
    pub sample: String,
    pub category: String,
    pub count: u64,
    pub percent: f64,
}

impl TsvRecord for AssignmentRow {
    fn header() -> Vec<&'static str> {
        vec!["sample", "category", "count", "percent"]
    }

    fn record(&self) -> Vec<String> {
        vec![
            self.sample.clone(),
            self.category.clone(),
            self.count.to_string(),
            format!("{:.2}", self.percent),
        ]
    }
}

/// Parse a read-counter `.summary` table
pub fn parse_featurecounts_summary(path: &Path) -> Result<AssignmentSummary> {
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let parse_err = |reason: String| SspaError::LogParse {
        path: path.display().to_string(),
        reason,
    };

    let header = lines.next().ok_or_else(|| parse_err("empty file".to_string()))?;
    let header: Vec<&str> = header.split('\t').collect();
    if header.first() != Some(&"Status") || header.len() < 2 {
        return Err(parse_err("header must start with 'Status' and name at least one sample".to_string()));
    }

    let mut summary = AssignmentSummary {
        samples: header[1..].iter().map(|h| sample_name_from_path(h)).collect(),
        ..Default::default()
    };

    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != header.len() {
            return Err(parse_err(format!("row '{}' has {} columns, expected {}", fields[0], fields.len(), header.len())));
        }
        let counts = fields[1..]
            .iter()
            .map(|v| v.trim().parse::<u64>().map_err(|_| parse_err(format!("'{}' is not a read count", v))))
            .collect::<Result<Vec<u64>>>()?;
        summary.categories.push(fields[0].to_string());
        summary.counts.push(counts);
    }

    if !summary.categories.iter().any(|c| c == "Assigned") {
        return Err(parse_err("no 'Assigned' row".to_string()));
    }
    Ok(summary)
}

/// Alignment and assignment tables restricted to sheet samples
#[derive(Debug, Clone, Default)]
pub struct AlignmentReport {
    /// Aligner statistics in sample sheet order
    pub alignment: Vec<AlignmentStats>,
    /// Read-counter categories; empty categories removed
    pub assignment: AssignmentSummary,
}

/// Parse every log under `log_dir` and join the results to the sample sheet
///
/// Samples that are not in the sheet are reported and left out.
pub fn summarize_alignments(log_dir: &Path, sheet: &SampleSheet) -> Result<AlignmentReport> {
    let files = find_logs(log_dir)?;
    if files.aligner.is_empty() {
        warn!("No aligner logs found under {}", log_dir.display());
    }
    if files.counter.is_empty() {
        warn!("No read-counter summaries found under {}", log_dir.display());
    }

    let mut alignment = Vec::with_capacity(files.aligner.len());
    for path in &files.aligner {
        let stats = parse_star_log(path)?;
        if sheet.sample_index(&stats.sample).is_none() {
            warn!("Aligner log {} belongs to sample '{}' not in the sample sheet", path.display(), stats.sample);
            continue;
        }
        alignment.push(stats);
    }
    alignment.sort_by_key(|s| sheet.sample_index(&s.sample));

    let mut merged = AssignmentSummary::default();
    for path in &files.counter {
        merged.merge(parse_featurecounts_summary(path)?);
    }

    let mut keep: Vec<usize> = Vec::new();
    for (i, sample) in merged.samples.iter().enumerate() {
        if sheet.sample_index(sample).is_some() {
            keep.push(i);
        } else {
            warn!("Read-counter sample '{}' not in the sample sheet", sample);
        }
    }
    keep.sort_by_key(|&i| sheet.sample_index(&merged.samples[i]));

    let mut assignment = AssignmentSummary {
        samples: keep.iter().map(|&i| merged.samples[i].clone()).collect(),
        categories: merged.categories.clone(),
        counts: merged
            .counts
            .iter()
            .map(|row| keep.iter().map(|&i| row[i]).collect())
            .collect(),
    };
    assignment.drop_empty_categories();

    info!(
        "Summarized alignment of {} samples and read assignment of {} samples",
        alignment.len(),
        assignment.samples.len()
    );
    Ok(AlignmentReport { alignment, assignment })
}
