//! Gene-level annotation: GC content, length and their decile bins
//!
//! Transcript records from a versioned annotation snapshot are collapsed to
//! genes and binned into equal-frequency classes for the bias diagnostic.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::ReferenceConfig;
use crate::error::{Result, SspaError};
use crate::io::read_annotation_snapshot;
use crate::stats::ntile;

/// One transcript row of an annotation snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub gene_id: String,
    pub gene_name: String,
    pub entrez_id: Option<String>,
    pub transcript_id: String,
    pub transcript_length: f64,
    /// GC content as a fraction or a percentage
    pub gc_content: f64,
}

/// Gene-level annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneAnnotation {
    pub gene_id: String,
    pub gene_name: String,
    pub entrez_id: Option<String>,
    /// GC content as a fraction in [0, 1]
    pub gc_content: f64,
    /// Mean transcript length (bp)
    pub length: f64,
    pub gc_bin: usize,
    pub length_bin: usize,
}

/// Annotation of every gene in one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationSet {
    /// File name of the snapshot the genes were derived from
    pub snapshot: String,
    pub n_bins: usize,
    pub genes: Vec<GeneAnnotation>,
}

impl AnnotationSet {
    /// Lookup table gene ID -> annotation
    pub fn index(&self) -> HashMap<&str, &GeneAnnotation> {
        self.genes.iter().map(|g| (g.gene_id.as_str(), g)).collect()
    }

    /// Lookup table gene ID -> Entrez ID, for genes that have one
    pub fn entrez_map(&self) -> HashMap<&str, &str> {
        self.genes
            .iter()
            .filter_map(|g| g.entrez_id.as_deref().map(|e| (g.gene_id.as_str(), e)))
            .collect()
    }
}

/// Lower-case species name with spaces replaced by underscores
pub fn species_slug(species: &str) -> String {
    species.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("_")
}

/// File name prefix identifying a snapshot: `{species}.{build}.{release}.`
pub fn snapshot_prefix(reference: &ReferenceConfig) -> String {
    format!(
        "{}.{}.{}.",
        species_slug(&reference.species),
        reference.build,
        reference.release
    )
}

/// Find the single snapshot in `dir` matching the configured reference
///
/// Zero or several matches abort the run.
pub fn locate_snapshot(dir: &Path, reference: &ReferenceConfig) -> Result<PathBuf> {
    let prefix = snapshot_prefix(reference);
    let mut matches: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();

    if matches.len() != 1 {
        return Err(SspaError::AnnotationSnapshot {
            pattern: format!("{}*", prefix),
            dir: dir.display().to_string(),
            found: matches.len(),
        });
    }
    Ok(matches.remove(0))
}

/// Locate, read and aggregate the configured annotation snapshot
pub fn load_annotation(reference: &ReferenceConfig, n_bins: usize) -> Result<AnnotationSet> {
    let path = locate_snapshot(&reference.annotation_dir, reference)?;
    info!("Loading annotation snapshot {}", path.display());
    let transcripts = read_annotation_snapshot(&path)?;
    let genes = aggregate_genes(&transcripts, n_bins)?;
    info!("Annotated {} genes from {} transcripts", genes.len(), transcripts.len());
    Ok(AnnotationSet {
        snapshot: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        n_bins,
        genes,
    })
}

/// Collapse transcripts to genes and assign GC / length bins
///
/// Gene GC is the transcript-length-weighted mean GC, gene length the mean
/// transcript length. Genes keep the order of their first transcript.
pub fn aggregate_genes(transcripts: &[TranscriptRecord], n_bins: usize) -> Result<Vec<GeneAnnotation>> {
    if transcripts.is_empty() {
        return Err(SspaError::EmptyData {
            reason: "Annotation snapshot lists no transcripts".to_string(),
        });
    }

    struct Accumulator {
        gene_name: String,
        entrez_id: Option<String>,
        gc_weighted: f64,
        total_length: f64,
        n: usize,
    }

    let mut order: Vec<String> = Vec::new();
    let mut acc: HashMap<String, Accumulator> = HashMap::new();

    for tx in transcripts {
        if !(tx.transcript_length > 0.0) {
            return Err(SspaError::InvalidAnnotation {
                reason: format!("Transcript '{}' has non-positive length", tx.transcript_id),
            });
        }
        let gc = if tx.gc_content > 1.0 { tx.gc_content / 100.0 } else { tx.gc_content };
        if !(0.0..=1.0).contains(&gc) {
            return Err(SspaError::InvalidAnnotation {
                reason: format!("Transcript '{}' has GC content {}", tx.transcript_id, tx.gc_content),
            });
        }

        let entrez = tx
            .entrez_id
            .as_deref()
            .and_then(|e| e.split(';').map(str::trim).find(|s| !s.is_empty() && *s != "NA"))
            .map(str::to_string);

        let entry = acc.entry(tx.gene_id.clone()).or_insert_with(|| {
            order.push(tx.gene_id.clone());
            Accumulator {
                gene_name: tx.gene_name.clone(),
                entrez_id: None,
                gc_weighted: 0.0,
                total_length: 0.0,
                n: 0,
            }
        });
        if entry.entrez_id.is_none() {
            entry.entrez_id = entrez;
        }
        entry.gc_weighted += gc * tx.transcript_length;
        entry.total_length += tx.transcript_length;
        entry.n += 1;
    }

    let mut genes: Vec<GeneAnnotation> = order
        .into_iter()
        .map(|gene_id| {
            let a = &acc[&gene_id];
            GeneAnnotation {
                gene_name: a.gene_name.clone(),
                entrez_id: a.entrez_id.clone(),
                gc_content: a.gc_weighted / a.total_length,
                length: a.total_length / a.n as f64,
                gc_bin: 0,
                length_bin: 0,
                gene_id,
            }
        })
        .collect();

    assign_bins(&mut genes, n_bins);
    Ok(genes)
}

/// Equal-frequency GC and length bins, 1-based
pub fn assign_bins(genes: &mut [GeneAnnotation], n_bins: usize) {
    let gc: Vec<f64> = genes.iter().map(|g| g.gc_content).collect();
    let len: Vec<f64> = genes.iter().map(|g| g.length).collect();
    let gc_bins = ntile(&gc, n_bins);
    let len_bins = ntile(&len, n_bins);
    for (g, (gb, lb)) in genes.iter_mut().zip(gc_bins.into_iter().zip(len_bins)) {
        g.gc_bin = gb;
        g.length_bin = lb;
    }
}
