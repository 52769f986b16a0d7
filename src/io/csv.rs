//! Delimited-file reading and writing
//!
//! Readers for the count matrix, sample sheet, annotation snapshot, pathway
//! edge list and allow-list, plus a generic TSV writer for result tables.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use ndarray::Array2;
use serde::Deserialize;

use crate::data::{CountMatrix, SampleSheet, TranscriptRecord};
use crate::error::{Result, SspaError};

/// Columns the read counter writes between `Geneid` and the samples
const AUX_COLUMNS: [&str; 5] = ["Chr", "Start", "End", "Strand", "Length"];

/// Strip surrounding quotes from a string
fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\''))) {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn detect_delimiter(line: &str) -> u8 {
    if line.contains('\t') {
        b'\t'
    } else {
        b','
    }
}

/// Sample name from an alignment path as written by the read counter
///
/// `/out/star/S1Aligned.sortedByCoord.out.bam` -> `S1`
pub fn sample_name_from_path(path: &str) -> String {
    let base = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let base = base.strip_suffix(".bam").unwrap_or(base);
    let base = base.strip_suffix("Aligned.sortedByCoord.out").unwrap_or(base);
    base.trim_end_matches(['.', '_']).to_string()
}

/// Read a count matrix written by the read counter
///
/// Lines starting with `#` are skipped. The first column holds gene IDs; any
/// of the auxiliary columns `Chr Start End Strand Length` that follow it are
/// dropped. Remaining header fields are alignment paths (or plain sample
/// names) and are turned into sample names. Tab or comma delimited.
pub fn read_featurecounts<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader
        .lines()
        .filter(|l| l.as_ref().map_or(true, |s| !s.starts_with('#') && !s.trim().is_empty()));

    let header_line = lines.next().ok_or_else(|| SspaError::EmptyData {
        reason: format!("Count file {} is empty", path.display()),
    })??;

    let delimiter = detect_delimiter(&header_line) as char;
    let header: Vec<String> = header_line.split(delimiter).map(strip_quotes).collect();

    let n_aux = header[1..]
        .iter()
        .take_while(|h| AUX_COLUMNS.contains(&h.as_str()))
        .count();
    let first_sample = 1 + n_aux;
    if header.len() <= first_sample {
        return Err(SspaError::InvalidCountMatrix {
            reason: "No sample columns in count file header".to_string(),
        });
    }

    let sample_ids: Vec<String> = header[first_sample..]
        .iter()
        .map(|h| sample_name_from_path(h))
        .collect();
    let n_samples = sample_ids.len();

    let mut gene_ids: Vec<String> = Vec::new();
    let mut values: Vec<f64> = Vec::new();

    for (line_no, line) in lines.enumerate() {
        let line = line?;
        let fields: Vec<&str> = line.split(delimiter).collect();
        if fields.len() != header.len() {
            return Err(SspaError::InvalidCountMatrix {
                reason: format!(
                    "Data row {} has {} columns, expected {}",
                    line_no + 1,
                    fields.len(),
                    header.len()
                ),
            });
        }

        gene_ids.push(strip_quotes(fields[0]));

        for s in &fields[first_sample..] {
            let val = strip_quotes(s);
            let count = val.parse::<f64>().map_err(|_| SspaError::InvalidCountMatrix {
                reason: format!("Invalid count value '{}' for gene {}", val, fields[0]),
            })?;
            values.push(count);
        }
    }

    if gene_ids.is_empty() {
        return Err(SspaError::EmptyData {
            reason: "No genes found in count matrix".to_string(),
        });
    }

    let counts = Array2::from_shape_vec((gene_ids.len(), n_samples), values).map_err(|e| {
        SspaError::InvalidCountMatrix {
            reason: e.to_string(),
        }
    })?;

    CountMatrix::new(counts, gene_ids, sample_ids)
}

/// Read the sample sheet; it must have a `sample` column
pub fn read_sample_sheet<P: AsRef<Path>>(path: P) -> Result<SampleSheet> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| SspaError::InvalidSampleSheet {
        reason: format!("Cannot read {}: {}", path.display(), e),
    })?;
    let first_line = text.lines().next().unwrap_or_default();

    let mut reader = ReaderBuilder::new()
        .delimiter(detect_delimiter(first_line))
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(strip_quotes).collect();
    let sample_col = headers
        .iter()
        .position(|h| h == "sample")
        .ok_or_else(|| SspaError::InvalidSampleSheet {
            reason: format!("{} has no 'sample' column", path.display()),
        })?;

    let mut sample_ids = Vec::new();
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(SspaError::InvalidSampleSheet {
                reason: format!("Row has {} columns, expected {}", record.len(), headers.len()),
            });
        }
        for (i, field) in record.iter().enumerate() {
            columns[i].push(strip_quotes(field));
        }
        sample_ids.push(strip_quotes(&record[sample_col]));
    }

    let mut sheet = SampleSheet::new(sample_ids)?;
    for (i, name) in headers.iter().enumerate() {
        if i != sample_col {
            sheet.add_column(name, std::mem::take(&mut columns[i]))?;
        }
    }
    Ok(sheet)
}

/// Read the transcript table of an annotation snapshot
pub fn read_annotation_snapshot<P: AsRef<Path>>(path: P) -> Result<Vec<TranscriptRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .from_path(path)?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<TranscriptRecord>, _>>()
        .map_err(SspaError::from)
}

/// One directed edge of a pathway topology file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopologyEdge {
    pub pathway: String,
    pub from: String,
    /// `-` declares `from` as an isolated node
    pub to: String,
    pub weight: f64,
}

/// Read a pathway edge list (`pathway from to weight`)
pub fn read_topology<P: AsRef<Path>>(path: P) -> Result<Vec<TopologyEdge>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(path)?;
    let edges = reader
        .deserialize()
        .collect::<std::result::Result<Vec<TopologyEdge>, _>>()?;
    if edges.is_empty() {
        return Err(SspaError::InvalidTopology {
            reason: format!("{} contains no edges", path.display()),
        });
    }
    if let Some(bad) = edges.iter().find(|e| !e.weight.is_finite()) {
        return Err(SspaError::InvalidTopology {
            reason: format!("Non-finite weight on {} -> {} in {}", bad.from, bad.to, bad.pathway),
        });
    }
    Ok(edges)
}

/// Read a pathway allow-list: one name per line, `#` starts a comment
pub fn read_allow_list<P: AsRef<Path>>(path: P) -> Result<HashSet<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(|l| l.split('#').next().unwrap_or_default().trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// A row type that can be written as one line of a TSV table
pub trait TsvRecord {
    fn header() -> Vec<&'static str>;
    fn record(&self) -> Vec<String>;
}

/// Format an optional statistic, `NA` when absent or not finite
pub fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.6e}", v),
        _ => "NA".to_string(),
    }
}

/// Write rows as a tab-separated table with a header line
pub fn write_tsv<P: AsRef<Path>, T: TsvRecord>(path: P, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record(T::header())?;
    for row in rows {
        writer.write_record(row.record())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sample_name_from_path() {
        assert_eq!(sample_name_from_path("/out/star/S1Aligned.sortedByCoord.out.bam"), "S1");
        assert_eq!(sample_name_from_path("bam/S2.bam"), "S2");
        assert_eq!(sample_name_from_path("S3"), "S3");
    }

    #[test]
    fn test_read_featurecounts_drops_aux_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# Program:featureCounts v2.0.1").unwrap();
        writeln!(file, "Geneid\tChr\tStart\tEnd\tStrand\tLength\tstar/S1Aligned.sortedByCoord.out.bam\tstar/S2Aligned.sortedByCoord.out.bam").unwrap();
        writeln!(file, "ENSG1\tchr1\t1\t100\t+\t100\t10\t20").unwrap();
        writeln!(file, "ENSG2\tchr1;chr1\t5;50\t40;90\t-;-\t75\t0\t0").unwrap();

        let matrix = read_featurecounts(file.path()).unwrap();
        assert_eq!(matrix.sample_ids(), &["S1".to_string(), "S2".to_string()]);
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.library_sizes(), vec![10.0, 20.0]);
    }

    #[test]
    fn test_read_featurecounts_plain_matrix() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2\ts3").unwrap();
        writeln!(file, "gene1\t100\t200\t150").unwrap();
        writeln!(file, "gene2\t50\t75\t60").unwrap();

        let matrix = read_featurecounts(file.path()).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
    }

    #[test]
    fn test_read_featurecounts_rejects_ragged_rows() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2").unwrap();
        writeln!(file, "gene1\t100").unwrap();
        assert!(matches!(
            read_featurecounts(file.path()),
            Err(SspaError::InvalidCountMatrix { .. })
        ));
    }

    #[test]
    fn test_read_featurecounts_rejects_text_counts() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1").unwrap();
        writeln!(file, "gene1\tmany").unwrap();
        assert!(read_featurecounts(file.path()).is_err());
    }

    #[test]
    fn test_read_sample_sheet() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample\ttreatment\tpatient").unwrap();
        writeln!(file, "S1\tVehicle\tP1").unwrap();
        writeln!(file, "S2\tDHT\tP1").unwrap();

        let sheet = read_sample_sheet(file.path()).unwrap();
        assert_eq!(sheet.n_samples(), 2);
        assert_eq!(sheet.column("treatment").unwrap()[1], "DHT");
        assert_eq!(sheet.column_names(), &["treatment".to_string(), "patient".to_string()]);
    }

    #[test]
    fn test_sample_sheet_without_sample_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id,treatment").unwrap();
        writeln!(file, "S1,Vehicle").unwrap();
        assert!(matches!(
            read_sample_sheet(file.path()),
            Err(SspaError::InvalidSampleSheet { .. })
        ));
    }

    #[test]
    fn test_unreadable_sample_sheet() {
        assert!(matches!(
            read_sample_sheet("/nonexistent/samples.tsv"),
            Err(SspaError::InvalidSampleSheet { .. })
        ));
    }

    #[test]
    fn test_read_topology_and_allow_list() {
        let mut topo = NamedTempFile::new().unwrap();
        writeln!(topo, "pathway\tfrom\tto\tweight").unwrap();
        writeln!(topo, "Wnt\t1\t2\t1").unwrap();
        writeln!(topo, "Wnt\t2\t3\t-1").unwrap();
        let edges = read_topology(topo.path()).unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[1].weight, -1.0);

        let mut allow = NamedTempFile::new().unwrap();
        writeln!(allow, "# curated").unwrap();
        writeln!(allow, "Wnt  # signalling").unwrap();
        writeln!(allow).unwrap();
        let names = read_allow_list(allow.path()).unwrap();
        assert_eq!(names.len(), 1);
        assert!(names.contains("Wnt"));
    }

    #[test]
    fn test_read_annotation_snapshot() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\tgene_name\tentrez_id\ttranscript_id\ttranscript_length\tgc_content").unwrap();
        writeln!(file, "ENSG1\tA\t100\tENST1\t1500\t45.2").unwrap();
        writeln!(file, "ENSG2\tB\t\tENST2\t800\t51.0").unwrap();
        let records = read_annotation_snapshot(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].entrez_id.as_deref(), Some("100"));
        assert_eq!(records[1].entrez_id, None);
    }
}
