//! Per-sample library statistics

use serde::{Deserialize, Serialize};

use crate::data::CountMatrix;
use crate::error::{Result, SspaError};
use crate::io::TsvRecord;

/// Library size and detected genes of one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryStats {
    pub sample: String,
    pub group: String,
    /// Total assigned reads
    pub library_size: f64,
    /// Genes with at least one read
    pub detected_genes: usize,
}

impl TsvRecord for LibraryStats {
    fn header() -> Vec<&'static str> {
        vec!["sample", "group", "library_size", "detected_genes"]
    }

    fn record(&self) -> Vec<String> {
        vec![
            self.sample.clone(),
            self.group.clone(),
            format!("{:.0}", self.library_size),
            self.detected_genes.to_string(),
        ]
    }
}

/// Library statistics of the unfiltered count matrix
///
/// `groups` holds the composite group label of each sample in matrix order.
pub fn library_stats(counts: &CountMatrix, groups: &[String]) -> Result<Vec<LibraryStats>> {
    if groups.len() != counts.n_samples() {
        return Err(SspaError::DimensionMismatch {
            expected: format!("{} group labels", counts.n_samples()),
            got: format!("{}", groups.len()),
        });
    }
    Ok(counts
        .sample_ids()
        .iter()
        .zip(groups)
        .zip(counts.library_sizes())
        .zip(counts.detected_genes())
        .map(|(((sample, group), library_size), detected_genes)| LibraryStats {
            sample: sample.clone(),
            group: group.clone(),
            library_size,
            detected_genes,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_library_stats() {
        let counts = CountMatrix::new(
            array![[10.0, 0.0], [5.0, 3.0], [0.0, 0.0]],
            vec!["g1".into(), "g2".into(), "g3".into()],
            vec!["s1".into(), "s2".into()],
        )
        .unwrap();
        let stats = library_stats(&counts, &["A".to_string(), "B".to_string()]).unwrap();
        assert_eq!(stats[0].library_size, 15.0);
        assert_eq!(stats[0].detected_genes, 2);
        assert_eq!(stats[1].library_size, 3.0);
        assert_eq!(stats[1].detected_genes, 1);
        assert_eq!(stats[1].record()[2], "3");

        assert!(library_stats(&counts, &["A".to_string()]).is_err());
    }
}
