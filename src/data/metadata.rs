//! Sample sheet and treatment design

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::PathwayConfig;
use crate::error::{Result, SspaError};

/// Sample sheet: one row per sample, every column a categorical factor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSheet {
    /// Sample identifiers (the `sample` column)
    sample_ids: Vec<String>,
    /// Column names in file order, excluding `sample`
    column_names: Vec<String>,
    /// Column name -> values for each sample
    columns: HashMap<String, Vec<String>>,
}

impl SampleSheet {
    /// Create a sample sheet; sample IDs must be unique and non-empty
    pub fn new(sample_ids: Vec<String>) -> Result<Self> {
        if sample_ids.is_empty() {
            return Err(SspaError::InvalidSampleSheet {
                reason: "No samples listed".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for id in &sample_ids {
            if id.is_empty() {
                return Err(SspaError::InvalidSampleSheet {
                    reason: "Empty sample ID".to_string(),
                });
            }
            if !seen.insert(id) {
                return Err(SspaError::InvalidSampleSheet {
                    reason: format!("Duplicate sample ID '{}'", id),
                });
            }
        }
        Ok(Self {
            sample_ids,
            column_names: Vec::new(),
            columns: HashMap::new(),
        })
    }

    /// Add a column (categorical factor)
    pub fn add_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(SspaError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        if !self.columns.contains_key(name) {
            self.column_names.push(name.to_string());
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    /// Get sample IDs
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get number of samples
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Column names in file order
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Get column values
    pub fn column(&self, name: &str) -> Option<&Vec<String>> {
        self.columns.get(name)
    }

    fn require_column(&self, name: &str) -> Result<&Vec<String>> {
        self.columns.get(name).ok_or_else(|| SspaError::InvalidSampleSheet {
            reason: format!("Column '{}' not found in sample sheet", name),
        })
    }

    /// Get sample index by ID
    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }

    /// Composite group label per sample: the `analysis` columns joined by `_`
    ///
    /// With no analysis columns every sample belongs to the group "all".
    pub fn group_labels(&self, analysis: &[String]) -> Result<Vec<String>> {
        if analysis.is_empty() {
            return Ok(vec!["all".to_string(); self.n_samples()]);
        }
        let cols: Vec<&Vec<String>> = analysis
            .iter()
            .map(|name| self.require_column(name))
            .collect::<Result<_>>()?;
        Ok((0..self.n_samples())
            .map(|i| cols.iter().map(|c| c[i].as_str()).collect::<Vec<_>>().join("_"))
            .collect())
    }

    /// Size of each composite group, sorted by label
    pub fn group_sizes(&self, analysis: &[String]) -> Result<BTreeMap<String, usize>> {
        let mut sizes = BTreeMap::new();
        for label in self.group_labels(analysis)? {
            *sizes.entry(label).or_insert(0) += 1;
        }
        Ok(sizes)
    }

    /// Subset the sheet to specific samples
    pub fn subset(&self, sample_indices: &[usize]) -> Result<Self> {
        let new_ids: Vec<String> = sample_indices.iter().map(|&i| self.sample_ids[i].clone()).collect();

        let mut new_sheet = SampleSheet::new(new_ids)?;
        for name in &self.column_names {
            let values = &self.columns[name];
            let new_values: Vec<String> = sample_indices.iter().map(|&i| values[i].clone()).collect();
            new_sheet.add_column(name, new_values)?;
        }

        Ok(new_sheet)
    }
}

/// Treatment-versus-reference design of the pathway analysis
///
/// Sample order matches the expression matrix the design is used with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Design {
    sample_ids: Vec<String>,
    treatments: Vec<String>,
    reference_level: String,
    /// Pairing key per sample, `None` for an unpaired design
    blocks: Option<Vec<String>>,
}

impl Design {
    /// Create and validate a design
    ///
    /// The reference level must be present and at least one sample must be
    /// treated. In a paired design every block needs the same, non-zero,
    /// number of reference samples.
    pub fn new(
        sample_ids: Vec<String>,
        treatments: Vec<String>,
        reference_level: &str,
        blocks: Option<Vec<String>>,
    ) -> Result<Self> {
        let n = sample_ids.len();
        if treatments.len() != n || blocks.as_ref().is_some_and(|b| b.len() != n) {
            return Err(SspaError::DimensionMismatch {
                expected: format!("{} labels per design column", n),
                got: format!("{} treatments", treatments.len()),
            });
        }

        let design = Self {
            sample_ids,
            treatments,
            reference_level: reference_level.to_string(),
            blocks,
        };

        if design.reference_indices().is_empty() {
            return Err(SspaError::InvalidDesign {
                reason: format!("Reference level '{}' not present in any sample", reference_level),
            });
        }
        if design.treated_indices().is_empty() {
            return Err(SspaError::InvalidDesign {
                reason: format!("No samples outside the reference level '{}'", reference_level),
            });
        }

        if let Some(blocks) = &design.blocks {
            let mut refs_per_block: BTreeMap<&str, usize> = BTreeMap::new();
            for (i, block) in blocks.iter().enumerate() {
                let entry = refs_per_block.entry(block.as_str()).or_insert(0);
                if design.is_reference(i) {
                    *entry += 1;
                }
            }
            if let Some((block, _)) = refs_per_block.iter().find(|(_, &r)| r == 0) {
                return Err(SspaError::InvalidDesign {
                    reason: format!("Pairing block '{}' has no '{}' sample", block, reference_level),
                });
            }
            let sizes: HashSet<usize> = refs_per_block.values().copied().collect();
            if sizes.len() > 1 {
                return Err(SspaError::InvalidDesign {
                    reason: "Pairing blocks hold different numbers of reference samples".to_string(),
                });
            }
        }

        Ok(design)
    }

    /// Build the design from the sample sheet columns named in the configuration
    pub fn from_sheet(sheet: &SampleSheet, config: &PathwayConfig) -> Result<Self> {
        let treatments = sheet.require_column(&config.treatment_column)?.clone();
        let blocks = match &config.pairing_column {
            Some(col) => Some(sheet.require_column(col)?.clone()),
            None => None,
        };
        Self::new(sheet.sample_ids().to_vec(), treatments, &config.reference_level, blocks)
    }

    /// Reorder the design to follow `sample_ids`; every ID must be present
    pub fn aligned_to(&self, sample_ids: &[String]) -> Result<Self> {
        let order: Vec<usize> = sample_ids
            .iter()
            .map(|id| {
                self.sample_ids.iter().position(|s| s == id).ok_or_else(|| SspaError::InvalidDesign {
                    reason: format!("Sample '{}' missing from the design", id),
                })
            })
            .collect::<Result<_>>()?;
        Self::new(
            sample_ids.to_vec(),
            order.iter().map(|&i| self.treatments[i].clone()).collect(),
            &self.reference_level,
            self.blocks.as_ref().map(|b| order.iter().map(|&i| b[i].clone()).collect()),
        )
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn reference_level(&self) -> &str {
        &self.reference_level
    }

    pub fn is_paired(&self) -> bool {
        self.blocks.is_some()
    }

    pub fn is_reference(&self, sample_idx: usize) -> bool {
        self.treatments[sample_idx] == self.reference_level
    }

    /// Indices of reference samples
    pub fn reference_indices(&self) -> Vec<usize> {
        (0..self.n_samples()).filter(|&i| self.is_reference(i)).collect()
    }

    /// Indices of treated (non-reference) samples
    pub fn treated_indices(&self) -> Vec<usize> {
        (0..self.n_samples()).filter(|&i| !self.is_reference(i)).collect()
    }

    /// Reference samples a treated sample is compared against
    pub fn references_for(&self, sample_idx: usize) -> Vec<usize> {
        match &self.blocks {
            Some(blocks) => (0..self.n_samples())
                .filter(|&i| self.is_reference(i) && blocks[i] == blocks[sample_idx])
                .collect(),
            None => self.reference_indices(),
        }
    }

    /// Size of the reference set behind each single-sample fold change
    pub fn reference_set_size(&self) -> usize {
        match self.treated_indices().first() {
            Some(&t) => self.references_for(t).len(),
            None => 0,
        }
    }
}
