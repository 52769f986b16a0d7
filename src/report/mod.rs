//! HTML reports with inline SVG figures

pub mod figures;
mod html;

pub use html::{escape, table, PathwayOverview, PathwayReport, QcReport};

use std::fs;
use std::path::Path;

use log::info;

use crate::error::Result;

/// Write a rendered report, creating the output directory when needed
pub fn write_report(path: &Path, html: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, html)?;
    info!("Report written to {}", path.display());
    Ok(())
}
