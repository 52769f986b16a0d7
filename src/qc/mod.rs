//! Post-alignment quality control: library statistics, sample similarity and
//! sequence bias

mod bias;
mod library;
mod pca;

pub use bias::{bias_grid, BiasCell};
pub use library::{library_stats, LibraryStats};
pub use pca::{run_pca, symmetric_eigen, PcaResult, PcaScoreRow};
