//! Error types for rust_sspa

use thiserror::Error;

/// Main error type for QC and pathway perturbation runs
#[derive(Error, Debug)]
pub enum SspaError {
    #[error("Invalid count matrix: {reason}")]
    InvalidCountMatrix { reason: String },

    #[error("Invalid sample sheet: {reason}")]
    InvalidSampleSheet { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Invalid design: {reason}")]
    InvalidDesign { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Expected exactly one annotation snapshot matching '{pattern}' in {dir}, found {found}")]
    AnnotationSnapshot {
        pattern: String,
        dir: String,
        found: usize,
    },

    #[error("Invalid annotation: {reason}")]
    InvalidAnnotation { reason: String },

    #[error("Malformed log file {path}: {reason}")]
    LogParse { path: String, reason: String },

    #[error("Invalid pathway topology: {reason}")]
    InvalidTopology { reason: String },

    #[error("Permutation bound violated: generated {generated} relabelings, at most {bound} exist")]
    PermutationBound { generated: u64, bound: u64 },

    #[error("Numerical instability in {operation}: {details}")]
    NumericalInstability { operation: String, details: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Figure rendering failed: {reason}")]
    Plot { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Pattern error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Directory traversal error: {0}")]
    WalkError(#[from] walkdir::Error),
}

/// Result type alias for rust_sspa operations
pub type Result<T> = std::result::Result<T, SspaError>;
