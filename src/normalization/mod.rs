//! Normalization of RNA-seq count data

mod counts;

pub use counts::{cpm, filter_expressed, log_cpm, ExpressionSet, FilterSummary};
