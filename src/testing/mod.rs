//! Statistical testing: multiplicity correction, t-tests and the
//! permutation-based significance of pathway scores

mod fdr;
mod pvalue;
pub mod significance;

pub use fdr::{adjust_optional, benjamini_hochberg, bonferroni};
pub use pvalue::{calculate_pvalue_t, one_sample_t_test, TTest};
pub use significance::{empirical_pvalue, evaluate, evaluate_groups, evaluate_samples, robust_z, NullStats};
