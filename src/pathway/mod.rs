//! Single-sample pathway perturbation scoring

pub mod perturbation;
pub mod topology;
pub mod weights;

pub use perturbation::{build_models, entrez_rows, propagate, raw_perturbation_scores, PathwayModel};
pub use topology::{build_topologies, load_topologies, Edge, PathwayTopology};
pub use weights::{gene_weights, single_sample_fc, weighted_fc};
