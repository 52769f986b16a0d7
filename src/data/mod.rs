//! Data structures for QC and pathway analysis

pub mod annotation;
mod count_matrix;
mod metadata;

pub use annotation::{load_annotation, AnnotationSet, GeneAnnotation, TranscriptRecord};
pub use count_matrix::CountMatrix;
pub use metadata::{Design, SampleSheet};
