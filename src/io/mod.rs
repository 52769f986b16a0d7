//! Input/Output: count files, sample sheets, logs and result tables

mod csv;
pub mod logs;
mod results;

pub use self::csv::{
    fmt_opt, read_allow_list, read_annotation_snapshot, read_featurecounts, read_sample_sheet, read_topology,
    sample_name_from_path, write_tsv, TopologyEdge, TsvRecord,
};
pub use logs::{summarize_alignments, AlignmentReport, AlignmentStats, AssignmentRow, AssignmentSummary};
pub use results::{
    Direction, Evaluation, GroupLevelResult, NullSummary, PathwayResults, ResultsSummary, SampleLevelResult,
};
