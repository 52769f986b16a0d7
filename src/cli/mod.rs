//! Command-line interface for rust_sspa

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rust_sspa")]
#[command(version)]
#[command(about = "RNA-seq QC and single-sample pathway perturbation analysis")]
#[command(disable_help_flag = true)]
#[command(disable_version_flag = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the post-alignment QC report
    #[command(
        long_about = "Build the post-alignment QC report.\n\n\
            Summarizes aligner and read-counter logs, library sizes and detected\n\
            genes, filters and log-CPM transforms the count matrix, runs PCA and\n\
            tests the principal component loadings for GC-content and gene-length\n\
            bias. Writes {tag}_qc_report.html and the QC tables to output_dir.",
        after_long_help = "\
Examples:
  rust_sspa qc -c config/sspa.toml
  rust_sspa qc -c config/sspa.toml --force -v"
    )]
    Qc {
        /// Path to the TOML configuration
        #[arg(short, long)]
        config: String,

        /// Recompute cached artifacts instead of reusing them
        #[arg(long)]
        force: bool,

        /// Number of threads (0 = auto) [default: 0]
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,
    },

    /// Build the pathway perturbation report
    #[command(
        long_about = "Build the single-sample pathway perturbation report.\n\n\
            Computes weighted single-sample fold changes of every treated sample\n\
            against its reference samples, propagates them through the pathway\n\
            topologies and compares each pathway score with a permutation null.\n\
            Sample-level results use robust z-scores with Bonferroni correction;\n\
            group-level results a one-sample t-test with Benjamini-Hochberg FDR.",
        after_long_help = "\
Examples:
  rust_sspa pathways -c config/sspa.toml
  rust_sspa pathways -c config/sspa.toml --threads 8"
    )]
    Pathways {
        /// Path to the TOML configuration
        #[arg(short, long)]
        config: String,

        /// Recompute cached artifacts, including the permutation null
        #[arg(long,
            long_help = "Recompute cached artifacts, including the permutation null.\n\
                Without this flag a stored null is reused even when its seed or\n\
                permutation count differs from the configuration (a warning is logged).")]
        force: bool,

        /// Number of threads (0 = auto) [default: 0]
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,
    },

    /// Remove cached artifacts of a configured run
    #[command(
        long_about = "Remove the cached annotation, expression and permutation null of a run\n\
            so that the next qc or pathways invocation recomputes them.",
        after_long_help = "\
Examples:
  rust_sspa invalidate -c config/sspa.toml"
    )]
    Invalidate {
        /// Path to the TOML configuration
        #[arg(short, long)]
        config: String,
    },
}
