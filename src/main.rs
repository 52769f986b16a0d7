//! rust_sspa command-line interface

use clap::Parser;
use log::{info, LevelFilter};

use rust_sspa::cache;
use rust_sspa::cli::{Cli, Commands};
use rust_sspa::prelude::*;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Find the first non-flag argument (potential subcommand)
    let first_positional = args.iter().skip(1).find(|a| !a.starts_with('-'));
    let subcommands = ["qc", "pathways", "invalidate", "help"];
    let has_subcommand = first_positional.is_some_and(|a| subcommands.contains(&a.as_str()));

    if !has_subcommand {
        if args.len() == 1 {
            print_no_args();
            return;
        }
        if args.iter().any(|a| a == "--help") {
            print_long_help();
            return;
        }
        if args.iter().any(|a| a == "-h") {
            print_short_help();
            return;
        }
        if args.iter().any(|a| a == "-V" || a == "--version") {
            println!("rust_sspa {}", VERSION);
            return;
        }
        print_no_args();
        return;
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Some(Commands::Qc { config, force, threads }) => run_qc_command(&config, force, threads),
        Some(Commands::Pathways { config, force, threads }) => run_pathways_command(&config, force, threads),
        Some(Commands::Invalidate { config }) => run_invalidate(&config),
        None => {
            print_no_args();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Custom help output
// ---------------------------------------------------------------------------

fn print_no_args() {
    println!("rust_sspa v{}", VERSION);
    println!("Run `rust_sspa -h` for usage or `rust_sspa --help` for detailed information.");
}

fn print_short_help() {
    println!("rust_sspa v{}", VERSION);
    println!();
    println!("Usage: rust_sspa <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  qc          Build the post-alignment QC report");
    println!("  pathways    Build the pathway perturbation report");
    println!("  invalidate  Remove cached artifacts");
    println!();
    println!("Run `rust_sspa <COMMAND> -h` for command-specific options.");
}

fn print_long_help() {
    println!("rust_sspa v{}", VERSION);
    println!("RNA-seq QC and single-sample pathway perturbation analysis");
    println!();
    println!("Usage: rust_sspa <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  qc          Build the post-alignment QC report");
    println!("                - Alignment and gene-assignment rates from the logs");
    println!("                - Library sizes and detected genes");
    println!("                - logCPM PCA of the filtered count matrix");
    println!("                - GC-content / gene-length bias of the components");
    println!("  pathways    Build the pathway perturbation report");
    println!("                - Weighted single-sample fold changes, paired or unpaired");
    println!("                - Propagation through signed pathway topologies");
    println!("                - Permutation null over sample relabelings");
    println!("                - Robust z-scores (Bonferroni) and group t-test (BH)");
    println!("  invalidate  Remove the cached annotation, expression and null");
    println!();
    println!("Global Options:");
    println!("  -v, --verbose    Enable verbose output");
    println!("  -h               Print short help");
    println!("      --help       Print detailed help");
    println!("  -V, --version    Print version");
    println!();
    println!("Examples:");
    println!("  rust_sspa qc -c config/sspa.toml");
    println!();
    println!("  rust_sspa pathways -c config/sspa.toml --threads 8");
    println!();
    println!("  rust_sspa invalidate -c config/sspa.toml");
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn configure_threads(threads: usize) {
    if threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .ok();
    }
}

fn run_qc_command(config_path: &str, force: bool, threads: usize) -> Result<()> {
    configure_threads(threads);
    let config = Config::from_file(config_path)?;
    info!("QC run '{}' from {}", config.tag, config_path);

    let summary = run_qc(&config, force)?;
    println!("\n{}", summary);
    Ok(())
}

fn run_pathways_command(config_path: &str, force: bool, threads: usize) -> Result<()> {
    configure_threads(threads);
    let config = Config::from_file(config_path)?;
    info!("Pathway run '{}' from {}", config.tag, config_path);

    let results = run_pathways(&config, force)?;
    println!("\n{}", results.summary());

    let significant = results.significant_pathways();
    if !significant.is_empty() {
        println!("Significant pathways:");
        for group in significant {
            println!(
                "  {:<40} {:>10} FDR = {:.3e}",
                group.pathway,
                group.direction.map_or("NA", |d| d.as_str()),
                group.fdr.unwrap_or(f64::NAN)
            );
        }
    }
    Ok(())
}

fn run_invalidate(config_path: &str) -> Result<()> {
    let config = Config::from_file(config_path)?;
    let removed = cache::invalidate(&config)?;
    if removed.is_empty() {
        println!("No cached artifacts for '{}'", config.tag);
    } else {
        for path in removed {
            println!("Removed {}", path.display());
        }
    }
    Ok(())
}
