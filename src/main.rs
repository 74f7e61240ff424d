//! dms_rank command-line interface

use std::path::Path;

use clap::Parser;
use log::{info, LevelFilter};

use dms_rank::cli::{configure_threads, Cli, Commands};
use dms_rank::prelude::*;

fn main() {
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
        Some(Commands::Rank {
            input,
            output,
            results,
            report,
            alternative,
            alpha,
            threads,
        }) => {
            configure_threads(threads);
            let config = PipelineConfig {
                alpha,
                alternative,
                ..PipelineConfig::default()
            };
            rank_dataset(&input, &output, results.as_deref(), report.as_deref(), &config).map(|_| ())
        }
        Some(Commands::Enrich {
            input,
            output,
            positions,
            n_perm,
            seed,
            mode,
            fdr_alpha,
            conditional,
            threads,
        }) => {
            configure_threads(threads);
            let config = EnrichmentConfig {
                positions,
                n_perm,
                seed,
                mode,
                fdr_alpha,
                conditional,
            };
            run_enrichment(&input, &output, &config)
        }
        None => run_datasets(&default_datasets(), &PipelineConfig::default()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_enrichment(input: &Path, output: &Path, config: &EnrichmentConfig) -> Result<()> {
    info!("Loading ranking from: {}", input.display());
    let ranking = read_ranking(input)?;
    let result = analyze_enrichment(&ranking, config)?;
    write_enrichment(output, &result)
}
