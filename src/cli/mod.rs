//! Command-line interface for dms_rank

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::enrichment::ScoreMode;
use crate::testing::AltHypothesis;

#[derive(Parser)]
#[command(name = "dms_rank")]
#[command(version)]
#[command(about = "Rank deep-mutational-scanning variants by shrunken log fold change")]
#[command(long_about = "Rank deep-mutational-scanning variants by shrunken log fold change.\n\n\
    Without a subcommand, ranks data/random.csv into results/ranking_random.csv\n\
    and data/sitesat.csv into results/ranking_sitesat.csv.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rank the variants of one count table
    #[command(
        long_about = "Rank the variants of one count table.\n\n\
            Fits a negative binomial GLM with design ~ batch + timepoint, tests the\n\
            latest timepoint against baseline, shrinks that log fold change with\n\
            apeglm and writes the variants sorted from most depleted to most enriched.",
        after_long_help = "\
Examples:
  dms_rank rank -i data/random.csv -o results/ranking_random.csv

  # Keep every statistic and a JSON summary of the run
  dms_rank rank -i counts.csv -o ranking.csv --results full.csv --report run.json"
    )]
    Rank {
        /// Count table with ID, Sequence and one column per sample
        #[arg(short, long,
            long_help = "Count table with an ID column, a Sequence column and one column per sample.\n\
                Sample names carry the timepoint as digits and the batch as the rest, e.g. 0A, 24B.")]
        input: PathBuf,

        /// Ranking output path
        #[arg(short, long)]
        output: PathBuf,

        /// Also write the full per-variant results table here
        #[arg(long, value_name = "PATH")]
        results: Option<PathBuf>,

        /// Also write a JSON run report here
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,

        /// Alternative hypothesis of the Wald test
        #[arg(long, value_enum, default_value_t = AltHypothesis::Less)]
        alternative: AltHypothesis,

        /// Significance level for independent filtering
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,

        /// Number of threads (0 = all available)
        #[arg(long, default_value_t = 0)]
        threads: usize,
    },

    /// Score positional residue enrichment along a ranking
    #[command(
        long_about = "Score positional residue enrichment along a ranking.\n\n\
            For every position and residue a running-sum curve is scored and compared\n\
            to a permutation null. Writes one residue x position CSV per metric.",
        after_long_help = "\
Examples:
  dms_rank enrich -i results/ranking_random.csv -o results/enrichment_random

  # Four positions, conditional AUC table included
  dms_rank enrich -i results/ranking_sitesat.csv -o results/enrichment_sitesat \\
    --positions 5,18,19,20 --conditional"
    )]
    Enrich {
        /// Ranking table written by `rank`
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// 1-based positions to score, comma separated [default: all]
        #[arg(long, value_delimiter = ',')]
        positions: Option<Vec<usize>>,

        /// Number of permutations
        #[arg(long, default_value_t = 1000)]
        n_perm: usize,

        /// Seed of the permutation generator
        #[arg(long, default_value_t = 42)]
        seed: u32,

        /// Curve statistic
        #[arg(long, value_enum, default_value_t = ScoreMode::Auc)]
        mode: ScoreMode,

        /// FDR level for significance calls
        #[arg(long, default_value_t = 0.1)]
        fdr_alpha: f64,

        /// Also compute conditional AUCs
        #[arg(long)]
        conditional: bool,

        /// Number of threads (0 = all available)
        #[arg(long, default_value_t = 0)]
        threads: usize,
    },
}

/// Size the global rayon pool; 0 keeps the default.
///
/// Returns false, with a warning, when the pool was already built.
pub fn configure_threads(threads: usize) -> bool {
    if threads == 0 {
        return true;
    }
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
        Ok(()) => true,
        Err(e) => {
            log::warn!("could not set up {} threads: {}", threads, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_is_default_run() {
        let cli = Cli::try_parse_from(["dms_rank", "-v"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.verbose);
    }

    #[test]
    fn test_second_pool_setup_is_reported() {
        assert!(configure_threads(0));
        configure_threads(2);
        // the global pool exists now, whoever built it
        assert!(!configure_threads(2));
    }

    #[test]
    fn test_rank_arguments() {
        let cli = Cli::try_parse_from([
            "dms_rank", "rank", "-i", "in.csv", "-o", "out.csv", "--alternative", "two-sided", "--alpha", "0.1",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Rank { input, alternative, alpha, results, .. }) => {
                assert_eq!(input, PathBuf::from("in.csv"));
                assert_eq!(alternative, AltHypothesis::TwoSided);
                assert_eq!(alpha, 0.1);
                assert!(results.is_none());
            }
            _ => panic!("expected rank"),
        }
    }

    #[test]
    fn test_enrich_arguments() {
        let cli = Cli::try_parse_from([
            "dms_rank", "enrich", "-i", "r.csv", "-o", "out", "--positions", "5,18", "--mode", "max", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Enrich { positions, mode, n_perm, conditional, .. }) => {
                assert_eq!(positions, Some(vec![5, 18]));
                assert_eq!(mode, ScoreMode::Max);
                assert_eq!(n_perm, 1000);
                assert!(!conditional);
            }
            _ => panic!("expected enrich"),
        }
    }
}
