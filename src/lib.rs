//! dms_rank: ranking of deep-mutational-scanning peptide variants
//!
//! Variants are ranked by the apeglm-shrunken log2 fold change between the
//! latest and the baseline timepoint of a negative binomial GLM with design
//! `~ batch + timepoint`, fitted the DESeq2 way. A second stage scores
//! positional residue enrichment along the ranking.
//!
//! # Example
//!
//! ```ignore
//! use dms_rank::prelude::*;
//!
//! let library = read_library("data/random.csv")?;
//! let run = rank_library(&library, &PipelineConfig::default())?;
//! write_ranking("results/ranking_random.csv", &run.ranking)?;
//!
//! let enrichment = analyze_enrichment(&run.ranking, &EnrichmentConfig::default())?;
//! write_enrichment("results/enrichment_random", &enrichment)?;
//! ```

pub mod cli;
pub mod data;
pub mod dispersion;
pub mod enrichment;
pub mod error;
pub mod filter;
pub mod glm;
pub mod io;
pub mod normalization;
pub mod pipeline;
pub mod rank;
pub mod rng;
pub mod shrinkage;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::data::{CountMatrix, DmsDataSet, SampleMetadata, VariantLibrary};
    pub use crate::dispersion::{estimate_dispersions, DispersionParams, TrendFitMethod};
    pub use crate::enrichment::{analyze_enrichment, write_enrichment, EnrichmentConfig, EnrichmentResult, ScoreMode};
    pub use crate::error::{DmsError, Result};
    pub use crate::filter::{filter_low_counts, independent_filtering};
    pub use crate::glm::{fit_glm, DesignInfo, GlmFitParams};
    pub use crate::io::{read_library, read_ranking, write_ranking, write_results_table, RunReport, WaldResults};
    pub use crate::normalization::{estimate_size_factors, SizeFactorMethod};
    pub use crate::pipeline::{
        default_datasets, rank_dataset, rank_library, run_datasets, DatasetSpec, PipelineConfig, RankingRun,
    };
    pub use crate::rank::{rank_variants, RankedVariant};
    pub use crate::shrinkage::{shrink_lfc_apeglm, ApeglmParams};
    pub use crate::testing::{benjamini_hochberg, wald_test, AltHypothesis};
}
