//! End-to-end ranking of one dataset

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::{DmsDataSet, VariantLibrary};
use crate::dispersion::{estimate_dispersions, DispersionParams, TrendFitMethod};
use crate::error::Result;
use crate::filter::{filter_low_counts, independent_filtering};
use crate::glm::{fit_glm, GlmFitParams};
use crate::io::{read_library, write_json, write_ranking, write_results_table, RunReport, WaldResults};
use crate::normalization::{estimate_size_factors, SizeFactorMethod};
use crate::rank::{rank_variants, RankedVariant};
use crate::shrinkage::{shrink_lfc_apeglm, ApeglmParams};
use crate::testing::{wald_test, AltHypothesis};

/// Settings of a ranking run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Significance level used for independent filtering
    pub alpha: f64,
    pub alternative: AltHypothesis,
    /// Variants with a total count at or below this are dropped
    pub min_total_count: f64,
    pub size_factor_method: SizeFactorMethod,
    pub trend_method: TrendFitMethod,
    pub dispersion: DispersionParams,
    pub glm: GlmFitParams,
    pub apeglm: ApeglmParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            alternative: AltHypothesis::Less,
            min_total_count: 1.0,
            size_factor_method: SizeFactorMethod::Ratio,
            trend_method: TrendFitMethod::Parametric,
            dispersion: DispersionParams::default(),
            glm: GlmFitParams::default(),
            apeglm: ApeglmParams::default(),
        }
    }
}

/// Input and output of one dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    pub name: String,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl DatasetSpec {
    pub fn new(name: &str, input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            input: input.into(),
            output: output.into(),
        }
    }
}

/// The random and site-saturation libraries under `data/`
pub fn default_datasets() -> Vec<DatasetSpec> {
    vec![
        DatasetSpec::new("random", "data/random.csv", "results/ranking_random.csv"),
        DatasetSpec::new("sitesat", "data/sitesat.csv", "results/ranking_sitesat.csv"),
    ]
}

/// Everything a ranking run produces
#[derive(Debug, Clone)]
pub struct RankingRun {
    pub results: WaldResults,
    pub ranking: Vec<RankedVariant>,
    pub report: RunReport,
}

/// Filter, fit, test, shrink and rank an in-memory library.
///
/// The report's `input` and `output` are left empty.
pub fn rank_library(library: &VariantLibrary, config: &PipelineConfig) -> Result<RankingRun> {
    let (kept, n_filtered) = filter_low_counts(library, config.min_total_count)?;
    let mut ds = DmsDataSet::new(kept)?;
    let info = ds.design_info().clone();
    log::info!("design: ~ {}", info.coef_names.join(" + "));

    log::info!("estimating size factors");
    estimate_size_factors(&mut ds, config.size_factor_method)?;
    estimate_dispersions(&mut ds, config.trend_method, &config.dispersion)?;
    log::info!("fitting negative binomial GLM");
    fit_glm(&mut ds, &config.glm)?;

    let mut results = wald_test(&ds, config.alternative)?;
    let cutoff = independent_filtering(&mut results, config.alpha);
    log::debug!("independent filtering base mean cutoff {:.4}", cutoff);

    let coefficient = info.tested_coefficient();
    let prior_scale = shrink_lfc_apeglm(&ds, &mut results, &coefficient, &config.apeglm)?;
    let ranking = rank_variants(&results, ds.library())?;

    let summary = results.summary(config.alpha);
    log::info!("{}", summary.to_string().replace('\n', ", "));

    let report = RunReport {
        input: String::new(),
        output: String::new(),
        n_input_variants: library.n_variants(),
        n_filtered,
        samples: ds.counts().sample_ids().to_vec(),
        timepoints: info.timepoint_levels.clone(),
        batches: info.batch_levels.clone(),
        coefficients: info.coef_names.clone(),
        tested_coefficient: coefficient,
        size_factors: ds.size_factors().map(|sf| sf.to_vec()).unwrap_or_default(),
        dispersion_trend: ds.dispersion_function(),
        dispersion_prior_var: ds.dispersion_prior_var(),
        shrinkage_prior_scale: prior_scale,
        summary,
    };
    Ok(RankingRun {
        results,
        ranking,
        report,
    })
}

/// Rank one count table and write the ranking, plus the optional full
/// results table and JSON report
pub fn rank_dataset(
    input: &Path,
    output: &Path,
    results_path: Option<&Path>,
    report_path: Option<&Path>,
    config: &PipelineConfig,
) -> Result<RankingRun> {
    log::info!("ranking {}", input.display());
    let library = read_library(input)?;
    let mut run = rank_library(&library, config)?;
    run.report.input = input.display().to_string();
    run.report.output = output.display().to_string();

    write_ranking(output, &run.ranking)?;
    log::info!("wrote {} ranked variants to {}", run.ranking.len(), output.display());
    if let Some(path) = results_path {
        write_results_table(path, &run.results)?;
    }
    if let Some(path) = report_path {
        write_json(path, &run.report)?;
    }
    Ok(run)
}

/// Rank each dataset independently; the first failure aborts
pub fn run_datasets(datasets: &[DatasetSpec], config: &PipelineConfig) -> Result<()> {
    for dataset in datasets {
        log::info!("dataset {}", dataset.name);
        rank_dataset(&dataset.input, &dataset.output, None, None, config)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_datasets() {
        let datasets = default_datasets();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].input, PathBuf::from("data/random.csv"));
        assert_eq!(datasets[1].output, PathBuf::from("results/ranking_sitesat.csv"));
    }

    #[test]
    fn test_config_defaults_and_json() {
        let config = PipelineConfig::default();
        assert_eq!(config.alpha, 0.05);
        assert_eq!(config.alternative, AltHypothesis::Less);
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.apeglm.lbfgs_m, 6);

        let partial: PipelineConfig = serde_json::from_str(r#"{"alpha": 0.1}"#).unwrap();
        assert_eq!(partial.alpha, 0.1);
        assert_eq!(partial.min_total_count, 1.0);
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = rank_dataset(
            &dir.path().join("absent.csv"),
            &dir.path().join("out.csv"),
            None,
            None,
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::DmsError::IoError(_)));
    }
}
