//! Command-line parsing for the threshold growth-curve fitter.
//!
//! Argument parsing and command dispatch stay separate from the fitting code;
//! `app` turns these structs into an [`AnalysisConfig`](crate::domain::AnalysisConfig).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{GroupKey, ModelKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "tcurve", version, about = "Sigmoid growth curves for longitudinal hearing thresholds")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit per-group curves, report derived metrics, and compare nested models.
    Fit(FitArgs),
    /// Write a synthetic cohort CSV with known per-group parameters.
    Simulate(SimulateArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Observation CSV (`subject_id, domain_label, variant_label, age, threshold`).
    #[arg(value_name = "CSV")]
    pub input: PathBuf,

    /// Optional `variant_label, domain_label` mapping used to validate the input.
    #[arg(long, value_name = "CSV")]
    pub mapping: Option<PathBuf>,

    /// Partition key for per-group fits.
    #[arg(long, value_enum, default_value_t = GroupKey::Domain)]
    pub group_by: GroupKey,

    /// Curve model for per-group fits.
    #[arg(long, value_enum, default_value_t = ModelKind::Logistic2)]
    pub model: ModelKind,

    /// Fixed asymptote (dB) for the two-parameter model and the joint fits.
    #[arg(long, default_value_t = crate::models::DEFAULT_ASYMPTOTE)]
    pub asymptote: f64,

    /// Clinical thresholds (dB) for onset ages; repeat or comma-separate.
    #[arg(long = "onset", value_delimiter = ',', default_values_t = crate::fit::DEFAULT_ONSET_THRESHOLDS)]
    pub onset: Vec<f64>,

    /// Groups with fewer observations are skipped.
    #[arg(long, default_value_t = crate::fit::DEFAULT_MIN_OBS)]
    pub min_obs: usize,

    /// Random starts per fit.
    #[arg(short = 'n', long, default_value_t = crate::fit::DEFAULT_N_STARTS)]
    pub starts: usize,

    /// Seed for start sampling.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Levenberg–Marquardt iteration cap per start.
    #[arg(long, default_value_t = 200)]
    pub max_iter: usize,

    /// Lower end of the initial `scale` range.
    #[arg(long, default_value_t = 0.01)]
    pub scale_min: f64,

    /// Upper end of the initial `scale` range.
    #[arg(long, default_value_t = 0.5)]
    pub scale_max: f64,

    /// Lower end of the initial `midpoint` range (years); observed ages by default.
    #[arg(long)]
    pub midpoint_min: Option<f64>,

    /// Upper end of the initial `midpoint` range (years); observed ages by default.
    #[arg(long)]
    pub midpoint_max: Option<f64>,

    /// Skip the nested-model comparison.
    #[arg(long)]
    pub no_compare: bool,

    /// Compare every nested pair, not only adjacent ones.
    #[arg(long)]
    pub all_pairs: bool,

    /// Significance level for model selection.
    #[arg(long, default_value_t = crate::fit::DEFAULT_ALPHA)]
    pub alpha: f64,

    /// Worker threads (defaults to all cores).
    #[arg(long)]
    pub threads: Option<usize>,

    /// Export the parameter report to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_params: Option<PathBuf>,

    /// Export the comparison report to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_comparisons: Option<PathBuf>,

    /// Export the full run bundle to JSON.
    #[arg(long, value_name = "JSON")]
    pub export_json: Option<PathBuf>,
}

/// Options for `tcurve simulate`.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Output CSV path.
    #[arg(short, long, value_name = "CSV")]
    pub output: PathBuf,

    /// Subjects per domain.
    #[arg(long, default_value_t = 30)]
    pub subjects: usize,

    /// Visits per subject.
    #[arg(long, default_value_t = 3)]
    pub visits: usize,

    /// Gaussian noise SD (dB).
    #[arg(long, default_value_t = 2.0)]
    pub noise: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}
