//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - runs the analysis pipeline
//! - prints reports
//! - writes optional exports

use clap::Parser;
use log::info;

use crate::cli::{Command, FitArgs, SimulateArgs};
use crate::data::{CohortSpec, generate_cohort};
use crate::domain::AnalysisConfig;
use crate::error::AppError;
use crate::report::{comparison_rows, format_comparisons, format_group_table, format_run_header, parameter_rows};

pub mod pipeline;

/// Entry point for the `tcurve` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = config_from_args(&args);
    let run = pipeline::run_analysis(&config)?;

    println!("{}", format_run_header(&run.ingest.stats, &config));
    println!("{}", format_group_table(&run.groups, &run.skipped));
    if config.compare {
        let rows = comparison_rows(&run.comparisons);
        println!("{}", format_comparisons(&rows, run.selected, config.alpha));
    }

    if let Some(path) = &config.export_params {
        crate::io::export::write_param_report_csv(path, &parameter_rows(&run.groups))?;
        info!("Wrote parameter report to {}", path.display());
    }
    if let Some(path) = &config.export_comparisons {
        crate::io::export::write_comparison_csv(path, &comparison_rows(&run.comparisons))?;
        info!("Wrote comparison report to {}", path.display());
    }
    if let Some(path) = &config.export_json {
        crate::io::results::write_run_bundle(path, &run.to_bundle(&config))?;
        info!("Wrote run bundle to {}", path.display());
    }

    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let mut spec = CohortSpec::demo(args.seed);
    spec.subjects_per_group = args.subjects;
    spec.visits_per_subject = args.visits;
    spec.noise_sd = args.noise;

    let dataset = generate_cohort(&spec)?;
    crate::io::export::write_observations_csv(&args.output, &dataset)?;

    println!("Wrote {} observations to {}", dataset.len(), args.output.display());
    for g in &spec.groups {
        println!(
            "  {:<8} scale={:.3} midpoint={:.1} variants={}",
            g.domain,
            g.scale,
            g.midpoint,
            g.variants.join("/")
        );
    }
    Ok(())
}

/// An explicit `--midpoint-min`/`--midpoint-max` overrides the age-derived
/// range; a missing side falls back to the wide default.
fn midpoint_start(args: &FitArgs) -> Option<(f64, f64)> {
    let (lo, hi) = crate::fit::DEFAULT_MIDPOINT_START;
    match (args.midpoint_min, args.midpoint_max) {
        (None, None) => None,
        (min, max) => Some((min.unwrap_or(lo), max.unwrap_or(hi))),
    }
}

pub fn config_from_args(args: &FitArgs) -> AnalysisConfig {
    AnalysisConfig {
        csv_path: args.input.clone(),
        mapping_path: args.mapping.clone(),
        group_key: args.group_by,
        model: args.model,
        asymptote: args.asymptote,
        onset_thresholds: args.onset.clone(),
        min_obs: args.min_obs,
        n_starts: args.starts,
        seed: args.seed,
        max_iterations: args.max_iter,
        scale_start: (args.scale_min, args.scale_max),
        midpoint_start: midpoint_start(args),
        compare: !args.no_compare,
        all_pairs: args.all_pairs,
        alpha: args.alpha,
        threads: args.threads,
        export_params: args.export_params.clone(),
        export_comparisons: args.export_comparisons.clone(),
        export_json: args.export_json.clone(),
    }
}
