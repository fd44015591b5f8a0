//! The analysis pipeline shared by the CLI and the integration tests.
//!
//! ingest -> per-group multi-start fits -> intervals + derived metrics
//! -> joint nested fits over the fitted groups -> F-tests -> selection
//!
//! Presentation (printing, exports) is left to the caller.

use log::{info, warn};

use crate::domain::{AnalysisConfig, Dataset, JointFit, Parameterization};
use crate::error::{AppError, FitError};
use crate::fit::{
    ComparisonOutcome, ComparisonPlan, FitSettings, SkipRecord, compare_ladder, fit_groups, fit_ladder,
    select_parameterization,
};
use crate::io::ingest::{IngestedData, load_observations};
use crate::io::results::RunBundle;
use crate::math::LmOptions;
use crate::models::SigmoidModel;
use crate::report::{GroupReport, comparison_rows};

/// All computed outputs of a single `tcurve fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ingest: IngestedData,
    pub groups: Vec<GroupReport>,
    pub skipped: Vec<SkipRecord>,
    pub joint_fits: Vec<(Parameterization, Result<JointFit, FitError>)>,
    pub comparisons: Vec<ComparisonOutcome>,
    pub selected: Option<Parameterization>,
}

impl RunOutput {
    pub fn to_bundle(&self, config: &AnalysisConfig) -> RunBundle {
        RunBundle {
            tool: "tcurve".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            input: config.csv_path.display().to_string(),
            group_key: config.group_key,
            model: config.model,
            asymptote: config.asymptote,
            seed: config.seed,
            n_starts: config.n_starts,
            min_obs: config.min_obs,
            groups: self.groups.clone(),
            skipped: self.skipped.iter().map(Into::into).collect(),
            joint_fits: self.joint_fits.iter().filter_map(|(_, r)| r.as_ref().ok().cloned()).collect(),
            comparisons: comparison_rows(&self.comparisons),
            selected: self.selected,
        }
    }
}

pub fn fit_settings(config: &AnalysisConfig) -> FitSettings {
    FitSettings {
        min_obs: config.min_obs,
        n_starts: config.n_starts,
        scale_start: config.scale_start,
        midpoint_start: config.midpoint_start,
        asymptote_start: None,
        lm: LmOptions {
            max_iterations: config.max_iterations,
            ..LmOptions::default()
        },
    }
}

/// Read the input CSV and run the analysis, using a dedicated thread pool
/// when `config.threads` is set.
pub fn run_analysis(config: &AnalysisConfig) -> Result<RunOutput, AppError> {
    let ingest = load_observations(&config.csv_path, config.mapping_path.as_deref())?;
    match config.threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| AppError::new(2, format!("Failed to build thread pool: {e}")))?;
            pool.install(|| analyze(ingest, config))
        }
        None => analyze(ingest, config),
    }
}

/// Run the analysis on already-ingested data.
pub fn analyze(ingest: IngestedData, config: &AnalysisConfig) -> Result<RunOutput, AppError> {
    if !(config.alpha > 0.0 && config.alpha < 1.0) {
        return Err(FitError::InvalidSettings(format!("alpha must be in (0, 1), got {}", config.alpha)).into());
    }
    let settings = fit_settings(config);
    let model = SigmoidModel::new(config.model, config.asymptote)?;

    info!(
        "Fitting {} per {:?} ({} starts, seed {})",
        model.kind.display_name(),
        config.group_key,
        settings.n_starts,
        config.seed
    );
    let grouped = fit_groups(&ingest.dataset, config.group_key, &model, &settings, config.seed)?;
    if grouped.fits.is_empty() {
        return Err(AppError::new(
            3,
            format!("No group could be fitted ({} skipped).", grouped.skipped.len()),
        ));
    }
    info!("Fitted {} groups, skipped {}", grouped.fits.len(), grouped.skipped.len());

    let groups: Vec<GroupReport> = grouped
        .fits
        .iter()
        .map(|(label, fit)| {
            let report = GroupReport::build(label, fit, &config.onset_thresholds);
            if let Some(note) = &report.note {
                warn!("{label}: {note}");
            }
            report
        })
        .collect();

    let (joint_fits, comparisons, selected) = if config.compare {
        compare_groups(&ingest.dataset, &grouped.fitted_groups(), config, &settings)
    } else {
        (Vec::new(), Vec::new(), None)
    };

    Ok(RunOutput {
        ingest,
        groups,
        skipped: grouped.skipped,
        joint_fits,
        comparisons,
        selected,
    })
}

type Comparisons = (
    Vec<(Parameterization, Result<JointFit, FitError>)>,
    Vec<ComparisonOutcome>,
    Option<Parameterization>,
);

fn compare_groups(dataset: &Dataset, groups: &[String], config: &AnalysisConfig, settings: &FitSettings) -> Comparisons {
    if groups.len() < 2 {
        info!("Skipping nested comparison: {} fitted group(s)", groups.len());
        return (Vec::new(), Vec::new(), None);
    }
    let joint_fits = fit_ladder(
        dataset,
        config.group_key,
        groups,
        &Parameterization::LADDER,
        config.asymptote,
        settings,
        config.seed,
    );
    let plan = if config.all_pairs {
        ComparisonPlan::AllPairs
    } else {
        ComparisonPlan::Adjacent
    };
    let comparisons = compare_ladder(&joint_fits, groups.len(), plan);
    for c in &comparisons {
        if let Err(e) = &c.result {
            warn!("comparison {} unavailable: {e}", c.pair_name());
        }
    }
    let selected = select_parameterization(&comparisons, config.alpha);
    if let Some(p) = selected {
        info!("Selected parameterization: {}", p.name());
    }
    (joint_fits, comparisons, selected)
}
