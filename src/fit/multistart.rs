//! Multi-start nonlinear least squares.
//!
//! Given:
//! - one dataset (ages `x_i`, thresholds `y_i`)
//! - a sigmoid model
//! - a sampling box for initial parameters
//!
//! we draw `n_starts` start vectors from a seeded RNG, run a bounded
//! Levenberg–Marquardt fit from each (in parallel), discard failed runs and
//! keep the converged run with the lowest residual sum of squares.
//!
//! The RNG is local and explicitly seeded, so a fit is reproducible from
//! `(dataset, model, bounds, n_starts, seed)` alone.

use log::debug;
use nalgebra::DMatrix;
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::domain::{Dataset, FitResult, ModelKind};
use crate::error::FitError;
use crate::fit::intervals::covariance;
use crate::math::{Bounds, LeastSquaresProblem, LmOptions, LmSolution, minimize};
use crate::models::{ASYMPTOTE_MIN, MIDPOINT_MIN, SigmoidModel};

/// Minimum number of observations a partition needs before any fit is attempted.
pub const DEFAULT_MIN_OBS: usize = 5;

/// Default number of random starts per fit.
pub const DEFAULT_N_STARTS: usize = 500;

/// Midpoint sampling range used when the data cannot supply one.
pub const DEFAULT_MIDPOINT_START: (f64, f64) = (5.0, 100.0);

/// Settings shared by every fit in a run.
#[derive(Debug, Clone)]
pub struct FitSettings {
    pub min_obs: usize,
    pub n_starts: usize,
    /// Sampling range for initial `scale` values.
    pub scale_start: (f64, f64),
    /// Sampling range for initial `midpoint` values (years); the observed
    /// age range when `None`.
    pub midpoint_start: Option<(f64, f64)>,
    /// Sampling range for a free asymptote; derived from the data when `None`.
    pub asymptote_start: Option<(f64, f64)>,
    pub lm: LmOptions,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            min_obs: DEFAULT_MIN_OBS,
            n_starts: DEFAULT_N_STARTS,
            scale_start: (0.01, 0.5),
            midpoint_start: None,
            asymptote_start: None,
            lm: LmOptions::default(),
        }
    }
}

impl FitSettings {
    pub fn validate(&self) -> Result<(), FitError> {
        if self.n_starts == 0 {
            return Err(FitError::InvalidSettings("n_starts must be > 0".to_string()));
        }
        if self.lm.max_iterations == 0 {
            return Err(FitError::InvalidSettings("max_iterations must be > 0".to_string()));
        }
        check_range("scale start", self.scale_start)?;
        if let Some(r) = self.midpoint_start {
            check_range("midpoint start", r)?;
        }
        if let Some(r) = self.asymptote_start {
            check_range("asymptote start", r)?;
        }
        Ok(())
    }

    /// Midpoint sampling range: the configured one, or the observed ages
    /// clipped to the hard lower bound.
    pub fn midpoint_range(&self, ages: &[f64]) -> (f64, f64) {
        if let Some(r) = self.midpoint_start {
            return r;
        }
        let lo = ages.iter().copied().fold(f64::INFINITY, f64::min).max(MIDPOINT_MIN);
        let hi = ages.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if lo.is_finite() && hi.is_finite() && hi > lo {
            (lo, hi)
        } else {
            DEFAULT_MIDPOINT_START
        }
    }
}

fn check_range(name: &str, (lo, hi): (f64, f64)) -> Result<(), FitError> {
    if lo.is_finite() && hi.is_finite() && lo <= hi {
        Ok(())
    } else {
        Err(FitError::InvalidSettings(format!(
            "invalid {name} range [{lo}, {hi}] (must be finite with lo <= hi)"
        )))
    }
}

/// Residual problem for one sigmoid curve on one dataset.
pub struct SigmoidProblem<'a> {
    pub model: SigmoidModel,
    pub ages: &'a [f64],
    pub thresholds: &'a [f64],
}

impl LeastSquaresProblem for SigmoidProblem<'_> {
    fn n_obs(&self) -> usize {
        self.ages.len()
    }

    fn n_params(&self) -> usize {
        self.model.param_count()
    }

    fn residuals(&self, params: &[f64], out: &mut [f64]) {
        for (i, (&age, &y)) in self.ages.iter().zip(self.thresholds).enumerate() {
            out[i] = y - self.model.forward(age, params);
        }
    }

    fn jacobian(&self, params: &[f64], jac: &mut DMatrix<f64>) {
        let mut row = vec![0.0; self.model.param_count()];
        for (i, &age) in self.ages.iter().enumerate() {
            self.model.fill_gradient(age, params, &mut row);
            for (j, v) in row.iter().enumerate() {
                jac[(i, j)] = *v;
            }
        }
    }
}

/// Best converged run out of a multi-start batch.
#[derive(Debug, Clone)]
pub struct MultiStartSolution {
    pub solution: LmSolution,
    pub start_index: usize,
    pub successful_starts: usize,
    pub total_starts: usize,
}

/// Draw `n` start vectors uniformly from the sampling box.
pub fn sample_starts(sampling: &Bounds, n: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            sampling
                .lower
                .iter()
                .zip(&sampling.upper)
                .map(|(&lo, &hi)| if lo < hi { rng.gen_range(lo..=hi) } else { lo })
                .collect()
        })
        .collect()
}

/// Run a bounded LM fit from every sampled start and keep the best.
pub fn multistart<P: LeastSquaresProblem + Sync + ?Sized>(
    problem: &P,
    hard: &Bounds,
    sampling: &Bounds,
    n_starts: usize,
    seed: u64,
    lm: &LmOptions,
) -> Result<MultiStartSolution, FitError> {
    let starts = sample_starts(sampling, n_starts, seed);

    // Evaluate each start independently (parallel).
    let runs: Vec<(usize, LmSolution)> = starts
        .par_iter()
        .enumerate()
        .filter_map(|(idx, start)| match minimize(problem, start, hard, lm) {
            Ok(sol) => Some((idx, sol)),
            Err(e) => {
                debug!("start {idx} discarded: {e}");
                None
            }
        })
        .collect();

    if runs.is_empty() {
        return Err(FitError::NonConvergence { starts: n_starts });
    }

    // Deterministic selection: pick the minimum RSS; break ties by start index.
    let mut best = &runs[0];
    for run in &runs[1..] {
        if run.1.rss < best.1.rss || (run.1.rss == best.1.rss && run.0 < best.0) {
            best = run;
        }
    }

    Ok(MultiStartSolution {
        solution: best.1.clone(),
        start_index: best.0,
        successful_starts: runs.len(),
        total_starts: n_starts,
    })
}

/// Reject datasets that cannot identify a `k`-parameter curve.
pub fn check_fittable(ages: &[f64], thresholds: &[f64], k: usize, min_obs: usize) -> Result<(), FitError> {
    let n = ages.len();
    let required = min_obs.max(k + 1);
    if n < required {
        return Err(FitError::InsufficientData { n, required });
    }
    if ages.iter().chain(thresholds).any(|v| !v.is_finite()) {
        return Err(FitError::Degenerate("non-finite age or threshold".to_string()));
    }
    let mean = ages.iter().sum::<f64>() / n as f64;
    let var = ages.iter().map(|a| (a - mean) * (a - mean)).sum::<f64>() / n as f64;
    if var <= 1e-12 {
        return Err(FitError::Degenerate("zero variance in age".to_string()));
    }
    Ok(())
}

/// Sampling box for a single-curve fit.
pub fn start_bounds(model: &SigmoidModel, settings: &FitSettings, ages: &[f64], thresholds: &[f64]) -> Bounds {
    let (mid_lo, mid_hi) = settings.midpoint_range(ages);
    let mut lower = vec![settings.scale_start.0, mid_lo];
    let mut upper = vec![settings.scale_start.1, mid_hi];
    if model.kind == ModelKind::Logistic3 {
        let (lo, hi) = settings.asymptote_start.unwrap_or_else(|| {
            let y_max = thresholds.iter().copied().fold(ASYMPTOTE_MIN, f64::max);
            (y_max, model.asymptote.max(1.5 * y_max))
        });
        lower.push(lo);
        upper.push(hi);
    }
    Bounds { lower, upper }
}

/// Fit one sigmoid to one dataset.
pub fn fit_dataset(
    dataset: &Dataset,
    model: &SigmoidModel,
    settings: &FitSettings,
    seed: u64,
) -> Result<FitResult, FitError> {
    settings.validate()?;
    let ages = dataset.ages();
    let thresholds = dataset.thresholds();
    let k = model.param_count();
    check_fittable(&ages, &thresholds, k, settings.min_obs)?;

    let problem = SigmoidProblem {
        model: *model,
        ages: &ages,
        thresholds: &thresholds,
    };
    let hard = Bounds::lower_only(model.lower_bounds());
    let sampling = start_bounds(model, settings, &ages, &thresholds);

    let best = multistart(&problem, &hard, &sampling, settings.n_starts, seed, &settings.lm)?;
    debug!(
        "{}: best rss={:.4} from start {} ({}/{} converged)",
        dataset.label, best.solution.rss, best.start_index, best.successful_starts, best.total_starts
    );

    let n = ages.len();
    let sol = &best.solution;
    let cov = covariance(&sol.jacobian, sol.rss, n);

    Ok(FitResult {
        dataset: dataset.label.clone(),
        model: model.kind,
        asymptote: model.asymptote_for(&sol.params),
        param_names: model.param_names().iter().map(|s| s.to_string()).collect(),
        estimates: sol.params.clone(),
        covariance: cov.map(|m| matrix_rows(&m)),
        rss: sol.rss,
        n_obs: n,
        df_resid: n - k,
        iterations: sol.iterations,
        successful_starts: best.successful_starts,
        total_starts: best.total_starts,
        at_bound: hard.touches_lower(&sol.params),
    })
}

pub(crate) fn matrix_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows())
        .map(|i| m.row(i).iter().copied().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;
    use crate::models::logistic;
    use rand_distr::{Distribution, Normal};

    fn curve_dataset(scale: f64, midpoint: f64, noise_sd: f64, seed: u64) -> Dataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, noise_sd).unwrap();
        let observations = (0..60)
            .map(|i| {
                let age = 5.0 + i as f64 * 1.25;
                Observation {
                    subject_id: format!("S{}", i / 3),
                    domain_label: "D".to_string(),
                    variant_label: "v".to_string(),
                    age,
                    threshold: logistic(age, scale, midpoint, 130.0) + noise.sample(&mut rng),
                }
            })
            .collect();
        Dataset::new("D", observations)
    }

    fn quick_settings() -> FitSettings {
        FitSettings {
            n_starts: 40,
            ..FitSettings::default()
        }
    }

    #[test]
    fn recovers_noise_free_parameters() {
        let ds = curve_dataset(0.09, 45.0, 1e-9, 1);
        let model = SigmoidModel::new(ModelKind::Logistic2, 130.0).unwrap();
        let fit = fit_dataset(&ds, &model, &quick_settings(), 7).unwrap();
        assert!((fit.scale() - 0.09).abs() < 1e-4, "scale={}", fit.scale());
        assert!((fit.midpoint() - 45.0).abs() < 1e-2, "midpoint={}", fit.midpoint());
        assert_eq!(fit.df_resid, 58);
        assert!(fit.covariance.is_some());
        assert!(fit.successful_starts >= 1);
    }

    #[test]
    fn different_seeds_agree_on_minimum_rss() {
        let ds = curve_dataset(0.12, 50.0, 3.0, 2);
        let model = SigmoidModel::new(ModelKind::Logistic2, 130.0).unwrap();
        let a = fit_dataset(&ds, &model, &quick_settings(), 1).unwrap();
        let b = fit_dataset(&ds, &model, &quick_settings(), 2).unwrap();
        let tol = 1e-6 * a.rss.max(1.0);
        assert!((a.rss - b.rss).abs() < tol, "rss {} vs {}", a.rss, b.rss);
    }

    #[test]
    fn same_seed_is_reproducible() {
        let ds = curve_dataset(0.07, 40.0, 2.0, 3);
        let model = SigmoidModel::new(ModelKind::Logistic2, 130.0).unwrap();
        let a = fit_dataset(&ds, &model, &quick_settings(), 11).unwrap();
        let b = fit_dataset(&ds, &model, &quick_settings(), 11).unwrap();
        assert_eq!(a.estimates, b.estimates);
        assert_eq!(a.rss, b.rss);
    }

    #[test]
    fn free_asymptote_model_fits() {
        let ds = curve_dataset(0.1, 40.0, 1e-9, 4);
        let model = SigmoidModel::new(ModelKind::Logistic3, 130.0).unwrap();
        let fit = fit_dataset(&ds, &model, &quick_settings(), 5).unwrap();
        assert!((fit.asymptote - 130.0).abs() < 0.1, "asymptote={}", fit.asymptote);
        assert_eq!(fit.param_names.len(), 3);
    }

    #[test]
    fn rejects_small_and_degenerate_datasets() {
        let model = SigmoidModel::new(ModelKind::Logistic2, 130.0).unwrap();
        let small = Dataset::new("s", curve_dataset(0.1, 40.0, 1.0, 5).observations[..3].to_vec());
        let err = fit_dataset(&small, &model, &quick_settings(), 1).unwrap_err();
        assert_eq!(err, FitError::InsufficientData { n: 3, required: 5 });

        let mut flat = curve_dataset(0.1, 40.0, 1.0, 6);
        for o in &mut flat.observations {
            o.age = 30.0;
        }
        let err = fit_dataset(&flat, &model, &quick_settings(), 1).unwrap_err();
        assert!(matches!(err, FitError::Degenerate(_)));
    }

    #[test]
    fn start_sampling_is_seeded_and_in_range() {
        let sampling = Bounds {
            lower: vec![0.01, 5.0],
            upper: vec![0.5, 100.0],
        };
        let a = sample_starts(&sampling, 20, 9);
        let b = sample_starts(&sampling, 20, 9);
        assert_eq!(a, b);
        for s in &a {
            assert!(s[0] >= 0.01 && s[0] <= 0.5);
            assert!(s[1] >= 5.0 && s[1] <= 100.0);
        }
    }

    #[test]
    fn midpoint_sampling_follows_observed_ages() {
        let settings = FitSettings::default();
        assert_eq!(settings.midpoint_range(&[12.0, 30.0, 64.5]), (12.0, 64.5));
        // Clipped to the hard lower bound.
        assert_eq!(settings.midpoint_range(&[1.0, 40.0]), (MIDPOINT_MIN, 40.0));
        // Too narrow to sample from.
        assert_eq!(settings.midpoint_range(&[2.0, 3.0]), DEFAULT_MIDPOINT_START);

        let fixed = FitSettings {
            midpoint_start: Some((20.0, 30.0)),
            ..FitSettings::default()
        };
        assert_eq!(fixed.midpoint_range(&[12.0, 64.5]), (20.0, 30.0));

        let model = SigmoidModel::new(ModelKind::Logistic2, 130.0).unwrap();
        let ages = [8.0, 20.0, 55.0];
        let bounds = start_bounds(&model, &settings, &ages, &[5.0, 20.0, 70.0]);
        assert_eq!((bounds.lower[1], bounds.upper[1]), (8.0, 55.0));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = FitSettings {
            scale_start: (0.5, 0.1),
            ..FitSettings::default()
        };
        assert!(matches!(settings.validate(), Err(FitError::InvalidSettings(_))));
    }
}
