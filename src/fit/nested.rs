//! Joint fits of nested parameterizations to the pooled cohort.
//!
//! All groups are fitted simultaneously with a single fixed-asymptote
//! logistic curve per group, where `scale` and `midpoint` are either shared
//! by every group or estimated per group. The joint parameter vector is laid
//! out as `[scale block][midpoint block]`; a shared block has one entry, a
//! per-group block has one entry per group (in sorted label order).

use log::{debug, info, warn};
use nalgebra::DMatrix;

use crate::domain::{Dataset, FitResult, GroupKey, JointFit, ModelKind, Parameterization, Sharing};
use crate::error::FitError;
use crate::fit::intervals::covariance;
use crate::fit::multistart::{FitSettings, check_fittable, matrix_rows, multistart};
use crate::math::{Bounds, LeastSquaresProblem};
use crate::models::{MIDPOINT_MIN, SCALE_MIN, logistic, logistic_gradient};

/// Residual problem for a joint multi-group fit.
pub struct JointProblem<'a> {
    pub parameterization: Parameterization,
    pub n_groups: usize,
    pub asymptote: f64,
    pub ages: &'a [f64],
    pub thresholds: &'a [f64],
    /// Group index of every observation.
    pub group_of: &'a [usize],
}

impl JointProblem<'_> {
    fn scale_width(&self) -> usize {
        self.parameterization.scale.width(self.n_groups)
    }

    fn scale_index(&self, g: usize) -> usize {
        match self.parameterization.scale {
            Sharing::Shared => 0,
            Sharing::PerGroup => g,
        }
    }

    fn midpoint_index(&self, g: usize) -> usize {
        let offset = self.scale_width();
        match self.parameterization.midpoint {
            Sharing::Shared => offset,
            Sharing::PerGroup => offset + g,
        }
    }
}

impl LeastSquaresProblem for JointProblem<'_> {
    fn n_obs(&self) -> usize {
        self.ages.len()
    }

    fn n_params(&self) -> usize {
        self.parameterization.param_count(self.n_groups)
    }

    fn residuals(&self, params: &[f64], out: &mut [f64]) {
        for i in 0..self.ages.len() {
            let g = self.group_of[i];
            let scale = params[self.scale_index(g)];
            let midpoint = params[self.midpoint_index(g)];
            out[i] = self.thresholds[i] - logistic(self.ages[i], scale, midpoint, self.asymptote);
        }
    }

    fn jacobian(&self, params: &[f64], jac: &mut DMatrix<f64>) {
        jac.fill(0.0);
        for i in 0..self.ages.len() {
            let g = self.group_of[i];
            let (si, mi) = (self.scale_index(g), self.midpoint_index(g));
            let grad = logistic_gradient(self.ages[i], params[si], params[mi], self.asymptote);
            jac[(i, si)] = grad[0];
            jac[(i, mi)] = grad[1];
        }
    }
}

fn block_names(base: &str, sharing: Sharing, groups: &[String]) -> Vec<String> {
    match sharing {
        Sharing::Shared => vec![base.to_string()],
        Sharing::PerGroup => groups.iter().map(|g| format!("{base}[{g}]")).collect(),
    }
}

/// Fit one parameterization jointly over the listed groups.
///
/// Observations whose label is not in `groups` are ignored.
pub fn fit_joint(
    dataset: &Dataset,
    key: GroupKey,
    groups: &[String],
    parameterization: Parameterization,
    asymptote: f64,
    settings: &FitSettings,
    seed: u64,
) -> Result<JointFit, FitError> {
    settings.validate()?;
    let mut groups = groups.to_vec();
    groups.sort();
    groups.dedup();
    if groups.is_empty() {
        return Err(FitError::Precondition("joint fit needs at least one group".to_string()));
    }

    let mut ages = Vec::new();
    let mut thresholds = Vec::new();
    let mut group_of = Vec::new();
    for obs in &dataset.observations {
        if let Ok(g) = groups.binary_search_by(|l| l.as_str().cmp(key.label_of(obs))) {
            ages.push(obs.age);
            thresholds.push(obs.threshold);
            group_of.push(g);
        }
    }

    let n_groups = groups.len();
    let k = parameterization.param_count(n_groups);
    check_fittable(&ages, &thresholds, k, settings.min_obs)?;

    let problem = JointProblem {
        parameterization,
        n_groups,
        asymptote,
        ages: &ages,
        thresholds: &thresholds,
        group_of: &group_of,
    };

    let sw = parameterization.scale.width(n_groups);
    let mw = parameterization.midpoint.width(n_groups);
    let mut lower = vec![SCALE_MIN; sw];
    lower.extend(std::iter::repeat_n(MIDPOINT_MIN, mw));
    let hard = Bounds::lower_only(lower);

    let mut s_lo = vec![settings.scale_start.0; sw];
    let mut s_hi = vec![settings.scale_start.1; sw];
    let (mid_lo, mid_hi) = settings.midpoint_range(&ages);
    s_lo.extend(std::iter::repeat_n(mid_lo, mw));
    s_hi.extend(std::iter::repeat_n(mid_hi, mw));
    let sampling = Bounds { lower: s_lo, upper: s_hi };

    let best = multistart(&problem, &hard, &sampling, settings.n_starts, seed, &settings.lm)?;
    let sol = &best.solution;
    let n = ages.len();
    debug!(
        "joint {}: rss={:.4} k={k} ({}/{} converged)",
        parameterization.name(),
        sol.rss,
        best.successful_starts,
        best.total_starts
    );

    let mut param_names = block_names("scale", parameterization.scale, &groups);
    param_names.extend(block_names("midpoint", parameterization.midpoint, &groups));

    let fit = FitResult {
        dataset: format!("{} ({})", dataset.label, parameterization.name()),
        model: ModelKind::Logistic2,
        asymptote,
        param_names,
        estimates: sol.params.clone(),
        covariance: covariance(&sol.jacobian, sol.rss, n).map(|m| matrix_rows(&m)),
        rss: sol.rss,
        n_obs: n,
        df_resid: n - k,
        iterations: sol.iterations,
        successful_starts: best.successful_starts,
        total_starts: best.total_starts,
        at_bound: hard.touches_lower(&sol.params),
    };

    Ok(JointFit {
        parameterization,
        groups,
        fit,
    })
}

/// Fit every parameterization of `ladder` over the same groups.
///
/// Each entry keeps its own outcome, so one failed joint fit only disables
/// the comparisons that involve it.
pub fn fit_ladder(
    dataset: &Dataset,
    key: GroupKey,
    groups: &[String],
    ladder: &[Parameterization],
    asymptote: f64,
    settings: &FitSettings,
    seed: u64,
) -> Vec<(Parameterization, Result<JointFit, FitError>)> {
    info!(
        "Fitting {} nested parameterizations over {} groups",
        ladder.len(),
        groups.len()
    );
    ladder
        .iter()
        .map(|&p| {
            let outcome = fit_joint(dataset, key, groups, p, asymptote, settings, seed);
            if let Err(e) = &outcome {
                warn!("joint fit {} failed: {e}", p.name());
            }
            (p, outcome)
        })
        .collect()
}
