//! Parameter uncertainty at the optimum.
//!
//! Covariance is the usual asymptotic estimate `s²·(JᵀJ)⁻¹` with
//! `s² = RSS/(n − p)`; per-parameter intervals are `θ ± t·se(θ)` with the
//! Student-t quantile on `n − p` degrees of freedom.
//!
//! Derived quantities use endpoint substitution: `h` is evaluated with one
//! parameter moved to its lower or upper bound while the others stay at
//! their estimates, and the interval is the span of those evaluations.
//! This is an approximation that ignores parameter correlation; it is not a
//! delta-method interval.

use nalgebra::DMatrix;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::domain::{DerivedMetric, FitResult, ParamInterval};
use crate::error::FitError;
use crate::math::inverse_condition;

/// Two-sided confidence level used for all reported intervals.
pub const CONFIDENCE_LEVEL: f64 = 0.95;

/// `s²·(JᵀJ)⁻¹`, or `None` when `JᵀJ` is not positive definite.
pub fn covariance(jacobian: &DMatrix<f64>, rss: f64, n_obs: usize) -> Option<DMatrix<f64>> {
    let k = jacobian.ncols();
    if n_obs <= k || !rss.is_finite() {
        return None;
    }
    if inverse_condition(jacobian) < 1e-10 {
        return None;
    }
    let sigma2 = rss / (n_obs - k) as f64;
    let jtj = jacobian.transpose() * jacobian;
    let chol = jtj.cholesky()?;
    let cov = chol.inverse() * sigma2;
    let ok = (0..k).all(|j| cov[(j, j)].is_finite() && cov[(j, j)] > 0.0);
    ok.then_some(cov)
}

/// `IllConditioned` when the fit carries no usable covariance, so its
/// parameter intervals will be `NA`.
pub fn check_covariance(fit: &FitResult) -> Result<(), FitError> {
    if fit.df_resid == 0 {
        return Err(FitError::IllConditioned(format!(
            "no residual degrees of freedom (n={})",
            fit.n_obs
        )));
    }
    match &fit.covariance {
        Some(_) => Ok(()),
        None => Err(FitError::IllConditioned(
            "JᵀJ is not positive definite at the optimum; intervals unavailable".to_string(),
        )),
    }
}

/// Two-sided Student-t critical value for `df` degrees of freedom.
pub fn t_critical(df: usize, level: f64) -> Option<f64> {
    if df == 0 || !(level > 0.0 && level < 1.0) {
        return None;
    }
    let dist = StudentsT::new(0.0, 1.0, df as f64).ok()?;
    let q = dist.inverse_cdf(0.5 + level / 2.0);
    q.is_finite().then_some(q)
}

/// 95% asymptotic intervals for every fitted parameter.
///
/// Bounds are `None` when the covariance is unavailable.
pub fn parameter_intervals(fit: &FitResult) -> Vec<ParamInterval> {
    let t = t_critical(fit.df_resid, CONFIDENCE_LEVEL);
    fit.param_names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let estimate = fit.estimates[j];
            let half_width = match (&fit.covariance, t) {
                (Some(cov), Some(t)) => {
                    let var = cov[j][j];
                    (var.is_finite() && var > 0.0).then(|| t * var.sqrt())
                }
                _ => None,
            };
            ParamInterval {
                name: name.clone(),
                estimate,
                ci_low: half_width.map(|h| estimate - h),
                ci_high: half_width.map(|h| estimate + h),
            }
        })
        .collect()
}

/// Propagate parameter intervals through `h` by endpoint substitution.
///
/// `h` receives a full parameter vector and returns `None` where it is
/// undefined. The result's bounds are ordered (`ci_low ≤ estimate ≤ ci_high`)
/// regardless of the direction in which `h` moves with each parameter. Any
/// undefined evaluation makes the interval `NA`.
pub fn substitution_interval<F>(name: &str, estimates: &[f64], intervals: &[ParamInterval], h: F) -> DerivedMetric
where
    F: Fn(&[f64]) -> Option<f64>,
{
    let estimate = h(estimates);
    let bounds = estimate.and_then(|point| {
        let mut lo = point;
        let mut hi = point;
        for (j, iv) in intervals.iter().enumerate() {
            for endpoint in [iv.ci_low?, iv.ci_high?] {
                let mut params = estimates.to_vec();
                params[j] = endpoint;
                let v = h(&params)?;
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        Some((lo, hi))
    });

    DerivedMetric {
        name: name.to_string(),
        estimate,
        ci_low: bounds.map(|b| b.0),
        ci_high: bounds.map(|b| b.1),
    }
}
