//! Clinically interpretable quantities derived from fitted curves.
//!
//! - `slope_db_per_year`: derivative at the midpoint, `A·scale/4`
//! - `onset_age_<T>db`: age at which the curve crosses threshold `T`
//!
//! Intervals come from endpoint substitution (see [`crate::fit::intervals`]);
//! bounds are always reported in ascending order.

use crate::domain::{DerivedMetric, FitResult, ModelKind, ParamInterval};
use crate::fit::intervals::substitution_interval;
use crate::models::logistic_inverse;

/// Default clinical thresholds (dB) for onset ages.
pub const DEFAULT_ONSET_THRESHOLDS: [f64; 2] = [25.0, 70.0];

pub fn onset_metric_name(threshold: f64) -> String {
    if threshold.fract() == 0.0 {
        format!("onset_age_{threshold:.0}db")
    } else {
        format!("onset_age_{threshold}db")
    }
}

/// Derive slope and onset ages (with intervals) for one fit.
pub fn derive_metrics(fit: &FitResult, intervals: &[ParamInterval], onset_thresholds: &[f64]) -> Vec<DerivedMetric> {
    let fixed_asymptote = fit.asymptote;
    let model = fit.model;
    let asymptote = move |p: &[f64]| match model {
        ModelKind::Logistic2 => fixed_asymptote,
        ModelKind::Logistic3 => p[2],
    };

    let mut out = Vec::with_capacity(1 + onset_thresholds.len());
    out.push(substitution_interval("slope_db_per_year", &fit.estimates, intervals, |p| {
        let v = asymptote(p) * p[0] / 4.0;
        v.is_finite().then_some(v)
    }));

    for &t in onset_thresholds {
        out.push(substitution_interval(&onset_metric_name(t), &fit.estimates, intervals, |p| {
            if p[0] <= 0.0 {
                return None;
            }
            logistic_inverse(t, p[0], p[1], asymptote(p))
        }));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(model: ModelKind, estimates: Vec<f64>) -> FitResult {
        let names: &[&str] = model.param_names();
        FitResult {
            dataset: "D".to_string(),
            model,
            asymptote: if model == ModelKind::Logistic3 { estimates[2] } else { 120.0 },
            param_names: names.iter().map(|s| s.to_string()).collect(),
            estimates,
            covariance: None,
            rss: 1.0,
            n_obs: 20,
            df_resid: 18,
            iterations: 1,
            successful_starts: 1,
            total_starts: 1,
            at_bound: false,
        }
    }

    fn iv(name: &str, estimate: f64, lo: f64, hi: f64) -> ParamInterval {
        ParamInterval {
            name: name.to_string(),
            estimate,
            ci_low: Some(lo),
            ci_high: Some(hi),
        }
    }

    #[test]
    fn slope_is_quarter_asymptote_times_scale() {
        let f = fit(ModelKind::Logistic2, vec![0.1, 40.0]);
        let ivs = vec![iv("scale", 0.1, 0.08, 0.12), iv("midpoint", 40.0, 38.0, 42.0)];
        let metrics = derive_metrics(&f, &ivs, &[]);
        let slope = &metrics[0];
        assert_eq!(slope.name, "slope_db_per_year");
        assert!((slope.estimate.unwrap() - 3.0).abs() < 1e-12);
        assert!((slope.ci_low.unwrap() - 2.4).abs() < 1e-12);
        assert!((slope.ci_high.unwrap() - 3.6).abs() < 1e-12);
    }

    #[test]
    fn onset_bounds_are_reordered_above_half_asymptote() {
        // Above A/2 a larger scale moves the crossing earlier, so the upper
        // scale endpoint produces the lower onset bound.
        let f = fit(ModelKind::Logistic2, vec![0.1, 40.0]);
        let ivs = vec![iv("scale", 0.1, 0.05, 0.15), iv("midpoint", 40.0, 35.0, 45.0)];
        let metrics = derive_metrics(&f, &ivs, &[100.0]);
        let onset = &metrics[1];
        assert_eq!(onset.name, "onset_age_100db");
        let (lo, est, hi) = (onset.ci_low.unwrap(), onset.estimate.unwrap(), onset.ci_high.unwrap());
        assert!(lo <= est && est <= hi, "{lo} {est} {hi}");
        let c = ((120.0_f64 - 100.0) / 100.0).ln();
        assert!((est - (40.0 - c / 0.1)).abs() < 1e-9);
        assert!((lo - (40.0 - c / 0.15)).abs() < 1e-9);
        assert!((hi - (40.0 - c / 0.05)).abs() < 1e-9);
    }

    #[test]
    fn onset_below_half_asymptote_tracks_scale() {
        let f = fit(ModelKind::Logistic2, vec![0.1, 40.0]);
        let ivs = vec![iv("scale", 0.1, 0.05, 0.15), iv("midpoint", 40.0, 35.0, 45.0)];
        let metrics = derive_metrics(&f, &ivs, &[25.0]);
        let onset = &metrics[1];
        let c = ((120.0_f64 - 25.0) / 25.0).ln();
        assert!((onset.ci_low.unwrap() - (40.0 - c / 0.05)).abs() < 1e-9);
        assert!((onset.ci_high.unwrap() - (45.0 - c / 0.1)).abs() < 1e-9);
    }

    #[test]
    fn onset_outside_range_is_na() {
        let f = fit(ModelKind::Logistic2, vec![0.1, 40.0]);
        let ivs = vec![iv("scale", 0.1, 0.05, 0.15), iv("midpoint", 40.0, 35.0, 45.0)];
        let metrics = derive_metrics(&f, &ivs, &[125.0]);
        assert!(metrics[1].estimate.is_none());
        assert!(metrics[1].ci_low.is_none());
    }

    #[test]
    fn non_positive_scale_bound_gives_na_interval() {
        let f = fit(ModelKind::Logistic2, vec![0.01, 40.0]);
        let ivs = vec![iv("scale", 0.01, -0.02, 0.04), iv("midpoint", 40.0, 35.0, 45.0)];
        let metrics = derive_metrics(&f, &ivs, &[25.0]);
        assert!(metrics[1].estimate.is_some());
        assert!(metrics[1].ci_low.is_none());
        // Slope stays linear in scale.
        assert!(metrics[0].ci_low.unwrap() < 0.0);
    }

    #[test]
    fn free_asymptote_feeds_slope() {
        let f = fit(ModelKind::Logistic3, vec![0.2, 30.0, 80.0]);
        let ivs = vec![
            iv("scale", 0.2, 0.1, 0.3),
            iv("midpoint", 30.0, 28.0, 32.0),
            iv("asymptote", 80.0, 70.0, 90.0),
        ];
        let metrics = derive_metrics(&f, &ivs, &[]);
        assert!((metrics[0].estimate.unwrap() - 4.0).abs() < 1e-12);
        assert!((metrics[0].ci_high.unwrap() - 6.0).abs() < 1e-12);
        assert!((metrics[0].ci_low.unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn metric_names_are_stable() {
        assert_eq!(onset_metric_name(25.0), "onset_age_25db");
        assert_eq!(onset_metric_name(22.5), "onset_age_22.5db");
    }
}
