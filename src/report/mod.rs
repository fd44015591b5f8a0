//! Reporting: tabular rows for the parameter and comparison reports, plus
//! terminal formatting (`format`).

use serde::{Deserialize, Serialize};

use crate::domain::{DerivedMetric, FitResult, ParamInterval};
use crate::fit::compare::ComparisonOutcome;
use crate::fit::{check_covariance, derive_metrics, parameter_intervals};

pub mod format;

pub use format::*;

/// One fitted group with its intervals and derived quantities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupReport {
    pub group: String,
    pub fit: FitResult,
    pub intervals: Vec<ParamInterval>,
    pub derived: Vec<DerivedMetric>,
    /// Why intervals are missing, when they are.
    #[serde(default)]
    pub note: Option<String>,
}

impl GroupReport {
    /// Intervals, derived metrics at `onset_thresholds`, and a note when the
    /// covariance was dropped.
    pub fn build(group: &str, fit: &FitResult, onset_thresholds: &[f64]) -> Self {
        let intervals = parameter_intervals(fit);
        let derived = derive_metrics(fit, &intervals, onset_thresholds);
        Self {
            group: group.to_string(),
            fit: fit.clone(),
            intervals,
            derived,
            note: check_covariance(fit).err().map(|e| e.to_string()),
        }
    }
}

/// Row of the parameter report. `None` is written as `NA`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamReportRow {
    pub group: String,
    pub parameter_name: String,
    pub point_estimate: Option<f64>,
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
}

/// Row of the comparison report. A failed comparison keeps its pair name
/// with every statistic missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReportRow {
    pub model_pair: String,
    pub f: Option<f64>,
    pub df1: Option<usize>,
    pub df2: Option<usize>,
    pub p_value: Option<f64>,
    pub note: Option<String>,
}

/// Flatten group reports: model parameters first, then derived metrics.
pub fn parameter_rows(groups: &[GroupReport]) -> Vec<ParamReportRow> {
    let mut rows = Vec::new();
    for g in groups {
        for iv in &g.intervals {
            rows.push(ParamReportRow {
                group: g.group.clone(),
                parameter_name: iv.name.clone(),
                point_estimate: Some(iv.estimate),
                ci_low: iv.ci_low,
                ci_high: iv.ci_high,
            });
        }
        for m in &g.derived {
            rows.push(ParamReportRow {
                group: g.group.clone(),
                parameter_name: m.name.clone(),
                point_estimate: m.estimate,
                ci_low: m.ci_low,
                ci_high: m.ci_high,
            });
        }
    }
    rows
}

pub fn comparison_rows(outcomes: &[ComparisonOutcome]) -> Vec<ComparisonReportRow> {
    outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(r) => ComparisonReportRow {
                model_pair: o.pair_name(),
                f: Some(r.f_statistic),
                df1: Some(r.df1),
                df2: Some(r.df2),
                p_value: Some(r.p_value),
                note: None,
            },
            Err(e) => ComparisonReportRow {
                model_pair: o.pair_name(),
                f: None,
                df1: None,
                df2: None,
                p_value: None,
                note: Some(e.to_string()),
            },
        })
        .collect()
}
