//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to CSV/JSON reports
//! - handed to an external presentation layer as-is

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which label partitions the cohort into independently fitted groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GroupKey {
    /// Aggregate all variants of a domain.
    Domain,
    /// One partition per variant.
    Variant,
}

impl GroupKey {
    pub fn label_of<'a>(self, obs: &'a Observation) -> &'a str {
        match self {
            GroupKey::Domain => &obs.domain_label,
            GroupKey::Variant => &obs.variant_label,
        }
    }
}

/// Sigmoid model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// `A / (1 + exp(-scale·(age − midpoint)))` with a fixed asymptote `A`.
    Logistic2,
    /// Same curve with `A` estimated from the data.
    Logistic3,
}

impl ModelKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Logistic2 => "logistic (fixed asymptote)",
            ModelKind::Logistic3 => "logistic (free asymptote)",
        }
    }

    pub fn param_count(self) -> usize {
        self.param_names().len()
    }

    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            ModelKind::Logistic2 => &["scale", "midpoint"],
            ModelKind::Logistic3 => &["scale", "midpoint", "asymptote"],
        }
    }
}

/// One threshold measurement of one subject at one age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub subject_id: String,
    pub domain_label: String,
    pub variant_label: String,
    /// Age in years (≥ 0).
    pub age: f64,
    /// Hearing threshold in dB.
    pub threshold: f64,
}

/// An ordered collection of observations sharing a partition key.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub label: String,
    pub observations: Vec<Observation>,
}

impl Dataset {
    pub fn new(label: impl Into<String>, observations: Vec<Observation>) -> Self {
        Self {
            label: label.into(),
            observations,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn ages(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.age).collect()
    }

    pub fn thresholds(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.threshold).collect()
    }

    /// Split into one dataset per label, keeping the original row order inside
    /// each partition. Labels come back sorted.
    pub fn partition(&self, key: GroupKey) -> BTreeMap<String, Dataset> {
        let mut out: BTreeMap<String, Dataset> = BTreeMap::new();
        for obs in &self.observations {
            let label = key.label_of(obs);
            out.entry(label.to_string())
                .or_insert_with(|| Dataset::new(label, Vec::new()))
                .observations
                .push(obs.clone());
        }
        out
    }

    /// Longitudinal series per subject, each ordered by age.
    pub fn subject_series(&self) -> BTreeMap<&str, Vec<&Observation>> {
        let mut out: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();
        for obs in &self.observations {
            out.entry(obs.subject_id.as_str()).or_default().push(obs);
        }
        for series in out.values_mut() {
            series.sort_by(|a, b| a.age.total_cmp(&b.age));
        }
        out
    }

    pub fn n_subjects(&self) -> usize {
        self.subject_series().len()
    }

    pub fn age_range(&self) -> Option<(f64, f64)> {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for obs in &self.observations {
            lo = lo.min(obs.age);
            hi = hi.max(obs.age);
        }
        if lo.is_finite() && hi.is_finite() { Some((lo, hi)) } else { None }
    }
}

/// Output of one converged fit. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Label of the dataset the fit was computed on.
    pub dataset: String,
    pub model: ModelKind,
    /// Asymptote used by the curve (fixed value, or the estimate for `Logistic3`).
    pub asymptote: f64,
    pub param_names: Vec<String>,
    pub estimates: Vec<f64>,
    /// `s²·(JᵀJ)⁻¹` at the optimum; `None` when not positive definite.
    pub covariance: Option<Vec<Vec<f64>>>,
    pub rss: f64,
    pub n_obs: usize,
    pub df_resid: usize,
    pub iterations: usize,
    pub successful_starts: usize,
    pub total_starts: usize,
    /// Whether any estimate sits on a hard lower bound.
    pub at_bound: bool,
}

impl FitResult {
    pub fn scale(&self) -> f64 {
        self.estimates[0]
    }

    pub fn midpoint(&self) -> f64 {
        self.estimates[1]
    }

    pub fn rmse(&self) -> f64 {
        if self.n_obs == 0 {
            return f64::NAN;
        }
        (self.rss / self.n_obs as f64).sqrt()
    }
}

/// Point estimate and 95% interval for one fitted parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamInterval {
    pub name: String,
    pub estimate: f64,
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
}

/// A clinically interpretable quantity derived from fitted parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetric {
    pub name: String,
    /// `None` when the transform is undefined at the point estimate.
    pub estimate: Option<f64>,
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
}

/// Whether a curve parameter is common to all groups or estimated per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sharing {
    Shared,
    PerGroup,
}

impl Sharing {
    pub fn width(self, n_groups: usize) -> usize {
        match self {
            Sharing::Shared => 1,
            Sharing::PerGroup => n_groups,
        }
    }
}

/// How the two curve parameters are tied across groups in a joint fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameterization {
    pub scale: Sharing,
    pub midpoint: Sharing,
}

impl Parameterization {
    pub const SHARED: Parameterization = Parameterization {
        scale: Sharing::Shared,
        midpoint: Sharing::Shared,
    };
    pub const GROUP_MIDPOINT: Parameterization = Parameterization {
        scale: Sharing::Shared,
        midpoint: Sharing::PerGroup,
    };
    pub const GROUP_SCALE_MIDPOINT: Parameterization = Parameterization {
        scale: Sharing::PerGroup,
        midpoint: Sharing::PerGroup,
    };

    /// Standard comparison ladder, simplest first.
    pub const LADDER: [Parameterization; 3] = [
        Parameterization::SHARED,
        Parameterization::GROUP_MIDPOINT,
        Parameterization::GROUP_SCALE_MIDPOINT,
    ];

    pub fn param_count(self, n_groups: usize) -> usize {
        self.scale.width(n_groups) + self.midpoint.width(n_groups)
    }

    /// Whether `self` is a strict restriction of `other`.
    pub fn nests_in(self, other: Parameterization) -> bool {
        self.scale <= other.scale && self.midpoint <= other.midpoint && self != other
    }

    pub fn name(self) -> &'static str {
        match (self.scale, self.midpoint) {
            (Sharing::Shared, Sharing::Shared) => "shared",
            (Sharing::Shared, Sharing::PerGroup) => "group_midpoint",
            (Sharing::PerGroup, Sharing::Shared) => "group_scale",
            (Sharing::PerGroup, Sharing::PerGroup) => "group_scale_midpoint",
        }
    }
}

/// A joint fit of one parameterization to the pooled dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointFit {
    pub parameterization: Parameterization,
    pub groups: Vec<String>,
    pub fit: FitResult,
}

/// F-test between two nested joint fits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub simple: Parameterization,
    pub complex: Parameterization,
    pub rss_simple: f64,
    pub rss_complex: f64,
    pub f_statistic: f64,
    /// `df_simple − df_complex`.
    pub df1: usize,
    /// `df_complex` (residual degrees of freedom of the larger model).
    pub df2: usize,
    pub p_value: f64,
}

impl ComparisonResult {
    pub fn pair_name(&self) -> String {
        format!("{} vs {}", self.simple.name(), self.complex.name())
    }
}

/// Everything needed to run one analysis, derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub csv_path: PathBuf,
    pub mapping_path: Option<PathBuf>,
    pub group_key: GroupKey,
    pub model: ModelKind,
    /// Fixed asymptote for `Logistic2` (dB).
    pub asymptote: f64,
    /// Clinical thresholds (dB) at which onset ages are reported.
    pub onset_thresholds: Vec<f64>,
    pub min_obs: usize,
    pub n_starts: usize,
    pub seed: u64,
    pub max_iterations: usize,
    pub scale_start: (f64, f64),
    /// `None` samples midpoints from the observed age range.
    pub midpoint_start: Option<(f64, f64)>,
    pub compare: bool,
    /// Compare every nested pair instead of adjacent ladder steps only.
    pub all_pairs: bool,
    /// Significance level for stepping up the ladder.
    pub alpha: f64,
    pub threads: Option<usize>,
    pub export_params: Option<PathBuf>,
    pub export_comparisons: Option<PathBuf>,
    pub export_json: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(subject: &str, domain: &str, variant: &str, age: f64) -> Observation {
        Observation {
            subject_id: subject.to_string(),
            domain_label: domain.to_string(),
            variant_label: variant.to_string(),
            age,
            threshold: 30.0,
        }
    }

    #[test]
    fn partition_by_domain_aggregates_variants() {
        let ds = Dataset::new(
            "all",
            vec![
                obs("s1", "D1", "v1", 10.0),
                obs("s2", "D1", "v2", 20.0),
                obs("s3", "D2", "v3", 30.0),
            ],
        );
        let by_domain = ds.partition(GroupKey::Domain);
        assert_eq!(by_domain.len(), 2);
        assert_eq!(by_domain["D1"].len(), 2);
        let by_variant = ds.partition(GroupKey::Variant);
        assert_eq!(by_variant.len(), 3);
    }

    #[test]
    fn subject_series_is_age_ordered() {
        let ds = Dataset::new(
            "all",
            vec![obs("s1", "D", "v", 40.0), obs("s1", "D", "v", 12.0), obs("s2", "D", "v", 5.0)],
        );
        let series = ds.subject_series();
        assert_eq!(ds.n_subjects(), 2);
        let ages: Vec<f64> = series["s1"].iter().map(|o| o.age).collect();
        assert_eq!(ages, vec![12.0, 40.0]);
    }

    #[test]
    fn ladder_is_strictly_nested() {
        let [a, b, c] = Parameterization::LADDER;
        assert!(a.nests_in(b));
        assert!(b.nests_in(c));
        assert!(a.nests_in(c));
        assert!(!c.nests_in(b));
        assert!(!b.nests_in(b));
        assert_eq!(c.param_count(3), 6);
        assert_eq!(b.param_count(3), 4);
    }
}
