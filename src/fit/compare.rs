//! Nested-model F-tests.
//!
//! For a simple model `s` nested in a complex model `c`, fitted to the same
//! observations:
//!
//! ```text
//! F = ((RSS_s − RSS_c) / (df_s − df_c)) / (RSS_c / df_c)
//! ```
//!
//! with `df = n − k` residual degrees of freedom, and the p-value is the
//! upper tail of `F(df_s − df_c, df_c)`.
//!
//! Nesting is checked from the parameterizations themselves, never inferred
//! from call order. A pair that fails a precondition yields an error for that
//! pair only.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::domain::{ComparisonResult, JointFit, Parameterization};
use crate::error::FitError;

/// Default significance level used when picking a model from the ladder.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Which pairs of the ladder are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonPlan {
    /// Each model against the next more complex one.
    Adjacent,
    /// Every nested pair.
    AllPairs,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FTest {
    pub f_statistic: f64,
    pub df1: usize,
    pub df2: usize,
    pub p_value: f64,
}

/// F-test from residual sums of squares and residual degrees of freedom.
pub fn f_test(rss_simple: f64, df_simple: usize, rss_complex: f64, df_complex: usize) -> Result<FTest, FitError> {
    if df_simple <= df_complex {
        return Err(FitError::Precondition(format!(
            "simple model must have more residual df ({df_simple}) than complex model ({df_complex})"
        )));
    }
    if df_complex == 0 {
        return Err(FitError::Degenerate("complex model has no residual degrees of freedom".to_string()));
    }
    if !(rss_simple.is_finite() && rss_complex.is_finite() && rss_simple >= 0.0) {
        return Err(FitError::Degenerate("non-finite residual sum of squares".to_string()));
    }
    if rss_complex <= 0.0 {
        return Err(FitError::Degenerate("complex model fits exactly (RSS = 0)".to_string()));
    }

    let df1 = df_simple - df_complex;
    let df2 = df_complex;
    // A nested model cannot fit better than its superset; tiny negative
    // differences are optimizer noise.
    let delta = (rss_simple - rss_complex).max(0.0);
    let f_statistic = (delta / df1 as f64) / (rss_complex / df2 as f64);

    let dist = FisherSnedecor::new(df1 as f64, df2 as f64)
        .map_err(|e| FitError::Degenerate(format!("F distribution: {e}")))?;
    let p_value = dist.sf(f_statistic).clamp(0.0, 1.0);

    Ok(FTest {
        f_statistic,
        df1,
        df2,
        p_value,
    })
}

/// Compare two joint fits after checking every precondition.
pub fn compare_nested(
    simple: Parameterization,
    simple_fit: Option<&JointFit>,
    complex: Parameterization,
    complex_fit: Option<&JointFit>,
) -> Result<ComparisonResult, FitError> {
    let s = simple_fit.ok_or_else(|| {
        FitError::Precondition(format!("model {} did not converge", simple.name()))
    })?;
    let c = complex_fit.ok_or_else(|| {
        FitError::Precondition(format!("model {} did not converge", complex.name()))
    })?;

    if s.parameterization != simple || c.parameterization != complex {
        return Err(FitError::Precondition("fit does not match its declared parameterization".to_string()));
    }
    if !simple.nests_in(complex) {
        return Err(FitError::Precondition(format!(
            "{} is not nested in {}",
            simple.name(),
            complex.name()
        )));
    }
    if s.groups != c.groups || s.fit.n_obs != c.fit.n_obs {
        return Err(FitError::Precondition("models were fitted to different data".to_string()));
    }
    let k_s = s.fit.estimates.len();
    let k_c = c.fit.estimates.len();
    if k_c <= k_s {
        return Err(FitError::Precondition(format!(
            "{} does not add parameters over {} for {} group(s)",
            complex.name(),
            simple.name(),
            s.groups.len()
        )));
    }

    let test = f_test(s.fit.rss, s.fit.df_resid, c.fit.rss, c.fit.df_resid)?;
    Ok(ComparisonResult {
        simple,
        complex,
        rss_simple: s.fit.rss,
        rss_complex: c.fit.rss,
        f_statistic: test.f_statistic,
        df1: test.df1,
        df2: test.df2,
        p_value: test.p_value,
    })
}

/// Outcome of one planned comparison.
#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub simple: Parameterization,
    pub complex: Parameterization,
    pub result: Result<ComparisonResult, FitError>,
}

impl ComparisonOutcome {
    pub fn pair_name(&self) -> String {
        format!("{} vs {}", self.simple.name(), self.complex.name())
    }
}

/// Run the planned comparisons, ordered from simplest to most complex.
///
/// `fits` may come in any order; it is sorted by parameter count first.
pub fn compare_ladder(
    fits: &[(Parameterization, Result<JointFit, FitError>)],
    n_groups: usize,
    plan: ComparisonPlan,
) -> Vec<ComparisonOutcome> {
    let mut ordered: Vec<(Parameterization, Option<&JointFit>)> =
        fits.iter().map(|(p, r)| (*p, r.as_ref().ok())).collect();
    ordered.sort_by_key(|(p, _)| p.param_count(n_groups));

    let mut out = Vec::new();
    for i in 0..ordered.len() {
        let partners: Vec<usize> = match plan {
            ComparisonPlan::Adjacent => (i + 1..ordered.len().min(i + 2)).collect(),
            ComparisonPlan::AllPairs => (i + 1..ordered.len()).collect(),
        };
        for j in partners {
            let (sp, sf) = ordered[i];
            let (cp, cf) = ordered[j];
            if plan == ComparisonPlan::AllPairs && !sp.nests_in(cp) {
                continue;
            }
            out.push(ComparisonOutcome {
                simple: sp,
                complex: cp,
                result: compare_nested(sp, sf, cp, cf),
            });
        }
    }
    out
}

/// Walk the ladder from the simplest model and step up while the next
/// comparison is significant at `alpha`. Returns `None` if the first
/// comparison is unavailable.
pub fn select_parameterization(outcomes: &[ComparisonOutcome], alpha: f64) -> Option<Parameterization> {
    let first = outcomes.first()?;
    let mut chosen = first.simple;
    for outcome in outcomes {
        if outcome.simple != chosen {
            continue;
        }
        match &outcome.result {
            Ok(r) if r.p_value < alpha => chosen = outcome.complex,
            Ok(_) => break,
            Err(_) => return None,
        }
    }
    Some(chosen)
}
