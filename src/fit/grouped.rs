//! Independent per-group fits.
//!
//! The cohort is split by a grouping key and every partition is fitted on
//! its own (in parallel). A partition that is too small, degenerate, or on
//! which every start fails is recorded as skipped; it never aborts the
//! others.

use std::collections::BTreeMap;

use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{Dataset, FitResult, GroupKey};
use crate::error::FitError;
use crate::fit::multistart::{FitSettings, fit_dataset};
use crate::models::SigmoidModel;

/// A partition that produced no fit, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkipRecord {
    pub group: String,
    pub n_obs: usize,
    pub reason: FitError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipSummary {
    pub group: String,
    pub n_obs: usize,
    pub reason: String,
}

impl From<&SkipRecord> for SkipSummary {
    fn from(rec: &SkipRecord) -> Self {
        Self {
            group: rec.group.clone(),
            n_obs: rec.n_obs,
            reason: rec.reason.to_string(),
        }
    }
}

/// Per-group fits (partial: not every group needs to succeed).
#[derive(Debug, Clone, Default)]
pub struct GroupedFits {
    pub fits: BTreeMap<String, FitResult>,
    pub skipped: Vec<SkipRecord>,
}

impl GroupedFits {
    pub fn fitted_groups(&self) -> Vec<String> {
        self.fits.keys().cloned().collect()
    }
}

/// Seed for one group, stable under adding or removing other groups.
///
/// FNV-1a (64-bit) over the label bytes, XORed into the run seed and
/// finished with splitmix64. The mix is fixed so seeds agree across builds.
pub fn group_seed(run_seed: u64, label: &str) -> u64 {
    let label_hash = label
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3));
    splitmix64(run_seed ^ label_hash)
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Partition `dataset` by `key` and fit every partition.
pub fn fit_groups(
    dataset: &Dataset,
    key: GroupKey,
    model: &SigmoidModel,
    settings: &FitSettings,
    seed: u64,
) -> Result<GroupedFits, FitError> {
    settings.validate()?;
    let partitions = dataset.partition(key);
    Ok(fit_partitions(&partitions, model, settings, seed))
}

/// Fit an explicit group → dataset mapping.
pub fn fit_partitions(
    partitions: &BTreeMap<String, Dataset>,
    model: &SigmoidModel,
    settings: &FitSettings,
    seed: u64,
) -> GroupedFits {
    let outcomes: Vec<(String, usize, Result<FitResult, FitError>)> = partitions
        .par_iter()
        .map(|(label, ds)| {
            let outcome = fit_dataset(ds, model, settings, group_seed(seed, label));
            (label.clone(), ds.len(), outcome)
        })
        .collect();

    let mut out = GroupedFits::default();
    for (group, n_obs, outcome) in outcomes {
        match outcome {
            Ok(fit) => {
                debug!("{group}: fitted n={n_obs} rss={:.3}", fit.rss);
                out.fits.insert(group, fit);
            }
            Err(reason) => {
                warn!("{group}: skipped (n={n_obs}): {reason}");
                out.skipped.push(SkipRecord { group, n_obs, reason });
            }
        }
    }
    out.skipped.sort_by(|a, b| a.group.cmp(&b.group));
    out
}
