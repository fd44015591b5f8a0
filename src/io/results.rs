//! Read/write the JSON run bundle.
//!
//! The bundle is the portable record of one analysis: settings that affect
//! the numbers, every per-group fit with intervals and derived metrics, the
//! skipped groups, the joint fits and their comparisons. An external
//! presenter can render tables or figures from it without refitting.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{GroupKey, JointFit, ModelKind, Parameterization};
use crate::error::AppError;
use crate::fit::grouped::SkipSummary;
use crate::report::{ComparisonReportRow, GroupReport};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunBundle {
    pub tool: String,
    pub version: String,
    pub input: String,
    pub group_key: GroupKey,
    pub model: ModelKind,
    pub asymptote: f64,
    pub seed: u64,
    pub n_starts: usize,
    pub min_obs: usize,
    pub groups: Vec<GroupReport>,
    pub skipped: Vec<SkipSummary>,
    pub joint_fits: Vec<JointFit>,
    pub comparisons: Vec<ComparisonReportRow>,
    pub selected: Option<Parameterization>,
}

pub fn write_run_bundle(path: &Path, bundle: &RunBundle) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create results JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, bundle)
        .map_err(|e| AppError::new(2, format!("Failed to write results JSON: {e}")))?;
    Ok(())
}

pub fn read_run_bundle(path: &Path) -> Result<RunBundle, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open results JSON '{}': {e}", path.display())))?;
    let bundle: RunBundle =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid results JSON: {e}")))?;
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let bundle = RunBundle {
            tool: "tcurve".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            input: "cohort.csv".to_string(),
            group_key: GroupKey::Domain,
            model: ModelKind::Logistic2,
            asymptote: 130.0,
            seed: 42,
            n_starts: 500,
            min_obs: 5,
            groups: Vec::new(),
            skipped: vec![SkipSummary {
                group: "tiny".to_string(),
                n_obs: 2,
                reason: "insufficient data".to_string(),
            }],
            joint_fits: Vec::new(),
            comparisons: Vec::new(),
            selected: Some(Parameterization::GROUP_MIDPOINT),
        };
        write_run_bundle(&path, &bundle).unwrap();
        let back = read_run_bundle(&path).unwrap();
        assert_eq!(back.skipped, bundle.skipped);
        assert_eq!(back.selected, Some(Parameterization::GROUP_MIDPOINT));
        assert_eq!(back.group_key, GroupKey::Domain);
    }

    #[test]
    fn garbage_json_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = read_run_bundle(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
