//! Export report tables to CSV.
//!
//! Missing values are written as `NA` so downstream readers can tell "not
//! estimable" apart from an empty cell.

use std::fs::File;
use std::path::Path;

use crate::domain::Dataset;
use crate::error::AppError;
use crate::report::{ComparisonReportRow, ParamReportRow};

fn na(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{x:.10}"),
        _ => "NA".to_string(),
    }
}

fn create(path: &Path) -> Result<csv::Writer<File>, AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    Ok(csv::Writer::from_writer(file))
}

fn write_err(e: csv::Error) -> AppError {
    AppError::new(2, format!("Failed to write export CSV: {e}"))
}

/// Write the parameter report: `group, parameter_name, point_estimate, ci_low, ci_high`.
pub fn write_param_report_csv(path: &Path, rows: &[ParamReportRow]) -> Result<(), AppError> {
    let mut w = create(path)?;
    w.write_record(["group", "parameter_name", "point_estimate", "ci_low", "ci_high"])
        .map_err(write_err)?;
    for r in rows {
        w.write_record([
            r.group.clone(),
            r.parameter_name.clone(),
            na(r.point_estimate),
            na(r.ci_low),
            na(r.ci_high),
        ])
        .map_err(write_err)?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

/// Write the comparison report: `model_pair, F, df1, df2, p_value`.
pub fn write_comparison_csv(path: &Path, rows: &[ComparisonReportRow]) -> Result<(), AppError> {
    let mut w = create(path)?;
    w.write_record(["model_pair", "F", "df1", "df2", "p_value"])
        .map_err(write_err)?;
    for r in rows {
        let df = |d: Option<usize>| d.map(|x| x.to_string()).unwrap_or_else(|| "NA".to_string());
        w.write_record([r.model_pair.clone(), na(r.f), df(r.df1), df(r.df2), na(r.p_value)])
            .map_err(write_err)?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

/// Write observations in the ingest schema (used by `tcurve simulate`).
pub fn write_observations_csv(path: &Path, dataset: &Dataset) -> Result<(), AppError> {
    let mut w = create(path)?;
    for obs in &dataset.observations {
        w.serialize(obs).map_err(write_err)?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_report_writes_na_for_missing_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.csv");
        let rows = vec![ParamReportRow {
            group: "D1, left ear".to_string(),
            parameter_name: "onset_age_70db".to_string(),
            point_estimate: Some(61.25),
            ci_low: None,
            ci_high: Some(70.0),
        }];
        write_param_report_csv(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("group,parameter_name,point_estimate,ci_low,ci_high"));
        assert_eq!(
            lines.next(),
            Some("\"D1, left ear\",onset_age_70db,61.2500000000,NA,70.0000000000")
        );
    }

    #[test]
    fn comparison_report_has_expected_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmp.csv");
        let rows = vec![ComparisonReportRow {
            model_pair: "shared vs group_midpoint".to_string(),
            f: None,
            df1: None,
            df2: None,
            p_value: None,
            note: Some("failed".to_string()),
        }];
        write_comparison_csv(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "model_pair,F,df1,df2,p_value\nshared vs group_midpoint,NA,NA,NA,NA\n");
    }
}
