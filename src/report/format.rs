//! Formatted terminal output.
//!
//! Formatting lives here so the fitting code stays free of presentation and
//! output changes stay localized.

use crate::domain::{AnalysisConfig, Parameterization};
use crate::fit::grouped::SkipRecord;
use crate::io::ingest::IngestStats;
use crate::report::{ComparisonReportRow, GroupReport};

/// Run header: input, data summary and fit settings.
pub fn format_run_header(stats: &IngestStats, config: &AnalysisConfig) -> String {
    let mut out = String::new();

    out.push_str("=== tcurve - Hearing Threshold Growth Curves ===\n");
    out.push_str(&format!("Input: {}\n", config.csv_path.display()));
    out.push_str(&format!(
        "Data: n={} | subjects={} | domains={} | variants={} | age=[{:.1}, {:.1}]\n",
        stats.n_rows, stats.n_subjects, stats.n_domains, stats.n_variants, stats.age_min, stats.age_max
    ));
    out.push_str(&format!(
        "Model: {} | asymptote={:.1} dB | group by {:?}\n",
        config.model.display_name(),
        config.asymptote,
        config.group_key
    ));
    out.push_str(&format!(
        "Fit: starts={} | seed={} | min_obs={}\n",
        config.n_starts, config.seed, config.min_obs
    ));
    out
}

/// Per-group parameters and derived metrics, followed by skipped groups.
pub fn format_group_table(groups: &[GroupReport], skipped: &[SkipRecord]) -> String {
    let mut out = String::new();

    out.push_str("\nPer-group fits:\n");
    out.push_str(
        format!(
            "{:<16} {:<20} {:>10} {:>10} {:>10}\n",
            "group", "parameter", "estimate", "ci_low", "ci_high"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<16} {:-<20} {:->10} {:->10} {:->10}\n", "", "", "", "", "").trim_end());
    out.push('\n');

    for g in groups {
        for iv in &g.intervals {
            push_row(&mut out, &g.group, &iv.name, Some(iv.estimate), iv.ci_low, iv.ci_high);
        }
        for m in &g.derived {
            push_row(&mut out, &g.group, &m.name, m.estimate, m.ci_low, m.ci_high);
        }
        let at_bound = if g.fit.at_bound { " (at bound)" } else { "" };
        out.push_str(&format!(
            "{:<16} n={} rmse={:.3} starts={}/{}{at_bound}\n",
            "",
            g.fit.n_obs,
            g.fit.rmse(),
            g.fit.successful_starts,
            g.fit.total_starts
        ));
        if let Some(note) = &g.note {
            out.push_str(&format!("{:<16} note: {note}\n", ""));
        }
    }

    if !skipped.is_empty() {
        out.push_str("\nSkipped groups:\n");
        for s in skipped {
            out.push_str(&format!("  {} (n={}): {}\n", truncate(&s.group, 16), s.n_obs, s.reason));
        }
    }

    out
}

fn push_row(out: &mut String, group: &str, name: &str, est: Option<f64>, lo: Option<f64>, hi: Option<f64>) {
    out.push_str(
        format!(
            "{:<16} {:<20} {:>10} {:>10} {:>10}\n",
            truncate(group, 16),
            truncate(name, 20),
            fmt_opt(est),
            fmt_opt(lo),
            fmt_opt(hi)
        )
        .trim_end(),
    );
    out.push('\n');
}

/// Nested-model F-tests and the parameterization they support.
pub fn format_comparisons(rows: &[ComparisonReportRow], selected: Option<Parameterization>, alpha: f64) -> String {
    let mut out = String::new();

    out.push_str("\nNested model comparisons:\n");
    if rows.is_empty() {
        out.push_str("  (none: fewer than two groups were fitted)\n");
        return out;
    }
    for r in rows {
        match (r.f, r.df1, r.df2, r.p_value) {
            (Some(f), Some(df1), Some(df2), Some(p)) => {
                let star = if p < alpha { "*" } else { " " };
                out.push_str(&format!(
                    "{star} {:<40} F={f:>10.3} df=({df1}, {df2}) p={}\n",
                    r.model_pair,
                    fmt_p(p)
                ));
            }
            _ => {
                out.push_str(&format!(
                    "  {:<40} NA ({})\n",
                    r.model_pair,
                    r.note.as_deref().unwrap_or("unavailable")
                ));
            }
        }
    }
    match selected {
        Some(p) => out.push_str(&format!("Selected (alpha={alpha}): {}\n", p.name())),
        None => out.push_str("Selected: NA\n"),
    }
    out
}

pub(crate) fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{x:.4}"),
        _ => "NA".to_string(),
    }
}

fn fmt_p(p: f64) -> String {
    if p < 1e-4 { format!("{p:.2e}") } else { format!("{p:.4}") }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FitError;

    #[test]
    fn missing_values_print_as_na() {
        assert_eq!(fmt_opt(None), "NA");
        assert_eq!(fmt_opt(Some(f64::NAN)), "NA");
        assert_eq!(fmt_opt(Some(1.5)), "1.5000");
    }

    #[test]
    fn truncate_marks_cut_labels() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-label", 6), "a-ver.");
    }

    #[test]
    fn comparisons_show_selection_and_failures() {
        let rows = vec![
            ComparisonReportRow {
                model_pair: "shared vs group_midpoint".to_string(),
                f: Some(12.0),
                df1: Some(2),
                df2: Some(100),
                p_value: Some(1e-5),
                note: None,
            },
            ComparisonReportRow {
                model_pair: "group_midpoint vs group_scale_midpoint".to_string(),
                f: None,
                df1: None,
                df2: None,
                p_value: None,
                note: Some("no start converged".to_string()),
            },
        ];
        let text = format_comparisons(&rows, Some(Parameterization::GROUP_MIDPOINT), 0.05);
        assert!(text.contains("* shared vs group_midpoint"));
        assert!(text.contains("NA (no start converged)"));
        assert!(text.contains("Selected (alpha=0.05): group_midpoint"));
    }

    #[test]
    fn skipped_groups_are_listed() {
        let skipped = vec![SkipRecord {
            group: "tiny".to_string(),
            n_obs: 3,
            reason: FitError::InsufficientData { n: 3, required: 5 },
        }];
        let text = format_group_table(&[], &skipped);
        assert!(text.contains("tiny (n=3): insufficient data"));
    }
}
