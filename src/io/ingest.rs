//! CSV ingest and validation.
//!
//! Turns a longitudinal threshold CSV into a [`Dataset`] that is safe to fit.
//!
//! - Required columns: `subject_id, domain_label, variant_label, age, threshold`
//!   (headers are case-insensitive, a UTF-8 BOM is tolerated)
//! - Any malformed row aborts ingestion with its 1-based line number
//! - Every variant must map to exactly one domain, either as observed in the
//!   data or as declared in an optional `variant_label, domain_label` file

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use log::{debug, info};

use crate::domain::{Dataset, Observation};
use crate::error::FitError;

/// Lowest plausible audiometric threshold (dB HL).
pub const THRESHOLD_MIN: f64 = -10.0;
/// Highest plausible audiometric threshold (dB HL).
pub const THRESHOLD_MAX: f64 = 130.0;

const REQUIRED_COLUMNS: [&str; 5] = ["subject_id", "domain_label", "variant_label", "age", "threshold"];

/// Summary of what was read.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestStats {
    pub n_rows: usize,
    pub n_subjects: usize,
    pub n_domains: usize,
    pub n_variants: usize,
    pub age_min: f64,
    pub age_max: f64,
}

#[derive(Debug, Clone)]
pub struct IngestedData {
    pub dataset: Dataset,
    /// Resolved variant → domain mapping.
    pub variant_domains: BTreeMap<String, String>,
    pub stats: IngestStats,
}

fn ingest_error(line: usize, message: impl Into<String>) -> FitError {
    FitError::Ingest {
        line,
        message: message.into(),
    }
}

/// Load observations from `csv_path`, validating against `mapping_path` if given.
pub fn load_observations(csv_path: &Path, mapping_path: Option<&Path>) -> Result<IngestedData, FitError> {
    let mapping = match mapping_path {
        Some(p) => Some(load_variant_mapping(p)?),
        None => None,
    };

    let file = File::open(csv_path)
        .map_err(|e| ingest_error(0, format!("failed to open CSV '{}': {e}", csv_path.display())))?;
    let label = csv_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cohort".to_string());

    let data = read_observations(file, &label, mapping.as_ref())?;
    info!(
        "Read {} observations ({} subjects, {} domains, {} variants) from {}",
        data.stats.n_rows,
        data.stats.n_subjects,
        data.stats.n_domains,
        data.stats.n_variants,
        csv_path.display()
    );
    Ok(data)
}

/// Parse observations from any reader.
pub fn read_observations<R: Read>(
    reader: R,
    label: &str,
    mapping: Option<&BTreeMap<String, String>>,
) -> Result<IngestedData, FitError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| ingest_error(1, format!("failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    for col in REQUIRED_COLUMNS {
        if !header_map.contains_key(col) {
            return Err(ingest_error(1, format!("missing required column: `{col}`")));
        }
    }

    let mut observations = Vec::new();
    // variant -> (domain, first line seen)
    let mut seen: BTreeMap<String, (String, usize)> = BTreeMap::new();

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let record = result.map_err(|e| ingest_error(line, format!("CSV parse error: {e}")))?;
        let obs = parse_row(&record, &header_map).map_err(|m| ingest_error(line, m))?;

        if let Some(map) = mapping {
            match map.get(&obs.variant_label) {
                None => {
                    return Err(ingest_error(
                        line,
                        format!("variant `{}` is not in the mapping file", obs.variant_label),
                    ));
                }
                Some(d) if *d != obs.domain_label => {
                    return Err(ingest_error(
                        line,
                        format!(
                            "variant `{}` is mapped to domain `{d}` but row says `{}`",
                            obs.variant_label, obs.domain_label
                        ),
                    ));
                }
                Some(_) => {}
            }
        }

        match seen.get(&obs.variant_label) {
            Some((domain, first)) if *domain != obs.domain_label => {
                return Err(ingest_error(
                    line,
                    format!(
                        "variant `{}` has domain `{}` here but `{domain}` at line {first}",
                        obs.variant_label, obs.domain_label
                    ),
                ));
            }
            Some(_) => {}
            None => {
                seen.insert(obs.variant_label.clone(), (obs.domain_label.clone(), line));
            }
        }

        observations.push(obs);
    }

    if observations.is_empty() {
        return Err(ingest_error(1, "CSV contains no observations"));
    }

    let variant_domains: BTreeMap<String, String> = seen.into_iter().map(|(v, (d, _))| (v, d)).collect();
    let dataset = Dataset::new(label, observations);
    let stats = compute_stats(&dataset, &variant_domains);
    debug!("ingest stats: {stats:?}");

    Ok(IngestedData {
        dataset,
        variant_domains,
        stats,
    })
}

/// Load a `variant_label, domain_label` mapping file.
pub fn load_variant_mapping(path: &Path) -> Result<BTreeMap<String, String>, FitError> {
    let file = File::open(path)
        .map_err(|e| ingest_error(0, format!("failed to open mapping '{}': {e}", path.display())))?;
    read_variant_mapping(file)
}

pub fn read_variant_mapping<R: Read>(reader: R) -> Result<BTreeMap<String, String>, FitError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| ingest_error(1, format!("failed to read mapping headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let mut out = BTreeMap::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| ingest_error(line, format!("mapping parse error: {e}")))?;
        let variant = get_required(&record, &header_map, "variant_label").map_err(|m| ingest_error(line, m))?;
        let domain = get_required(&record, &header_map, "domain_label").map_err(|m| ingest_error(line, m))?;
        if let Some(prev) = out.insert(variant.to_string(), domain.to_string()) {
            if prev != domain {
                return Err(ingest_error(
                    line,
                    format!("variant `{variant}` is mapped to both `{prev}` and `{domain}`"),
                ));
            }
        }
    }
    Ok(out)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<Observation, String> {
    let subject_id = get_required(record, header_map, "subject_id")?.to_string();
    let domain_label = get_required(record, header_map, "domain_label")?.to_string();
    let variant_label = get_required(record, header_map, "variant_label")?.to_string();
    let age = parse_f64(get_required(record, header_map, "age")?, "age")?;
    let threshold = parse_f64(get_required(record, header_map, "threshold")?, "threshold")?;

    if age < 0.0 {
        return Err(format!("`age` must be >= 0 (got {age})"));
    }
    if !(THRESHOLD_MIN..=THRESHOLD_MAX).contains(&threshold) {
        return Err(format!(
            "`threshold` {threshold} outside [{THRESHOLD_MIN}, {THRESHOLD_MAX}] dB"
        ));
    }

    Ok(Observation {
        subject_id,
        domain_label,
        variant_label,
        age,
        threshold,
    })
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing required value: `{name}`"))
}

fn parse_f64(s: &str, name: &str) -> Result<f64, String> {
    let v = s
        .parse::<f64>()
        .map_err(|_| format!("invalid `{name}` value '{s}'"))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("non-finite `{name}` value '{s}'"))
    }
}

fn compute_stats(dataset: &Dataset, variant_domains: &BTreeMap<String, String>) -> IngestStats {
    let domains: BTreeSet<&str> = variant_domains.values().map(String::as_str).collect();
    let (age_min, age_max) = dataset.age_range().unwrap_or((f64::NAN, f64::NAN));
    IngestStats {
        n_rows: dataset.len(),
        n_subjects: dataset.n_subjects(),
        n_domains: domains.len(),
        n_variants: variant_domains.len(),
        age_min,
        age_max,
    }
}
