//! Merging per-report metric files into a dense per-exchange view.
//!
//! Each report directory contains one or more JSON files named
//! `ci-results-<exchange>-<trading_mode>-*`, each holding
//! `timerange -> metric -> value`. The merge flattens these into
//! `timerange -> metric -> report name -> trading mode -> value`, filling
//! every hole with the literal string `"n/a"` so rendering never has to
//! special-case missing data.

use anyhow::{Context, Result};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::manifest::Manifest;

/// timerange -> metric -> value, as found in a single result file.
type ReportResults = BTreeMap<String, BTreeMap<String, Value>>;

/// Merged view of all reports for one exchange.
#[derive(Debug, Default)]
pub struct ExchangeResults {
    /// report name -> commit SHA, straight from the manifest.
    pub names: BTreeMap<String, String>,
    /// timerange -> metric -> report name -> trading mode -> value.
    pub timeranges: BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, Value>>>>,
}

pub type MergedResults = BTreeMap<String, ExchangeResults>;

/// Presentation order for report columns: `Current` first, then `Previous`,
/// then everything else in reverse-alphabetical order.
pub fn sorted_report_names(names: &BTreeMap<String, String>) -> Vec<String> {
    fn rank(name: &str) -> u8 {
        match name {
            "Current" => 0,
            "Previous" => 1,
            _ => 2,
        }
    }

    let mut sorted: Vec<String> = names.keys().cloned().collect();
    sorted.sort_by(|a, b| match rank(a).cmp(&rank(b)) {
        Ordering::Equal => b.cmp(a),
        other => other,
    });
    sorted
}

/// Read and merge every report named by the manifest. Paths in the manifest
/// are resolved relative to `base_dir` unless absolute.
pub fn merge_reports(manifest: &Manifest, base_dir: &Path) -> Result<MergedResults> {
    let mut merged = MergedResults::new();

    for (exchange, modes) in manifest {
        let mut entry = ExchangeResults::default();

        // mode -> report name -> raw results
        let mut raw: BTreeMap<&str, BTreeMap<&str, ReportResults>> = BTreeMap::new();
        let mut timeranges: BTreeSet<String> = BTreeSet::new();
        let mut keys: BTreeSet<String> = BTreeSet::new();

        for (mode, reports) in modes {
            for (name, source) in reports {
                entry.names.insert(name.clone(), source.sha.clone());

                let report_dir = if source.path.is_absolute() {
                    source.path.clone()
                } else {
                    base_dir.join(&source.path)
                };

                let prefix = format!("ci-results-{}-{}-", exchange, mode);
                let results = load_report_results(&report_dir, &prefix)?;

                for (timerange, metrics) in &results {
                    timeranges.insert(timerange.clone());
                    keys.extend(metrics.keys().cloned());
                }
                raw.entry(mode.as_str())
                    .or_default()
                    .insert(name.as_str(), results);
            }
        }

        // Dense view over the union of timeranges and metric keys.
        for timerange in &timeranges {
            let tr_entry = entry.timeranges.entry(timerange.clone()).or_default();
            for key in &keys {
                let key_entry = tr_entry.entry(key.clone()).or_default();
                for (mode, reports) in modes {
                    for name in reports.keys() {
                        let value = raw
                            .get(mode.as_str())
                            .and_then(|by_name| by_name.get(name.as_str()))
                            .and_then(|results| results.get(timerange))
                            .and_then(|metrics| metrics.get(key))
                            .cloned()
                            .unwrap_or_else(|| Value::String("n/a".to_string()));
                        key_entry
                            .entry(name.clone())
                            .or_default()
                            .insert(mode.clone(), value);
                    }
                }
            }
        }

        merged.insert(exchange.clone(), entry);
    }

    Ok(merged)
}

/// Load and merge all matching result files under one report directory.
/// Later files overwrite earlier ones per timerange key.
fn load_report_results(report_dir: &Path, prefix: &str) -> Result<ReportResults> {
    let mut files = Vec::new();
    collect_result_files(report_dir, prefix, &mut files)?;
    files.sort();

    let mut results = ReportResults::new();
    for file in files {
        let text = fs::read_to_string(&file)
            .with_context(|| format!("Failed to read results file {}", file.display()))?;
        let parsed: ReportResults = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse results file {}", file.display()))?;
        for (timerange, metrics) in parsed {
            results.insert(timerange, metrics);
        }
    }
    Ok(results)
}

fn collect_result_files(dir: &Path, prefix: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        warn!("Report path {} does not exist, skipping", dir.display());
        return Ok(());
    }

    for dir_entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?
    {
        let path = dir_entry
            .with_context(|| format!("Failed to read entry in {}", dir.display()))?
            .path();
        if path.is_dir() {
            collect_result_files(&path, prefix, out)?;
        } else if path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.starts_with(prefix))
        {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names_of(entries: &[&str]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|name| (name.to_string(), "sha".to_string()))
            .collect()
    }

    #[test]
    fn current_and_previous_lead_the_column_order() {
        let names = names_of(&["alpha", "Previous", "release-1", "Current"]);
        assert_eq!(
            sorted_report_names(&names),
            vec!["Current", "Previous", "release-1", "alpha"]
        );
    }

    #[test]
    fn other_names_sort_reverse_alphabetically() {
        let names = names_of(&["a", "c", "b"]);
        assert_eq!(sorted_report_names(&names), vec!["c", "b", "a"]);
    }
}
