//! Reports manifest loading.
//!
//! The CI pipeline drops a `reports-info.json` next to the extracted
//! artifacts, mapping exchange -> trading mode -> report name -> source.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a single report's result files live, plus the commit they were
/// produced from.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportSource {
    pub path: PathBuf,
    pub sha: String,
}

/// exchange -> trading mode -> report name -> source.
///
/// BTreeMap keeps exchange iteration sorted, which fixes the order comments
/// are posted in.
pub type Manifest = BTreeMap<String, BTreeMap<String, BTreeMap<String, ReportSource>>>;

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_manifest() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"binance": {{"spot": {{"Current": {{"path": "current", "sha": "abc123"}}}}}}}}"#
        )
        .unwrap();

        let manifest = load_manifest(file.path()).unwrap();
        let source = &manifest["binance"]["spot"]["Current"];
        assert_eq!(source.sha, "abc123");
        assert_eq!(source.path, PathBuf::from("current"));
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let err = load_manifest(Path::new("/nonexistent/reports-info.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read manifest"));
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = load_manifest(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse manifest"));
    }
}
