use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Write-once record of a single trial; the unit of resumability. Identity
/// for duplicate detection is (context_length, depth_percent, version,
/// model) with exact float equality on the depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub model: String,
    pub context_length: usize,
    pub depth_percent: f64,
    pub version: u32,
    pub needle: String,
    pub model_response: String,
    pub score: f64,
    pub test_duration_seconds: f64,
    pub test_timestamp_utc: String,
}

/// One JSON file per trial under `<root>/<namespace>/`.
#[derive(Debug)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scans every record in the namespace for an exact identity match. A
    /// truncated record from an interrupted save must not block the sweep,
    /// so unreadable or unparsable files count as absent.
    pub fn exists(
        &self,
        namespace: &str,
        context_length: usize,
        depth_percent: f64,
        version: u32,
        model: &str,
    ) -> Result<bool> {
        let dir = self.root.join(namespace);
        if !dir.is_dir() {
            return Ok(false);
        }
        for entry in fs::read_dir(&dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            let record: TrialResult = match serde_json::from_str(&raw) {
                Ok(record) => record,
                Err(_) => continue,
            };
            if record.context_length == context_length
                && record.depth_percent == depth_percent
                && record.version == version
                && record.model == model
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn save(
        &self,
        namespace: &str,
        model_version: &str,
        result: &TrialResult,
    ) -> Result<PathBuf> {
        let dir = self.root.join(namespace);
        fs::create_dir_all(&dir)?;
        let stem = record_stem(model_version, result.context_length, result.depth_percent);
        let path = dir.join(format!("{stem}_results.json"));
        fs::write(&path, serde_json::to_string(result)?)?;
        Ok(path)
    }

    /// Audit copy of the assembled context, written beside the result.
    pub fn save_context(
        &self,
        namespace: &str,
        model_version: &str,
        context_length: usize,
        depth_percent: f64,
        context: &str,
    ) -> Result<PathBuf> {
        let dir = self.root.join(namespace);
        fs::create_dir_all(&dir)?;
        let stem = record_stem(model_version, context_length, depth_percent);
        let path = dir.join(format!("{stem}_context.txt"));
        fs::write(&path, context)?;
        Ok(path)
    }
}

fn record_stem(model_version: &str, context_length: usize, depth_percent: f64) -> String {
    format!(
        "{}_len_{}_depth_{}",
        model_version.replace('.', "_"),
        context_length,
        (depth_percent * 100.0).round() as i64
    )
}
