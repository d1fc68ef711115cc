use std::path::PathBuf;

use anyhow::{Context, Result};
use settle_core::RunId;

use crate::report::BuildReport;

/// Keeps one directory per run under `root` with the JSON and text reports.
#[derive(Clone)]
pub struct ReportStore {
    pub root: PathBuf,
}

impl ReportStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id.as_str())
    }

    /// Returns the run directory.
    pub fn write(&self, report: &BuildReport) -> Result<PathBuf> {
        let dir = self.run_dir(&report.run_id);
        std::fs::create_dir_all(&dir).with_context(|| format!("create run dir {}", dir.display()))?;

        let json = dir.join("build_report.json");
        let bytes = serde_json::to_vec_pretty(report)?;
        std::fs::write(&json, bytes).with_context(|| format!("write report {}", json.display()))?;

        let text = dir.join("build_report.txt");
        std::fs::write(&text, report.render_human()).with_context(|| format!("write report {}", text.display()))?;
        Ok(dir)
    }

    pub fn read_json(&self, run_id: &RunId) -> Result<serde_json::Value> {
        let path = self.run_dir(run_id).join("build_report.json");
        let bytes = std::fs::read(&path).with_context(|| format!("read report {}", path.display()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn read_text(&self, run_id: &RunId) -> Result<String> {
        let path = self.run_dir(run_id).join("build_report.txt");
        std::fs::read_to_string(&path).with_context(|| format!("read report {}", path.display()))
    }
}
