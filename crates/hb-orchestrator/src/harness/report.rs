//! Aggregate test report

use std::io;
use std::path::Path;

use hb_core::time::current_time_millis;
use serde::{Deserialize, Serialize};

/// Overall verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    /// Every scenario passed
    Pass,
    /// Some scenarios passed
    Partial,
    /// No scenario passed
    Fail,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::Pass => write!(f, "PASS"),
            OverallStatus::Partial => write!(f, "PARTIAL"),
            OverallStatus::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pass,
    Fail,
}

/// Outcome of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    pub status: ResultStatus,
    pub duration_ms: u64,
    pub detail: String,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.status == ResultStatus::Pass
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub name: String,
    /// Unix milliseconds when the report was produced
    pub timestamp: u64,
    pub overall: OverallStatus,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TestResult>,
}

impl TestReport {
    pub fn new(name: impl Into<String>, results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed()).count();
        let failed = results.len() - passed;
        let overall = if failed == 0 {
            OverallStatus::Pass
        } else if passed > 0 {
            OverallStatus::Partial
        } else {
            OverallStatus::Fail
        };
        Self {
            name: name.into(),
            timestamp: current_time_millis(),
            overall,
            passed,
            failed,
            results,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.overall == OverallStatus::Pass
    }

    /// Write the report as pretty JSON
    pub fn write(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)
    }
}
