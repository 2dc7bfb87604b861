//! Running success/failure tally for one investigation.

use chrono::Local;
use tracing::info;
use vigil_common::{LedgerEntry, LedgerSummary, ProbeReport};

#[derive(Debug, Default)]
pub struct ProbeLedger {
    entries: Vec<LedgerEntry>,
}

impl ProbeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step_name: &str, report: &ProbeReport) {
        let success = report.is_success();
        info!(
            "Investigation step '{}' completed: {}",
            step_name,
            if success { "SUCCESS" } else { "FAILED" }
        );
        self.entries.push(LedgerEntry {
            step_name: step_name.to_string(),
            timestamp: Local::now().to_rfc3339(),
            success,
            result: report.clone(),
            error: if success { None } else { report.error.clone() },
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> LedgerSummary {
        LedgerSummary::from_entries(self.entries.clone())
    }
}
