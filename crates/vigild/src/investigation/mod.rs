//! Investigation agent
//!
//! Plans diagnostic steps for one bug, runs every step in order against the
//! probe set, and closes with a structured analysis. An investigation always
//! completes: planning falls back to keyword rules, steps degrade to
//! `failed`/`no_data`, and the analysis degrades to a placeholder.

pub mod executor;
pub mod planner;

pub use executor::InvestigationExecutor;
pub use planner::{fallback_plan, InvestigationPlan, InvestigationPlanner, PlanSource, PlannedStep};

use chrono::Local;
use std::sync::Arc;
use tracing::info;
use vigil_common::{BugRecord, InvestigationRecord, TextGenerator};

use crate::probes::DiagnosticProbes;

pub struct InvestigationAgent {
    planner: InvestigationPlanner,
    executor: InvestigationExecutor,
}

impl InvestigationAgent {
    pub fn new(probes: DiagnosticProbes, llm: Arc<dyn TextGenerator>) -> Self {
        Self {
            planner: InvestigationPlanner::new(Arc::clone(&llm)),
            executor: InvestigationExecutor::new(probes, llm),
        }
    }

    pub fn new_id() -> String {
        format!("investigation_{}", Local::now().format("%Y%m%d_%H%M%S"))
    }

    pub async fn start_investigation(&self, bug: BugRecord) -> InvestigationRecord {
        let record = InvestigationRecord::begin(Self::new_id(), bug);
        info!(
            "Starting investigation {} for bug: {}",
            record.investigation_id,
            if record.bug_info.summary.is_empty() { "Unknown" } else { record.bug_info.summary.as_str() }
        );

        let plan = self.planner.plan(&record.bug_info).await;
        let results = self.executor.execute(plan).await;
        info!("Investigation completed, generating analysis...");

        let analysis = self.executor.analyze(&record.bug_info, &results).await;
        info!("Analysis completed. Severity: {}", analysis.severity.level);

        record.complete(results, analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::FakeClusterService;
    use vigil_common::{FakeTextGenerator, InvestigationStatus, ProbeSettings};

    #[tokio::test]
    async fn test_investigation_completes_without_model() {
        let probes = DiagnosticProbes::new(ProbeSettings::default(), Arc::new(FakeClusterService::new()));
        let agent = InvestigationAgent::new(probes, Arc::new(FakeTextGenerator::new()));
        let bug = BugRecord {
            summary: "flaky thing".to_string(),
            ..Default::default()
        };

        let record = agent.start_investigation(bug).await;
        assert!(record.investigation_id.starts_with("investigation_"));
        assert_eq!(record.status, InvestigationStatus::Completed);
        assert!(record.end_time.is_some());
        assert!(record.analysis.is_some());
    }
}
