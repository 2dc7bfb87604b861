//! Investigation planning: a generated plan when the model cooperates, a
//! keyword-driven fallback when it does not.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use vigil_common::{decode_reply, BugRecord, ChatMessage, TextGenerator};

use crate::probes::DiagnosticKind;
use crate::prompts;

pub const DEFAULT_STRATEGY: &str = "Systematic debugging approach";
pub const DEFAULT_CORRELATIONS: &str = "Looking for patterns between infrastructure health and the reported issue";
const FALLBACK_STRATEGY: &str = "Systematic debugging approach focusing on infrastructure and dependencies";

const PLAN_TEMPERATURE: f32 = 0.1;
const PLAN_MAX_TOKENS: u32 = 1500;

const KUBERNETES_KEYWORDS: &[&str] = &["kubernetes", "k8s", "pod", "deployment"];
const DATABASE_KEYWORDS: &[&str] = &["database", "db", "postgres", "mysql"];
const RESOURCE_KEYWORDS: &[&str] = &["memory", "cpu", "disk", "resource"];
const SERVICE_KEYWORDS: &[&str] = &["service", "api", "http", "endpoint"];
const MONITORING_KEYWORDS: &[&str] = &["monitoring", "grafana", "prometheus"];

/// Where a plan came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    Generated,
    Fallback,
}

/// One step as planned. `kind` is `None` when the name matched no known
/// diagnostic; the executor reports those instead of dropping them.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub name: String,
    pub kind: Option<DiagnosticKind>,
    pub description: String,
    pub explanation: String,
    pub priority: String,
    pub params: Option<Value>,
}

impl PlannedStep {
    fn known(kind: DiagnosticKind, explanation: &str, priority: &str) -> Self {
        Self {
            name: kind.display_name().to_string(),
            kind: Some(kind),
            description: kind.description().to_string(),
            explanation: explanation.to_string(),
            priority: priority.to_string(),
            params: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvestigationPlan {
    pub strategy: String,
    pub expected_correlations: String,
    pub steps: Vec<PlannedStep>,
    pub source: PlanSource,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    priority: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    investigation_strategy: Option<String>,
    steps: Vec<RawStep>,
    #[serde(default)]
    expected_correlations: Option<String>,
}

fn non_empty(text: Option<String>, default: &str) -> String {
    text.filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl From<RawPlan> for InvestigationPlan {
    fn from(raw: RawPlan) -> Self {
        let steps = raw
            .steps
            .into_iter()
            .map(|step| PlannedStep {
                kind: DiagnosticKind::from_name(&step.name),
                name: step.name,
                description: step.description,
                explanation: step.explanation,
                priority: step.priority,
                params: step.params.filter(|p| !p.is_null()),
            })
            .collect();

        Self {
            strategy: non_empty(raw.investigation_strategy, DEFAULT_STRATEGY),
            expected_correlations: non_empty(raw.expected_correlations, DEFAULT_CORRELATIONS),
            steps,
            source: PlanSource::Generated,
        }
    }
}

/// The context the planner sees: summary and message lower-cased
pub fn bug_context(bug: &BugRecord) -> Value {
    json!({
        "summary": bug.summary.to_lowercase(),
        "message": bug.message.to_lowercase(),
        "evidence": bug.evidence.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(),
        "file": bug.file.as_deref().unwrap_or(""),
        "line": bug.line.unwrap_or(0),
    })
}

fn mentions(summary: &str, message: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| summary.contains(k) || message.contains(k))
}

/// Deterministic plan built from the bug text alone
pub fn fallback_plan(bug: &BugRecord) -> InvestigationPlan {
    let summary = bug.summary.to_lowercase();
    let message = bug.message.to_lowercase();
    let mut steps = vec![PlannedStep::known(
        DiagnosticKind::EnvironmentVariables,
        "Environment variables are often the root cause of configuration issues",
        "high",
    )];

    if let (Some(file), Some(line)) = (bug.file.as_deref(), bug.line) {
        if bug.has_location() {
            let mut step = PlannedStep::known(
                DiagnosticKind::CodeContext,
                "Understanding the code context helps identify the exact failure point",
                "high",
            );
            step.description = format!("Analyze code around line {} in {}", line, file);
            step.params = Some(json!({"file_path": file, "line_number": line}));
            steps.push(step);
        }
    }

    steps.push(PlannedStep::known(
        DiagnosticKind::NetworkConnectivity,
        "Network issues are common causes of service failures",
        "high",
    ));

    if mentions(&summary, &message, KUBERNETES_KEYWORDS) {
        steps.push(PlannedStep::known(
            DiagnosticKind::PodStatus,
            "Kubernetes issues require checking pod health and status",
            "high",
        ));
        steps.push(PlannedStep::known(
            DiagnosticKind::PodLogs,
            "Pod logs provide detailed error information for Kubernetes issues",
            "high",
        ));
    }
    if mentions(&summary, &message, DATABASE_KEYWORDS) {
        steps.push(PlannedStep::known(
            DiagnosticKind::Database,
            "Database connection issues are common and need direct testing",
            "high",
        ));
    }
    if mentions(&summary, &message, RESOURCE_KEYWORDS) {
        steps.push(PlannedStep::known(
            DiagnosticKind::SystemResources,
            "Resource exhaustion can cause various service failures",
            "medium",
        ));
    }
    if mentions(&summary, &message, SERVICE_KEYWORDS) {
        steps.push(PlannedStep::known(
            DiagnosticKind::ServiceHealth,
            "Service health checks verify if the application is responding correctly",
            "medium",
        ));
    }
    if mentions(&summary, &message, MONITORING_KEYWORDS) {
        steps.push(PlannedStep::known(
            DiagnosticKind::MetricsBackend,
            "Monitoring system issues affect our ability to track the problem",
            "medium",
        ));
    }

    steps.push(PlannedStep::known(
        DiagnosticKind::LogBackend,
        "Log aggregation system health affects our debugging capabilities",
        "medium",
    ));
    steps.push(PlannedStep::known(
        DiagnosticKind::RecentChanges,
        "Recent changes often correlate with new issues",
        "low",
    ));

    InvestigationPlan {
        strategy: FALLBACK_STRATEGY.to_string(),
        expected_correlations: DEFAULT_CORRELATIONS.to_string(),
        steps,
        source: PlanSource::Fallback,
    }
}

pub struct InvestigationPlanner {
    llm: Arc<dyn TextGenerator>,
}

impl InvestigationPlanner {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Ask the model for a plan; fall back on call errors, undecodable
    /// replies and empty step lists
    pub async fn plan(&self, bug: &BugRecord) -> InvestigationPlan {
        let messages = [
            ChatMessage::system(prompts::INVESTIGATION_SYSTEM_PROMPT),
            ChatMessage::user(prompts::strategy_prompt(&bug_context(bug))),
        ];

        let reply = match self.llm.chat(&messages, PLAN_TEMPERATURE, PLAN_MAX_TOKENS).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Strategy generation failed, using fallback plan: {}", e);
                return fallback_plan(bug);
            }
        };

        match decode_reply::<RawPlan>(&reply) {
            Some(decoded) if !decoded.value.steps.is_empty() => {
                let plan = InvestigationPlan::from(decoded.value);
                info!("Generated investigation plan with {} steps", plan.steps.len());
                plan
            }
            _ => {
                warn!("Failed to parse strategy response, using fallback plan");
                fallback_plan(bug)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_common::FakeTextGenerator;

    fn bug(summary: &str, file: Option<&str>, line: Option<u32>) -> BugRecord {
        BugRecord {
            summary: summary.to_string(),
            file: file.map(str::to_string),
            line,
            ..Default::default()
        }
    }

    fn kinds(plan: &InvestigationPlan) -> Vec<Option<DiagnosticKind>> {
        plan.steps.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_fallback_minimal_plan() {
        let plan = fallback_plan(&bug("something odd", None, None));
        assert_eq!(
            kinds(&plan),
            vec![
                Some(DiagnosticKind::EnvironmentVariables),
                Some(DiagnosticKind::NetworkConnectivity),
                Some(DiagnosticKind::LogBackend),
                Some(DiagnosticKind::RecentChanges),
            ]
        );
        assert_eq!(plan.source, PlanSource::Fallback);
    }

    #[test]
    fn test_fallback_code_context_needs_location() {
        let plan = fallback_plan(&bug("Postgres timeout", Some("db.py"), Some(12)));
        let step = &plan.steps[1];
        assert_eq!(step.kind, Some(DiagnosticKind::CodeContext));
        assert_eq!(step.description, "Analyze code around line 12 in db.py");
        assert_eq!(step.params, Some(json!({"file_path": "db.py", "line_number": 12})));
        assert!(kinds(&plan).contains(&Some(DiagnosticKind::Database)));

        let no_line = fallback_plan(&bug("x", Some("db.py"), None));
        assert!(!kinds(&no_line).contains(&Some(DiagnosticKind::CodeContext)));
    }

    #[tokio::test]
    async fn test_generated_plan_keeps_unknown_steps() {
        let llm = FakeTextGenerator::with_replies([r#"```json
{
  "investigation_strategy": "Check the database first",
  "steps": [
    {"name": "Database Connection Test", "priority": "high"},
    {"name": "check_docker_containers"}
  ]
}
```"#]);
        let plan = InvestigationPlanner::new(Arc::new(llm)).plan(&bug("db down", None, None)).await;

        assert_eq!(plan.source, PlanSource::Generated);
        assert_eq!(plan.strategy, "Check the database first");
        assert_eq!(plan.expected_correlations, DEFAULT_CORRELATIONS);
        assert_eq!(kinds(&plan), vec![Some(DiagnosticKind::Database), None]);
        assert_eq!(plan.steps[1].name, "check_docker_containers");
    }

    #[tokio::test]
    async fn test_unparseable_plan_falls_back() {
        let llm = FakeTextGenerator::with_replies(["I would start by checking the pods."]);
        let plan = InvestigationPlanner::new(Arc::new(llm))
            .plan(&bug("pod crash", None, None))
            .await;
        assert_eq!(plan.source, PlanSource::Fallback);
        assert_eq!(plan.strategy, FALLBACK_STRATEGY);
    }
}
