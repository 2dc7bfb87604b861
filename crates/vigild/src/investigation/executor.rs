//! Runs a plan step by step, then asks for the final analysis.

use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use vigil_common::decode::truncate_chars;
use vigil_common::{
    decode_reply, AnalysisResult, BugRecord, ChatMessage, InvestigationResults, InvestigationStep, ProbeReport,
    TextGenerator,
};

use super::planner::{InvestigationPlan, PlannedStep};
use crate::probes::{DiagnosticKind, DiagnosticProbes, ProbeLedger};
use crate::prompts;

const ANALYSIS_TEMPERATURE: f32 = 0.1;
const ANALYSIS_MAX_TOKENS: u32 = 2000;
const RAW_RESPONSE_PREVIEW_CHARS: usize = 200;

pub struct InvestigationExecutor {
    probes: DiagnosticProbes,
    llm: Arc<dyn TextGenerator>,
}

impl InvestigationExecutor {
    pub fn new(probes: DiagnosticProbes, llm: Arc<dyn TextGenerator>) -> Self {
        Self { probes, llm }
    }

    /// Run one probe on its own task so a panic inside it cannot take the
    /// investigation down
    async fn run_isolated(&self, kind: DiagnosticKind, params: Option<Value>) -> ProbeReport {
        let probes = self.probes.clone();
        let handle = tokio::spawn(async move { probes.run(kind, params.as_ref()).await });
        match handle.await {
            Ok(report) => report,
            Err(e) => {
                error!("Investigation step {} aborted: {}", kind, e);
                ProbeReport::no_data(e.to_string())
            }
        }
    }

    async fn run_step(&self, step: &PlannedStep) -> ProbeReport {
        match step.kind {
            Some(kind) => self.run_isolated(kind, step.params.clone()).await,
            None => {
                warn!("Unknown investigation step: {}", step.name);
                ProbeReport::failed(format!("Unknown investigation step: {}", step.name))
            }
        }
    }

    /// Every step runs, in plan order
    pub async fn execute(&self, plan: InvestigationPlan) -> InvestigationResults {
        let total_steps = plan.steps.len();
        let mut ledger = ProbeLedger::new();
        let mut steps = Vec::with_capacity(total_steps);
        info!("Starting investigation with {} steps", total_steps);

        for (index, planned) in plan.steps.into_iter().enumerate() {
            let step_number = index + 1;
            info!("Executing investigation step {}/{}: {}", step_number, total_steps, planned.name);
            if !planned.explanation.is_empty() {
                info!("Reason: {}", planned.explanation);
            }

            let result = self.run_step(&planned).await;
            ledger.record(&planned.name, &result);

            steps.push(InvestigationStep {
                success: result.is_success(),
                outcome: result.outcome(),
                name: planned.name,
                description: planned.description,
                explanation: planned.explanation,
                priority: planned.priority,
                params: planned.params,
                result,
                step_number,
                total_steps,
            });
        }

        InvestigationResults {
            steps,
            summary: ledger.summary(),
            strategy: plan.strategy,
            expected_correlations: plan.expected_correlations,
        }
    }

    /// Final structured analysis. Never fails: undecodable replies and call
    /// errors both yield a placeholder.
    pub async fn analyze(&self, bug: &BugRecord, results: &InvestigationResults) -> AnalysisResult {
        let bug_json = serde_json::to_string_pretty(bug).unwrap_or_default();
        let results_json = serde_json::to_string_pretty(results).unwrap_or_default();
        let messages = [
            ChatMessage::system(prompts::INVESTIGATION_SYSTEM_PROMPT),
            ChatMessage::user(prompts::analysis_prompt(&bug_json, &results_json)),
        ];

        let reply = match self.llm.chat(&messages, ANALYSIS_TEMPERATURE, ANALYSIS_MAX_TOKENS).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Analysis call failed: {}", e);
                return AnalysisResult::placeholder(
                    format!("Error generating severity analysis: {}", e),
                    format!("Error generating analysis: {}", e),
                    format!("Analysis failed due to error: {}", e),
                );
            }
        };

        match decode_reply::<AnalysisResult>(&reply) {
            Some(decoded) => {
                info!("Analysis decoded via {:?}", decoded.recovery);
                decoded.value
            }
            None => {
                warn!("Failed to parse analysis response as JSON");
                AnalysisResult::placeholder(
                    "Unable to parse LLM response, using default assessment",
                    format!(
                        "Analysis failed to parse properly. Raw response: {}...",
                        truncate_chars(&reply, RAW_RESPONSE_PREVIEW_CHARS)
                    ),
                    "LLM analysis failed to generate proper JSON response",
                )
            }
        }
    }
}
