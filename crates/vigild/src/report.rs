//! SRE report generation: semantic-search hits plus pod health, summarised
//! by the text generator and written as markdown.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use vigil_common::{ChatMessage, TextGenerator};

use crate::prompts;
use crate::sources::{ClusterService, PodHealth, SemanticSearch};
use crate::store::ReportStore;

pub const REPORT_QUERY: &str = "CPU";
const SEARCH_LIMIT: usize = 100;
const DEFAULT_MAX_LOGS: usize = 20;
const REPORT_TEMPERATURE: f32 = 0.0;
const REPORT_MAX_TOKENS: u32 = 4000;
const NO_PODS: &str = "No pods found";

/// Status of one pod, or a plain note when none could be listed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PodStatusEntry {
    Health(PodHealth),
    Note(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SreReport {
    pub timestamp: DateTime<Local>,
    pub time_period: String,
    pub log_analysis: String,
    pub pod_statuses: BTreeMap<String, PodStatusEntry>,
    pub issues_found: bool,
    pub path: PathBuf,
}

impl SreReport {
    pub fn to_markdown(&self) -> String {
        let mut markdown = format!(
            "# SRE Log Analysis Report\nGenerated on: {} at {}\nTime Period: {}\n\n## Log Analysis\n{}\n\n## Pod Statuses\n",
            self.timestamp.format("%Y-%m-%d"),
            self.timestamp.format("%H:%M:%S"),
            self.time_period,
            self.log_analysis
        );

        if self.pod_statuses.is_empty() {
            markdown.push_str("\nNo pod status information available.\n");
        }
        for (pod, status) in &self.pod_statuses {
            markdown.push_str(&format!("\n### {}\n", pod));
            match status {
                PodStatusEntry::Health(health) => {
                    markdown.push_str(&format!("Status: {}\n", health.phase().unwrap_or("Unknown")));
                    if let PodHealth::Error { error } = health {
                        markdown.push_str(&format!("Error: {}\n", error));
                    }
                }
                PodStatusEntry::Note(note) => markdown.push_str(&format!("Status: {}\n", note)),
            }
        }

        markdown.push_str("\n## Summary\n");
        markdown.push_str(&format!(
            "Issues Found: {}\n",
            if self.issues_found { "Yes" } else { "No" }
        ));
        markdown
    }
}

pub struct ReportGenerator {
    search: Arc<dyn SemanticSearch>,
    cluster: Arc<dyn ClusterService>,
    llm: Arc<dyn TextGenerator>,
    reports: ReportStore,
    max_logs: usize,
}

impl ReportGenerator {
    pub fn new(
        search: Arc<dyn SemanticSearch>,
        cluster: Arc<dyn ClusterService>,
        llm: Arc<dyn TextGenerator>,
        reports: ReportStore,
    ) -> Self {
        Self {
            search,
            cluster,
            llm,
            reports,
            max_logs: DEFAULT_MAX_LOGS,
        }
    }

    /// Every pod's health, keyed by name
    pub async fn pod_statuses(&self, namespace: &str) -> BTreeMap<String, PodStatusEntry> {
        let mut statuses = BTreeMap::new();
        let pods = match self.cluster.list_pods(namespace).await {
            Ok(pods) if !pods.is_empty() => pods,
            Ok(_) => {
                warn!("No pods found in namespace {}", namespace);
                statuses.insert("pods".to_string(), PodStatusEntry::Note(NO_PODS.to_string()));
                return statuses;
            }
            Err(e) => {
                error!("Failed to list pods: {:#}", e);
                statuses.insert("pods".to_string(), PodStatusEntry::Note(NO_PODS.to_string()));
                return statuses;
            }
        };

        for pod in pods {
            let health = self.cluster.get_pod_health(&pod, namespace).await;
            statuses.insert(pod, PodStatusEntry::Health(health));
        }
        statuses
    }

    async fn analyze_logs(&self, logs: &[Value], pod_statuses: &BTreeMap<String, PodStatusEntry>) -> Result<String> {
        if logs.len() > self.max_logs {
            info!("Limiting logs to {} entries to reduce token usage", self.max_logs);
        }
        let logs = Value::Array(logs.iter().take(self.max_logs).cloned().collect());
        let pods = serde_json::to_value(pod_statuses).context("Failed to serialize pod statuses")?;

        let messages = [
            ChatMessage::system(prompts::SRE_REPORT_SYSTEM_PROMPT),
            ChatMessage::user(prompts::sre_report_prompt(&logs, &pods)),
        ];
        self.llm
            .chat(&messages, REPORT_TEMPERATURE, REPORT_MAX_TOKENS)
            .await
            .context("Report analysis call failed")
    }

    /// Build, render and save one report. A failed search still produces a
    /// report; a failed analysis call does not.
    pub async fn generate(&self, hours: u32, namespace: &str) -> Result<SreReport> {
        info!("Generating report for the last {} hours", hours);

        let logs = match self.search.search(REPORT_QUERY, SEARCH_LIMIT).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Report search failed: {:#}", e);
                Vec::new()
            }
        };

        let pod_statuses = self.pod_statuses(namespace).await;
        let log_analysis = self.analyze_logs(&logs, &pod_statuses).await?;
        let timestamp = Local::now();

        let mut report = SreReport {
            timestamp,
            time_period: format!("Last {} hours", hours),
            log_analysis,
            pod_statuses,
            issues_found: !logs.is_empty(),
            path: PathBuf::new(),
        };
        report.path = self.reports.save(&report.to_markdown(), &timestamp).await?;
        info!("Report generation completed");
        Ok(report)
    }
}
