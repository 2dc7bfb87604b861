//! Diagnostic probe set
//!
//! Eleven independent checks, each testing one subsystem. A probe never
//! returns an error: transient failures come back as `failed` or `no_data`
//! reports so an investigation always runs every planned step.

pub mod cluster;
pub mod connectivity;
pub mod host;
pub mod ledger;

pub use ledger::ProbeLedger;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use vigil_common::{ProbeReport, ProbeSettings};

use crate::sources::ClusterService;

/// Closed catalogue of diagnostics an investigation can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    EnvironmentVariables,
    CodeContext,
    NetworkConnectivity,
    LogBackend,
    MetricsBackend,
    ServiceHealth,
    Database,
    PodStatus,
    PodLogs,
    SystemResources,
    RecentChanges,
}

impl DiagnosticKind {
    pub const ALL: [DiagnosticKind; 11] = [
        DiagnosticKind::EnvironmentVariables,
        DiagnosticKind::CodeContext,
        DiagnosticKind::NetworkConnectivity,
        DiagnosticKind::LogBackend,
        DiagnosticKind::MetricsBackend,
        DiagnosticKind::ServiceHealth,
        DiagnosticKind::Database,
        DiagnosticKind::PodStatus,
        DiagnosticKind::PodLogs,
        DiagnosticKind::SystemResources,
        DiagnosticKind::RecentChanges,
    ];

    /// Name shown to operators and used in plans
    pub fn display_name(&self) -> &'static str {
        match self {
            DiagnosticKind::EnvironmentVariables => "Environment Variables Check",
            DiagnosticKind::CodeContext => "Code Context Analysis",
            DiagnosticKind::NetworkConnectivity => "Network Connectivity Check",
            DiagnosticKind::LogBackend => "Loki Connectivity Check",
            DiagnosticKind::MetricsBackend => "Grafana Connectivity Check",
            DiagnosticKind::ServiceHealth => "Service Health Check",
            DiagnosticKind::Database => "Database Connection Test",
            DiagnosticKind::PodStatus => "Kubernetes Pod Status",
            DiagnosticKind::PodLogs => "Kubernetes Pod Logs",
            DiagnosticKind::SystemResources => "System Resources Check",
            DiagnosticKind::RecentChanges => "Recent Changes Check",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DiagnosticKind::EnvironmentVariables => "Check if required environment variables are set",
            DiagnosticKind::CodeContext => "Analyze code around the error line",
            DiagnosticKind::NetworkConnectivity => "Test basic network connectivity",
            DiagnosticKind::LogBackend => "Check if Loki log aggregation is reachable",
            DiagnosticKind::MetricsBackend => "Check if Grafana is reachable",
            DiagnosticKind::ServiceHealth => "Check service health and response",
            DiagnosticKind::Database => "Test database connectivity",
            DiagnosticKind::PodStatus => "Check Kubernetes pod status and health",
            DiagnosticKind::PodLogs => "Get recent logs from Kubernetes pods",
            DiagnosticKind::SystemResources => "Check system resource usage",
            DiagnosticKind::RecentChanges => "Check for recent deployments or changes",
        }
    }

    /// snake_case identifier (`pod_logs`, ...)
    pub fn id(&self) -> &'static str {
        match self {
            DiagnosticKind::EnvironmentVariables => "environment_variables",
            DiagnosticKind::CodeContext => "code_context",
            DiagnosticKind::NetworkConnectivity => "network_connectivity",
            DiagnosticKind::LogBackend => "log_backend",
            DiagnosticKind::MetricsBackend => "metrics_backend",
            DiagnosticKind::ServiceHealth => "service_health",
            DiagnosticKind::Database => "database",
            DiagnosticKind::PodStatus => "pod_status",
            DiagnosticKind::PodLogs => "pod_logs",
            DiagnosticKind::SystemResources => "system_resources",
            DiagnosticKind::RecentChanges => "recent_changes",
        }
    }

    /// Tool-style names models tend to emit
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            DiagnosticKind::EnvironmentVariables => &["check_environment_variables"],
            DiagnosticKind::CodeContext => &["get_code_context", "check_code_context"],
            DiagnosticKind::NetworkConnectivity => &["check_network_connectivity"],
            DiagnosticKind::LogBackend => &["check_loki_connectivity", "loki_connectivity"],
            DiagnosticKind::MetricsBackend => &["check_grafana_connectivity", "grafana_connectivity"],
            DiagnosticKind::ServiceHealth => &["check_service_health"],
            DiagnosticKind::Database => &[
                "check_database_connection",
                "check_database_connectivity",
                "database_connection",
            ],
            DiagnosticKind::PodStatus => &[
                "check_kubernetes_pod_status",
                "check_kubernetes_pods",
                "kubernetes_pod_status",
            ],
            DiagnosticKind::PodLogs => &["check_kubernetes_pod_logs", "kubernetes_pod_logs"],
            DiagnosticKind::SystemResources => &["check_system_resources"],
            DiagnosticKind::RecentChanges => &["check_recent_changes"],
        }
    }

    /// Resolve a plan step name. Matching ignores case and surrounding
    /// whitespace.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| {
            kind.display_name().to_ascii_lowercase() == wanted
                || kind.id() == wanted
                || kind.aliases().contains(&wanted.as_str())
        })
    }

    /// Per-probe time budget, where the probe has one
    pub fn timeout(&self, settings: &ProbeSettings) -> Option<Duration> {
        let secs = match self {
            DiagnosticKind::NetworkConnectivity => settings.network_timeout_secs,
            DiagnosticKind::LogBackend
            | DiagnosticKind::MetricsBackend
            | DiagnosticKind::ServiceHealth => settings.http_timeout_secs,
            DiagnosticKind::Database => settings.db_timeout_secs,
            DiagnosticKind::PodStatus => settings.pod_status_timeout_secs,
            DiagnosticKind::PodLogs => settings.pod_logs_timeout_secs,
            DiagnosticKind::EnvironmentVariables
            | DiagnosticKind::CodeContext
            | DiagnosticKind::SystemResources
            | DiagnosticKind::RecentChanges => return None,
        };
        Some(Duration::from_secs(secs))
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

fn param_str<'a>(params: Option<&'a Value>, key: &str) -> Option<&'a str> {
    params?.get(key)?.as_str().filter(|s| !s.is_empty())
}

/// Runs one diagnostic against the configured targets
#[derive(Clone)]
pub struct DiagnosticProbes {
    settings: ProbeSettings,
    cluster: Arc<dyn ClusterService>,
}

impl DiagnosticProbes {
    pub fn new(settings: ProbeSettings, cluster: Arc<dyn ClusterService>) -> Self {
        Self { settings, cluster }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Dispatch is total over `DiagnosticKind`. `params` may override
    /// targets (`file_path`/`line_number`, `pod_name`, `namespace`, `url`,
    /// `host`/`port`).
    pub async fn run(&self, kind: DiagnosticKind, params: Option<&Value>) -> ProbeReport {
        let s = &self.settings;
        let timeout = kind.timeout(s).unwrap_or(Duration::from_secs(5));
        let namespace = param_str(params, "namespace").unwrap_or(&s.namespace);

        match kind {
            DiagnosticKind::EnvironmentVariables => host::check_environment_variables(&s.required_env_vars),
            DiagnosticKind::CodeContext => {
                let file_path = param_str(params, "file_path").unwrap_or("");
                let line_number = params
                    .and_then(|p| p.get("line_number"))
                    .and_then(vigil_common::line_from_value)
                    .unwrap_or(0);
                host::code_context(s.code_root.as_deref(), file_path, line_number, s.context_lines).await
            }
            DiagnosticKind::NetworkConnectivity => {
                let host = param_str(params, "host").unwrap_or(&s.network_host);
                let port = params
                    .and_then(|p| p.get("port"))
                    .and_then(Value::as_u64)
                    .and_then(|p| u16::try_from(p).ok())
                    .unwrap_or(s.network_port);
                connectivity::tcp_check(host, port, timeout).await
            }
            DiagnosticKind::LogBackend => {
                let url = format!("{}/ready", s.log_backend_url.trim_end_matches('/'));
                connectivity::http_check(&url, timeout).await
            }
            DiagnosticKind::MetricsBackend => {
                let url = format!("{}/api/health", s.metrics_url.trim_end_matches('/'));
                connectivity::http_check(&url, timeout).await
            }
            DiagnosticKind::ServiceHealth => {
                let url = param_str(params, "url").unwrap_or(&s.service_health_url);
                connectivity::service_health(url, timeout).await
            }
            DiagnosticKind::Database => connectivity::tcp_check(&s.db_host, s.db_port, timeout)
                .await
                .with("database", &s.db_name),
            DiagnosticKind::PodStatus => {
                let pod = param_str(params, "pod_name");
                cluster::pod_status(self.cluster.as_ref(), pod, namespace, timeout).await
            }
            DiagnosticKind::PodLogs => {
                let pod = param_str(params, "pod_name");
                cluster::pod_logs(self.cluster.as_ref(), pod, namespace, s.pod_log_tail, timeout).await
            }
            DiagnosticKind::SystemResources => host::system_resources().await,
            DiagnosticKind::RecentChanges => host::recent_changes(s.recent_changes_hours),
        }
    }
}
