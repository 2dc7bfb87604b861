//! Container orchestrator access through `kubectl`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Phase of one pod, or why it could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PodHealth {
    Phase { pod: String, phase: String },
    Error { error: String },
}

impl PodHealth {
    pub fn phase(&self) -> Option<&str> {
        match self {
            PodHealth::Phase { phase, .. } => Some(phase),
            PodHealth::Error { .. } => None,
        }
    }
}

/// One row of `kubectl get pods -o wide`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSummary {
    pub pod_name: String,
    pub ready: String,
    pub status: String,
    pub restarts: u32,
    pub created: String,
    pub ip: String,
    pub node: String,
}

#[async_trait]
pub trait ClusterService: Send + Sync {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<String>>;

    /// Never fails; lookup problems come back as `PodHealth::Error`
    async fn get_pod_health(&self, pod: &str, namespace: &str) -> PodHealth;

    async fn pod_summaries(&self, namespace: &str) -> Result<Vec<PodSummary>>;

    async fn pod_logs(&self, pod: &str, namespace: &str, tail: u32) -> Result<Vec<String>>;
}

// ============================================================================
// kubectl
// ============================================================================

pub struct KubectlCluster {
    kubeconfig: Option<String>,
    timeout: Duration,
}

impl KubectlCluster {
    pub fn new(kubeconfig: Option<String>) -> Self {
        Self {
            kubeconfig: kubeconfig.filter(|p| !p.trim().is_empty()),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn kubectl(&self, args: &[&str]) -> Result<String> {
        let mut command = Command::new("kubectl");
        if let Some(path) = &self.kubeconfig {
            command.arg("--kubeconfig").arg(path);
        }
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Executing: kubectl {:?}", args);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .with_context(|| format!("kubectl timed out after {}s", self.timeout.as_secs()))?
            .context("Failed to execute kubectl")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("kubectl {} failed: {}", args.join(" "), stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn pods_json(&self, namespace: &str) -> Result<Vec<Value>> {
        let stdout = self.kubectl(&["get", "pods", "-n", namespace, "-o", "json"]).await?;
        let list: Value = serde_json::from_str(&stdout).context("Failed to parse pod list")?;
        Ok(list
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or("")
}

/// Reduce a pod object to its `get pods -o wide` columns
pub fn summarize_pod(pod: &Value) -> PodSummary {
    let containers = pod
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let ready = containers
        .iter()
        .filter(|c| c.get("ready").and_then(Value::as_bool).unwrap_or(false))
        .count();
    let restarts = containers
        .iter()
        .filter_map(|c| c.get("restartCount").and_then(Value::as_u64))
        .sum::<u64>();

    let node = str_at(pod, "/spec/nodeName");
    PodSummary {
        pod_name: str_at(pod, "/metadata/name").to_string(),
        ready: format!("{}/{}", ready, containers.len()),
        status: str_at(pod, "/status/phase").to_string(),
        restarts: u32::try_from(restarts).unwrap_or(u32::MAX),
        created: str_at(pod, "/metadata/creationTimestamp").to_string(),
        ip: str_at(pod, "/status/podIP").to_string(),
        node: if node.is_empty() { "N/A".to_string() } else { node.to_string() },
    }
}

#[async_trait]
impl ClusterService for KubectlCluster {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<String>> {
        let pods = self.pods_json(namespace).await.map_err(|e| {
            error!("Error listing pods: {}", e);
            e
        })?;
        Ok(pods
            .iter()
            .map(|p| str_at(p, "/metadata/name").to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }

    async fn get_pod_health(&self, pod: &str, namespace: &str) -> PodHealth {
        let result = async {
            let stdout = self.kubectl(&["get", "pod", pod, "-n", namespace, "-o", "json"]).await?;
            let value: Value = serde_json::from_str(&stdout).context("Failed to parse pod")?;
            Ok::<_, anyhow::Error>(str_at(&value, "/status/phase").to_string())
        }
        .await;

        match result {
            Ok(phase) => PodHealth::Phase {
                pod: pod.to_string(),
                phase,
            },
            Err(e) => {
                warn!("Error checking pod health for {}: {}", pod, e);
                PodHealth::Error {
                    error: format!("Error checking pod health: {}", e),
                }
            }
        }
    }

    async fn pod_summaries(&self, namespace: &str) -> Result<Vec<PodSummary>> {
        let pods = self.pods_json(namespace).await?;
        Ok(pods.iter().map(summarize_pod).collect())
    }

    async fn pod_logs(&self, pod: &str, namespace: &str, tail: u32) -> Result<Vec<String>> {
        let tail_arg = format!("--tail={}", tail);
        let stdout = self.kubectl(&["logs", pod, "-n", namespace, &tail_arg]).await?;
        Ok(stdout.trim().lines().map(str::to_string).collect())
    }
}

// ============================================================================
// Fake cluster (testing)
// ============================================================================

/// In-memory cluster: pods with a phase and a log buffer
#[derive(Clone, Default)]
pub struct FakeClusterService {
    pods: Vec<(String, String)>,
    logs: HashMap<String, Vec<String>>,
    unreachable: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeClusterService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pod(mut self, name: &str, phase: &str) -> Self {
        self.pods.push((name.to_string(), phase.to_string()));
        self
    }

    pub fn with_logs(mut self, pod: &str, lines: &[&str]) -> Self {
        self.logs
            .insert(pod.to_string(), lines.iter().map(|l| l.to_string()).collect());
        self
    }

    /// Every call fails as if the API server were down
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn check(&self) -> Result<()> {
        if self.unreachable {
            anyhow::bail!("cluster unreachable");
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterService for FakeClusterService {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<String>> {
        self.record(format!("list_pods {}", namespace));
        self.check()?;
        Ok(self.pods.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn get_pod_health(&self, pod: &str, namespace: &str) -> PodHealth {
        self.record(format!("get_pod_health {} {}", pod, namespace));
        if let Err(e) = self.check() {
            return PodHealth::Error {
                error: format!("Error checking pod health: {}", e),
            };
        }
        match self.pods.iter().find(|(name, _)| name == pod) {
            Some((name, phase)) => PodHealth::Phase {
                pod: name.clone(),
                phase: phase.clone(),
            },
            None => PodHealth::Error {
                error: format!("Error checking pod health: pod {} not found", pod),
            },
        }
    }

    async fn pod_summaries(&self, namespace: &str) -> Result<Vec<PodSummary>> {
        self.record(format!("pod_summaries {}", namespace));
        self.check()?;
        Ok(self
            .pods
            .iter()
            .map(|(name, phase)| PodSummary {
                pod_name: name.clone(),
                ready: "1/1".to_string(),
                status: phase.clone(),
                restarts: 0,
                created: String::new(),
                ip: "10.0.0.1".to_string(),
                node: "node-1".to_string(),
            })
            .collect())
    }

    async fn pod_logs(&self, pod: &str, namespace: &str, tail: u32) -> Result<Vec<String>> {
        self.record(format!("pod_logs {} {} {}", pod, namespace, tail));
        self.check()?;
        let lines = self.logs.get(pod).cloned().unwrap_or_default();
        let skip = lines.len().saturating_sub(tail as usize);
        Ok(lines.into_iter().skip(skip).collect())
    }
}
