//! Pod status and pod log probes.

use std::time::Duration;
use vigil_common::ProbeReport;

use crate::sources::ClusterService;

/// Pod rows for the namespace, narrowed to `pod` when given
pub async fn pod_status(
    cluster: &dyn ClusterService,
    pod: Option<&str>,
    namespace: &str,
    timeout: Duration,
) -> ProbeReport {
    let summaries = match tokio::time::timeout(timeout, cluster.pod_summaries(namespace)).await {
        Ok(Ok(summaries)) => summaries,
        Ok(Err(e)) => return ProbeReport::failed(e.to_string()).with("namespace", namespace),
        Err(_) => {
            return ProbeReport::no_data(format!("Pod status timed out after {}s", timeout.as_secs()))
                .with("namespace", namespace)
        }
    };

    let pods: Vec<_> = summaries
        .into_iter()
        .filter(|s| pod.map_or(true, |name| s.pod_name == name))
        .collect();

    if pods.is_empty() {
        return ProbeReport::no_data("No pods found").with("namespace", namespace);
    }

    let not_running = pods.iter().filter(|p| p.status != "Running" && p.status != "Succeeded").count();
    ProbeReport::success()
        .with("namespace", namespace)
        .with("pod_count", pods.len())
        .with("not_running", not_running)
        .with("pods", pods)
}

type FetchedLogs = Option<(String, anyhow::Result<Vec<String>>)>;

/// Resolve the target pod, then read its tail. Listing errors propagate;
/// log read errors stay attached to the pod name.
async fn fetch_logs(
    cluster: &dyn ClusterService,
    pod: Option<&str>,
    namespace: &str,
    tail: u32,
) -> anyhow::Result<FetchedLogs> {
    let pod_name = match pod {
        Some(name) => Some(name.to_string()),
        None => cluster.list_pods(namespace).await?.into_iter().next(),
    };
    let Some(pod_name) = pod_name else {
        return Ok(None);
    };
    let logs = cluster.pod_logs(&pod_name, namespace, tail).await;
    Ok(Some((pod_name, logs)))
}

/// Last `tail` lines of `pod`, or of the first pod in the namespace
pub async fn pod_logs(
    cluster: &dyn ClusterService,
    pod: Option<&str>,
    namespace: &str,
    tail: u32,
    timeout: Duration,
) -> ProbeReport {
    let fetch = fetch_logs(cluster, pod, namespace, tail);

    match tokio::time::timeout(timeout, fetch).await {
        Err(_) => ProbeReport::no_data(format!("Pod logs timed out after {}s", timeout.as_secs()))
            .with("namespace", namespace),
        Ok(Err(e)) => ProbeReport::no_data(e.to_string()).with("namespace", namespace),
        Ok(Ok(None)) => ProbeReport::no_data("No pod name available").with("namespace", namespace),
        Ok(Ok(Some((pod_name, Ok(logs))))) => ProbeReport::success()
            .with("pod_name", pod_name)
            .with("namespace", namespace)
            .with("log_count", logs.len())
            .with("logs", logs),
        Ok(Ok(Some((pod_name, Err(e))))) => ProbeReport::failed(e.to_string())
            .with("pod_name", pod_name)
            .with("namespace", namespace),
    }
}
