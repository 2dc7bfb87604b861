//! Probes that look at the local host: environment, source tree, resources.

use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};
use vigil_common::ProbeReport;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Required variables must be present and non-empty
pub fn check_environment_variables(required: &[String]) -> ProbeReport {
    let mut statuses = serde_json::Map::new();
    let mut missing = Vec::new();

    for var in required {
        let set = std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false);
        let label = if set { "set" } else { "missing" };
        statuses.insert(var.clone(), label.into());
        if !set {
            missing.push(var.clone());
        }
    }

    let report = if missing.is_empty() {
        ProbeReport::success()
    } else {
        ProbeReport::failed(format!("Missing variables: {}", missing.join(", ")))
    };

    report
        .with("environment_variables", statuses)
        .with("total_checked", required.len())
        .with("total_missing", missing.len())
        .with("missing_variables", missing)
}

fn resolve_source(code_root: Option<&Path>, file_path: &str) -> PathBuf {
    let path = Path::new(file_path);
    match code_root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path.to_path_buf(),
    }
}

/// Up to `context_lines` lines either side of `line_number` (1-based)
pub async fn code_context(
    code_root: Option<&Path>,
    file_path: &str,
    line_number: u32,
    context_lines: usize,
) -> ProbeReport {
    if file_path.is_empty() {
        return ProbeReport::no_data("No file path provided").with("error_line", line_number);
    }

    let path = resolve_source(code_root, file_path);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ProbeReport::failed("File not found")
                .with("file_path", file_path)
                .with("error_line", line_number)
                .with("message", format!("File {} not found locally", file_path));
        }
        Err(e) => {
            return ProbeReport::no_data(e.to_string())
                .with("file_path", file_path)
                .with("error_line", line_number);
        }
    };

    let lines: Vec<&str> = content.lines().collect();
    let line = line_number as usize;
    let start = line.saturating_sub(context_lines + 1);
    let end = lines.len().min(line + context_lines);
    let start = start.min(end);

    ProbeReport::success()
        .with("file_path", file_path)
        .with("error_line", line_number)
        .with("context_lines", context_lines)
        .with("code_snippet", &lines[start..end])
        .with("line_numbers", (start + 1..=end).collect::<Vec<_>>())
        .with("source", "local_file")
}

/// CPU, memory and root filesystem usage
pub async fn system_resources() -> ProbeReport {
    let mut sys = System::new();
    sys.refresh_cpu();
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    sys.refresh_cpu();
    sys.refresh_memory();

    let total_memory = sys.total_memory();
    if total_memory == 0 {
        return ProbeReport::no_data("Memory information unavailable");
    }
    let available_memory = sys.available_memory();
    let memory_percent = (total_memory - available_memory.min(total_memory)) as f64 / total_memory as f64 * 100.0;

    let disks = Disks::new_with_refreshed_list();
    let root = disks.list().iter().find(|d| d.mount_point() == Path::new("/"));

    let mut report = ProbeReport::success()
        .with("cpu_percent", round2(sys.global_cpu_info().cpu_usage() as f64))
        .with("cpu_cores", sys.cpus().len())
        .with("memory_percent", round2(memory_percent))
        .with("memory_available_gb", round2(available_memory as f64 / GIB));

    if let Some(disk) = root {
        let total = disk.total_space();
        let free = disk.available_space();
        if total > 0 {
            report = report
                .with("disk_percent", round2((total - free.min(total)) as f64 / total as f64 * 100.0))
                .with("disk_free_gb", round2(free as f64 / GIB));
        }
    }

    report
}

/// Placeholder until a deploy/commit feed is wired in
pub fn recent_changes(hours_back: u32) -> ProbeReport {
    ProbeReport::success()
        .with("hours_back", hours_back)
        .with("message", "Recent changes analysis is not available")
        .with("implemented", false)
}
