//! End-to-end behaviour of the scan, investigation and scheduling pipeline
//! against in-memory collaborators.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use vigil_common::{
    truncate_chars, BugRecord, FakeTextGenerator, InvestigationResults, LogStream, ProbeSettings, ProbeStatus,
    SchedulerConfig, SeverityLevel, StorageSettings,
};
use vigild::investigation::{fallback_plan, InvestigationExecutor};
use vigild::probes::{DiagnosticKind, DiagnosticProbes};
use vigild::sources::{FakeClusterService, FakeLogSource, FakeSemanticSearch};
use vigild::{
    Backends, BugStore, FixedBackends, LogScanner, PipelineContext, ScanOutcome, Scheduler, VigilService,
};

fn bug(summary: &str) -> BugRecord {
    BugRecord {
        file: Some("app/main.py".to_string()),
        line: Some(42),
        summary: summary.to_string(),
        ..Default::default()
    }
}

fn error_stream() -> LogStream {
    serde_json::from_value(json!({
        "stream": {"job": "app", "level": "ERROR", "service": "api"},
        "values": [
            ["1717236000000000000", "Request failed: upstream timeout"],
            ["1717236001000000000", "NullPointerException at line 42 in app/main.py"],
            ["1717236002000000000", "Retry budget exhausted"]
        ]
    }))
    .unwrap()
}

const DETECTION_REPLY: &str = r#"```json
{
  "file": "app/main.py",
  "line": 42,
  "summary": "Null pointer exception in request handler",
  "human_explanation": "The handler dereferences a missing user object.",
  "evidence": ["NullPointerException at line 42 in app/main.py"],
  "message": "NullPointerException at line 42 in app/main.py"
}
```"#;

fn fake_backends(log_source: FakeLogSource, llm: FakeTextGenerator) -> Backends {
    Backends {
        log_source: Arc::new(log_source),
        search: Arc::new(FakeSemanticSearch::new()),
        cluster: Arc::new(FakeClusterService::new()),
        llm: Arc::new(llm),
    }
}

#[tokio::test]
async fn test_consecutive_duplicates_persist_once() {
    let tmp = TempDir::new().unwrap();
    let store = BugStore::new(tmp.path());

    assert!(store.save_if_new(&bug("A")).await.unwrap().is_some());
    assert!(store.save_if_new(&bug("A")).await.unwrap().is_none());
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_alternating_signatures_all_persist() {
    let tmp = TempDir::new().unwrap();
    let store = BugStore::new(tmp.path());

    for summary in ["A", "B", "A"] {
        assert!(store.save_if_new(&bug(summary)).await.unwrap().is_some());
    }
    assert_eq!(store.list().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_concurrent_identical_scans_persist_once() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(BugStore::new(tmp.path()));

    let a = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.save_if_new(&bug("A")).await.unwrap() }
    });
    let b = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.save_if_new(&bug("A")).await.unwrap() }
    });

    let saved = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(saved.iter().filter(|s| s.is_some()).count(), 1);
}

#[tokio::test]
async fn test_closed_port_probe_fails_with_error_code() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let settings = ProbeSettings {
        db_host: "127.0.0.1".to_string(),
        db_port: port,
        ..Default::default()
    };
    let probes = DiagnosticProbes::new(settings, Arc::new(FakeClusterService::new()));

    let report = probes.run(DiagnosticKind::Database, None).await;
    assert_eq!(report.status, ProbeStatus::Failed);
    let code = report.detail("error_code").and_then(|c| c.as_i64()).unwrap();
    assert_ne!(code, 0);
}

#[test]
fn test_fallback_plan_for_pod_crash() {
    let plan = fallback_plan(&BugRecord {
        summary: "kubernetes pod crash".to_string(),
        ..Default::default()
    });
    let kinds: Vec<_> = plan.steps.iter().filter_map(|s| s.kind).collect();

    assert!(kinds.contains(&DiagnosticKind::PodStatus));
    assert!(kinds.contains(&DiagnosticKind::PodLogs));
    assert_eq!(kinds.first(), Some(&DiagnosticKind::EnvironmentVariables));
    assert_eq!(kinds.last(), Some(&DiagnosticKind::RecentChanges));
}

#[tokio::test]
async fn test_prose_analysis_reply_gets_placeholder() {
    let prose = "The service looks unhealthy because the database is overloaded and nobody noticed.";
    let llm = FakeTextGenerator::with_replies([prose]);
    let probes = DiagnosticProbes::new(ProbeSettings::default(), Arc::new(FakeClusterService::new()));
    let executor = InvestigationExecutor::new(probes, Arc::new(llm));

    let results = InvestigationResults {
        steps: Vec::new(),
        summary: Default::default(),
        strategy: "Systematic debugging approach".to_string(),
        expected_correlations: String::new(),
    };
    let analysis = executor.analyze(&BugRecord::default(), &results).await;

    assert_eq!(analysis.severity.level, SeverityLevel::Medium);
    assert_eq!(analysis.confidence_level, "low");
    assert!(analysis.root_cause.contains(prose));
}

#[tokio::test]
async fn test_long_prose_analysis_keeps_first_200_chars() {
    let prose = format!("{}{}", "a".repeat(200), "Z".repeat(60));
    let llm = FakeTextGenerator::with_replies([prose.clone()]);
    let probes = DiagnosticProbes::new(ProbeSettings::default(), Arc::new(FakeClusterService::new()));
    let executor = InvestigationExecutor::new(probes, Arc::new(llm));

    let results = InvestigationResults {
        steps: Vec::new(),
        summary: Default::default(),
        strategy: String::new(),
        expected_correlations: String::new(),
    };
    let analysis = executor.analyze(&BugRecord::default(), &results).await;

    assert_eq!(analysis.severity.level, SeverityLevel::Medium);
    assert!(analysis.root_cause.contains(truncate_chars(&prose, 200)));
    assert!(!analysis.root_cause.contains('Z'));
}

#[tokio::test]
async fn test_detection_reply_with_null_field_keeps_location() {
    let tmp = TempDir::new().unwrap();
    let log_source = FakeLogSource::new().with_streams(Some("ERROR"), vec![error_stream()]);
    let reply = DETECTION_REPLY.replace(
        r#""message": "NullPointerException at line 42 in app/main.py""#,
        r#""message": "NullPointerException at line 42 in app/main.py", "bug_found_time": null"#,
    );
    assert!(reply.contains("null"));
    let llm = FakeTextGenerator::with_replies([reply.as_str(), "insights"]);
    let bugs = Arc::new(BugStore::new(tmp.path()));
    let scanner = LogScanner::new(
        Arc::new(log_source),
        Arc::new(FakeSemanticSearch::new()),
        Arc::new(llm),
        Arc::clone(&bugs),
    );

    assert!(matches!(scanner.run_once().await.unwrap(), ScanOutcome::Persisted(_)));
    let listed = bugs.list().await.unwrap();
    let saved = listed[0].bug.as_ref().unwrap();
    assert_eq!(saved.file.as_deref(), Some("app/main.py"));
    assert_eq!(saved.line, Some(42));
    assert_eq!(saved.summary, "Null pointer exception in request handler");
}

#[tokio::test]
async fn test_scheduler_start_stop_idempotent() {
    let tmp = TempDir::new().unwrap();
    let context = PipelineContext::new(StorageSettings::under(tmp.path()), ProbeSettings::default());
    let backends = fake_backends(FakeLogSource::new(), FakeTextGenerator::new());
    let scheduler = Scheduler::new(SchedulerConfig::default(), context, Arc::new(FixedBackends(backends))).unwrap();

    scheduler.stop().await;
    assert!(!scheduler.is_running().await);

    scheduler.start().await;
    scheduler.start().await;
    assert!(scheduler.is_running().await);

    scheduler.stop().await;
    assert!(!scheduler.is_running().await);
    scheduler.stop().await;
}

#[tokio::test]
async fn test_scheduler_survives_failing_cycles() {
    let tmp = TempDir::new().unwrap();
    let context = PipelineContext::new(StorageSettings::under(tmp.path()), ProbeSettings::default());
    let llm = FakeTextGenerator::new();
    let backends = fake_backends(FakeLogSource::new(), llm.clone());
    let config = SchedulerConfig {
        frequency_seconds: 1,
        ..Default::default()
    };
    let scheduler = Scheduler::new(config, context, Arc::new(FixedBackends(backends)))
        .unwrap()
        .with_backoff(Duration::from_millis(10));

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert!(scheduler.is_running().await);
    assert!(llm.call_count() >= 2);
    scheduler.stop().await;
}

#[tokio::test]
async fn test_error_logs_produce_one_bug_file() {
    let tmp = TempDir::new().unwrap();
    let log_source = FakeLogSource::new().with_streams(Some("ERROR"), vec![error_stream()]);
    let llm = FakeTextGenerator::with_replies([DETECTION_REPLY, "1. Guard the user lookup."]);
    let bugs = Arc::new(BugStore::new(tmp.path().join("bugs")));
    let scanner = LogScanner::new(
        Arc::new(log_source.clone()),
        Arc::new(FakeSemanticSearch::new()),
        Arc::new(llm.clone()),
        Arc::clone(&bugs),
    );

    let outcome = scanner.run_once().await.unwrap();
    assert!(matches!(outcome, ScanOutcome::Persisted(_)));

    let listed = bugs.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    let saved = listed[0].bug.as_ref().unwrap();
    assert_eq!(saved.line, Some(42));
    assert_eq!(saved.file.as_deref(), Some("app/main.py"));
    assert_eq!(saved.evidence.len(), 3);
    assert_eq!(saved.evidence[1].full, "[ERROR] api: NullPointerException at line 42 in app/main.py");
    assert_eq!(saved.ai_insights, "1. Guard the user lookup.");

    let levels: Vec<_> = log_source.queries().into_iter().map(|q| q.level).collect();
    assert_eq!(levels, vec![Some("ERROR".to_string()), Some("WARN".to_string())]);
    let prompt = &llm.calls()[0][1].content;
    assert!(prompt.contains("Log 2: [ERROR] api: NullPointerException at line 42 in app/main.py"));
}

#[tokio::test]
async fn test_repeated_scan_is_duplicate() {
    let tmp = TempDir::new().unwrap();
    let log_source = FakeLogSource::new().with_streams(Some("ERROR"), vec![error_stream()]);
    let llm = FakeTextGenerator::with_replies([DETECTION_REPLY, "insights", DETECTION_REPLY, "insights"]);
    let bugs = Arc::new(BugStore::new(tmp.path()));
    let scanner = LogScanner::new(
        Arc::new(log_source),
        Arc::new(FakeSemanticSearch::new()),
        Arc::new(llm),
        Arc::clone(&bugs),
    );

    assert!(matches!(scanner.run_once().await.unwrap(), ScanOutcome::Persisted(_)));
    assert_eq!(scanner.run_once().await.unwrap(), ScanOutcome::Duplicate);
    assert_eq!(bugs.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_investigation_is_saved_and_linked() {
    let tmp = TempDir::new().unwrap();
    let context = PipelineContext::new(StorageSettings::under(tmp.path()), ProbeSettings::default());
    let bugs = Arc::clone(&context.bugs);
    let path = bugs.save_if_new(&bug("Recent changes")).await.unwrap().unwrap();
    let filename = path.file_name().unwrap().to_string_lossy().into_owned();

    let plan = r#"{"investigation_strategy": "Look at changes", "steps": [{"name": "Recent Changes Check"}]}"#;
    let analysis = r#"{"severity": {"level": "Low", "confidence": "high", "reasoning": "minor"}, "root_cause": "config drift"}"#;
    let llm = FakeTextGenerator::with_replies([plan, analysis]);
    let backends = fake_backends(FakeLogSource::new(), llm);
    let scheduler = Scheduler::new(SchedulerConfig::default(), context, Arc::new(FixedBackends(backends))).unwrap();
    let service = VigilService::new(Arc::new(scheduler), "test-model");

    let bug_info = serde_json::to_value(bug("Recent changes")).unwrap();
    let envelope = service.start_investigation(bug_info, Some(&filename)).await;
    assert!(envelope.is_success());

    let result = envelope.result.unwrap();
    let id = result["investigation_id"].as_str().unwrap().to_string();
    assert_eq!(result["result"]["status"], json!("completed"));
    assert_eq!(result["result"]["analysis"]["severity"]["level"], json!("Low"));
    assert_eq!(result["result"]["investigation_results"]["steps"][0]["success"], json!(true));

    assert!(tmp.path().join("investigations").join(format!("{}.json", id)).exists());
    let linked = bugs.read(&filename).await.unwrap();
    assert_eq!(linked.investigation_id.as_deref(), Some(id.as_str()));

    assert!(service.get_investigation(&id).await.is_success());
    assert!(service.delete_investigation(&id).await.is_success());
    assert!(!service.get_investigation(&id).await.is_success());
}
