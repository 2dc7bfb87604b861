//! Shared data model for detection, investigation and reporting.
//!
//! Everything here is plain serde data. Raw log records arrive in several
//! shapes and are normalized to [`NormalizedLog`] before anything else looks
//! at them. Bug and investigation records are persisted as JSON files, so
//! every field that a text-generation reply may omit carries a serde default.

use chrono::Local;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Log entries
// ============================================================================

/// Loki-style stream: labels plus `[timestamp, line]` values. Newer Loki
/// versions append a structured-metadata object as a third element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogStream {
    pub stream: Map<String, Value>,
    pub values: Vec<Vec<Value>>,
}

impl LogStream {
    fn label(&self, key: &str) -> Option<&str> {
        self.stream.get(key).and_then(Value::as_str)
    }

    /// Log lines in order; values without a line element are skipped
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.values.iter().filter_map(|value| value.get(1)).map(stringify)
    }
}

/// Heterogeneous raw log record as returned by the log source or the
/// semantic index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogEntry {
    Stream(LogStream),
    Flat(Map<String, Value>),
    Text(String),
    Other(Value),
}

/// A single log line in the two forms the scanner needs: `full` carries
/// level/service context for the prompt, `message` is the bare text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct NormalizedLog {
    pub full: String,
    pub message: String,
}

impl From<Value> for NormalizedLog {
    fn from(value: Value) -> Self {
        let pair = value
            .get("full")
            .and_then(Value::as_str)
            .zip(value.get("message").and_then(Value::as_str));
        match pair {
            Some((full, message)) => Self {
                full: full.to_string(),
                message: message.to_string(),
            },
            None => Self::plain(stringify(&value)),
        }
    }
}

impl NormalizedLog {
    /// Line with no extra context (`full == message`)
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            full: text.clone(),
            message: text,
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl LogEntry {
    /// Flatten into normalized lines. Stream entries yield one line per value.
    pub fn normalize(&self) -> Vec<NormalizedLog> {
        match self {
            LogEntry::Stream(stream) => {
                let level = stream.label("level").unwrap_or("INFO");
                let service = stream.label("service").unwrap_or("unknown");
                stream
                    .lines()
                    .map(|message| NormalizedLog {
                        full: format!("[{}] {}: {}", level, service, message),
                        message,
                    })
                    .collect()
            }
            LogEntry::Flat(map) => match map.get("message") {
                Some(message) => vec![NormalizedLog::plain(stringify(message))],
                None => vec![NormalizedLog::plain(Value::Object(map.clone()).to_string())],
            },
            LogEntry::Text(text) => vec![NormalizedLog::plain(text.clone())],
            LogEntry::Other(value) => vec![NormalizedLog::plain(stringify(value))],
        }
    }

    /// Interpret an arbitrary JSON payload (e.g. a semantic-search hit)
    pub fn from_payload(value: Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or(LogEntry::Other(value))
    }
}

/// Normalize a batch of entries, preserving order
pub fn normalize_all(entries: &[LogEntry]) -> Vec<NormalizedLog> {
    entries.iter().flat_map(LogEntry::normalize).collect()
}

// ============================================================================
// Bug records
// ============================================================================

/// Number of trailing normalized lines kept as evidence on every record
pub const EVIDENCE_LIMIT: usize = 10;

/// Characters of the summary that participate in the dedup signature
pub const SIGNATURE_SUMMARY_CHARS: usize = 50;

/// One detected anomaly extracted from logs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BugRecord {
    #[serde(default, deserialize_with = "lenient_opt_text")]
    pub file: Option<String>,
    #[serde(default, deserialize_with = "lenient_line")]
    pub line: Option<u32>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub human_explanation: String,
    #[serde(default, deserialize_with = "lenient_evidence")]
    pub evidence: Vec<NormalizedLog>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub bug_found_time: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub scan_time: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub ai_insights: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub raw_response: String,
    #[serde(default, deserialize_with = "lenient_opt_text", skip_serializing_if = "Option::is_none")]
    pub investigation_id: Option<String>,
}

/// Accept a line number given as a JSON number or a numeric string
pub fn line_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// Lenient field readers. Replies and dashboard payloads send `null`, numbers
// or objects where a string is expected; none of that rejects the record.

fn lenient_line<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(line_from_value))
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(stringify).unwrap_or_default())
}

fn lenient_opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_null()).map(|v| stringify(&v)))
}

fn lenient_values<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.into_iter().filter(|v| !v.is_null()).collect(),
        Some(single) => vec![single],
    })
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = lenient_values(deserializer)?;
    Ok(values.iter().map(stringify).collect())
}

fn lenient_evidence<'de, D>(deserializer: D) -> Result<Vec<NormalizedLog>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = lenient_values(deserializer)?;
    Ok(values.into_iter().map(NormalizedLog::from).collect())
}

/// Dedup key derived from file, line and the first 50 summary characters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BugSignature(String);

impl BugSignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BugSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl BugRecord {
    pub fn signature(&self) -> BugSignature {
        let summary: String = self.summary.chars().take(SIGNATURE_SUMMARY_CHARS).collect();
        BugSignature(format!(
            "{}-{}-{}",
            self.file.as_deref().unwrap_or(""),
            self.line.map(|l| l.to_string()).unwrap_or_default(),
            summary
        ))
    }

    /// File and a non-zero line are both known
    pub fn has_location(&self) -> bool {
        self.file.as_deref().is_some_and(|f| !f.is_empty()) && self.line.is_some_and(|l| l > 0)
    }
}

// ============================================================================
// Probe results
// ============================================================================

/// Classification every probe reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Connected,
    Success,
    Failed,
    NoData,
}

/// Terminal state of one executed investigation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed,
    NoData,
}

/// Result of a single probe run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub status: ProbeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}

impl ProbeReport {
    fn with_status(status: ProbeStatus) -> Self {
        Self {
            status,
            response_time_ms: None,
            error: None,
            details: Map::new(),
        }
    }

    /// Endpoint answered; latency recorded in milliseconds
    pub fn connected(elapsed: Duration) -> Self {
        let mut report = Self::with_status(ProbeStatus::Connected);
        report.response_time_ms = Some(round_ms(elapsed));
        report
    }

    pub fn success() -> Self {
        Self::with_status(ProbeStatus::Success)
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let mut report = Self::with_status(ProbeStatus::Failed);
        report.error = Some(error.into());
        report
    }

    pub fn no_data(error: impl Into<String>) -> Self {
        let mut report = Self::with_status(ProbeStatus::NoData);
        report.error = Some(error.into());
        report
    }

    /// Attach a probe-specific field
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn with_latency(mut self, elapsed: Duration) -> Self {
        self.response_time_ms = Some(round_ms(elapsed));
        self
    }

    pub fn outcome(&self) -> StepOutcome {
        match self.status {
            ProbeStatus::Connected | ProbeStatus::Success => StepOutcome::Succeeded,
            ProbeStatus::Failed => StepOutcome::Failed,
            ProbeStatus::NoData => StepOutcome::NoData,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome() == StepOutcome::Succeeded
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }
}

/// One entry of the running success/failure tally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub step_name: String,
    pub timestamp: String,
    pub success: bool,
    pub result: ProbeReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total_steps: usize,
    pub successful_steps: usize,
    pub failed_steps: usize,
    pub steps: Vec<LedgerEntry>,
}

impl LedgerSummary {
    pub fn from_entries(steps: Vec<LedgerEntry>) -> Self {
        let successful_steps = steps.iter().filter(|s| s.success).count();
        Self {
            total_steps: steps.len(),
            successful_steps,
            failed_steps: steps.len() - successful_steps,
            steps,
        }
    }
}

// ============================================================================
// Investigations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationStep {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub result: ProbeReport,
    pub success: bool,
    pub outcome: StepOutcome,
    pub step_number: usize,
    pub total_steps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationResults {
    pub steps: Vec<InvestigationStep>,
    pub summary: LedgerSummary,
    #[serde(alias = "investigation_strategy")]
    pub strategy: String,
    pub expected_correlations: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationRecord {
    pub investigation_id: String,
    pub bug_info: BugRecord,
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub status: InvestigationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_results: Option<InvestigationResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
}

impl InvestigationRecord {
    pub fn begin(investigation_id: String, bug_info: BugRecord) -> Self {
        Self {
            investigation_id,
            bug_info,
            start_time: Local::now().to_rfc3339(),
            end_time: None,
            status: InvestigationStatus::InProgress,
            investigation_results: None,
            analysis: None,
        }
    }

    pub fn complete(mut self, results: InvestigationResults, analysis: AnalysisResult) -> Self {
        self.end_time = Some(Local::now().to_rfc3339());
        self.status = InvestigationStatus::Completed;
        self.investigation_results = Some(results);
        self.analysis = Some(analysis);
        self
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// Categorical urgency label
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SeverityLevel {
    Critical,
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

impl SeverityLevel {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for SeverityLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = Option::<Value>::deserialize(deserializer)?;
        Ok(label.as_ref().and_then(Value::as_str).map_or(Self::Unknown, Self::parse))
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SeverityRepr")]
pub struct Severity {
    pub level: SeverityLevel,
    pub confidence: String,
    pub reasoning: String,
}

/// Full object, or a bare level label
#[derive(Deserialize)]
#[serde(untagged)]
enum SeverityRepr {
    Full {
        #[serde(default)]
        level: SeverityLevel,
        #[serde(default, deserialize_with = "lenient_text")]
        confidence: String,
        #[serde(default, deserialize_with = "lenient_text")]
        reasoning: String,
    },
    Label(String),
}

impl From<SeverityRepr> for Severity {
    fn from(repr: SeverityRepr) -> Self {
        match repr {
            SeverityRepr::Full {
                level,
                confidence,
                reasoning,
            } => Self {
                level,
                confidence,
                reasoning,
            },
            SeverityRepr::Label(label) => Self {
                level: SeverityLevel::parse(&label),
                confidence: String::new(),
                reasoning: String::new(),
            },
        }
    }
}

/// Structured root-cause analysis. Only `severity` and `root_cause` must be
/// present for a reply to count as well-formed; list items that are not
/// strings are kept as their JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub severity: Severity,
    #[serde(deserialize_with = "lenient_text")]
    pub root_cause: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub correlations: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub recommended_fixes: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub prevention_measures: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub confidence_level: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub summary: String,
}

impl AnalysisResult {
    /// Medium severity, low confidence stand-in used when no usable
    /// analysis could be recovered
    pub fn placeholder(reasoning: impl Into<String>, root_cause: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            severity: Severity {
                level: SeverityLevel::Medium,
                confidence: "low".to_string(),
                reasoning: reasoning.into(),
            },
            root_cause: root_cause.into(),
            correlations: Vec::new(),
            recommended_fixes: Vec::new(),
            prevention_measures: Vec::new(),
            confidence_level: "low".to_string(),
            summary: summary.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_stream_entry() {
        let entry: LogEntry = serde_json::from_value(json!({
            "stream": {"job": "app", "level": "ERROR", "service": "billing"},
            "values": [["1700000000000000000", "db timeout"], ["1700000000000000001", "retrying"]]
        }))
        .unwrap();

        let lines = entry.normalize();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].full, "[ERROR] billing: db timeout");
        assert_eq!(lines[0].message, "db timeout");
    }

    #[test]
    fn test_normalize_stream_defaults() {
        let entry: LogEntry = serde_json::from_value(json!({
            "stream": {"job": "app"},
            "values": [["1", "hello"]]
        }))
        .unwrap();
        assert_eq!(entry.normalize()[0].full, "[INFO] unknown: hello");
    }

    #[test]
    fn test_normalize_flat_and_text() {
        let flat = LogEntry::from_payload(json!({"message": "disk full", "level": "WARN"}));
        assert_eq!(flat.normalize(), vec![NormalizedLog::plain("disk full")]);

        let no_message = LogEntry::from_payload(json!({"cpu": 93}));
        assert_eq!(no_message.normalize()[0].full, r#"{"cpu":93}"#);

        let text = LogEntry::from_payload(json!("plain line"));
        assert_eq!(text.normalize()[0].message, "plain line");

        let number = LogEntry::from_payload(json!(42));
        assert_eq!(number.normalize()[0].full, "42");
    }

    #[test]
    fn test_signature_truncates_summary() {
        let bug = BugRecord {
            file: Some("app/main.py".to_string()),
            line: Some(42),
            summary: "x".repeat(80),
            ..Default::default()
        };
        assert_eq!(bug.signature().as_str(), format!("app/main.py-42-{}", "x".repeat(50)));

        let bare = BugRecord::default();
        assert_eq!(bare.signature().as_str(), "--");
    }

    #[test]
    fn test_bug_record_lenient_fields() {
        let bug: BugRecord = serde_json::from_value(json!({
            "file": "svc.py",
            "line": "17",
            "summary": "boom",
            "evidence": ["raw line", {"full": "[ERROR] a: b", "message": "b"}]
        }))
        .unwrap();
        assert_eq!(bug.line, Some(17));
        assert_eq!(bug.evidence[0], NormalizedLog::plain("raw line"));
        assert_eq!(bug.evidence[1].message, "b");
        assert!(bug.has_location());
    }

    #[test]
    fn test_bug_record_tolerates_nulls_and_odd_evidence() {
        let bug: BugRecord = serde_json::from_value(json!({
            "file": "app/main.py",
            "line": 42,
            "summary": "Null pointer exception",
            "human_explanation": null,
            "bug_found_time": null,
            "investigation_id": null,
            "evidence": ["plain", {"full": "[ERROR] api: x", "message": "x"}, {"ts": 1}, 7, null]
        }))
        .unwrap();

        assert_eq!(bug.file.as_deref(), Some("app/main.py"));
        assert_eq!(bug.line, Some(42));
        assert_eq!(bug.human_explanation, "");
        assert_eq!(bug.bug_found_time, "");
        assert_eq!(bug.investigation_id, None);
        assert_eq!(bug.evidence.len(), 4);
        assert_eq!(bug.evidence[1].full, "[ERROR] api: x");
        assert_eq!(bug.evidence[2].full, r#"{"ts":1}"#);
        assert_eq!(bug.evidence[3].message, "7");
    }

    #[test]
    fn test_stream_values_with_metadata() {
        let entry: LogEntry = serde_json::from_value(json!({
            "stream": {"level": "WARN", "service": "api"},
            "values": [["1", "slow query", {"trace_id": "abc"}], ["2"]]
        }))
        .unwrap();

        let lines = entry.normalize();
        assert_eq!(lines, vec![NormalizedLog {
            full: "[WARN] api: slow query".to_string(),
            message: "slow query".to_string(),
        }]);
    }

    #[test]
    fn test_analysis_accepts_loose_shapes() {
        let analysis: AnalysisResult = serde_json::from_value(json!({
            "severity": {"level": "High", "confidence": null, "reasoning": "pool at limit"},
            "root_cause": "pool exhausted",
            "correlations": [{"a": "network", "b": "db"}, "latency spike"],
            "recommended_fixes": "raise pool size",
            "prevention_measures": null,
            "confidence_level": null
        }))
        .unwrap();

        assert_eq!(analysis.severity.level, SeverityLevel::High);
        assert_eq!(analysis.severity.confidence, "");
        assert_eq!(analysis.correlations, vec![r#"{"a":"network","b":"db"}"#, "latency spike"]);
        assert_eq!(analysis.recommended_fixes, vec!["raise pool size"]);
        assert!(analysis.prevention_measures.is_empty());
        assert_eq!(analysis.confidence_level, "");
    }

    #[test]
    fn test_analysis_requires_severity_and_root_cause() {
        let label: AnalysisResult =
            serde_json::from_value(json!({"severity": "critical", "root_cause": "disk full"})).unwrap();
        assert_eq!(label.severity.level, SeverityLevel::Critical);

        assert!(serde_json::from_value::<AnalysisResult>(json!({"severity": {"level": "Low"}})).is_err());
        assert!(serde_json::from_value::<AnalysisResult>(json!({"root_cause": "x"})).is_err());
    }

    #[test]
    fn test_probe_report_serializes_flat() {
        let report = ProbeReport::failed("Connection refused")
            .with("error_code", 111)
            .with("host", "127.0.0.1");
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error_code"], 111);
        assert_eq!(report.outcome(), StepOutcome::Failed);
    }

    #[test]
    fn test_severity_level_is_case_tolerant() {
        let severity: Severity = serde_json::from_value(json!({"level": "high"})).unwrap();
        assert_eq!(severity.level, SeverityLevel::High);
        let odd: Severity = serde_json::from_value(json!({"level": "Severe"})).unwrap();
        assert_eq!(odd.level, SeverityLevel::Unknown);
    }

    #[test]
    fn test_ledger_summary_counts() {
        let entry = |success| LedgerEntry {
            step_name: "x".to_string(),
            timestamp: String::new(),
            success,
            result: ProbeReport::success(),
            error: None,
        };
        let summary = LedgerSummary::from_entries(vec![entry(true), entry(false), entry(true)]);
        assert_eq!(summary.total_steps, 3);
        assert_eq!(summary.successful_steps, 2);
        assert_eq!(summary.failed_steps, 1);
    }
}
