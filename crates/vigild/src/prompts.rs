//! Prompt text for every text-generation call vigild makes.

use serde_json::Value;
use vigil_common::NormalizedLog;

use crate::probes::DiagnosticKind;

pub const LOG_EXPERT_SYSTEM_PROMPT: &str =
    "You are an expert at analysing logs and identifying issues in production monitoring systems.";

/// Detection contract: one fenced JSON bug, or `{"no_bug": true}`
pub const SCANNER_SYSTEM_PROMPT: &str = r#"You are a debugging expert.
From the following logs, identify exactly one bug: the most recent or the most critical.
If you find a bug, answer with a JSON object wrapped in a ```json fenced block and nothing else.
The JSON object must have these fields:
 - file (string, source file where the error occurred)
 - line (integer, line where the error occurred)
 - summary (string, very short human-friendly outline of the issue)
 - human_explanation (string, detailed explanation and suggested fix)
 - evidence (list of up to 10 relevant log lines)
 - message (string, the core log message that shows the bug)
 - bug_found_time (string, ISO8601 time the bug occurred in the logs)

If there is no bug, answer with {"no_bug": true}.

Example:
```json
{
  "file": "app/main.py",
  "line": 42,
  "summary": "Null pointer exception",
  "human_explanation": "The handler dereferences a missing user object...",
  "evidence": ["[ERROR] api: NullPointerException at line 42 in app/main.py"],
  "message": "[ERROR] api: NullPointerException at line 42 in app/main.py",
  "bug_found_time": "2024-06-01T12:00:00"
}
```"#;

pub const INVESTIGATION_SYSTEM_PROMPT: &str = "You are an expert SRE debugging agent.
Your job is to investigate production issues systematically: read the bug report,
choose diagnostic checks, correlate their findings, identify the root cause and
recommend fixes and prevention measures. Start from basic health checks, move to the
services named in the error, then look for correlations between the results.";

pub const SRE_REPORT_SYSTEM_PROMPT: &str = "You are an expert SRE analysing logs and pod health.
Write a concise, actionable markdown report for the on-call engineer.

Cover, where the data allows:
- Error analysis: patterns, counts, file paths and line numbers, how errors propagate
- Performance: CPU and memory pressure, latency anomalies, bottlenecks
- Security: authentication failures and unusual access patterns
- System health: pod restarts, crashes, unavailable services, network problems
- Resource utilization: storage, memory and CPU trends

Start with a short executive summary. Mark severity with 🚨 critical, ⚠️ warning,
ℹ️ information and ✅ resolved. Give concrete next steps with file paths where known,
and say explicitly when data is missing.";

pub const CHAT_SYSTEM_PROMPT: &str = "You are an expert in diagnosing and troubleshooting production issues from logs.
Find patterns, spot anomalies and give engineers actionable insights.";

pub const LOG_SUMMARY_PROMPT: &str = "Summarise the key insights from these production log entries.
- Recurring issues: repeated errors, CPU or memory pressure, frequent timeouts
- Anomalies: unusual timestamps, rare errors, unexpected behaviour
- Severity: group entries by INFO, WARNING, ERROR and CRITICAL, critical failures first
- Correlations: cluster similar messages and name dependencies between failures
- Likely root causes, and recommended actions
Back every conclusion with log excerpts, timestamps, affected components and,
where known, the file and line.

Log entries:
";

/// Prepended to every follow-up question in a conversation
pub const CHAT_FOLLOW_UP_PREFIX: &str = "You are a debugging expert. Analyse the logs and cluster state to report back
on anything relevant to the user question. Talk to the user directly, always attempt
an answer, and include your reasoning with evidence from the raw data.

The user question is:";

const CHAT_RESPONSE_FORMAT: &str = "Structure your answer with these sections:
### 🚨 Critical Issue Detected! 🚨
#### 🔍 Issue Summary
#### 🚑 Potential Causes
#### ✅ Recommended Actions";

/// Enumerated log block (`Log {i}: {full}`), 1-based
pub fn format_logs(logs: &[NormalizedLog]) -> String {
    logs.iter()
        .enumerate()
        .map(|(i, log)| format!("Log {}: {}", i + 1, log.full))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn scanner_user_prompt(formatted_logs: &str) -> String {
    format!("Please analyze the following logs:\n\n{}", formatted_logs)
}

pub fn insights_prompt(bug_json: &str, formatted_logs: &str) -> String {
    format!(
        "Given the following bug and logs, answer in markdown (do not write the word 'markdown'):
- Root cause analysis (short paragraph)
- Step-by-step fix instructions (numbered list)
- Potential impact if not fixed (short paragraph)
- Related files or log lines to check (list)
Do not start with '- **Root Cause Analysis**'.

Bug: {}

Logs:
{}",
        bug_json, formatted_logs
    )
}

fn tool_catalogue() -> String {
    DiagnosticKind::ALL
        .iter()
        .enumerate()
        .map(|(i, kind)| format!("{}. {} - {}", i + 1, kind.display_name(), kind.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn strategy_prompt(bug_context: &Value) -> String {
    let context = serde_json::to_string_pretty(bug_context).unwrap_or_else(|_| bug_context.to_string());
    format!(
        r#"Analyze this bug and determine the optimal investigation strategy.

BUG CONTEXT:
{context}

AVAILABLE INVESTIGATION TOOLS:
{tools}

INVESTIGATION PRINCIPLES:
- Start with basic context gathering (environment, code)
- Move to infrastructure checks (network, services)
- Check dependencies (databases, external services)
- Check resources and performance
- Look for recent changes that might have caused the issue
- Explain why each step matters for this specific bug

Respond with JSON only, using the tool names exactly as listed:
{{
    "investigation_strategy": "brief description of the overall approach",
    "steps": [
        {{
            "name": "tool name",
            "description": "what this tool does",
            "explanation": "why this tool is important for this bug",
            "priority": "high/medium/low",
            "params": {{}}
        }}
    ],
    "expected_correlations": "patterns or relationships we expect to find"
}}"#,
        context = context,
        tools = tool_catalogue()
    )
}

pub fn analysis_prompt(bug_json: &str, results_json: &str) -> String {
    format!(
        r#"Based on the following bug report and investigation results, provide a comprehensive analysis.

BUG REPORT:
{bug_json}

INVESTIGATION RESULTS:
{results_json}

Provide a severity assessment (Critical/High/Medium/Low) with confidence, the root cause,
correlations between findings, recommended fixes, prevention measures and your overall
confidence. Respond with JSON in exactly this structure:
{{
    "severity": {{
        "level": "Critical/High/Medium/Low",
        "confidence": "high/medium/low",
        "reasoning": "why this severity level was chosen"
    }},
    "root_cause": "description of the root cause",
    "correlations": ["correlations found"],
    "recommended_fixes": ["specific fixes"],
    "prevention_measures": ["prevention measures"],
    "confidence_level": "high/medium/low",
    "summary": "brief summary of findings"
}}"#,
        bug_json = bug_json,
        results_json = results_json
    )
}

pub fn sre_report_prompt(logs: &Value, pod_statuses: &Value) -> String {
    format!(
        "Analyze these logs and pod health data to create a comprehensive SRE report:\n\n\
         Logs: <LOGS>\n{}\n</LOGS>\n\n\
         Pod Health Data: <POD_HEALTH_DATA>\n{}\n</POD_HEALTH_DATA>",
        logs, pod_statuses
    )
}

pub fn chat_answer_prompt(question: &str, log_summary: &str) -> String {
    format!(
        "{}\n\nLog summary:\n{}\n\n{} {}",
        CHAT_RESPONSE_FORMAT, log_summary, CHAT_FOLLOW_UP_PREFIX, question
    )
}
