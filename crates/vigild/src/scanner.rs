//! Log scanner: one detection cycle over the last hour of logs.
//!
//! Entries come from the log store (ERROR and WARN) and the semantic index,
//! are normalized, and handed to the text generator under the detection
//! contract. Whatever comes back is turned into a `BugRecord` by the layered
//! decoder, enriched with evidence and insights, then deduplicated and
//! persisted through the [`BugStore`].

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Local};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vigil_common::{
    decode_reply, normalize_all, scrape_bug, BugRecord, ChatMessage, LogEntry, NormalizedLog, TextGenerator,
    EVIDENCE_LIMIT,
};

use crate::prompts;
use crate::sources::{LogQuery, LogSource, SemanticSearch};
use crate::store::BugStore;

/// Fixed recall query against the semantic index
pub const RECALL_QUERY: &str = "ERROR OR WARN OR bug OR exception";

const LOOKBACK_HOURS: i64 = 1;
const DEFAULT_LOG_LIMIT: usize = 100;
const DETECTION_MAX_TOKENS: u32 = 1500;
const INSIGHTS_MAX_TOKENS: u32 = 200;
const DETECTION_TEMPERATURE: f32 = 0.0;
const INSIGHTS_TEMPERATURE: f32 = 0.0;

/// What one scan cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    NoBug,
    Duplicate,
    Persisted(PathBuf),
}

/// Reply shape under the detection contract. Only `no_bug` is read from it
/// directly; bug replies are decoded straight into `BugRecord`.
#[derive(Debug, Deserialize)]
struct NoBugReply {
    no_bug: bool,
}

pub struct LogScanner {
    log_source: Arc<dyn LogSource>,
    search: Arc<dyn SemanticSearch>,
    llm: Arc<dyn TextGenerator>,
    bugs: Arc<BugStore>,
    log_limit: usize,
}

impl LogScanner {
    pub fn new(
        log_source: Arc<dyn LogSource>,
        search: Arc<dyn SemanticSearch>,
        llm: Arc<dyn TextGenerator>,
        bugs: Arc<BugStore>,
    ) -> Self {
        Self {
            log_source,
            search,
            llm,
            bugs,
            log_limit: DEFAULT_LOG_LIMIT,
        }
    }

    /// Per-source fetch limit (default 100)
    pub fn with_log_limit(mut self, limit: usize) -> Self {
        self.log_limit = limit.max(1);
        self
    }

    pub fn bugs(&self) -> &Arc<BugStore> {
        &self.bugs
    }

    /// Collect every source. A failing source is logged and skipped.
    async fn collect_entries(&self) -> Vec<LogEntry> {
        let mut entries = Vec::new();

        for level in ["ERROR", "WARN"] {
            let query = LogQuery::last(ChronoDuration::hours(LOOKBACK_HOURS), self.log_limit).with_level(level);
            match self.log_source.query(&query).await {
                Ok(streams) => entries.extend(streams.into_iter().map(LogEntry::Stream)),
                Err(e) => warn!("Failed to fetch {} logs: {:#}", level, e),
            }
        }

        match self.search.search(RECALL_QUERY, self.log_limit).await {
            Ok(hits) => entries.extend(hits.into_iter().map(LogEntry::from_payload)),
            Err(e) => warn!("Semantic search failed: {:#}", e),
        }

        entries
    }

    /// Decode the detection reply. `None` means the model reported no bug.
    fn parse_detection(reply: &str) -> Option<BugRecord> {
        if let Some(decoded) = decode_reply::<NoBugReply>(reply) {
            if decoded.value.no_bug {
                return None;
            }
        }

        if let Some(decoded) = decode_reply::<BugRecord>(reply) {
            debug!("Detection reply decoded via {:?}", decoded.recovery);
            return Some(decoded.value);
        }

        let scraped = scrape_bug(reply);
        Some(BugRecord {
            file: scraped.file,
            line: scraped.line,
            summary: scraped.summary,
            human_explanation: scraped.explanation,
            message: reply.trim().to_string(),
            ..Default::default()
        })
    }

    async fn insights(&self, bug: &BugRecord, formatted_logs: &str) -> String {
        let bug_json = serde_json::to_string_pretty(bug).unwrap_or_default();
        let messages = [
            ChatMessage::system(prompts::LOG_EXPERT_SYSTEM_PROMPT),
            ChatMessage::user(prompts::insights_prompt(&bug_json, formatted_logs)),
        ];
        match self.llm.chat(&messages, INSIGHTS_TEMPERATURE, INSIGHTS_MAX_TOKENS).await {
            Ok(text) => text,
            Err(e) => {
                warn!("AI insights call failed: {}", e);
                format!("Failed to get AI insights: {}", e)
            }
        }
    }

    /// Turn normalized logs into a bug record, or `None` when the model saw
    /// no bug. Errors only when the detection call itself fails.
    pub async fn detect(&self, logs: &[NormalizedLog]) -> Result<Option<BugRecord>> {
        let formatted = prompts::format_logs(logs);
        let messages = [
            ChatMessage::system(prompts::SCANNER_SYSTEM_PROMPT),
            ChatMessage::user(prompts::scanner_user_prompt(&formatted)),
        ];

        let reply = self
            .llm
            .chat(&messages, DETECTION_TEMPERATURE, DETECTION_MAX_TOKENS)
            .await
            .context("Detection call failed")?;

        let Some(mut bug) = Self::parse_detection(&reply) else {
            return Ok(None);
        };

        let scan_time = Local::now().to_rfc3339();
        if bug.bug_found_time.is_empty() {
            bug.bug_found_time = scan_time.clone();
        }
        bug.scan_time = scan_time;
        bug.raw_response = reply;
        let skip = logs.len().saturating_sub(EVIDENCE_LIMIT);
        bug.evidence = logs[skip..].to_vec();
        bug.ai_insights = self.insights(&bug, &formatted).await;

        Ok(Some(bug))
    }

    /// One full cycle: collect, detect, dedup, persist
    pub async fn run_once(&self) -> Result<ScanOutcome> {
        let entries = self.collect_entries().await;
        let logs = normalize_all(&entries);
        info!("Scanning {} log lines from {} entries", logs.len(), entries.len());

        let bug = match self.detect(&logs).await {
            Ok(Some(bug)) => bug,
            Ok(None) => {
                info!("No bug found in this scan");
                return Ok(ScanOutcome::NoBug);
            }
            Err(e) => {
                error!("Scan aborted: {:#}", e);
                return Err(e);
            }
        };

        match self.bugs.save_if_new(&bug).await? {
            Some(path) => Ok(ScanOutcome::Persisted(path)),
            None => {
                info!("Bug already reported: {}", bug.summary);
                Ok(ScanOutcome::Duplicate)
            }
        }
    }
}
