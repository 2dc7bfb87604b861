//! Best-effort recovery of structured data from text-generation replies.
//!
//! Replies are untrusted text. Every caller goes through [`decode_reply`],
//! which tries, in order:
//! 1. a fenced ```` ```json ```` block
//! 2. the whole reply as JSON
//! 3. the outermost `{...}` span embedded in prose
//!
//! Each candidate must deserialize into the caller's schema type to count.
//! When none does the caller substitutes its own typed fallback; nothing in
//! here returns an error or panics.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;

/// Which layer produced a decoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Fenced,
    Raw,
    Embedded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub recovery: Recovery,
}

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|JSON)?\s*(\{[\s\S]+?\})\s*```").unwrap());

/// Contents of the first fenced JSON object block, if any
pub fn fenced_json(text: &str) -> Option<&str> {
    FENCED_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Span from the first `{` to the last `}`
pub fn embedded_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Decode a reply into `T`, trying fenced, raw, then embedded JSON
pub fn decode_reply<T: DeserializeOwned>(text: &str) -> Option<Decoded<T>> {
    let layers = [
        (Recovery::Fenced, fenced_json(text)),
        (Recovery::Raw, Some(text.trim())),
        (Recovery::Embedded, embedded_object(text)),
    ];

    layers.into_iter().find_map(|(recovery, candidate)| {
        let candidate = candidate?;
        serde_json::from_str::<T>(candidate)
            .ok()
            .map(|value| Decoded { value, recovery })
    })
}

// ============================================================================
// Free-text bug extraction
// ============================================================================

/// Fields scraped from a reply that was not JSON at all
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedBug {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub summary: String,
    pub explanation: String,
}

static FILE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:File|file)[\s:]+([\w/\\.\-]+)[\s,;:]+(?:line|Line)[\s:]+(\d+)").unwrap()
});

static SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(?:Summary|summary|Issue|issue)[\s:]+(.+?)(?:Explanation:|$)").unwrap()
});

static EXPLANATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)Explanation:(.+)").unwrap());

pub const NO_EXPLANATION: &str = "No explanation provided.";

/// Regex extraction of `file`, `line` and `summary` from prose. The summary
/// falls back to the whole trimmed reply.
pub fn scrape_bug(text: &str) -> ScrapedBug {
    let (file, line) = match FILE_LINE.captures(text) {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str().to_string()),
            caps.get(2).and_then(|m| m.as_str().parse().ok()),
        ),
        None => (None, None),
    };

    let summary = SUMMARY
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| text.trim().to_string());

    let explanation = EXPLANATION
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| NO_EXPLANATION.to_string());

    ScrapedBug {
        file,
        line,
        summary,
        explanation,
    }
}

/// First `n` characters, on a char boundary
pub fn truncate_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalysisResult, BugRecord, SeverityLevel};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        name: String,
    }

    #[test]
    fn test_decode_fenced_block() {
        let text = "Here you go:\n```json\n{\"name\": \"fenced\"}\n```\nthanks";
        let decoded = decode_reply::<Probe>(text).unwrap();
        assert_eq!(decoded.value.name, "fenced");
        assert_eq!(decoded.recovery, Recovery::Fenced);
    }

    #[test]
    fn test_decode_raw_json() {
        let decoded = decode_reply::<Probe>("  {\"name\": \"raw\"}  ").unwrap();
        assert_eq!(decoded.recovery, Recovery::Raw);
    }

    #[test]
    fn test_decode_embedded_object() {
        let text = "Sure! {\"name\": \"inner\"} hope that helps";
        let decoded = decode_reply::<Probe>(text).unwrap();
        assert_eq!(decoded.value.name, "inner");
        assert_eq!(decoded.recovery, Recovery::Embedded);
    }

    #[test]
    fn test_decode_rejects_wrong_schema() {
        assert!(decode_reply::<Probe>("{\"other\": 1}").is_none());
        assert!(decode_reply::<Probe>("no json here").is_none());
    }

    #[test]
    fn test_decode_fenced_bug_with_null_field() {
        let text = "```json\n{\"file\": \"app/main.py\", \"line\": 42, \"summary\": \"Null pointer exception\", \"bug_found_time\": null}\n```";
        let decoded = decode_reply::<BugRecord>(text).unwrap();
        assert_eq!(decoded.recovery, Recovery::Fenced);
        assert_eq!(decoded.value.file.as_deref(), Some("app/main.py"));
        assert_eq!(decoded.value.line, Some(42));
        assert_eq!(decoded.value.summary, "Null pointer exception");
    }

    #[test]
    fn test_decode_analysis_with_object_correlations() {
        let text = r#"{"severity": {"level": "High"}, "root_cause": "pool exhausted", "correlations": [{"a": "network", "b": "db"}]}"#;
        let decoded = decode_reply::<AnalysisResult>(text).unwrap();
        assert_eq!(decoded.value.severity.level, SeverityLevel::High);
        assert_eq!(decoded.value.root_cause, "pool exhausted");
        assert_eq!(decoded.value.correlations.len(), 1);
    }

    #[test]
    fn test_scrape_bug_from_prose() {
        let text = "File: app/main.py, line: 42\nSummary: Null pointer in handler\nExplanation: the user object is None";
        let scraped = scrape_bug(text);
        assert_eq!(scraped.file.as_deref(), Some("app/main.py"));
        assert_eq!(scraped.line, Some(42));
        assert_eq!(scraped.summary, "Null pointer in handler");
        assert_eq!(scraped.explanation, "the user object is None");
    }

    #[test]
    fn test_scrape_bug_without_markers() {
        let scraped = scrape_bug("  something went wrong  ");
        assert_eq!(scraped.file, None);
        assert_eq!(scraped.summary, "something went wrong");
        assert_eq!(scraped.explanation, NO_EXPLANATION);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }
}
