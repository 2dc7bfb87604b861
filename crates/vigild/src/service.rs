//! Operations exposed to callers, each answering with a status envelope.
//!
//! Nothing here panics or returns `Err`: failures become `fail` (the
//! operation ran and did not succeed) or `error` (bad input, missing
//! records, storage problems) envelopes with a reason.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{error, info, warn};
use vigil_common::{BugRecord, ChatMessage, SchedulerConfig};

use crate::chat::ChatError;
use crate::scanner::ScanOutcome;
use crate::scheduler::{Scheduler, DEFAULT_REPORT_HOURS};
use crate::store::InvestigationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Fail,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: EnvelopeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Envelope {
    pub fn success(result: Value) -> Self {
        Self {
            status: EnvelopeStatus::Success,
            reason: None,
            result: Some(result),
        }
    }

    pub fn ok() -> Self {
        Self {
            status: EnvelopeStatus::Success,
            reason: None,
            result: None,
        }
    }

    pub fn fail(reason: impl Display) -> Self {
        Self {
            status: EnvelopeStatus::Fail,
            reason: Some(reason.to_string()),
            result: None,
        }
    }

    pub fn error(reason: impl Display) -> Self {
        Self {
            status: EnvelopeStatus::Error,
            reason: Some(reason.to_string()),
            result: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EnvelopeStatus::Success
    }
}

/// Request-level errors with fixed reasons
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("bug_info is required")]
    MissingBugInfo,

    #[error("Invalid bug_info: {0}")]
    InvalidBugInfo(String),

    #[error("File not found")]
    BugNotFound,

    #[error("Investigation not found")]
    InvestigationNotFound,

    #[error("Invalid messages: {0}")]
    InvalidMessages(String),
}

fn to_value(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

pub struct VigilService {
    scheduler: Arc<Scheduler>,
    investigations: InvestigationStore,
    llm_model: String,
}

impl VigilService {
    pub fn new(scheduler: Arc<Scheduler>, llm_model: impl Into<String>) -> Self {
        let investigations = InvestigationStore::new(scheduler.context().storage.investigations_dir.clone());
        Self {
            scheduler,
            investigations,
            llm_model: llm_model.into(),
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Manual scan on the caller's task, independent of the timer
    pub async fn trigger_scan(&self) -> Envelope {
        let pipeline = self.scheduler.pipeline().await;
        match pipeline.scanner.run_once().await {
            Ok(ScanOutcome::NoBug) => Envelope::success(json!({"outcome": "no_bug"})),
            Ok(ScanOutcome::Duplicate) => Envelope::success(json!({"outcome": "duplicate"})),
            Ok(ScanOutcome::Persisted(path)) => Envelope::success(json!({
                "outcome": "persisted",
                "filename": path.file_name().map(|n| n.to_string_lossy().into_owned()),
            })),
            Err(e) => Envelope::fail(format!("{:#}", e)),
        }
    }

    pub async fn generate_report(&self, hours: Option<u32>, namespace: Option<&str>) -> Envelope {
        let pipeline = self.scheduler.pipeline().await;
        let namespace = namespace.unwrap_or(pipeline.namespace()).to_string();
        match pipeline
            .reports
            .generate(hours.unwrap_or(DEFAULT_REPORT_HOURS), &namespace)
            .await
        {
            Ok(report) => Envelope::success(to_value(report)),
            Err(e) => {
                error!("Report generation failed: {:#}", e);
                Envelope::fail(format!("{:#}", e))
            }
        }
    }

    /// Run an investigation, persist it, and link it from the bug file when
    /// one is named. A failed link is logged, not reported.
    pub async fn start_investigation(&self, bug_info: Value, bug_filename: Option<&str>) -> Envelope {
        let empty = match &bug_info {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if empty {
            return Envelope::error(ServiceError::MissingBugInfo);
        }
        let bug: BugRecord = match serde_json::from_value(bug_info) {
            Ok(bug) => bug,
            Err(e) => return Envelope::error(ServiceError::InvalidBugInfo(e.to_string())),
        };

        let pipeline = self.scheduler.pipeline().await;
        let mut record = pipeline.investigations.start_investigation(bug).await;
        if let Err(e) = self.investigations.save(&mut record).await {
            error!("Error saving investigation: {:#}", e);
            return Envelope::error(format!("{:#}", e));
        }

        if let Some(filename) = bug_filename.filter(|f| !f.is_empty()) {
            match self
                .scheduler
                .context()
                .bugs
                .attach_investigation(filename, &record.investigation_id)
                .await
            {
                Ok(true) => {}
                Ok(false) => warn!("Bug file {} not found, investigation not linked", filename),
                Err(e) => warn!("Could not update bug file with investigation ID: {:#}", e),
            }
        }

        info!("Investigation {} completed and saved", record.investigation_id);
        Envelope::success(json!({
            "investigation_id": record.investigation_id,
            "result": to_value(&record),
        }))
    }

    /// Answer the latest user message of a `[{role, content}]` conversation.
    /// The result carries the reply and the extended conversation.
    pub async fn chat(&self, messages: Value) -> Envelope {
        let messages: Vec<ChatMessage> = match serde_json::from_value(messages) {
            Ok(messages) => messages,
            Err(e) => return Envelope::error(ServiceError::InvalidMessages(e.to_string())),
        };

        let pipeline = self.scheduler.pipeline().await;
        match pipeline.chat.respond(messages).await {
            Ok(messages) => {
                let response = messages.last().map(|m| m.content.clone()).unwrap_or_default();
                Envelope::success(json!({"response": response, "messages": to_value(messages)}))
            }
            Err(e @ ChatError::MissingUserMessage) => Envelope::error(e),
            Err(e) => {
                error!("Chat failed: {}", e);
                Envelope::fail(e)
            }
        }
    }

    pub async fn list_bugs(&self) -> Envelope {
        match self.scheduler.context().bugs.list().await {
            Ok(bugs) => Envelope::success(json!({"bugs": to_value(bugs)})),
            Err(e) => Envelope::error(format!("{:#}", e)),
        }
    }

    pub async fn delete_bug(&self, filename: &str) -> Envelope {
        match self.scheduler.context().bugs.delete(filename).await {
            Ok(true) => Envelope::ok(),
            Ok(false) => Envelope::error(ServiceError::BugNotFound),
            Err(e) => Envelope::error(format!("{:#}", e)),
        }
    }

    pub async fn get_investigation(&self, investigation_id: &str) -> Envelope {
        match self.investigations.get(investigation_id).await {
            Ok(Some(record)) => Envelope::success(json!({"investigation": to_value(record)})),
            Ok(None) => Envelope::error(ServiceError::InvestigationNotFound),
            Err(e) => {
                error!("Error retrieving investigation {}: {:#}", investigation_id, e);
                Envelope::error(format!("{:#}", e))
            }
        }
    }

    pub async fn list_investigations(&self) -> Envelope {
        match self.investigations.list().await {
            Ok(listed) => Envelope::success(json!({"investigations": to_value(listed)})),
            Err(e) => Envelope::error(format!("{:#}", e)),
        }
    }

    pub async fn delete_investigation(&self, investigation_id: &str) -> Envelope {
        match self.investigations.delete(investigation_id).await {
            Ok(true) => Envelope::ok(),
            Ok(false) => Envelope::error(ServiceError::InvestigationNotFound),
            Err(e) => Envelope::error(format!("{:#}", e)),
        }
    }

    pub async fn update_config(&self, config: SchedulerConfig) -> Envelope {
        match self.scheduler.update_config(config).await {
            Ok(()) => Envelope::ok(),
            Err(e) => Envelope::fail(format!("{:#}", e)),
        }
    }

    /// Current settings with the API key reduced to whether one is set
    pub async fn get_config(&self) -> Envelope {
        let config = self.scheduler.current_config().await;
        Envelope::success(json!({
            "config": {
                "log_source_url": config.log_source_url,
                "job_name": config.job_name,
                "cluster_config_path": config.cluster_config_path,
                "api_key": !config.api_key.trim().is_empty(),
                "frequency_seconds": config.frequency().as_secs(),
                "model": self.llm_model,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Backends, FixedBackends, PipelineContext};
    use crate::sources::{FakeClusterService, FakeLogSource, FakeSemanticSearch};
    use tempfile::TempDir;
    use vigil_common::{FakeTextGenerator, ProbeSettings, StorageSettings};

    fn service(tmp: &TempDir) -> VigilService {
        let backends = Backends {
            log_source: Arc::new(FakeLogSource::new()),
            search: Arc::new(FakeSemanticSearch::new()),
            cluster: Arc::new(FakeClusterService::new()),
            llm: Arc::new(FakeTextGenerator::new()),
        };
        let context = PipelineContext::new(StorageSettings::under(tmp.path()), ProbeSettings::default());
        let config = SchedulerConfig {
            api_key: "sk-secret".to_string(),
            ..Default::default()
        };
        let scheduler = Scheduler::new(config, context, Arc::new(FixedBackends(backends))).unwrap();
        VigilService::new(Arc::new(scheduler), "gpt-4o-mini")
    }

    #[test]
    fn test_envelope_shape() {
        let value = serde_json::to_value(Envelope::fail("boom")).unwrap();
        assert_eq!(value, json!({"status": "fail", "reason": "boom"}));
        assert_eq!(serde_json::to_value(Envelope::ok()).unwrap(), json!({"status": "success"}));
    }

    #[tokio::test]
    async fn test_get_config_masks_key() {
        let tmp = TempDir::new().unwrap();
        let envelope = service(&tmp).get_config().await;
        let config = &envelope.result.unwrap()["config"];
        assert_eq!(config["api_key"], json!(true));
        assert_eq!(config["model"], json!("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_missing_records_are_errors() {
        let tmp = TempDir::new().unwrap();
        let service = service(&tmp);

        let missing_bug = service.delete_bug("bug_nope.json").await;
        assert_eq!(missing_bug.status, EnvelopeStatus::Error);
        assert_eq!(missing_bug.reason.as_deref(), Some("File not found"));

        let missing = service.get_investigation("investigation_nope").await;
        assert_eq!(missing.reason.as_deref(), Some("Investigation not found"));

        let no_bug = service.start_investigation(json!({}), None).await;
        assert_eq!(no_bug.reason.as_deref(), Some("bug_info is required"));
    }

    #[tokio::test]
    async fn test_investigation_accepts_null_fields() {
        let tmp = TempDir::new().unwrap();
        let bug_info = json!({
            "summary": "worker stalled",
            "file": null,
            "line": null,
            "human_explanation": null,
            "evidence": null
        });

        let envelope = service(&tmp).start_investigation(bug_info, None).await;
        assert!(envelope.is_success(), "{:?}", envelope.reason);
        let result = envelope.result.unwrap();
        assert_eq!(result["result"]["bug_info"]["summary"], json!("worker stalled"));
    }

    #[tokio::test]
    async fn test_chat_envelopes() {
        let tmp = TempDir::new().unwrap();
        let service = service(&tmp);

        let malformed = service.chat(json!([{"role": "user"}])).await;
        assert_eq!(malformed.status, EnvelopeStatus::Error);
        assert!(malformed.reason.unwrap().starts_with("Invalid messages"));

        let no_question = service.chat(json!([{"role": "system", "content": "hi"}])).await;
        assert_eq!(no_question.reason.as_deref(), Some("User message is required."));

        let history = json!([
            {"role": "system", "content": "hi"},
            {"role": "user", "content": "q1"},
            {"role": "assistant", "content": "a1"},
            {"role": "user", "content": "q2"}
        ]);
        let unanswered = service.chat(history).await;
        assert_eq!(unanswered.status, EnvelopeStatus::Fail);
    }

    #[tokio::test]
    async fn test_empty_listings() {
        let tmp = TempDir::new().unwrap();
        let service = service(&tmp);
        assert_eq!(service.list_bugs().await.result, Some(json!({"bugs": []})));
        assert_eq!(
            service.list_investigations().await.result,
            Some(json!({"investigations": []}))
        );
    }
}
