//! Conversational questions about recent logs and cluster state.
//!
//! The opening turn grounds the answer in a generated summary of the
//! semantic-search hits plus a pod listing, and appends both to the reply so
//! later turns carry them as history. Follow-up turns prefix the question with
//! a fixed instruction and send the whole conversation as is.

use std::sync::Arc;
use tracing::{info, warn};
use vigil_common::{normalize_all, ChatMessage, LlmError, LogEntry, TextGenerator};

use crate::prompts;
use crate::sources::{ClusterService, SemanticSearch};

const CHAT_QUERY: &str = "CPU";
const SEARCH_LIMIT: usize = 100;
const MAX_SUMMARY_LOGS: usize = 20;
/// Conversations up to this length (system + first question) are openings
const OPENING_TURN_MAX: usize = 2;
const CHAT_TEMPERATURE: f32 = 0.0;
const CHAT_MAX_TOKENS: u32 = 4000;

const NO_LOGS: &str = "No matching log entries were found.";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("User message is required.")]
    MissingUserMessage,

    #[error("Chat completion failed: {0}")]
    Llm(#[from] LlmError),
}

pub struct LogChat {
    search: Arc<dyn SemanticSearch>,
    cluster: Arc<dyn ClusterService>,
    llm: Arc<dyn TextGenerator>,
    namespace: String,
}

impl LogChat {
    pub fn new(
        search: Arc<dyn SemanticSearch>,
        cluster: Arc<dyn ClusterService>,
        llm: Arc<dyn TextGenerator>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            search,
            cluster,
            llm,
            namespace: namespace.into(),
        }
    }

    /// Answer the latest user message and return the conversation with the
    /// assistant reply appended
    pub async fn respond(&self, mut messages: Vec<ChatMessage>) -> Result<Vec<ChatMessage>, ChatError> {
        let question = messages
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(|m| m.content.clone())
            .ok_or(ChatError::MissingUserMessage)?;

        if messages.len() <= OPENING_TURN_MAX {
            info!("Opening chat turn, gathering log and cluster context");
            let cluster_summary = self.cluster_summary().await;
            let log_summary = self.log_summary().await?;

            let answer = self
                .complete(&[
                    ChatMessage::system(prompts::CHAT_SYSTEM_PROMPT),
                    ChatMessage::user(prompts::chat_answer_prompt(&question, &log_summary)),
                ])
                .await?;
            messages.push(ChatMessage::assistant(format!(
                "{} \n{}\n\n{}",
                answer, log_summary, cluster_summary
            )));
        } else {
            if let Some(last) = messages.last_mut() {
                *last = ChatMessage::user(format!("{} {}", prompts::CHAT_FOLLOW_UP_PREFIX, question));
            }
            let answer = self.complete(&messages).await?;
            messages.push(ChatMessage::assistant(answer));
        }

        Ok(messages)
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.llm.chat(messages, CHAT_TEMPERATURE, CHAT_MAX_TOKENS).await
    }

    /// Generated digest of the semantic-search hits; no call is made when
    /// nothing matched
    async fn log_summary(&self) -> Result<String, LlmError> {
        let hits = match self.search.search(CHAT_QUERY, SEARCH_LIMIT).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Chat log search failed: {:#}", e);
                Vec::new()
            }
        };
        if hits.is_empty() {
            return Ok(NO_LOGS.to_string());
        }

        let entries: Vec<LogEntry> = hits
            .into_iter()
            .take(MAX_SUMMARY_LOGS)
            .map(LogEntry::from_payload)
            .collect();
        let logs = prompts::format_logs(&normalize_all(&entries));
        self.complete(&[
            ChatMessage::system(prompts::LOG_EXPERT_SYSTEM_PROMPT),
            ChatMessage::user(format!("{}{}", prompts::LOG_SUMMARY_PROMPT, logs)),
        ])
        .await
    }

    async fn cluster_summary(&self) -> String {
        match self.cluster.pod_summaries(&self.namespace).await {
            Ok(pods) if pods.is_empty() => format!("No pods found in namespace {}", self.namespace),
            Ok(pods) => {
                let mut summary = format!("Pods in namespace {}:", self.namespace);
                for pod in pods {
                    summary.push_str(&format!(
                        "\n- {} status={} ready={} restarts={} node={}",
                        pod.pod_name, pod.status, pod.ready, pod.restarts, pod.node
                    ));
                }
                summary
            }
            Err(e) => {
                warn!("Chat cluster summary failed: {:#}", e);
                format!("Cluster summary unavailable: {:#}", e)
            }
        }
    }
}
