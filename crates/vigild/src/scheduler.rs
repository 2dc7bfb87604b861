//! Periodic scan-then-report driver
//!
//! One spawned task sleeps for the configured period, runs a log scan, then
//! a report. Reconfiguration builds a fresh [`Pipeline`] and swaps it in
//! under a lock; an iteration already in flight keeps the snapshot it took.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info, warn};
use vigil_common::{
    LlmSettings, OpenAiChatClient, ProbeSettings, SchedulerConfig, SearchSettings, StorageSettings, TextGenerator,
};

use crate::chat::LogChat;
use crate::investigation::InvestigationAgent;
use crate::probes::DiagnosticProbes;
use crate::report::ReportGenerator;
use crate::scanner::{LogScanner, ScanOutcome};
use crate::sources::{
    ClusterService, HttpSemanticSearch, KubectlCluster, LogSource, LokiClient, SemanticSearch,
};
use crate::store::{BugStore, ReportStore};

const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);
pub const DEFAULT_REPORT_HOURS: u32 = 1;

// ============================================================================
// Backends
// ============================================================================

/// External collaborators one pipeline is built on
#[derive(Clone)]
pub struct Backends {
    pub log_source: Arc<dyn LogSource>,
    pub search: Arc<dyn SemanticSearch>,
    pub cluster: Arc<dyn ClusterService>,
    pub llm: Arc<dyn TextGenerator>,
}

/// Builds backends for a scheduler config. Errors here are configuration
/// errors and surface to whoever asked for the (re)build.
pub trait BackendFactory: Send + Sync {
    fn build(&self, config: &SchedulerConfig) -> Result<Backends>;
}

/// Loki, HTTP semantic search, kubectl and an OpenAI-compatible endpoint
pub struct RealBackends {
    llm: LlmSettings,
    search: SearchSettings,
}

impl RealBackends {
    pub fn new(llm: LlmSettings, search: SearchSettings) -> Self {
        Self { llm, search }
    }
}

impl BackendFactory for RealBackends {
    fn build(&self, config: &SchedulerConfig) -> Result<Backends> {
        config.validate()?;
        let log_source = LokiClient::new(&config.log_source_url, &config.job_name)?;
        let search = HttpSemanticSearch::new(&self.search)?;
        let llm = OpenAiChatClient::new(&self.llm, &config.api_key).context("Failed to create LLM client")?;
        let cluster = KubectlCluster::new(config.cluster_config_path.clone());

        Ok(Backends {
            log_source: Arc::new(log_source),
            search: Arc::new(search),
            cluster: Arc::new(cluster),
            llm: Arc::new(llm),
        })
    }
}

/// Hands out the same backends for every config (tests, embedding)
pub struct FixedBackends(pub Backends);

impl BackendFactory for FixedBackends {
    fn build(&self, _config: &SchedulerConfig) -> Result<Backends> {
        Ok(self.0.clone())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// State that outlives any one pipeline: the bug store (and with it the
/// dedup slot) plus storage and probe settings
#[derive(Clone)]
pub struct PipelineContext {
    pub bugs: Arc<BugStore>,
    pub storage: StorageSettings,
    pub probes: ProbeSettings,
}

impl PipelineContext {
    pub fn new(storage: StorageSettings, probes: ProbeSettings) -> Self {
        Self {
            bugs: Arc::new(BugStore::new(storage.bugs_dir.clone())),
            storage,
            probes,
        }
    }
}

/// Immutable snapshot of one configuration and the clients built from it
pub struct Pipeline {
    pub config: SchedulerConfig,
    pub scanner: LogScanner,
    pub reports: ReportGenerator,
    pub investigations: InvestigationAgent,
    pub chat: LogChat,
    namespace: String,
}

impl Pipeline {
    pub fn build(config: SchedulerConfig, context: &PipelineContext, factory: &dyn BackendFactory) -> Result<Self> {
        let backends = factory.build(&config)?;

        let scanner = LogScanner::new(
            Arc::clone(&backends.log_source),
            Arc::clone(&backends.search),
            Arc::clone(&backends.llm),
            Arc::clone(&context.bugs),
        );
        let reports = ReportGenerator::new(
            Arc::clone(&backends.search),
            Arc::clone(&backends.cluster),
            Arc::clone(&backends.llm),
            ReportStore::new(context.storage.reports_dir.clone()),
        );
        let chat = LogChat::new(
            Arc::clone(&backends.search),
            Arc::clone(&backends.cluster),
            Arc::clone(&backends.llm),
            context.probes.namespace.clone(),
        );
        let probes = DiagnosticProbes::new(context.probes.clone(), Arc::clone(&backends.cluster));
        let investigations = InvestigationAgent::new(probes, backends.llm);

        Ok(Self {
            config,
            scanner,
            reports,
            investigations,
            chat,
            namespace: context.probes.namespace.clone(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Scan, then report. The report is written even when the scan fails;
    /// the cycle still counts as failed so the loop backs off.
    pub async fn run_cycle(&self) -> Result<ScanOutcome> {
        let scan = self.scanner.run_once().await;
        self.reports
            .generate(DEFAULT_REPORT_HOURS, &self.namespace)
            .await
            .context("Report generation failed")?;
        scan
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct Scheduler {
    factory: Arc<dyn BackendFactory>,
    context: PipelineContext,
    pipeline: Arc<RwLock<Arc<Pipeline>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    backoff: Duration,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, context: PipelineContext, factory: Arc<dyn BackendFactory>) -> Result<Self> {
        let pipeline = Pipeline::build(config, &context, factory.as_ref())?;
        info!("Scheduler created (every {}s)", pipeline.config.frequency().as_secs());

        Ok(Self {
            factory,
            context,
            pipeline: Arc::new(RwLock::new(Arc::new(pipeline))),
            task: Mutex::new(None),
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Pause after a failed cycle (default 60 s)
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Current snapshot
    pub async fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&*self.pipeline.read().await)
    }

    pub async fn current_config(&self) -> SchedulerConfig {
        self.pipeline.read().await.config.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("Scheduler is already running");
            return;
        }

        let pipeline = Arc::clone(&self.pipeline);
        let backoff = self.backoff;
        *task = Some(tokio::spawn(async move {
            loop {
                let period = pipeline.read().await.config.frequency();
                tokio::time::sleep(period).await;

                let snapshot = Arc::clone(&*pipeline.read().await);
                match snapshot.run_cycle().await {
                    Ok(outcome) => info!("Scheduler run completed: {:?}", outcome),
                    Err(e) => {
                        error!("Error in scheduler: {:#}", e);
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }));
        info!("Scheduler started");
    }

    pub async fn stop(&self) {
        let Some(handle) = self.task.lock().await.take() else {
            warn!("Scheduler is not running");
            return;
        };

        handle.abort();
        match handle.await {
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("Scheduler task ended abnormally: {}", e),
            Ok(()) => {}
        }
        info!("Scheduler stopped");
    }

    /// Rebuild clients for `config` and swap them in. The timer keeps
    /// running; the next iteration uses the new pipeline.
    pub async fn update_config(&self, config: SchedulerConfig) -> Result<()> {
        let pipeline = Pipeline::build(config, &self.context, self.factory.as_ref())?;
        *self.pipeline.write().await = Arc::new(pipeline);
        info!("Scheduler configuration updated");
        Ok(())
    }

    /// One scan-then-report cycle on the caller's task
    pub async fn run_cycle(&self) -> Result<ScanOutcome> {
        self.pipeline().await.run_cycle().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{FakeClusterService, FakeLogSource, FakeSemanticSearch};
    use tempfile::TempDir;
    use vigil_common::{ConfigError, FakeTextGenerator, LlmError};

    fn fixed(llm: FakeTextGenerator) -> Arc<dyn BackendFactory> {
        Arc::new(FixedBackends(Backends {
            log_source: Arc::new(FakeLogSource::new()),
            search: Arc::new(FakeSemanticSearch::new()),
            cluster: Arc::new(FakeClusterService::new()),
            llm: Arc::new(llm),
        }))
    }

    fn context(tmp: &TempDir) -> PipelineContext {
        PipelineContext::new(StorageSettings::under(tmp.path()), ProbeSettings::default())
    }

    #[test]
    fn test_real_backends_reject_missing_key() {
        let factory = RealBackends::new(LlmSettings::default(), SearchSettings::default());
        let err = factory.build(&SchedulerConfig::default()).err().unwrap();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_update_config_swaps_snapshot() {
        let tmp = TempDir::new().unwrap();
        let scheduler = Scheduler::new(SchedulerConfig::default(), context(&tmp), fixed(FakeTextGenerator::new())).unwrap();
        let before = scheduler.pipeline().await;

        let config = SchedulerConfig {
            job_name: "billing".to_string(),
            ..Default::default()
        };
        scheduler.update_config(config).await.unwrap();

        assert_eq!(scheduler.current_config().await.job_name, "billing");
        assert_eq!(before.config.job_name, "app");
    }

    #[tokio::test]
    async fn test_run_cycle_scans_then_reports() {
        let tmp = TempDir::new().unwrap();
        let llm = FakeTextGenerator::with_replies([r#"{"no_bug": true}"#, "Nothing to report."]);
        let scheduler = Scheduler::new(SchedulerConfig::default(), context(&tmp), fixed(llm.clone())).unwrap();

        assert_eq!(scheduler.run_cycle().await.unwrap(), ScanOutcome::NoBug);
        assert_eq!(llm.call_count(), 2);
        assert_eq!(std::fs::read_dir(tmp.path().join("reports")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_failed_scan_still_writes_report() {
        let tmp = TempDir::new().unwrap();
        let llm = FakeTextGenerator::new();
        llm.push_error(LlmError::HttpError("503 Service Unavailable".to_string()));
        llm.push_reply("CPU usage is nominal.");
        let scheduler = Scheduler::new(SchedulerConfig::default(), context(&tmp), fixed(llm.clone())).unwrap();

        assert!(scheduler.run_cycle().await.is_err());
        assert_eq!(llm.call_count(), 2);
        assert_eq!(std::fs::read_dir(tmp.path().join("reports")).unwrap().count(), 1);
    }
}
