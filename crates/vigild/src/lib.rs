//! Vigil daemon library
//!
//! Continuous log anomaly detection (scanner), diagnostic investigation
//! (planner, probes, executor), SRE reporting, conversational questions about
//! recent logs, and the scheduler and service layer that drive them.

pub mod chat;
pub mod investigation;
pub mod logging;
pub mod probes;
pub mod prompts;
pub mod report;
pub mod scanner;
pub mod scheduler;
pub mod service;
pub mod sources;
pub mod store;

pub use chat::{ChatError, LogChat};
pub use investigation::InvestigationAgent;
pub use report::{ReportGenerator, SreReport};
pub use scanner::{LogScanner, ScanOutcome};
pub use scheduler::{BackendFactory, Backends, FixedBackends, Pipeline, PipelineContext, RealBackends, Scheduler};
pub use service::{Envelope, EnvelopeStatus, VigilService};
pub use store::{BugStore, InvestigationStore, ReportStore};
