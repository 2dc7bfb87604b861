//! Boundary clients for the external systems vigild reads from.
//!
//! Each collaborator sits behind a trait with a real implementation and a
//! `Fake*` counterpart, so the scanner, report generator and probes can be
//! exercised without a log store, vector index or cluster.

pub mod cluster;
pub mod log_source;
pub mod semantic;

pub use cluster::{ClusterService, FakeClusterService, KubectlCluster, PodHealth, PodSummary};
pub use log_source::{build_logql, FakeLogSource, LogQuery, LogSource, LokiClient};
pub use semantic::{FakeSemanticSearch, HttpSemanticSearch, SemanticSearch};
