pub mod analyzer;
pub mod cli;
pub mod config;
pub mod job;
pub mod orchestrator;
pub mod report;
pub mod status;
pub mod store;
pub mod util;

pub use analyzer::{Analyzer, Payload, Registry};
pub use job::{Job, JobParams, JobState};
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use report::{AggregatedReport, AnalyzerResult, JobStatus, StatusRecord};
pub use status::StatusSink;
pub use store::ResultStore;
