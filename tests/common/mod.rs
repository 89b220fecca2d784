#![allow(dead_code)]

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stegmage::{
    analyzer::into_payload,
    report::AggregatedReport,
    status::MemoryStatusSink,
    Analyzer, Orchestrator, OrchestratorOptions, Payload, Registry, ResultStore, StatusRecord,
    StatusSink,
};
use tempfile::TempDir;

pub struct Fixed(pub Value);

impl Analyzer for Fixed {
    fn description(&self) -> &str {
        "returns a fixed payload"
    }

    fn analyze(&self, _input: &Path, _out: &Path, _params: Option<&Value>) -> Result<Payload> {
        Ok(into_payload(self.0.clone()))
    }
}

pub struct Failing(pub &'static str);

impl Analyzer for Failing {
    fn description(&self) -> &str {
        "always fails"
    }

    fn analyze(&self, _input: &Path, _out: &Path, _params: Option<&Value>) -> Result<Payload> {
        Err(anyhow!(self.0))
    }
}

pub struct Panicking;

impl Analyzer for Panicking {
    fn description(&self) -> &str {
        "always panics"
    }

    fn analyze(&self, _input: &Path, _out: &Path, _params: Option<&Value>) -> Result<Payload> {
        panic!("analyzer blew up");
    }
}

pub struct Unavailable;

impl Analyzer for Unavailable {
    fn description(&self) -> &str {
        "never available"
    }

    fn check_available(&self) -> Result<()> {
        Err(anyhow!("fake-tool not installed"))
    }

    fn analyze(&self, _input: &Path, _out: &Path, _params: Option<&Value>) -> Result<Payload> {
        unreachable!("unavailable analyzers are not invoked")
    }
}

/// Records the parameters it was handed.
#[derive(Clone, Default)]
pub struct ParamProbe {
    pub seen: Arc<Mutex<Vec<Option<Value>>>>,
}

impl Analyzer for ParamProbe {
    fn description(&self) -> &str {
        "records params"
    }

    fn analyze(&self, _input: &Path, _out: &Path, params: Option<&Value>) -> Result<Payload> {
        self.seen.lock().unwrap().push(params.cloned());
        Ok(into_payload(json!({ "got_params": params.is_some() })))
    }
}

/// Writes a fixed artifact into the scratch directory.
pub struct ArtifactWriter(pub &'static str);

impl Analyzer for ArtifactWriter {
    fn description(&self) -> &str {
        "writes one artifact"
    }

    fn analyze(&self, _input: &Path, out: &Path, _params: Option<&Value>) -> Result<Payload> {
        std::fs::write(out.join(self.0), b"artifact")?;
        Ok(into_payload(json!({ "output_file": self.0 })))
    }
}

/// Sleeps, then succeeds. Used to make parallel completion order interesting.
pub struct Slow(pub u64);

impl Analyzer for Slow {
    fn description(&self) -> &str {
        "sleeps"
    }

    fn analyze(&self, _input: &Path, _out: &Path, _params: Option<&Value>) -> Result<Payload> {
        std::thread::sleep(Duration::from_millis(self.0));
        Ok(into_payload(json!({ "slept_ms": self.0 })))
    }
}

/// Status sink that keeps every published record.
#[derive(Default)]
pub struct RecordingSink {
    inner: MemoryStatusSink,
    pub history: Mutex<Vec<StatusRecord>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<StatusRecord> {
        self.history.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<u8> {
        self.records().iter().map(|r| r.progress).collect()
    }
}

impl StatusSink for RecordingSink {
    fn publish(&self, job_id: &str, record: &StatusRecord, ttl: Duration) -> Result<()> {
        self.history.lock().unwrap().push(record.clone());
        self.inner.publish(job_id, record, ttl)
    }

    fn read(&self, job_id: &str) -> Result<Option<StatusRecord>> {
        self.inner.read(job_id)
    }

    fn delete(&self, job_id: &str) -> Result<()> {
        self.inner.delete(job_id)
    }
}

/// Result store whose writes always fail.
pub struct BrokenStore;

impl ResultStore for BrokenStore {
    fn put(&self, _job_id: &str, _report: &AggregatedReport) -> Result<()> {
        Err(anyhow!("disk full"))
    }

    fn get(&self, _job_id: &str) -> Result<Option<AggregatedReport>> {
        Ok(None)
    }

    fn delete(&self, _job_id: &str) -> Result<bool> {
        Ok(false)
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub input: PathBuf,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("upload.png");
        std::fs::write(&input, b"not really a png").unwrap();
        Self {
            dir,
            input,
            sink: Arc::new(RecordingSink::default()),
        }
    }

    pub fn options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            scratch_root: self.dir.path().join("results"),
            ..Default::default()
        }
    }

    pub fn orchestrator(&self, registry: Registry, store: Arc<dyn ResultStore>) -> Orchestrator {
        Orchestrator::new(registry, self.sink.clone(), store, self.options())
    }
}
