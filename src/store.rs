//! Durable home of finished reports.

use crate::job::validate_job_id;
use crate::report::AggregatedReport;
use crate::util::{ensure_dir, write_atomic};
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait ResultStore: Send + Sync {
    /// Store `report` under `job_id`, replacing any previous report.
    fn put(&self, job_id: &str, report: &AggregatedReport) -> Result<()>;
    fn get(&self, job_id: &str) -> Result<Option<AggregatedReport>>;
    /// Returns whether a report existed.
    fn delete(&self, job_id: &str) -> Result<bool>;
}

/// `<root>/<job_id>.json`, written through a temp file and rename so readers
/// never observe a half-written report.
pub struct FsResultStore {
    root: PathBuf,
}

impl FsResultStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        ensure_dir(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn report_path(&self, job_id: &str) -> Result<PathBuf> {
        validate_job_id(job_id)?;
        Ok(self.root.join(format!("{job_id}.json")))
    }
}

impl ResultStore for FsResultStore {
    fn put(&self, job_id: &str, report: &AggregatedReport) -> Result<()> {
        let path = self.report_path(job_id)?;
        let bytes = serde_json::to_vec_pretty(report)?;
        write_atomic(&path, &bytes).with_context(|| format!("persist report for {job_id}"))
    }

    fn get(&self, job_id: &str) -> Result<Option<AggregatedReport>> {
        let path = self.report_path(job_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let report = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing report {}", path.display()))?;
        Ok(Some(report))
    }

    fn delete(&self, job_id: &str) -> Result<bool> {
        let path = self.report_path(job_id)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        Ok(true)
    }
}

/// Process-local store, handy for embedding and tests.
#[derive(Default)]
pub struct MemoryResultStore {
    reports: Mutex<HashMap<String, AggregatedReport>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, AggregatedReport>>> {
        self.reports
            .lock()
            .map_err(|_| anyhow!("report map lock poisoned"))
    }
}

impl ResultStore for MemoryResultStore {
    fn put(&self, job_id: &str, report: &AggregatedReport) -> Result<()> {
        self.lock()?.insert(job_id.to_string(), report.clone());
        Ok(())
    }

    fn get(&self, job_id: &str) -> Result<Option<AggregatedReport>> {
        Ok(self.lock()?.get(job_id).cloned())
    }

    fn delete(&self, job_id: &str) -> Result<bool> {
        Ok(self.lock()?.remove(job_id).is_some())
    }
}
