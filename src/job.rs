use crate::report::{JobStatus, StatusRecord};
use crate::util::now_rfc3339;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const MAX_JOB_ID_LEN: usize = 128;

/// Per-run values addressed to analyzers by registry name.
///
/// `{"steghide": ["a", "b"]}` hands the password list to the analyzer
/// registered as `steghide`; every other analyzer sees nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobParams(BTreeMap<String, Value>);

impl JobParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, analyzer: impl Into<String>, value: Value) -> Self {
        self.insert(analyzer, value);
        self
    }

    pub fn insert(&mut self, analyzer: impl Into<String>, value: Value) {
        self.0.insert(analyzer.into(), value);
    }

    pub fn for_analyzer(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Processing { progress: u8 },
    Completed,
    Failed { reason: String },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Queued => JobStatus::Queued,
            JobState::Processing { .. } => JobStatus::Processing,
            JobState::Completed => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn progress(&self) -> u8 {
        match self {
            JobState::Queued => 0,
            JobState::Processing { progress } => *progress,
            JobState::Completed => 100,
            JobState::Failed { .. } => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub input: PathBuf,
    pub created_at: String,
    pub params: Option<JobParams>,
    state: JobState,
    last_progress: u8,
}

impl Job {
    pub fn new(id: &str, input: &Path, params: Option<JobParams>) -> Result<Self> {
        validate_job_id(id)?;
        Ok(Self {
            id: id.to_string(),
            input: input.to_path_buf(),
            created_at: now_rfc3339(),
            params,
            state: JobState::Queued,
            last_progress: 0,
        })
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn filename(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.display().to_string())
    }

    pub fn params_for(&self, analyzer: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|p| p.for_analyzer(analyzer))
    }

    pub fn start(&mut self) {
        self.state = JobState::Processing { progress: 0 };
        self.last_progress = 0;
    }

    /// Record progress. Values below the last reported one are ignored.
    pub fn advance(&mut self, progress: u8) {
        let progress = progress.min(100).max(self.last_progress);
        self.last_progress = progress;
        self.state = JobState::Processing { progress };
    }

    pub fn complete(&mut self) {
        self.last_progress = 100;
        self.state = JobState::Completed;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = JobState::Failed {
            reason: reason.into(),
        };
    }

    pub fn status_record(&self) -> StatusRecord {
        let progress = match self.state {
            JobState::Failed { .. } => self.last_progress,
            ref other => other.progress(),
        };
        StatusRecord {
            status: self.state.status(),
            progress,
            updated_at: now_rfc3339(),
        }
    }
}

/// Progress after `done` of `total` analyzers, rounded half up.
pub fn progress_after(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = done.min(total);
    ((done * 100 + total / 2) / total) as u8
}

/// Job ids end up in file names and store keys.
pub fn validate_job_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("job id is empty"));
    }
    if id.len() > MAX_JOB_ID_LEN {
        return Err(anyhow!("job id longer than {MAX_JOB_ID_LEN} chars"));
    }
    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(anyhow!("job id contains invalid character {bad:?}: {id}"));
    }
    Ok(())
}
