use crate::analyzer::{Analyzer, Registry};
use crate::job::{progress_after, Job, JobParams};
use crate::report::{AggregatedReport, AnalyzerResult, JobStatus, ResultSet};
use crate::status::StatusSink;
use crate::store::ResultStore;
use crate::util::{ensure_dir, hash_file, write_atomic};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const EFFECTIVE_CONFIG_FILENAME: &str = "effective-config.toml";

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Parent of the per-job scratch directories (`<root>/<job_id>/`).
    pub scratch_root: PathBuf,
    pub status_ttl: Duration,
    pub max_parallel: usize,
    pub hash_input: bool,
    /// Written to `<scratch>/effective-config.toml` at the start of each run.
    pub effective_config: Option<String>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            scratch_root: PathBuf::from("results"),
            status_ttl: Duration::from_secs(3600),
            max_parallel: 1,
            hash_input: true,
            effective_config: None,
        }
    }
}

impl OrchestratorOptions {
    pub fn from_config(cfg: &crate::config::Config) -> Result<Self> {
        let effective_config = if cfg.debug.dump_effective_config {
            Some(toml::to_string(cfg).with_context(|| "serializing effective config")?)
        } else {
            None
        };
        Ok(Self {
            scratch_root: PathBuf::from(&cfg.paths.results_dir),
            status_ttl: Duration::from_secs(cfg.status.ttl_seconds),
            max_parallel: cfg.global.max_parallel_analyzers.max(1),
            hash_input: true,
            effective_config,
        })
    }
}

pub struct Orchestrator {
    registry: Registry,
    status: Arc<dyn StatusSink>,
    store: Arc<dyn ResultStore>,
    opts: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        registry: Registry,
        status: Arc<dyn StatusSink>,
        store: Arc<dyn ResultStore>,
        opts: OrchestratorOptions,
    ) -> Self {
        Self {
            registry,
            status,
            store,
            opts,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scratch_dir(&self, job_id: &str) -> PathBuf {
        self.opts.scratch_root.join(job_id)
    }

    pub fn run(
        &self,
        input: &Path,
        job_id: &str,
        params: Option<&JobParams>,
    ) -> Result<AggregatedReport> {
        let mut job = Job::new(job_id, input, params.cloned())?;
        if let Some(p) = params {
            for target in p.targets().filter(|t| !self.registry.contains(t)) {
                warn!("job {job_id}: parameters for unregistered analyzer {target} are ignored");
            }
        }

        job.start();
        self.publish(&job)?;
        info!(
            "job {} started input={} analyzers={}",
            job.id,
            input.display(),
            self.registry.len()
        );

        match self.execute(&mut job) {
            Ok(report) => Ok(report),
            Err(err) => {
                error!("job {} failed: {err:#}", job.id);
                job.fail(format!("{err:#}"));
                if let Err(publish_err) = self.publish(&job) {
                    warn!("job {}: could not publish failed status: {publish_err:#}", job.id);
                }
                Err(err)
            }
        }
    }

    fn execute(&self, job: &mut Job) -> Result<AggregatedReport> {
        let started = Instant::now();
        let scratch = self.prepare_scratch(&job.id)?;
        if let Some(raw) = &self.opts.effective_config {
            write_atomic(&scratch.join(EFFECTIVE_CONFIG_FILENAME), raw.as_bytes())?;
        }

        let input_sha256 = if self.opts.hash_input {
            match hash_file(&job.input) {
                Ok(h) => Some(h),
                Err(err) => {
                    warn!("job {}: could not hash input: {err:#}", job.id);
                    None
                }
            }
        } else {
            None
        };

        let results = if self.opts.max_parallel > 1 && self.registry.len() > 1 {
            self.run_parallel(job, &scratch)?
        } else {
            self.run_sequential(job, &scratch)?
        };

        let report = AggregatedReport {
            analysis_id: job.id.clone(),
            filename: job.filename(),
            timestamp: job.created_at.clone(),
            status: JobStatus::Completed,
            input_sha256,
            results,
        };

        // A poller that sees `completed` must be able to fetch the report.
        self.store
            .put(&job.id, &report)
            .with_context(|| format!("persisting report for job {}", job.id))?;
        job.complete();
        self.publish(job)?;

        info!(
            "job {} completed in {}ms ({} analyzers, {} failed)",
            job.id,
            started.elapsed().as_millis(),
            report.results.len(),
            report.results.failures()
        );
        Ok(report)
    }

    fn run_sequential(&self, job: &mut Job, scratch: &Path) -> Result<ResultSet> {
        let total = self.registry.len();
        let mut results = ResultSet::new();
        for (idx, (name, analyzer)) in self.registry.list().enumerate() {
            let result = invoke(name, analyzer, &job.input, scratch, job.params_for(name));
            results.insert(name, result);
            job.advance(progress_after(idx + 1, total));
            self.publish(job)?;
        }
        Ok(results)
    }

    // Progress counts completions; the report keeps registry order.
    fn run_parallel(&self, job: &mut Job, scratch: &Path) -> Result<ResultSet> {
        let total = self.registry.len();
        let workers = self.opts.max_parallel.min(total);
        debug!("job {}: {} analyzers on {} workers", job.id, total, workers);

        let next = AtomicUsize::new(0);
        let mut slots: Vec<Option<AnalyzerResult>> = vec![None; total];
        let input = job.input.clone();
        let params = job.params.clone();

        std::thread::scope(|s| -> Result<()> {
            let (tx, rx) = mpsc::channel::<(usize, AnalyzerResult)>();
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                let registry = &self.registry;
                let input = input.as_path();
                let params = params.as_ref();
                s.spawn(move || {
                    loop {
                        let idx = next.fetch_add(1, Ordering::SeqCst);
                        let Some((name, analyzer)) = registry.get(idx) else {
                            break;
                        };
                        let p = params.and_then(|p| p.for_analyzer(name));
                        let result = invoke(name, analyzer, input, scratch, p);
                        if tx.send((idx, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut done = 0;
            for (idx, result) in rx {
                slots[idx] = Some(result);
                done += 1;
                job.advance(progress_after(done, total));
                self.publish(job)?;
            }
            Ok(())
        })?;

        let mut results = ResultSet::new();
        for ((name, _), slot) in self.registry.list().zip(slots) {
            let result = slot.ok_or_else(|| anyhow!("analyzer {name} produced no result"))?;
            results.insert(name, result);
        }
        Ok(results)
    }

    fn prepare_scratch(&self, job_id: &str) -> Result<PathBuf> {
        let dir = self.scratch_dir(job_id);
        if dir.exists() {
            debug!("clearing previous scratch dir {}", dir.display());
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("clearing scratch dir {}", dir.display()))?;
        }
        ensure_dir(&dir)?;
        Ok(dir)
    }

    fn publish(&self, job: &Job) -> Result<()> {
        let record = job.status_record();
        debug!("job {} status={} progress={}", job.id, record.status, record.progress);
        self.status
            .publish(&job.id, &record, self.opts.status_ttl)
            .with_context(|| format!("publishing status for job {}", job.id))
    }

    pub fn purge(&self, job_id: &str) -> Result<bool> {
        crate::job::validate_job_id(job_id)?;
        let had_report = self.store.delete(job_id)?;
        let dir = self.scratch_dir(job_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("removing scratch dir {}", dir.display()))?;
        }
        self.status.delete(job_id)?;
        Ok(had_report)
    }
}

fn invoke(
    name: &str,
    analyzer: &dyn Analyzer,
    input: &Path,
    scratch: &Path,
    params: Option<&Value>,
) -> AnalyzerResult {
    let started = Instant::now();
    info!("running {name} analyzer");

    if let Err(err) = analyzer.check_available() {
        warn!("{name} unavailable: {err:#}");
        return AnalyzerResult::failure(format!("{name} unavailable: {err:#}"));
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| analyzer.analyze(input, scratch, params)));
    let elapsed = started.elapsed().as_millis();

    match outcome {
        Ok(Ok(data)) => {
            info!("{name} finished in {elapsed}ms");
            AnalyzerResult::success(data)
        }
        Ok(Err(err)) => {
            warn!("{name} failed after {elapsed}ms: {err:#}");
            AnalyzerResult::failure(format!("{err:#}"))
        }
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            error!("{name} panicked after {elapsed}ms: {msg}");
            AnalyzerResult::failure(format!("analyzer panicked: {msg}"))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
