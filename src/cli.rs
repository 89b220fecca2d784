use crate::{
    analyzer::Registry,
    config::Config,
    job::JobParams,
    orchestrator::{Orchestrator, OrchestratorOptions},
    status,
    store::{FsResultStore, ResultStore},
    util::ensure_dir,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "stegmage")]
#[command(about = "Steganography analysis orchestrator (pluggable analyzers + progress status + report)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./stegmage.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check analyzers, tools and stores.
    Doctor {},
    /// List the configured analyzers in run order.
    Analyzers {},
    /// Analyze one image.
    Run {
        #[arg(long)]
        input: PathBuf,
        /// Job id; a UUID is generated when omitted.
        #[arg(long)]
        job_id: Option<String>,
        /// Extra steghide password candidate (repeatable).
        #[arg(long = "password")]
        passwords: Vec<String>,
        /// JSON file with per-analyzer parameters, keyed by analyzer name.
        #[arg(long)]
        params: Option<PathBuf>,
    },
    /// Print the status record of a job.
    Status {
        #[arg(long)]
        job_id: String,
    },
    /// Print the stored report of a job.
    Result {
        #[arg(long)]
        job_id: String,
    },
    /// Remove report, artifacts and status of a job.
    Delete {
        #[arg(long)]
        job_id: String,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Analyzers {} => analyzers(&cfg),
        Command::Run {
            input,
            job_id,
            passwords,
            params,
        } => run(&cfg, input, job_id.as_deref(), passwords, params.as_deref()),
        Command::Status { job_id } => show_status(&cfg, job_id),
        Command::Result { job_id } => show_result(&cfg, job_id),
        Command::Delete { job_id } => delete(&cfg, job_id),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("stegmage.toml");
    default.exists().then_some(default)
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.paths.results_dir).join("stegmage.log"))
}

fn build_orchestrator(cfg: &Config) -> Result<Orchestrator> {
    let registry = Registry::from_config(cfg)?;
    let status = status::from_config(cfg)?;
    let store: Arc<dyn ResultStore> = Arc::new(FsResultStore::new(&cfg.paths.results_dir)?);
    Ok(Orchestrator::new(
        registry,
        status,
        store,
        OrchestratorOptions::from_config(cfg)?,
    ))
}

fn doctor(cfg: &Config) -> Result<()> {
    let registry = Registry::from_config(cfg)?;
    let analyzers: Vec<_> = registry
        .list()
        .map(|(name, a)| match a.check_available() {
            Ok(()) => json!({ "name": name, "available": true }),
            Err(err) => json!({ "name": name, "available": false, "reason": format!("{err:#}") }),
        })
        .collect();

    let status_check = status::from_config(cfg).and_then(|s| s.ping());
    let results_check = FsResultStore::new(&cfg.paths.results_dir).map(|_| ());

    let diag = json!({
        "analyzers": analyzers,
        "status_backend": {
            "backend": cfg.status.backend,
            "ok": status_check.is_ok(),
            "error": status_check.err().map(|e| format!("{e:#}")),
        },
        "results_dir": {
            "path": cfg.paths.results_dir,
            "ok": results_check.is_ok(),
            "error": results_check.err().map(|e| format!("{e:#}")),
        },
    });
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(())
}

fn analyzers(cfg: &Config) -> Result<()> {
    let registry = Registry::from_config(cfg)?;
    for (idx, (name, analyzer)) in registry.list().enumerate() {
        let availability = match analyzer.check_available() {
            Ok(()) => "available".to_string(),
            Err(err) => format!("unavailable: {err:#}"),
        };
        println!("{:>2}. {:<14} {} [{}]", idx + 1, name, analyzer.description(), availability);
    }
    Ok(())
}

fn run(
    cfg: &Config,
    input: &Path,
    job_id: Option<&str>,
    passwords: &[String],
    params_file: Option<&Path>,
) -> Result<()> {
    validate_input(cfg, input)?;

    let job_id = job_id
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let params = load_params(params_file, passwords)?;

    let orchestrator = build_orchestrator(cfg)?;
    info!("job_id={job_id} input={}", input.display());

    let report = orchestrator.run(input, &job_id, params.as_ref())?;

    if cfg.global.print_summary {
        let results: serde_json::Map<String, serde_json::Value> = report
            .results
            .iter()
            .map(|(name, r)| (name.to_string(), json!(r.is_success())))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "analysis_id": report.analysis_id,
                "filename": report.filename,
                "status": report.status,
                "results": results,
                "report": Path::new(&cfg.paths.results_dir).join(format!("{job_id}.json")),
            }))?
        );
    }
    Ok(())
}

fn load_params(file: Option<&Path>, passwords: &[String]) -> Result<Option<JobParams>> {
    let mut params = match file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading params: {}", path.display()))?;
            serde_json::from_str::<JobParams>(&raw)
                .with_context(|| format!("parsing params JSON: {}", path.display()))?
        }
        None => JobParams::new(),
    };
    if !passwords.is_empty() {
        if params.for_analyzer("steghide").is_some() {
            warn!("--password overrides steghide entry from params file");
        }
        params.insert("steghide", json!(passwords));
    }
    Ok((!params.is_empty()).then_some(params))
}

fn show_status(cfg: &Config, job_id: &str) -> Result<()> {
    let sink = status::from_config(cfg)?;
    match sink.read(job_id)? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        None => Err(anyhow!("analysis not found (or status expired): {job_id}")),
    }
}

fn show_result(cfg: &Config, job_id: &str) -> Result<()> {
    let store = FsResultStore::new(&cfg.paths.results_dir)?;
    match store.get(job_id)? {
        Some(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        None => Err(anyhow!("results not found: {job_id}")),
    }
}

fn delete(cfg: &Config, job_id: &str) -> Result<()> {
    let orchestrator = build_orchestrator(cfg)?;
    let existed = orchestrator.purge(job_id)?;
    if !existed {
        warn!("no report stored for {job_id}");
    }
    println!("{}", json!({ "analysis_id": job_id, "deleted": existed }));
    Ok(())
}

fn validate_input(cfg: &Config, input: &Path) -> Result<()> {
    let input_str = input.display().to_string();

    if cfg.security.reject_url_inputs && looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are disabled: {input_str}"));
    }

    if !input.is_file() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    let size = std::fs::metadata(input)
        .with_context(|| format!("stat input: {}", input.display()))?
        .len();
    if size > cfg.limits.max_input_file_bytes {
        return Err(anyhow!(
            "input exceeds max_input_file_bytes ({} > {})",
            size,
            cfg.limits.max_input_file_bytes
        ));
    }

    let ext = input
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .ok_or_else(|| anyhow!("input has no file extension: {}", input.display()))?;
    if !cfg
        .limits
        .allowed_extensions
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
    {
        return Err(anyhow!("file type not allowed: .{ext}"));
    }

    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}
