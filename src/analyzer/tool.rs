//! Running third-party forensic binaries under a hard timeout.

use crate::config::Config;
use crate::util::expand_tilde;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A configured external program, resolved lazily against `PATH`.
#[derive(Debug, Clone)]
pub struct Tool {
    name: String,
    program: String,
    env: BTreeMap<String, String>,
    log_stderr: bool,
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

impl Tool {
    pub fn new(name: &str, program: &str) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            env: BTreeMap::new(),
            log_stderr: false,
        }
    }

    /// Tool named `name` using the program path and environment from `cfg`.
    pub fn configured(cfg: &Config, name: &str, program: &str) -> Self {
        Self::new(name, program)
            .with_env(&cfg.tools.env)
            .with_stderr_logging(cfg.debug.keep_tool_stderr)
    }

    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env = env.clone();
        self
    }

    pub fn with_stderr_logging(mut self, on: bool) -> Self {
        self.log_stderr = on;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolve(&self) -> Option<PathBuf> {
        find_program(&self.program)
    }

    pub fn check_available(&self) -> Result<()> {
        match self.resolve() {
            Some(_) => Ok(()),
            None => Err(anyhow!("{} not found ({})", self.name, self.program)),
        }
    }

    /// Run the tool to completion or kill it once `timeout` passes.
    pub fn run<I, S>(&self, args: I, timeout: Duration) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = self
            .resolve()
            .ok_or_else(|| anyhow!("{} not found ({})", self.name, self.program))?;
        let mut cmd = Command::new(&program);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        debug!("tool run {} timeout={:?}", program.display(), timeout);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", program.display()))?;
        let output = wait_with_timeout(&mut child, timeout)
            .with_context(|| format!("{} did not finish", self.name))?;

        if self.log_stderr && !output.stderr.trim().is_empty() {
            debug!("{} stderr: {}", self.name, output.stderr.trim());
        }
        Ok(output)
    }
}

/// Resolve `program` the way a shell would: explicit paths are checked as-is,
/// bare names are searched on `PATH`.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let program = program.trim();
    if program.is_empty() {
        return None;
    }
    let candidate = expand_tilde(program);
    if candidate.components().count() > 1 {
        return is_executable(&candidate).then_some(candidate);
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| is_executable(p))
}

#[cfg(unix)]
fn is_executable(p: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(p)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(p: &Path) -> bool {
    p.is_file() || p.with_extension("exe").is_file()
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ToolOutput> {
    // Pipes are drained on their own threads so a chatty tool cannot block on
    // a full buffer while we poll for exit.
    let stdout_reader = child.stdout.take();
    let stderr_reader = child.stderr.take();
    let stdout_thread = std::thread::spawn(move || drain(stdout_reader));
    let stderr_thread = std::thread::spawn(move || drain(stderr_reader));

    let start = Instant::now();
    let (status, timed_out) = loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            break (status, false);
        }
        if start.elapsed() > timeout {
            warn!("external tool timed out after {:?}", timeout);
            let _ = child.kill();
            let status = child.wait().with_context(|| "wait after kill")?;
            break (status, true);
        }
        std::thread::sleep(Duration::from_millis(25));
    };

    let stdout = stdout_thread
        .join()
        .map_err(|_| anyhow!("stdout reader thread panicked"))??;
    let stderr = stderr_thread
        .join()
        .map_err(|_| anyhow!("stderr reader thread panicked"))??;

    if timed_out {
        return Err(anyhow!(
            "timed out after {:?}; stderr: {}",
            timeout,
            String::from_utf8_lossy(&stderr).trim()
        ));
    }

    Ok(ToolOutput {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

fn drain<R: Read>(reader: Option<R>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut r) = reader {
        r.read_to_end(&mut buf).with_context(|| "read tool output")?;
    }
    Ok(buf)
}
