use super::{into_payload, tool::Tool, Analyzer, Payload};
use crate::config::Config;
use crate::util::{ensure_dir, list_files_relative};
use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Embedded-file carving with binwalk and foremost, reported side by side.
pub struct FileCarvingAnalyzer {
    binwalk: Tool,
    foremost: Tool,
    timeout: Duration,
}

impl FileCarvingAnalyzer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            binwalk: Tool::configured(cfg, "binwalk", &cfg.tools.binwalk),
            foremost: Tool::configured(cfg, "foremost", &cfg.tools.foremost),
            timeout: Duration::from_secs(cfg.carving.timeout_seconds),
        }
    }

    fn run_binwalk(&self, input: &Path, out_dir: &Path) -> Result<Value> {
        let target = out_dir.join("binwalk");
        ensure_dir(&target)?;
        let args: [&OsStr; 4] = [
            OsStr::new("-e"),
            OsStr::new("-C"),
            target.as_os_str(),
            input.as_os_str(),
        ];
        let out = self.binwalk.run(args, self.timeout)?;
        Ok(json!({
            "success": out.success(),
            "output": out.stdout,
            "extracted_files": list_files_relative(&target, out_dir)?,
        }))
    }

    fn run_foremost(&self, input: &Path, out_dir: &Path) -> Result<Value> {
        let target = out_dir.join("foremost");
        ensure_dir(&target)?;
        let args: [&OsStr; 4] = [
            OsStr::new("-o"),
            target.as_os_str(),
            OsStr::new("-i"),
            input.as_os_str(),
        ];
        let out = self.foremost.run(args, self.timeout)?;
        let extracted: Vec<String> = list_files_relative(&target, out_dir)?
            .into_iter()
            .filter(|f| !f.ends_with("audit.txt"))
            .collect();
        Ok(json!({
            "success": out.success(),
            "extracted_files": extracted,
        }))
    }
}

impl Analyzer for FileCarvingAnalyzer {
    fn description(&self) -> &str {
        "embedded file carving (binwalk, foremost)"
    }

    fn check_available(&self) -> Result<()> {
        if self.binwalk.resolve().is_none() && self.foremost.resolve().is_none() {
            return Err(anyhow!("neither binwalk nor foremost is installed"));
        }
        Ok(())
    }

    fn analyze(&self, input: &Path, out_dir: &Path, _params: Option<&Value>) -> Result<Payload> {
        let binwalk = sub_result(&self.binwalk, || self.run_binwalk(input, out_dir));
        let foremost = sub_result(&self.foremost, || self.run_foremost(input, out_dir));
        Ok(into_payload(json!({
            "binwalk": binwalk,
            "foremost": foremost,
        })))
    }
}

fn sub_result(tool: &Tool, run: impl FnOnce() -> Result<Value>) -> Value {
    if let Err(err) = tool.check_available() {
        return json!({ "error": format!("{err:#}") });
    }
    match run() {
        Ok(v) => v,
        Err(err) => {
            warn!("{} failed: {err:#}", tool.name());
            json!({ "error": format!("{err:#}") })
        }
    }
}
