//! Password-guessing extraction with `steghide extract`.
//!
//! Candidate passwords come from the job's parameter bundle (when it is
//! addressed to this analyzer) followed by the configured defaults. The first
//! password that extracts something ends the search.

use super::{into_payload, tool::Tool, Analyzer, Payload};
use crate::config::Config;
use crate::util::safe_file_component;
use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub struct SteghideAnalyzer {
    tool: Tool,
    timeout: Duration,
    default_passwords: Vec<String>,
}

impl SteghideAnalyzer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            tool: Tool::configured(cfg, "steghide", &cfg.tools.steghide),
            timeout: Duration::from_secs(cfg.steghide.timeout_seconds),
            default_passwords: cfg.steghide.default_passwords.clone(),
        }
    }
}

impl Analyzer for SteghideAnalyzer {
    fn description(&self) -> &str {
        "steghide extraction with password guessing"
    }

    fn check_available(&self) -> Result<()> {
        self.tool.check_available()
    }

    fn analyze(&self, input: &Path, out_dir: &Path, params: Option<&Value>) -> Result<Payload> {
        let custom = custom_passwords(params)?;
        let candidates = candidate_passwords(&custom, &self.default_passwords);
        debug!(
            "steghide trying {} passwords ({} custom)",
            candidates.len(),
            custom.len()
        );

        let mut used_names = HashSet::new();
        let mut attempts = Vec::new();
        let mut extracted = None;

        for (idx, password) in candidates.iter().enumerate() {
            let filename = output_filename(password, idx, &mut used_names);
            let output_path = out_dir.join(&filename);
            let label = if password.is_empty() {
                "(empty)"
            } else {
                password.as_str()
            };

            let args: [&OsStr; 8] = [
                OsStr::new("extract"),
                OsStr::new("-sf"),
                input.as_os_str(),
                OsStr::new("-xf"),
                output_path.as_os_str(),
                OsStr::new("-p"),
                OsStr::new(password.as_str()),
                OsStr::new("-f"),
            ];
            let run = self.tool.run(args, self.timeout);

            match run {
                Ok(out) if out.success() => {
                    info!("steghide extracted data with password #{idx}");
                    attempts.push(json!({
                        "password": label,
                        "success": true,
                        "message": "Data extracted successfully",
                        "output_file": filename,
                    }));
                    extracted = Some(filename);
                    break;
                }
                Ok(out) => attempts.push(json!({
                    "password": label,
                    "success": false,
                    "message": out.stderr.trim(),
                })),
                Err(err) => attempts.push(json!({
                    "password": label,
                    "success": false,
                    "message": format!("{err:#}"),
                })),
            }
        }

        Ok(into_payload(json!({
            "attempts": attempts,
            "extracted": extracted.is_some(),
            "output_file": extracted,
        })))
    }
}

/// Accepts `["a", "b"]` or `{"passwords": ["a", "b"]}`.
pub fn custom_passwords(params: Option<&Value>) -> Result<Vec<String>> {
    let list = match params {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(Value::Object(map)) => match map.get("passwords") {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(other) => return Err(anyhow!("steghide passwords must be a list, got {other}")),
        },
        Some(other) => return Err(anyhow!("unsupported steghide parameters: {other}")),
    };
    list.iter()
        .map(|v| match v {
            Value::String(s) => Ok(s.clone()),
            other => Err(anyhow!("steghide password must be a string, got {other}")),
        })
        .collect()
}

/// Custom passwords first, then defaults, without repeats.
pub fn candidate_passwords(custom: &[String], defaults: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    custom
        .iter()
        .chain(defaults.iter())
        .filter(|p| seen.insert(p.as_str()))
        .cloned()
        .collect()
}

pub fn output_filename(password: &str, idx: usize, used: &mut HashSet<String>) -> String {
    let base = format!("steghide_extracted_{}", safe_file_component(password));
    let mut name = format!("{base}.txt");
    let mut suffix = idx;
    while !used.insert(name.clone()) {
        name = format!("{base}_{suffix}.txt");
        suffix += 1;
    }
    name
}
