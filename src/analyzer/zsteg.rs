use super::{into_payload, tool::Tool, Analyzer, Payload};
use crate::config::Config;
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

/// PNG/BMP LSB detection via `zsteg -a`.
pub struct ZstegAnalyzer {
    tool: Tool,
    timeout: Duration,
}

impl ZstegAnalyzer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            tool: Tool::configured(cfg, "zsteg", &cfg.tools.zsteg),
            timeout: Duration::from_secs(cfg.zsteg.timeout_seconds),
        }
    }
}

impl Analyzer for ZstegAnalyzer {
    fn description(&self) -> &str {
        "LSB payload detection for PNG/BMP (zsteg)"
    }

    fn check_available(&self) -> Result<()> {
        self.tool
            .check_available()
            .with_context(|| "zsteg requires Ruby: gem install zsteg")
    }

    fn analyze(&self, input: &Path, _out_dir: &Path, _params: Option<&Value>) -> Result<Payload> {
        let out = self.tool.run([Path::new("-a"), input], self.timeout)?;
        let findings = parse_findings(&out.stdout)?;
        Ok(into_payload(json!({
            "findings": findings,
            "exit_code": out.status.code(),
            "raw_output": out.stdout,
        })))
    }
}

/// Keep result lines (progress lines start with `[`) and split off the
/// `<channel> .. <payload>` shape when present.
pub fn parse_findings(stdout: &str) -> Result<Vec<Value>> {
    let shape = Regex::new(r"^(?P<channel>\S+)\s+\.\.\s+(?P<payload>.*)$")?;
    let mut findings = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('[') {
            continue;
        }
        let finding = match shape.captures(line) {
            Some(caps) => json!({
                "line": line,
                "channel": &caps["channel"],
                "payload": caps["payload"].trim(),
            }),
            None => json!({ "line": line }),
        };
        findings.push(finding);
    }
    Ok(findings)
}
