use super::{into_payload, tool::Tool, Analyzer, Payload};
use crate::config::Config;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

const OUTPUT_FILENAME: &str = "outguess_extracted.txt";

/// JPEG payload recovery via `outguess -r`.
pub struct OutguessAnalyzer {
    tool: Tool,
    timeout: Duration,
    preview_bytes: usize,
}

impl OutguessAnalyzer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            tool: Tool::configured(cfg, "outguess", &cfg.tools.outguess),
            timeout: Duration::from_secs(cfg.outguess.timeout_seconds),
            preview_bytes: cfg.outguess.preview_bytes,
        }
    }
}

impl Analyzer for OutguessAnalyzer {
    fn description(&self) -> &str {
        "outguess payload extraction"
    }

    fn check_available(&self) -> Result<()> {
        self.tool.check_available()
    }

    fn analyze(&self, input: &Path, out_dir: &Path, _params: Option<&Value>) -> Result<Payload> {
        let output_path = out_dir.join(OUTPUT_FILENAME);
        let args: [&OsStr; 3] = [OsStr::new("-r"), input.as_os_str(), output_path.as_os_str()];
        let out = self.tool.run(args, self.timeout)?;

        if out.success() && output_path.exists() {
            let content = std::fs::read(&output_path)
                .with_context(|| format!("read {}", output_path.display()))?;
            let preview_len = content.len().min(self.preview_bytes);
            return Ok(into_payload(json!({
                "found": true,
                "output_file": OUTPUT_FILENAME,
                "size": content.len(),
                "preview": String::from_utf8_lossy(&content[..preview_len]),
            })));
        }

        Ok(into_payload(json!({
            "found": false,
            "message": "No hidden data found or extraction failed",
            "stderr": out.stderr.trim(),
        })))
    }
}
