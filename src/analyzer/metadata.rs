use super::{into_payload, tool::Tool, Analyzer, Payload};
use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

/// EXIF and container metadata via `exiftool -j`.
pub struct MetadataAnalyzer {
    tool: Tool,
    timeout: Duration,
}

impl MetadataAnalyzer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            tool: Tool::configured(cfg, "exiftool", &cfg.tools.exiftool),
            timeout: Duration::from_secs(cfg.metadata.timeout_seconds),
        }
    }
}

impl Analyzer for MetadataAnalyzer {
    fn description(&self) -> &str {
        "EXIF/XMP/IPTC metadata (exiftool)"
    }

    fn check_available(&self) -> Result<()> {
        self.tool.check_available()
    }

    fn analyze(&self, input: &Path, _out_dir: &Path, _params: Option<&Value>) -> Result<Payload> {
        let out = self.tool.run([Path::new("-j"), input], self.timeout)?;
        if !out.success() {
            return Err(anyhow!("exiftool failed: {}", out.stderr.trim()));
        }
        let parsed: Value =
            serde_json::from_str(&out.stdout).with_context(|| "parsing exiftool JSON")?;
        let metadata = match parsed {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            Value::Array(_) => json!({}),
            other => other,
        };
        Ok(into_payload(json!({
            "metadata": metadata,
            "raw_output": out.stdout,
        })))
    }
}
