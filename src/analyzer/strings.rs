use super::{into_payload, Analyzer, Payload};
use crate::config::Config;
use crate::util::write_atomic;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::path::Path;

/// Printable ASCII runs, like `strings -n 8`, done in-process.
pub struct StringsAnalyzer {
    min_len: usize,
    preview_limit: usize,
    output_filename: String,
}

impl StringsAnalyzer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            min_len: cfg.strings.min_len.max(1),
            preview_limit: cfg.strings.preview_limit,
            output_filename: cfg.strings.output_filename.clone(),
        }
    }
}

impl Analyzer for StringsAnalyzer {
    fn description(&self) -> &str {
        "printable ASCII strings embedded in the file"
    }

    fn analyze(&self, input: &Path, out_dir: &Path, _params: Option<&Value>) -> Result<Payload> {
        let data = std::fs::read(input).with_context(|| format!("read {}", input.display()))?;
        let found = extract_ascii_strings(&data, self.min_len);

        write_atomic(&out_dir.join(&self.output_filename), found.join("\n").as_bytes())?;

        let preview: Vec<&String> = found.iter().take(self.preview_limit).collect();
        Ok(into_payload(json!({
            "count": found.len(),
            "strings": preview,
            "output_file": self.output_filename,
        })))
    }
}

fn is_printable(byte: u8) -> bool {
    matches!(byte, b'\t' | 0x20..=0x7E)
}

/// Runs of at least `min_len` printable bytes, trimmed, empties dropped.
pub fn extract_ascii_strings(data: &[u8], min_len: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0usize;

    while i < data.len() {
        if !is_printable(data[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < data.len() && is_printable(data[i]) {
            i += 1;
        }
        if i - start >= min_len {
            let run = String::from_utf8_lossy(&data[start..i]);
            let run = run.trim();
            if !run.is_empty() {
                out.push(run.to_string());
            }
        }
    }

    out
}
