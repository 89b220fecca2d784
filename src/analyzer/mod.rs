pub mod carving;
pub mod color_analysis;
pub mod entropy;
pub mod forensics;
pub mod lsb;
pub mod metadata;
pub mod outguess;
pub mod registry;
pub mod steghide;
pub mod strings;
pub mod tool;
pub mod zsteg;

use anyhow::Result;
use serde_json::Value;
use std::path::Path;

pub use crate::report::Payload;
pub use registry::Registry;

/// One forensic technique.
///
/// `analyze` reads `input`, may write artifacts under `out_dir` and returns a
/// payload that names those artifacts relative to `out_dir`. `params` is only
/// ever the value addressed to this analyzer's registry name.
pub trait Analyzer: Send + Sync {
    fn description(&self) -> &str;

    /// `Err` explains why the technique cannot run here (missing tool, ...).
    fn check_available(&self) -> Result<()> {
        Ok(())
    }

    fn analyze(&self, input: &Path, out_dir: &Path, params: Option<&Value>) -> Result<Payload>;
}

/// Wrap a `json!` value into a payload; non-objects land under `value`.
pub fn into_payload(v: Value) -> Payload {
    match v {
        Value::Object(map) => map,
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
