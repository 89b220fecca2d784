use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub analyzers: Analyzers,
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub strings: Strings,
    #[serde(default)]
    pub steghide: Steghide,
    #[serde(default)]
    pub outguess: Outguess,
    #[serde(default)]
    pub zsteg: Zsteg,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub carving: Carving,
    #[serde(default)]
    pub entropy: Entropy,
    #[serde(default)]
    pub color: Color,
    #[serde(default)]
    pub forensics: Forensics,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    /// Number of analyzers allowed to run at the same time inside one job.
    pub max_parallel_analyzers: usize,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            max_parallel_analyzers: 1,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub results_dir: String,
    pub status_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            results_dir: "results".into(),
            status_dir: ".stegmage-status".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_input_file_bytes: u64,
    pub allowed_extensions: Vec<String>,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_file_bytes: 50 * 1024 * 1024,
            allowed_extensions: ["png", "jpg", "jpeg", "gif", "bmp", "tiff", "tif", "jfif"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    /// One of `file`, `memory`, `redis`.
    pub backend: String,
    pub ttl_seconds: u64,
    pub key_prefix: String,
    pub redis_url: String,
}
impl Default for Status {
    fn default() -> Self {
        Self {
            backend: "file".into(),
            ttl_seconds: 3600,
            key_prefix: "stegmage:job:".into(),
            redis_url: "redis://localhost:6379/0".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Analyzers {
    /// Registry order. Progress granularity follows the length of this list.
    pub enabled: Vec<String>,
}
impl Default for Analyzers {
    fn default() -> Self {
        Self {
            enabled: [
                "lsb",
                "metadata",
                "strings",
                "zsteg",
                "steghide",
                "outguess",
                "file_carving",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tools {
    pub steghide: String,
    pub outguess: String,
    pub exiftool: String,
    pub binwalk: String,
    pub foremost: String,
    pub zsteg: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
impl Default for Tools {
    fn default() -> Self {
        Self {
            steghide: "steghide".into(),
            outguess: "outguess".into(),
            exiftool: "exiftool".into(),
            binwalk: "binwalk".into(),
            foremost: "foremost".into(),
            zsteg: "zsteg".into(),
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Strings {
    pub min_len: usize,
    pub preview_limit: usize,
    pub output_filename: String,
}
impl Default for Strings {
    fn default() -> Self {
        Self {
            min_len: 8,
            preview_limit: 100,
            output_filename: "strings.txt".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Steghide {
    pub default_passwords: Vec<String>,
    pub timeout_seconds: u64,
}
impl Default for Steghide {
    fn default() -> Self {
        Self {
            default_passwords: ["", "password", "123456", "admin", "root"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Outguess {
    pub timeout_seconds: u64,
    pub preview_bytes: usize,
}
impl Default for Outguess {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            preview_bytes: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Zsteg {
    pub timeout_seconds: u64,
}
impl Default for Zsteg {
    fn default() -> Self {
        Self { timeout_seconds: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub timeout_seconds: u64,
}
impl Default for Metadata {
    fn default() -> Self {
        Self { timeout_seconds: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Carving {
    pub timeout_seconds: u64,
}
impl Default for Carving {
    fn default() -> Self {
        Self { timeout_seconds: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Entropy {
    pub block_size: u32,
    pub suspicious_factor: f64,
    pub max_suspicious_blocks: usize,
}
impl Default for Entropy {
    fn default() -> Self {
        Self {
            block_size: 8,
            suspicious_factor: 1.2,
            max_suspicious_blocks: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Color {
    pub dominant_limit: usize,
}
impl Default for Color {
    fn default() -> Self {
        Self { dominant_limit: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Forensics {
    /// JPEG quality used for the error level analysis recompression.
    pub ela_quality: u8,
    pub clone_block_size: u32,
    pub max_clone_matches: usize,
}
impl Default for Forensics {
    fn default() -> Self {
        Self {
            ela_quality: 90,
            clone_block_size: 8,
            max_clone_matches: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub keep_tool_stderr: bool,
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            keep_tool_stderr: true,
            dump_effective_config: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Security {
    pub reject_url_inputs: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
        }
    }
}
