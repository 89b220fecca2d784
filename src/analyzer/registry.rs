use super::{
    carving::FileCarvingAnalyzer, color_analysis::ColorAnalyzer, entropy::EntropyAnalyzer,
    forensics::ForensicsAnalyzer, lsb::LsbAnalyzer,
    metadata::MetadataAnalyzer, outguess::OutguessAnalyzer, steghide::SteghideAnalyzer,
    strings::StringsAnalyzer, zsteg::ZstegAnalyzer, Analyzer,
};
use crate::config::Config;
use anyhow::{anyhow, bail, Result};

/// Names accepted in `analyzers.enabled`.
pub const KNOWN_ANALYZERS: &[&str] = &[
    "lsb",
    "metadata",
    "strings",
    "zsteg",
    "steghide",
    "outguess",
    "file_carving",
    "entropy",
    "color_analysis",
    "forensics",
];

/// Ordered set of named analyzers. Order is run order.
#[derive(Default)]
pub struct Registry {
    entries: Vec<(String, Box<dyn Analyzer>)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the roster listed in `analyzers.enabled`, in that order.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let mut registry = Self::new();
        for name in &cfg.analyzers.enabled {
            let analyzer = build_analyzer(cfg, name)?;
            registry.register(name, analyzer)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, name: &str, analyzer: Box<dyn Analyzer>) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            bail!("analyzer name is empty");
        }
        if self.contains(name) {
            bail!("analyzer registered twice: {name}");
        }
        self.entries.push((name.to_string(), analyzer));
        Ok(())
    }

    pub fn with(mut self, name: &str, analyzer: Box<dyn Analyzer>) -> Result<Self> {
        self.register(name, analyzer)?;
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn list(&self) -> impl Iterator<Item = (&str, &dyn Analyzer)> {
        self.entries.iter().map(|(n, a)| (n.as_str(), a.as_ref()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn get(&self, index: usize) -> Option<(&str, &dyn Analyzer)> {
        self.entries.get(index).map(|(n, a)| (n.as_str(), a.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn build_analyzer(cfg: &Config, name: &str) -> Result<Box<dyn Analyzer>> {
    let analyzer: Box<dyn Analyzer> = match name {
        "lsb" => Box::new(LsbAnalyzer::new()),
        "metadata" => Box::new(MetadataAnalyzer::new(cfg)),
        "strings" => Box::new(StringsAnalyzer::new(cfg)),
        "zsteg" => Box::new(ZstegAnalyzer::new(cfg)),
        "steghide" => Box::new(SteghideAnalyzer::new(cfg)),
        "outguess" => Box::new(OutguessAnalyzer::new(cfg)),
        "file_carving" => Box::new(FileCarvingAnalyzer::new(cfg)),
        "entropy" => Box::new(EntropyAnalyzer::new(cfg)),
        "color_analysis" => Box::new(ColorAnalyzer::new(cfg)),
        "forensics" => Box::new(ForensicsAnalyzer::new(cfg)),
        other => {
            return Err(anyhow!(
                "unknown analyzer in analyzers.enabled: {other} (known: {})",
                KNOWN_ANALYZERS.join(", ")
            ))
        }
    };
    Ok(analyzer)
}
