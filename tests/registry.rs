use anyhow::Result;
use serde_json::Value;
use std::path::Path;
use stegmage::{analyzer::registry::KNOWN_ANALYZERS, config::Config, Analyzer, Payload, Registry};

struct Noop;

impl Analyzer for Noop {
    fn description(&self) -> &str {
        "does nothing"
    }

    fn analyze(&self, _input: &Path, _out: &Path, _params: Option<&Value>) -> Result<Payload> {
        Ok(Payload::new())
    }
}

#[test]
fn keeps_insertion_order() {
    let registry = Registry::new()
        .with("zeta", Box::new(Noop))
        .unwrap()
        .with("alpha", Box::new(Noop))
        .unwrap()
        .with("mid", Box::new(Noop))
        .unwrap();

    assert_eq!(registry.names(), vec!["zeta", "alpha", "mid"]);
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.get(1).map(|(n, _)| n), Some("alpha"));
    assert!(registry.get(3).is_none());
}

#[test]
fn rejects_duplicate_and_empty_names() {
    let mut registry = Registry::new();
    registry.register("lsb", Box::new(Noop)).unwrap();

    let dup = registry.register("lsb", Box::new(Noop)).unwrap_err();
    assert!(dup.to_string().contains("twice"));
    assert!(registry.register("  ", Box::new(Noop)).is_err());
    assert_eq!(registry.len(), 1);
}

#[test]
fn default_config_builds_the_standard_roster() {
    let registry = Registry::from_config(&Config::default()).unwrap();
    assert_eq!(
        registry.names(),
        vec!["lsb", "metadata", "strings", "zsteg", "steghide", "outguess", "file_carving"]
    );
    for (_, analyzer) in registry.list() {
        assert!(!analyzer.description().is_empty());
    }
}

#[test]
fn every_known_analyzer_can_be_enabled() {
    let mut cfg = Config::default();
    cfg.analyzers.enabled = KNOWN_ANALYZERS.iter().map(|s| s.to_string()).collect();
    let registry = Registry::from_config(&cfg).unwrap();
    assert_eq!(registry.len(), KNOWN_ANALYZERS.len());
}

#[test]
fn unknown_or_repeated_names_in_config_fail() {
    let mut cfg = Config::default();
    cfg.analyzers.enabled = vec!["lsb".into(), "telepathy".into()];
    let err = Registry::from_config(&cfg).err().unwrap();
    assert!(err.to_string().contains("telepathy"));

    cfg.analyzers.enabled = vec!["lsb".into(), "lsb".into()];
    assert!(Registry::from_config(&cfg).is_err());
}
