use stegmage::config::Config;

#[test]
fn parse_example_config() {
    let raw = include_str!("../stegmage.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert!(cfg.global.max_parallel_analyzers >= 1);
    assert!(!cfg.paths.results_dir.is_empty());
    assert_eq!(cfg.status.ttl_seconds, 3600);
    assert_eq!(cfg.analyzers.enabled.len(), 7);
    assert_eq!(cfg.analyzers.enabled[0], "lsb");
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[status]\nttl_seconds = 5\n").expect("parse TOML");
    assert_eq!(cfg.status.ttl_seconds, 5);
    assert_eq!(cfg.status.backend, "file");
    assert_eq!(cfg.status.key_prefix, "stegmage:job:");
    assert_eq!(cfg.steghide.timeout_seconds, 30);
    assert_eq!(cfg.zsteg.timeout_seconds, 60);
    assert_eq!(cfg.strings.min_len, 8);
    assert!(cfg.limits.allowed_extensions.iter().any(|e| e == "jfif"));
}
