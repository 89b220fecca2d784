#![cfg(unix)]

use serde_json::json;
use std::collections::HashSet;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use stegmage::{
    analyzer::{
        carving::FileCarvingAnalyzer, metadata::MetadataAnalyzer, outguess::OutguessAnalyzer,
        steghide::{output_filename, SteghideAnalyzer},
    },
    config::Config,
    Analyzer,
};
use tempfile::TempDir;

struct Bench {
    dir: TempDir,
    input: PathBuf,
    out: PathBuf,
}

impl Bench {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        std::fs::write(&input, b"stand-in image bytes").unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        Self { dir, input, out }
    }

    /// Shell script standing in for an external tool.
    fn script(&self, name: &str, body: &str) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn missing(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().into_owned()
    }

    fn log(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    fn logged(&self) -> Vec<String> {
        std::fs::read_to_string(self.log())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

// Args: extract -sf <in> -xf <out> -p <password> -f
fn fake_steghide(bench: &Bench, secret: &str) -> String {
    bench.script(
        "steghide",
        &format!(
            r#"echo "$7|$(basename "$5")" >> "{log}"
if [ "$7" = "{secret}" ]; then printf 'hidden' > "$5"; exit 0; fi
echo "could not extract any data with that passphrase!" >&2
exit 1"#,
            log = bench.log().display(),
        ),
    )
}

fn logged_passwords(bench: &Bench) -> Vec<String> {
    bench
        .logged()
        .iter()
        .map(|l| l.split('|').next().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn steghide_stops_at_first_working_password() {
    let bench = Bench::new();
    let mut cfg = Config::default();
    cfg.tools.steghide = fake_steghide(&bench, "open-sesame");

    let payload = SteghideAnalyzer::new(&cfg)
        .analyze(&bench.input, &bench.out, Some(&json!(["wrong", "open-sesame"])))
        .unwrap();

    assert_eq!(logged_passwords(&bench), vec!["wrong", "open-sesame"]);
    let attempts = payload["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0]["success"], json!(false));
    assert!(attempts[0]["message"].as_str().unwrap().contains("could not extract"));
    assert_eq!(attempts[1]["success"], json!(true));
    assert_eq!(payload["extracted"], json!(true));
    assert_eq!(payload["output_file"], json!("steghide_extracted_open-sesame.txt"));
    let body = std::fs::read_to_string(bench.out.join("steghide_extracted_open-sesame.txt")).unwrap();
    assert_eq!(body, "hidden");
}

#[test]
fn steghide_falls_back_to_defaults_after_custom() {
    let bench = Bench::new();
    let mut cfg = Config::default();
    cfg.tools.steghide = fake_steghide(&bench, "never-matches");
    cfg.steghide.default_passwords = vec!["".into(), "password".into()];

    let payload = SteghideAnalyzer::new(&cfg)
        .analyze(&bench.input, &bench.out, Some(&json!({ "passwords": ["mine"] })))
        .unwrap();

    assert_eq!(logged_passwords(&bench), vec!["mine", "", "password"]);
    let attempts = payload["attempts"].as_array().unwrap();
    assert_eq!(attempts[1]["password"], json!("(empty)"));
    assert!(attempts.iter().all(|a| a["success"] == json!(false)));
    assert_eq!(payload["extracted"], json!(false));
    assert_eq!(payload["output_file"], json!(null));
}

#[test]
fn steghide_output_names_never_collide() {
    let bench = Bench::new();
    let mut cfg = Config::default();
    cfg.tools.steghide = fake_steghide(&bench, "never-matches");
    cfg.steghide.default_passwords = Vec::new();

    SteghideAnalyzer::new(&cfg)
        .analyze(&bench.input, &bench.out, Some(&json!(["x_3", "x", "y", "x!"])))
        .unwrap();

    let names: Vec<String> = bench
        .logged()
        .iter()
        .map(|l| l.rsplit('|').next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names.len(), 4);
    assert_eq!(names.iter().collect::<HashSet<_>>().len(), 4, "{names:?}");
}

#[test]
fn output_filename_skips_taken_suffixes() {
    let mut used = HashSet::new();
    let names: Vec<String> = ["x_3", "x", "y", "x!"]
        .iter()
        .enumerate()
        .map(|(idx, pw)| output_filename(pw, idx, &mut used))
        .collect();
    assert_eq!(names[0], "steghide_extracted_x_3.txt");
    assert_eq!(names[1], "steghide_extracted_x.txt");
    assert_eq!(names[3], "steghide_extracted_x_4.txt");
    assert_eq!(used.len(), 4);
}

#[test]
fn carving_reports_each_tool_separately() {
    let bench = Bench::new();
    let mut cfg = Config::default();
    cfg.tools.binwalk = bench.missing("binwalk");
    // Args: -o <dir> -i <input>
    cfg.tools.foremost = bench.script(
        "foremost",
        r#"mkdir -p "$2/png"
printf 'x' > "$2/png/00000001.png"
printf 'audit' > "$2/audit.txt""#,
    );
    let analyzer = FileCarvingAnalyzer::new(&cfg);

    analyzer.check_available().unwrap();
    let payload = analyzer.analyze(&bench.input, &bench.out, None).unwrap();

    assert!(payload["binwalk"]["error"].as_str().unwrap().contains("binwalk not found"));
    assert_eq!(payload["foremost"]["success"], json!(true));
    assert_eq!(
        payload["foremost"]["extracted_files"],
        json!(["foremost/png/00000001.png"])
    );
}

#[test]
fn carving_needs_at_least_one_tool() {
    let bench = Bench::new();
    let mut cfg = Config::default();
    cfg.tools.binwalk = bench.missing("binwalk");
    cfg.tools.foremost = bench.missing("foremost");
    assert!(FileCarvingAnalyzer::new(&cfg).check_available().is_err());
}

#[test]
fn metadata_parses_exiftool_json() {
    let bench = Bench::new();
    let mut cfg = Config::default();
    cfg.tools.exiftool = bench.script(
        "exiftool",
        r#"echo '[{"FileType":"PNG","ImageWidth":4}]'"#,
    );

    let payload = MetadataAnalyzer::new(&cfg)
        .analyze(&bench.input, &bench.out, None)
        .unwrap();
    assert_eq!(payload["metadata"]["FileType"], json!("PNG"));
    assert_eq!(payload["metadata"]["ImageWidth"], json!(4));
}

#[test]
fn metadata_nonzero_exit_is_an_error() {
    let bench = Bench::new();
    let mut cfg = Config::default();
    cfg.tools.exiftool = bench.script("exiftool", "echo 'Error: File format error' >&2\nexit 1");

    let err = MetadataAnalyzer::new(&cfg)
        .analyze(&bench.input, &bench.out, None)
        .unwrap_err();
    assert!(err.to_string().contains("File format error"));
}

#[test]
fn outguess_without_payload_reports_not_found() {
    let bench = Bench::new();
    let mut cfg = Config::default();
    cfg.tools.outguess = bench.script("outguess", "echo 'Extraction failed' >&2\nexit 1");

    let payload = OutguessAnalyzer::new(&cfg)
        .analyze(&bench.input, &bench.out, None)
        .unwrap();
    assert_eq!(payload["found"], json!(false));
    assert_eq!(payload["stderr"], json!("Extraction failed"));
}

#[test]
fn outguess_with_payload_previews_it() {
    let bench = Bench::new();
    let mut cfg = Config::default();
    // Args: -r <in> <out>
    cfg.tools.outguess = bench.script("outguess", r#"printf 'secret message' > "$3""#);

    let payload = OutguessAnalyzer::new(&cfg)
        .analyze(&bench.input, &bench.out, None)
        .unwrap();
    assert_eq!(payload["found"], json!(true));
    assert_eq!(payload["size"], json!(14));
    assert_eq!(payload["preview"], json!("secret message"));
    assert!(Path::new(&bench.out).join("outguess_extracted.txt").is_file());
}
