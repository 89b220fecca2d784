use serde_json::json;
use stegmage::{
    report::{AggregatedReport, ResultSet},
    store::{FsResultStore, MemoryResultStore},
    AnalyzerResult, JobStatus, ResultStore,
};

fn report(id: &str, marker: i64) -> AggregatedReport {
    let mut results = ResultSet::new();
    results.insert(
        "lsb",
        AnalyzerResult::success(json!({ "marker": marker }).as_object().unwrap().clone()),
    );
    results.insert("steghide", AnalyzerResult::failure("steghide not found"));
    AggregatedReport {
        analysis_id: id.to_string(),
        filename: "cat.png".to_string(),
        timestamp: "2024-01-01T00:00:00Z".to_string(),
        status: JobStatus::Completed,
        input_sha256: None,
        results,
    }
}

#[test]
fn fs_store_put_get_overwrite_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsResultStore::new(dir.path().join("results")).unwrap();

    assert!(store.get("r1").unwrap().is_none());
    store.put("r1", &report("r1", 1)).unwrap();
    store.put("r1", &report("r1", 2)).unwrap();

    let got = store.get("r1").unwrap().unwrap();
    assert_eq!(got, report("r1", 2));
    assert_eq!(
        got.results.names().collect::<Vec<_>>(),
        vec!["lsb", "steghide"]
    );

    assert!(store.delete("r1").unwrap());
    assert!(!store.delete("r1").unwrap());
    assert!(store.get("r1").unwrap().is_none());
}

#[test]
fn fs_store_leaves_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsResultStore::new(dir.path()).unwrap();
    store.put("r2", &report("r2", 1)).unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["r2.json".to_string()]);
}

#[test]
fn fs_store_rejects_traversal_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsResultStore::new(dir.path()).unwrap();
    assert!(store.report_path("../../etc/passwd").is_err());
    assert!(store.put("..", &report("..", 1)).is_err());
    assert_eq!(
        store.report_path("ok_id-1").unwrap(),
        dir.path().join("ok_id-1.json")
    );
}

#[test]
fn memory_store_round_trip() {
    let store = MemoryResultStore::new();
    store.put("m", &report("m", 5)).unwrap();
    assert_eq!(store.get("m").unwrap(), Some(report("m", 5)));
    assert!(store.delete("m").unwrap());
    assert!(store.get("m").unwrap().is_none());
}
