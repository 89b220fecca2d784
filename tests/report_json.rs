use serde_json::json;
use stegmage::{
    job::{progress_after, validate_job_id, Job},
    report::{AggregatedReport, ResultSet},
    AnalyzerResult, JobState, JobStatus,
};
use std::path::Path;

#[test]
fn analyzer_result_wire_format() {
    let ok = AnalyzerResult::success(json!({ "count": 3 }).as_object().unwrap().clone());
    assert_eq!(
        serde_json::to_value(&ok).unwrap(),
        json!({ "success": true, "data": { "count": 3 } })
    );

    let bad = AnalyzerResult::failure("steghide not found");
    assert_eq!(
        serde_json::to_value(&bad).unwrap(),
        json!({ "success": false, "error": "steghide not found" })
    );
}

#[test]
fn failure_never_has_an_empty_message() {
    let r = AnalyzerResult::failure("   ");
    assert!(!r.error().unwrap().trim().is_empty());
}

#[test]
fn failure_entry_without_error_is_rejected() {
    let parsed = serde_json::from_value::<AnalyzerResult>(json!({ "success": false }));
    assert!(parsed.is_err());
}

#[test]
fn result_set_preserves_order_through_json() {
    let mut set = ResultSet::new();
    for name in ["zsteg", "lsb", "metadata"] {
        set.insert(name, AnalyzerResult::failure(format!("{name} down")));
    }
    set.insert("lsb", AnalyzerResult::success(Default::default()));

    let text = serde_json::to_string(&set).unwrap();
    assert!(text.find("zsteg").unwrap() < text.find("lsb").unwrap());
    assert!(text.find("lsb").unwrap() < text.find("metadata").unwrap());

    let back: ResultSet = serde_json::from_str(&text).unwrap();
    assert_eq!(back.names().collect::<Vec<_>>(), vec!["zsteg", "lsb", "metadata"]);
    assert_eq!(back.failures(), 2);
}

#[test]
fn report_without_hash_omits_the_field() {
    let report = AggregatedReport {
        analysis_id: "a".into(),
        filename: "f.png".into(),
        timestamp: "2024-01-01T00:00:00Z".into(),
        status: JobStatus::Completed,
        input_sha256: None,
        results: ResultSet::new(),
    };
    let v = serde_json::to_value(&report).unwrap();
    assert!(v.get("input_sha256").is_none());
    assert_eq!(v["results"], json!({}));
}

#[test]
fn progress_rounds_half_up() {
    assert_eq!(progress_after(0, 3), 0);
    assert_eq!(progress_after(1, 3), 33);
    assert_eq!(progress_after(2, 3), 67);
    assert_eq!(progress_after(3, 3), 100);
    assert_eq!(progress_after(1, 8), 13);
    assert_eq!(progress_after(0, 0), 100);
    assert_eq!(progress_after(9, 4), 100);
}

#[test]
fn job_progress_never_goes_backwards() {
    let mut job = Job::new("j", Path::new("x.png"), None).unwrap();
    assert_eq!(job.state(), &JobState::Queued);
    job.start();
    job.advance(40);
    job.advance(20);
    assert_eq!(job.status_record().progress, 40);
    job.advance(250);
    assert_eq!(job.status_record().progress, 100);

    job.fail("store down");
    let rec = job.status_record();
    assert_eq!((rec.status, rec.progress), (JobStatus::Failed, 100));
}

#[test]
fn job_ids_are_restricted() {
    assert!(validate_job_id("3f2a-11_ab").is_ok());
    assert!(validate_job_id("").is_err());
    assert!(validate_job_id("a.b").is_err());
    assert!(validate_job_id(&"x".repeat(129)).is_err());
    assert!(validate_job_id(&"x".repeat(128)).is_ok());
}
