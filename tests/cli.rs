//! CLI test cases.
//!
//! These only cover commands which run locally. Anything which talks to S3 or
//! an LLM needs real credentials, so we test those pieces with fakes in the
//! unit tests instead.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// Resources owned by `alice` (two) and `bob` (one).
static RESOURCES: &str = "tests/fixtures/resources.jsonl";

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    Command::cargo_bin("sheek").unwrap()
}

#[test]
fn test_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("AWS_S3_BUCKET"));
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_schema_resource() {
    cmd()
        .arg("schema")
        .arg("Resource")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fileUrl\""))
        .stdout(predicate::str::contains("\"extractedAt\""));
}

#[test]
fn test_schema_quiz_response() {
    cmd()
        .arg("schema")
        .arg("QuizResponse")
        .assert()
        .success()
        .stdout(predicate::str::contains("multipleChoiceQuiz"));
}

#[test]
fn test_schema_unknown_type() {
    cmd().arg("schema").arg("Nope").assert().failure();
}

#[test]
fn test_resources_newest_first() {
    let output = cmd()
        .arg("resources")
        .arg("--user-id")
        .arg("alice")
        .arg("--resources")
        .arg(RESOURCES)
        .output()
        .unwrap();
    assert!(output.status.success());
    let page: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(page["totalData"], 2);
    assert_eq!(page["totalPages"], 1);
    assert_eq!(page["data"][0]["title"], "Photosynthesis");
    assert_eq!(page["data"][1]["title"], "Cell Biology");
    assert!(page["data"][0]["content"].get("pages").is_none());
}

#[test]
fn test_resources_paged() {
    let output = cmd()
        .arg("resources")
        .arg("--user-id")
        .arg("alice")
        .arg("--resources")
        .arg(RESOURCES)
        .arg("--page")
        .arg("2")
        .arg("--limit")
        .arg("1")
        .output()
        .unwrap();
    assert!(output.status.success());
    let page: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["page"], 2);
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
    assert_eq!(page["data"][0]["title"], "Cell Biology");
}

#[test]
fn test_resources_missing_store_is_empty() {
    let output = cmd()
        .arg("resources")
        .arg("--user-id")
        .arg("alice")
        .arg("--resources")
        .arg("tests/fixtures/does-not-exist.jsonl")
        .output()
        .unwrap();
    assert!(output.status.success());
    let page: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(page["totalData"], 0);
    assert_eq!(page["totalPages"], 0);
}

#[test]
fn test_resources_invalid_page() {
    cmd()
        .arg("resources")
        .arg("--user-id")
        .arg("alice")
        .arg("--resources")
        .arg(RESOURCES)
        .arg("--page")
        .arg("-2")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Page must be greater than 0"));
}

#[test]
fn test_resources_zero_page_means_first_page() {
    let output = cmd()
        .arg("resources")
        .arg("--user-id")
        .arg("alice")
        .arg("--resources")
        .arg(RESOURCES)
        .arg("--page")
        .arg("0")
        .arg("--limit")
        .arg("0")
        .output()
        .unwrap();
    assert!(output.status.success());
    let page: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(page["page"], 1);
    assert_eq!(page["limit"], 10);
    assert_eq!(page["totalData"], 2);
}

#[test]
fn test_resources_invalid_limit() {
    cmd()
        .arg("resources")
        .arg("--user-id")
        .arg("alice")
        .arg("--resources")
        .arg(RESOURCES)
        .arg("--limit")
        .arg("101")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Limit must be between 1 and 100"));
}

#[test]
fn test_quiz_for_someone_elses_resource() {
    // This fails before we ever need an LLM.
    cmd()
        .arg("quiz")
        .arg("--user-id")
        .arg("bob")
        .arg("--resource-id")
        .arg("4f0c9a52-1d4e-4c8a-9a57-3a1f6f0d2b11")
        .arg("--resources")
        .arg(RESOURCES)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_ocr_rejects_non_pdf() {
    cmd()
        .arg("ocr")
        .arg("tests/fixtures/not-a-pdf.txt")
        .assert()
        .failure();
}
