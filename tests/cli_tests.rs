//! Smoke tests for the screenlign binary over fixture JSONL files

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::PathBuf;

fn write_fixtures(dir: &tempfile::TempDir) -> (PathBuf, PathBuf) {
    let obs_path = dir.path().join("observations.jsonl");
    let mut f = std::fs::File::create(&obs_path).unwrap();
    writeln!(f, r#"{{"t_video_ms": 0, "state": "app_open", "confidence": 1.0}}"#).unwrap();
    writeln!(f, r#"{{"t_video_ms": 1000, "state": "playback", "confidence": 0.9}}"#).unwrap();

    let events_path = dir.path().join("events.jsonl");
    let mut f = std::fs::File::create(&events_path).unwrap();
    writeln!(f, r#"{{"t_event_ms": 50, "kind": "session_start", "session_key": "s-1"}}"#).unwrap();
    writeln!(f, r#"{{"t_event_ms": 1050, "kind": "playback", "session_key": "s-1"}}"#).unwrap();

    (obs_path, events_path)
}

#[test]
fn test_text_report_summarizes_run() {
    let dir = tempfile::tempdir().unwrap();
    let (obs, events) = write_fixtures(&dir);

    Command::cargo_bin("screenlign")
        .unwrap()
        .arg("--observations")
        .arg(&obs)
        .arg("--events")
        .arg(&events)
        .assert()
        .success()
        .stdout(predicate::str::contains("Correlation Report"))
        .stdout(predicate::str::contains("offset 50 ms"));
}

#[test]
fn test_json_report_is_valid_json() {
    let dir = tempfile::tempdir().unwrap();
    let (obs, events) = write_fixtures(&dir);

    let output = Command::cargo_bin("screenlign")
        .unwrap()
        .arg("-o")
        .arg(&obs)
        .arg("-e")
        .arg(&events)
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["alignment"]["offset_ms"], 50);
    assert_eq!(report["gate_video_ms"], 0);
}

#[test]
fn test_missing_observations_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, events) = write_fixtures(&dir);

    Command::cargo_bin("screenlign")
        .unwrap()
        .arg("-o")
        .arg(dir.path().join("nope.jsonl"))
        .arg("-e")
        .arg(&events)
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading observations"));
}

#[test]
fn test_invalid_config_aborts_before_processing() {
    let dir = tempfile::tempdir().unwrap();
    let (obs, events) = write_fixtures(&dir);
    let config = dir.path().join("run.toml");
    std::fs::write(&config, "app_open_video_ms = -1\n").unwrap();

    Command::cargo_bin("screenlign")
        .unwrap()
        .arg("-o")
        .arg(&obs)
        .arg("-e")
        .arg(&events)
        .arg("-c")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}
