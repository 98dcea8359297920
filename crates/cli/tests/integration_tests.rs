//! End-to-end tests driving the compiled binary the way operators do.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

use sow::{SowRecord, SowWriter};

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cli"))
        .args(args)
        .output()
        .expect("failed to spawn cli")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn write_sow_fixture(path: &Path) {
    let mut w = SowWriter::create(path, 512, 10_000).unwrap();
    for i in 1..=3u64 {
        w.write(&SowRecord {
            key: i,
            seq: i * 11,
            data: format!("record-{}", i).into_bytes(),
            data_size: 8,
            ..SowRecord::default()
        })
        .unwrap();
    }
    w.close().unwrap();
}

#[test]
fn sow_version_reports_latest() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topic.sow");
    write_sow_fixture(&path);

    let output = run_cli(&["sow", "version", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("6.0"));
}

#[test]
fn sow_check_distinguishes_current_from_stale() {
    let dir = tempdir().unwrap();
    let current = dir.path().join("topic.sow");
    write_sow_fixture(&current);

    let output = run_cli(&["sow", "check", current.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("up to date"));
}

#[test]
fn sow_dump_prints_records_and_summary() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topic.sow");
    write_sow_fixture(&path);

    let output = run_cli(&["sow", "dump", path.to_str().unwrap()]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("record-1"));
    assert!(text.contains("record-3"));
    assert!(text.contains("Valid Keys"));
}

#[test]
fn sow_dump_limit_caps_output() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topic.sow");
    write_sow_fixture(&path);

    let output = run_cli(&["sow", "dump", "--limit", "1", path.to_str().unwrap()]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("record-1"));
    assert!(!text.contains("record-2"));
}

#[test]
fn journal_upgrade_roundtrip_through_binary() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.journal");
    let mut w = journal::JournalWriter::create(&path, 3, journal::Extents::default()).unwrap();
    w.write(&journal::JournalRecord {
        rtype: journal::RecordType::Publish,
        local_tx_id: 12,
        timestamp: 1,
        topic: b"orders".to_vec(),
        data: b"x".to_vec(),
        message_len: 1,
        ..journal::JournalRecord::default()
    })
    .unwrap();
    w.close().unwrap();

    let copy = dir.path().join("b.journal");
    let output = run_cli(&[
        "journal",
        "upgrade",
        path.to_str().unwrap(),
        copy.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    assert!(copy.exists());

    let output = run_cli(&["journal", "version", copy.to_str().unwrap()]);
    assert!(stdout(&output).contains("amps::txlog/v8"));
}

#[test]
fn help_prints_usage() {
    for flag in ["--help", "-h"] {
        let output = run_cli(&[flag]);
        assert!(output.status.success());
        let text = stdout(&output);
        assert!(text.contains("usage: cli"));
        assert!(text.contains("--record-size"));
    }

    // --help wins even when other arguments are present
    let output = run_cli(&["sow", "dump", "--help"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("usage: cli"));
}

#[test]
fn unknown_store_kind_fails() {
    let output = run_cli(&["frobnicator", "dump", "whatever"]);
    assert!(!output.status.success());
}

#[test]
fn unknown_option_fails() {
    let output = run_cli(&["sow", "dump", "--frobnicate", "whatever"]);
    assert!(!output.status.success());
}

#[test]
fn missing_file_reports_error() {
    let output = run_cli(&["sow", "version", "/nonexistent/topic.sow"]);
    assert!(!output.status.success());
}
