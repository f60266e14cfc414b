//! E2E CLI tests for `genea track`:
//! - summary output in JSON and text modes
//! - genealogy JSONL written to `--out`
//! - merge validation through a configured lister command
//! - error reporting with stable codes
//!
//! Each test runs the `genea` binary in an isolated temp directory.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// Rename on one side of a merge, modification on the other.
const COMMITS: &str = r#"{"hash":"r","timestamp":1600000000,"parents":[]}
{"hash":"a","timestamp":1600000100,"parents":["r"]}
{"hash":"b","timestamp":1600000200,"parents":["r"]}
{"hash":"m","timestamp":1600000300,"parents":["a","b"]}
"#;

const CHANGES: &str = r#"{"commit":"r","hunk":0,"kind":"ADD","function":{"signature":"int f(void)","file":"file.c"},"lines_added":4}
{"commit":"a","hunk":0,"kind":"MOD","function":{"signature":"int f(void)","file":"file.c"},"previous_revision":"r","lines_added":1,"lines_deleted":1}
{"commit":"b","hunk":0,"kind":"MOVE","function":{"signature":"int f(void)","file":"file.c"},"new_function":{"signature":"int f(int)","file":"file2.c"},"previous_revision":"r"}

{"commit":"m","hunk":0,"kind":"MOVE","function":{"signature":"int f(void)","file":"file.c"},"new_function":{"signature":"int f(int)","file":"file2.c"},"previous_revision":"a"}
{"commit":"m","hunk":1,"kind":"MOD","function":{"signature":"int f(int)","file":"file2.c"},"previous_revision":"b","lines_added":1,"lines_deleted":1}
"#;

fn genea_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("genea"));
    cmd.current_dir(dir);
    cmd.env("GENEA_LOG", "error");
    cmd.env("XDG_CONFIG_HOME", dir.join("xdg"));
    cmd.env_remove("FORMAT");
    cmd.env_remove("GENEA_WORKERS");
    cmd
}

fn project() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("commits.jsonl"), COMMITS).expect("write commits");
    fs::write(dir.path().join("changes.jsonl"), CHANGES).expect("write changes");
    dir
}

fn track_json(dir: &Path, extra: &[&str]) -> Value {
    let output = genea_cmd(dir)
        .args(["track", "--commits", "commits.jsonl", "--changes", "changes.jsonl", "--json"])
        .args(extra)
        .output()
        .expect("track should not crash");
    assert!(
        output.status.success(),
        "track failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("track --json should produce valid JSON")
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[test]
fn json_summary_reports_stats() {
    let dir = project();
    let report = track_json(dir.path(), &[]);

    assert_eq!(report["commits"], 4);
    assert_eq!(report["genealogies"], 1);
    assert_eq!(report["live_genealogies"], 1);
    assert_eq!(report["guessed_adds"], 0);
    assert_eq!(report["history_start"], "2020-09-13T12:26:40+00:00");
    assert_eq!(report["stats"]["changes"], 5);
    assert_eq!(report["stats"]["move_conflicts"], 1);
    assert_eq!(report["stats"]["probable_merge_resolutions"], 1);
    assert_eq!(report["stats"]["always_deleted"], 0);
    assert!(report.get("validation").is_none());
    assert!(report.get("out").is_none());
}

#[test]
fn text_summary_is_line_oriented() {
    let dir = project();
    genea_cmd(dir.path())
        .args(["--format", "text", "track", "--commits", "commits.jsonl", "--changes", "changes.jsonl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("commits 4\n"))
        .stdout(predicate::str::contains("genealogies 1\n"))
        .stdout(predicate::str::contains("move_conflicts 1\n"));
}

#[test]
fn pretty_summary_includes_replay_section() {
    let dir = project();
    genea_cmd(dir.path())
        .args(["--format", "pretty", "track", "--commits", "commits.jsonl", "--changes", "changes.jsonl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("History"))
        .stdout(predicate::str::contains("Replay"))
        .stdout(predicate::str::contains("move conflicts: 1 (1 probable merge resolutions"));
}

#[test]
fn config_output_key_selects_mode() {
    let dir = project();
    fs::write(dir.path().join("genea.toml"), "output = \"json\"\n").expect("write config");
    let output = genea_cmd(dir.path())
        .args(["track", "--commits", "commits.jsonl", "--changes", "changes.jsonl"])
        .output()
        .expect("track should not crash");
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("config selects JSON");
    assert_eq!(report["commits"], 4);
}

// ---------------------------------------------------------------------------
// Genealogy output
// ---------------------------------------------------------------------------

#[test]
fn out_flag_writes_one_genealogy_per_line() {
    let dir = project();
    let report = track_json(dir.path(), &["--out", "genealogies.jsonl"]);
    assert_eq!(report["out"], "genealogies.jsonl");

    let written = fs::read_to_string(dir.path().join("genealogies.jsonl")).expect("out file");
    let rows: Vec<Value> = written
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid JSON line"))
        .collect();
    assert_eq!(rows.len(), 1);

    let genealogy = &rows[0];
    assert_eq!(genealogy["adding_commits"], serde_json::json!(["r"]));
    assert_eq!(genealogy["adding_guessed"], false);
    assert_eq!(genealogy["live"], true);
    let kinds: Vec<&str> = genealogy["changes"]
        .as_array()
        .expect("changes array")
        .iter()
        .filter_map(|c| c["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"ADD"));
    assert!(kinds.contains(&"MOVE"));
    assert!(kinds.contains(&"MOD"));
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn validate_uses_configured_lister() {
    let dir = project();
    fs::write(
        dir.path().join("genea.toml"),
        "[oracle]\ncommand = [\"sh\", \"-c\", \"printf 'int f(int)\\\\tfile2.c\\\\n'\", \"lister\"]\n",
    )
    .expect("write config");

    let report = track_json(dir.path(), &["--validate"]);
    assert_eq!(report["validation"]["merges_validated"], 1);
    assert_eq!(report["validation"]["missing"], 0);
    assert_eq!(report["validation"]["superfluous"], 0);
}

#[test]
fn validate_without_lister_fails_with_code() {
    let dir = project();
    genea_cmd(dir.path())
        .args(["track", "--commits", "commits.jsonl", "--changes", "changes.jsonl", "--validate", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no function lister configured"))
        .stderr(predicate::str::contains("E4002"));
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn unknown_commit_in_changes_is_reported() {
    let dir = project();
    fs::write(
        dir.path().join("changes.jsonl"),
        r#"{"commit":"ghost","kind":"ADD","function":{"signature":"int g(void)","file":"g.c"}}"#,
    )
    .expect("write changes");

    let output = genea_cmd(dir.path())
        .args(["track", "--commits", "commits.jsonl", "--changes", "changes.jsonl", "--json"])
        .output()
        .expect("track should not crash");
    assert!(!output.status.success());
    let err: Value = serde_json::from_slice(&output.stderr).expect("JSON error on stderr");
    assert_eq!(err["error"]["error_code"], "E1003");
    assert!(err["error"]["suggestion"].is_string());
}

#[test]
fn missing_input_file_fails() {
    let dir = project();
    genea_cmd(dir.path())
        .args(["--format", "text", "track", "--commits", "nope.jsonl", "--changes", "changes.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open nope.jsonl"));
}

#[test]
fn explicit_config_must_exist() {
    let dir = project();
    genea_cmd(dir.path())
        .args(["--config", "missing.toml", "track", "--commits", "commits.jsonl", "--changes", "changes.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.toml does not exist"));
}
