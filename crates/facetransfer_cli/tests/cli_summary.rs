#[path = "../../facetransfer_core/tests/support/mod.rs"]
mod support;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

use support::Fixture;

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_face-transfer"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run face-transfer CLI")
}

fn write_save(dir: &TempDir, name: &str, fixture: &Fixture) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, fixture.bytes()).expect("failed to write fixture");
    path
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("stdout should be valid JSON")
}

#[test]
fn summary_json_reports_the_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_save(&dir, "nora.fos", &Fixture::fallout4("Nora", 8));

    let output = run_cli(&["summary", "--json", &arg(&path)]);
    assert!(output.status.success());
    let json = stdout_json(&output);

    assert_eq!(json["game"], "fallout4");
    assert_eq!(json["player_name"], "Nora");
    assert_eq!(json["race"], "HumanRace");
    assert_eq!(json["sex"], "Female");
    assert_eq!(json["screenshot"]["bytes_per_pixel"], 4);
}

#[test]
fn summary_text_lists_name_and_race() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_save(&dir, "lydia.ess", &Fixture::skyrim("Lydia", 3));

    let output = run_cli(&["summary", &arg(&path)]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Name:       Lydia"), "{stdout}");
    assert!(stdout.contains("Race:       NordRace"), "{stdout}");
    assert!(stdout.contains("Game:       skyrim"), "{stdout}");
}

#[test]
fn layout_json_covers_the_whole_file() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::skyrim("Lydia", 3);
    let path = write_save(&dir, "lydia.ess", &fixture);

    let output = run_cli(&["layout", "--json", &arg(&path)]);
    assert!(output.status.success());
    let json = stdout_json(&output);

    assert_eq!(json["file_len"], fixture.bytes().len());
    let sections = json["sections"].as_array().expect("sections array");
    assert_eq!(sections.first().unwrap()["section"], "magic");
    assert_eq!(sections.last().unwrap()["end"], fixture.bytes().len());
    assert!(sections.iter().any(|s| s["section"] == "change_forms"));
    assert!(!sections.iter().any(|s| s["section"] == "game_version"));
}

#[test]
fn player_json_lists_flags_and_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_save(&dir, "lydia.ess", &Fixture::skyrim("Lydia", 3));

    let output = run_cli(&["player", "--json", &arg(&path)]);
    assert!(output.status.success());
    let json = stdout_json(&output);

    assert_eq!(json["form_type"], 9);
    assert_eq!(json["compressed"], true);
    assert_eq!(json["flag_bits"], serde_json::json!([1, 5, 6, 11, 24, 28]));
    assert_eq!(json["tail_len"], 2);

    let fields = json["fields"].as_array().expect("fields array");
    let name = fields
        .iter()
        .find(|f| f["key"] == "name")
        .expect("name field");
    assert_eq!(name["bit"], 5);
    assert_eq!(name["value"]["kind"], "text");
    assert_eq!(name["value"]["value"], "Lydia");
    assert!(fields.iter().any(|f| f["key"] == "head_parts"));
}

#[test]
fn player_text_names_each_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_save(&dir, "nora.fos", &Fixture::fallout4("Nora", 8));

    let output = run_cli(&["player", &arg(&path)]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("face_tints"), "{stdout}");
    assert!(stdout.contains("\"Nora\""), "{stdout}");
    assert!(stdout.contains("tail"), "{stdout}");
}

#[test]
fn unreadable_save_exits_with_status_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk.ess");
    fs::write(&path, b"not a save at all").unwrap();

    let output = run_cli(&["summary", &arg(&path)]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error parsing save file"), "{stderr}");

    let output = run_cli(&["summary", &arg(&dir.path().join("missing.ess"))]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn missing_arguments_exit_with_status_two() {
    let output = run_cli(&["summary"]);
    assert_eq!(output.status.code(), Some(2));
}
