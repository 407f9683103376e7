use assert_cmd::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const STORE: &str = r##"{
  "odds_table": {
    "odds_rows": "table#odds tr",
    "refresh_button": "#refresh"
  }
}"##;

const CONTEXTS: &str = r#"
contexts:
  odds_table:
    description: Match odds listing
    required_locators: ["table#odds"]
    schema:
      odds_rows: Every row of the odds table
"#;

fn workspace() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path();
    fs::write(root.join("locators.json"), STORE).unwrap();
    fs::write(root.join("contexts.yaml"), CONTEXTS).unwrap();
    let config = format!(
        "store_path: {store}\nsnapshot_dir: null\ncontexts_file: {contexts}\n",
        store = root.join("locators.json").display(),
        contexts = root.join("contexts.yaml").display(),
    );
    let config_path = root.join("config.yaml");
    fs::write(&config_path, config).unwrap();
    (dir, config_path)
}

fn locator_heal(cwd: &Path, config: &Path) -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("locator-heal");
    let mut cmd = Command::new(bin);
    cmd.current_dir(cwd)
        .env_remove("RUST_LOG")
        .args(["--config", config.to_str().unwrap(), "--log-level", "error"]);
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let assert = cmd.assert().success();
    String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 output")
}

#[test]
fn store_get_prints_cached_locator() {
    let (dir, config) = workspace();
    let stdout = stdout_of(locator_heal(dir.path(), &config).args([
        "store",
        "get",
        "odds_table",
        "refresh_button",
    ]));
    assert_eq!(stdout.trim(), "#refresh");
}

#[test]
fn store_get_unknown_key_fails() {
    let (dir, config) = workspace();
    locator_heal(dir.path(), &config)
        .args(["store", "get", "odds_table", "missing"])
        .assert()
        .failure();
}

#[test]
fn store_show_emits_json_book() {
    let (dir, config) = workspace();
    let stdout = stdout_of(locator_heal(dir.path(), &config).args([
        "--output", "json", "store", "show",
    ]));
    let value: Value = serde_json::from_str(&stdout).expect("valid json");
    assert_eq!(value["odds_table"]["odds_rows"].as_str(), Some("table#odds tr"));
}

#[test]
fn contexts_schema_overlays_base_keys() {
    let (dir, config) = workspace();
    let stdout = stdout_of(locator_heal(dir.path(), &config).args([
        "--output",
        "json",
        "contexts",
        "--schema",
        "odds_table",
    ]));
    let value: Value = serde_json::from_str(&stdout).expect("valid json");
    assert!(value.get("odds_rows").is_some());
    assert!(value.get("search_input").is_some());
}

#[test]
fn simplify_prefers_unique_id() {
    let (dir, config) = workspace();
    let markup = dir.path().join("page.html");
    fs::write(
        &markup,
        r#"<body><div class="wrap"><div><table id="odds"></table></div></div></body>"#,
    )
    .unwrap();

    let stdout = stdout_of(locator_heal(dir.path(), &config).args([
        "simplify",
        "--markup",
        markup.to_str().unwrap(),
        "body > div.wrap > div > table#odds",
        "#odds",
    ]));
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["#odds", "#odds"]);
}

#[test]
fn heal_skips_cached_context_without_force() {
    let (dir, config) = workspace();
    let markup = dir.path().join("page.html");
    fs::write(&markup, "<table id=\"odds\"></table>").unwrap();

    let stdout = stdout_of(locator_heal(dir.path(), &config).args([
        "heal",
        "odds_table",
        "--markup",
        markup.to_str().unwrap(),
    ]));
    assert!(stdout.starts_with("Skipped:"), "unexpected output: {stdout}");
}

#[test]
fn config_validate_reports_missing_providers() {
    let (dir, config) = workspace();
    let assert = locator_heal(dir.path(), &config)
        .args(["config", "validate"])
        .assert()
        .failure();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("gateway.providers is empty"));
}

#[test]
fn config_get_reads_nested_value() {
    let (dir, config) = workspace();
    let stdout = stdout_of(locator_heal(dir.path(), &config).args([
        "config",
        "get",
        "gateway.backoff.rate_limit_ms",
    ]));
    assert_eq!(stdout.trim(), "1000");
}

#[test]
fn heal_defaults_to_newest_markup_snapshot() {
    let (dir, config) = workspace();
    let snapshots = dir.path().join("snapshots");
    fs::create_dir_all(&snapshots).unwrap();
    fs::write(
        snapshots.join("odds_table_20260101_000000000.html"),
        "<table id=\"odds\"></table>",
    )
    .unwrap();
    let mut yaml = fs::read_to_string(&config).unwrap();
    yaml = yaml.replace(
        "snapshot_dir: null",
        &format!("snapshot_dir: {}", snapshots.display()),
    );
    fs::write(&config, yaml).unwrap();

    let stdout = stdout_of(locator_heal(dir.path(), &config).args(["heal", "odds_table"]));
    assert!(stdout.starts_with("Skipped:"), "unexpected output: {stdout}");
}

#[test]
fn heal_without_markup_or_snapshot_fails() {
    let (dir, config) = workspace();
    let assert = locator_heal(dir.path(), &config)
        .args(["heal", "odds_table"])
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("no saved markup snapshot"), "stderr: {stderr}");
}
