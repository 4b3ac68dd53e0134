use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn scout_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("scout");
    path
}

/// Config without a repository, so every command serves synthetic data.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[cache]
path = "{}/data/scout.sqlite"

[retrieval]
limit = 5

[logging]
level = "warn"
"#,
        root.display()
    );

    let config_path = config_dir.join("scout.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_scout(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = scout_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .env_remove("SCOUT_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run scout binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_scout(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/scout.sqlite").exists());

    // Idempotent.
    let (_, stderr, success) = run_scout(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_scan_without_repository_is_synthetic() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_scout(&config_path, &["scan"]);
    assert!(success, "scan failed: {}", stderr);
    assert!(stdout.contains("source:    synthetic"));
    assert!(stdout.contains("synthetic (mock)"));
}

#[test]
fn test_search_labels_synthetic_results() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_scout(
        &config_path,
        &["search", "subscription payment stripe", "--explain"],
    );
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("(synthetic data"));
    assert!(stdout.contains("1. ["));
    assert!(stdout.contains("matched:"));
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_scout(&config_path, &["search", "zzqxv kubernetes"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_stats_and_cache_commands() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_scout(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Entries:"));
    assert!(stdout.contains("synthetic (mock)"));

    let (stdout, _, success) = run_scout(&config_path, &["cache", "show"]);
    assert!(success);
    assert!(stdout.contains("Cache is empty."));

    let (stdout, _, success) = run_scout(&config_path, &["clear"]);
    assert!(success);
    assert!(stdout.contains("cleared"));
}

#[test]
fn test_ephemeral_run_writes_no_database() {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_scout(&config_path, &["--ephemeral", "diagnostics"]);
    assert!(success, "diagnostics failed: {}", stderr);
    assert!(!tmp.path().join("data/scout.sqlite").exists());
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(&config_path, "[explorer]\nmax_depth = 9\n").unwrap();
    let (_, stderr, success) = run_scout(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("max_depth"));
}
