use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docsync_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docsync");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("alpha.md"),
        "# Alpha Document\n\nNotes about Rust programming.\n\nCargo and crates are covered.",
    )
    .unwrap();
    fs::write(
        docs_dir.join("beta.txt"),
        "Beta plain text file.\n\nDeployment and infrastructure notes.",
    )
    .unwrap();
    fs::write(docs_dir.join("ignored.log"), "not a document").unwrap();

    let config_content = format!(
        r#"[documents]
root = "{root}/docs"
extensions = ["md", "txt"]

[ledger]
path = "{root}/data/ledger.json"

[index]
path = "{root}/data/index.sqlite"
"#,
        root = root.display()
    );

    let config_path = root.join("docsync.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docsync(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docsync_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docsync binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, ok) = run_docsync(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Index initialized successfully."));

    // Running init again must not fail
    let (_, stderr, ok) = run_docsync(&config_path, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_dry_run_classifies_without_writing() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, ok) = run_docsync(&config_path, &["sync", "--dry-run"]);
    assert!(ok, "dry-run failed: {}", stderr);

    // Two allow-listed files, the .log excluded
    assert!(stdout.contains("candidates: 2"), "stdout: {}", stdout);
    assert!(stdout.contains("new: 2"), "stdout: {}", stdout);
    assert!(stdout.contains("dry-run"), "stdout: {}", stdout);
    assert!(stdout.contains("ok"));

    // No ledger, no index database
    assert!(!tmp.path().join("data/ledger.json").exists());
    assert!(!tmp.path().join("data/index.sqlite").exists());
}

#[test]
fn test_status_on_fresh_index() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, ok) = run_docsync(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);

    let (stdout, stderr, ok) = run_docsync(&config_path, &["status"]);
    assert!(ok, "status failed: {}", stderr);
    assert!(stdout.contains("documents tracked: 0"), "stdout: {}", stdout);
    assert!(stdout.contains("records: 0"), "stdout: {}", stdout);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let bogus = tmp.path().join("nope.toml");

    let (_, stderr, ok) = run_docsync(&bogus, &["status"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_provider_rejected() {
    let (tmp, _) = setup_test_env();
    let config_path = tmp.path().join("bad.toml");
    fs::write(
        &config_path,
        format!(
            r#"[documents]
root = "{root}/docs"

[ledger]
path = "{root}/data/ledger.json"

[index]
path = "{root}/data/index.sqlite"

[embedding]
provider = "milvus"
model = "m"
dims = 8
"#,
            root = tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, ok) = run_docsync(&config_path, &["status"]);
    assert!(!ok);
    assert!(stderr.contains("Unknown embedding provider"), "stderr: {}", stderr);
}

#[test]
fn test_sync_without_embedder_reports_error() {
    let (_tmp, config_path) = setup_test_env();

    // Real sync needs an embedding provider; the disabled default must
    // produce a clear error rather than a partial run.
    let (_, stderr, ok) = run_docsync(&config_path, &["sync"]);
    assert!(!ok);
    assert!(
        stderr.contains("embedding") || stderr.contains("provider"),
        "stderr: {}",
        stderr
    );
}
