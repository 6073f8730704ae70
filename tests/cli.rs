//! CLI smoke tests that exercise the `nbe` binary end to end.
//!
//! Only commands that need no external providers are covered here; the
//! generation flows are tested in-process in `pipeline.rs` and `server.rs`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn nbe_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("nbe");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/nbe.sqlite"

[storage]
backend = "local"
root = "{}/files"

[index]
provider = "memory"
"#,
        root.display(),
        root.display()
    );

    let config_path = root.join("config").join("nbe.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_nbe(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = nbe_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run nbe binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_nbe(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/nbe.sqlite").exists());
}

#[test]
fn init_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_nbe(&config_path, &["init"]);
    assert!(first, "First init failed");

    let (_, _, second) = run_nbe(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn invalid_config_is_rejected_with_a_message() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("nbe.toml");
    fs::write(&config_path, "[chunking]\nchunk_size = 100\noverlap = 100\n").unwrap();

    let (_, stderr, success) = run_nbe(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr: {}", stderr);
}
