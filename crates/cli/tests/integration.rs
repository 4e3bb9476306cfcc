//! Integration tests for the bp CLI
//!
//! These tests require a running S3-compatible server.
//!
//! Run with:
//! ```bash
//! # Start a single-node Garage (see its quick start for key creation)
//! export TEST_S3_ENDPOINT=http://localhost:3900
//! export TEST_S3_ACCESS_KEY=GK...
//! export TEST_S3_SECRET_KEY=...
//!
//! cargo test --features integration
//! ```

#![cfg(feature = "integration")]

use std::path::Path;
use std::process::{Command, Output};
use std::time::Duration;

use tempfile::TempDir;

fn bp_binary() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_bp"))
}

/// Run bp with an isolated config directory
fn run_bp(args: &[&str], config_dir: &Path) -> Output {
    Command::new(bp_binary())
        .args(args)
        .env("BP_CONFIG_DIR", config_dir)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute bp command")
}

fn run_json(args: &[&str], config_dir: &Path) -> serde_json::Value {
    let mut full = args.to_vec();
    full.push("--json");
    let output = run_bp(&full, config_dir);
    assert!(
        output.status.success(),
        "bp {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("command output is not JSON")
}

/// Get S3 test configuration from environment
fn get_test_config() -> Option<(String, String, String)> {
    let endpoint = std::env::var("TEST_S3_ENDPOINT").ok()?;
    let access_key = std::env::var("TEST_S3_ACCESS_KEY").ok()?;
    let secret_key = std::env::var("TEST_S3_SECRET_KEY").ok()?;
    Some((endpoint, access_key, secret_key))
}

/// Generate unique suffix for test resources
fn uuid_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{:x}", duration.as_nanos() % 0xFFFFFFFF)
}

/// Configure the `test` profile and wait until the server answers
fn setup_profile() -> Option<TempDir> {
    let (endpoint, access_key, secret_key) = get_test_config()?;
    let config_dir = tempfile::tempdir().ok()?;

    let output = run_bp(
        &["profile", "set", "test", &endpoint, &access_key, &secret_key],
        config_dir.path(),
    );
    if !output.status.success() {
        eprintln!(
            "Failed to set profile: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        return None;
    }

    for _ in 0..30 {
        if run_bp(&["buckets", "test"], config_dir.path()).status.success() {
            return Some(config_dir);
        }
        std::thread::sleep(Duration::from_secs(1));
    }
    eprintln!("S3 service did not become ready in time");
    None
}

/// Create a bucket through the smoke test, which leaves it empty
fn create_bucket(config_dir: &Path, bucket: &str) {
    let output = run_bp(&["check", &format!("test/{bucket}")], config_dir);
    assert!(
        output.status.success(),
        "check failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_check_passes() {
    let Some(config_dir) = setup_profile() else {
        eprintln!("Skipping: S3 test config not available");
        return;
    };
    let bucket = format!("bp-check-{}", uuid_suffix());

    let report = run_json(&["check", &format!("test/{bucket}")], config_dir.path());
    let steps = report["steps"].as_array().unwrap();
    assert!(steps.iter().all(|s| s["status"] == "passed"), "{report}");
}

#[test]
fn test_export_import_and_sync() {
    let Some(config_dir) = setup_profile() else {
        eprintln!("Skipping: S3 test config not available");
        return;
    };
    let suffix = uuid_suffix();
    let source = format!("bp-src-{suffix}");
    let restore = format!("bp-restore-{suffix}");
    let mirror = format!("bp-mirror-{suffix}");
    for bucket in [&restore, &mirror] {
        create_bucket(config_dir.path(), bucket);
    }

    // The persistence probe doubles as a data generator
    let state = run_json(
        &["probe", "write", &format!("test/{source}"), "--count", "5"],
        config_dir.path(),
    );
    assert_eq!(state["objects"].as_array().unwrap().len(), 5);

    let work = tempfile::tempdir().unwrap();
    let archive = work.path().join("backup.tar.gz");
    let archive_arg = archive.to_string_lossy().to_string();

    let exported = run_json(
        &["export", &format!("test/{source}"), &archive_arg],
        config_dir.path(),
    );
    assert_eq!(exported["exported"], 5);
    assert_eq!(exported["failed"], 0);

    let imported = run_json(
        &["import", &archive_arg, &format!("test/{restore}")],
        config_dir.path(),
    );
    assert_eq!(imported["imported"], 5);

    let again = run_json(
        &["import", &archive_arg, &format!("test/{restore}"), "--no-overwrite"],
        config_dir.path(),
    );
    assert_eq!(again["skipped"], 5);

    let first = run_json(
        &["sync", &format!("test/{source}"), &format!("test/{mirror}")],
        config_dir.path(),
    );
    assert_eq!(first["copied"], 5);
    let second = run_json(
        &["sync", &format!("test/{source}"), &format!("test/{mirror}")],
        config_dir.path(),
    );
    assert_eq!(second["copied"], 0);

    let verified = run_json(
        &["probe", "verify", &format!("test/{source}")],
        config_dir.path(),
    );
    assert_eq!(verified["intact"], true);

    let output = run_bp(&["probe", "clear", &format!("test/{source}")], config_dir.path());
    assert!(output.status.success());
}

#[test]
fn test_missing_bucket_exit_code() {
    let Some(config_dir) = setup_profile() else {
        eprintln!("Skipping: S3 test config not available");
        return;
    };
    let work = tempfile::tempdir().unwrap();
    let output = run_bp(
        &[
            "export",
            &format!("test/bp-missing-{}", uuid_suffix()),
            &work.path().join("x.tar.gz").to_string_lossy(),
        ],
        config_dir.path(),
    );
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn test_unknown_profile_exit_code() {
    let config_dir = tempfile::tempdir().unwrap();
    let output = run_bp(&["buckets", "nope"], config_dir.path());
    assert_eq!(output.status.code(), Some(5));
}
