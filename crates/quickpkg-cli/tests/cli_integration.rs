//! CLI subprocess integration tests.
//!
//! These tests invoke the `quickpkg` binary as a subprocess and verify
//! exit codes, stdout content, and JSON output.

use std::path::Path;
use std::process::Command;

fn quickpkg_bin(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_quickpkg"));
    cmd.env("QUICKPKG_SKIP_PREREQS", "1");
    cmd.env("HOME", home);
    cmd.env_remove("QUICKPKG_LOG");
    cmd
}

#[test]
fn cli_version_exits_zero() {
    let home = tempfile::tempdir().unwrap();
    let output = quickpkg_bin(home.path()).arg("--version").output().unwrap();
    assert!(output.status.success(), "quickpkg --version must exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("quickpkg"),
        "version output must contain 'quickpkg': {stdout}"
    );
}

#[test]
fn cli_help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    let output = quickpkg_bin(home.path()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("build"), "help must list 'build' command");
    assert!(stdout.contains("doctor"), "help must list 'doctor' command");
}

#[test]
fn cli_build_rejects_unsupported_extension() {
    let home = tempfile::tempdir().unwrap();
    let item = home.path().join("Foo.tar.gz");
    std::fs::write(&item, b"not an installer").unwrap();

    let output = quickpkg_bin(home.path())
        .args(["build", &item.to_string_lossy()])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("app, dmg, zip, xip"),
        "stderr must list supported kinds, got: {stderr}"
    );
}

#[test]
fn cli_build_missing_input_is_a_usage_error() {
    let home = tempfile::tempdir().unwrap();
    let item = home.path().join("Missing.app");

    let output = quickpkg_bin(home.path())
        .args(["build", &item.to_string_lossy()])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Missing.app"), "got: {stderr}");
}

#[test]
fn cli_build_with_malformed_config_fails() {
    let home = tempfile::tempdir().unwrap();
    let config = home.path().join("config.toml");
    std::fs::write(&config, "relocatable = \"sometimes\"\n").unwrap();
    let item = home.path().join("Foo.app");
    std::fs::create_dir(&item).unwrap();

    let output = quickpkg_bin(home.path())
        .args([
            "--config",
            &config.to_string_lossy(),
            "build",
            &item.to_string_lossy(),
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid config"), "got: {stderr}");
}

#[test]
fn cli_build_rejects_conflicting_package_types() {
    let home = tempfile::tempdir().unwrap();
    let output = quickpkg_bin(home.path())
        .args(["build", "Foo.app", "--component", "--distribution"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    let output = quickpkg_bin(home.path())
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("quickpkg"));
}

#[test]
fn cli_man_pages_written() {
    let home = tempfile::tempdir().unwrap();
    let dir = home.path().join("man");

    let output = quickpkg_bin(home.path())
        .args(["man-pages", &dir.to_string_lossy()])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(dir.join("quickpkg.1").is_file());
    assert!(dir.join("quickpkg-build.1").is_file());
}

#[test]
fn cli_doctor_json_is_valid() {
    let home = tempfile::tempdir().unwrap();
    let output = quickpkg_bin(home.path())
        .args(["--json", "doctor"])
        .output()
        .unwrap();

    // Exit status depends on whether the host has the macOS tools.
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("doctor --json must emit JSON ({e}): {stdout}"));
    let checks = json["checks"].as_array().expect("checks array");
    assert!(checks.iter().any(|c| c["name"] == "pkgbuild"));
    assert!(checks.iter().any(|c| c["name"] == "config"));
    assert!(json["healthy"].is_boolean());
}
