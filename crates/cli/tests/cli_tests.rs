//! CLI integration tests
//!
//! These drive the built binary directly. Nothing here needs a cluster:
//! argument errors, input validation, and configuration errors all fail
//! before the first kubectl invocation.

use std::io::Write;
use std::process::Command;

fn smart() -> Command {
    Command::new(env!("CARGO_BIN_EXE_kubectl-smart"))
}

#[test]
fn help_lists_the_three_commands() {
    let output = smart().arg("--help").output().expect("failed to run binary");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "help should succeed");
    assert!(stdout.contains("diag"), "should show diag command");
    assert!(stdout.contains("graph"), "should show graph command");
    assert!(stdout.contains("top"), "should show top command");
    assert!(stdout.contains("--watch"), "should show watch flag");
    assert!(stdout.contains("--debug"), "should show debug flag");
}

#[test]
fn version_prints_binary_name() {
    let output = smart().arg("--version").output().expect("failed to run binary");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("kubectl-smart"));
}

#[test]
fn diag_help_shows_namespace_and_output() {
    let output = smart()
        .args(["diag", "--help"])
        .output()
        .expect("failed to run binary");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--namespace"));
    assert!(stdout.contains("--context"));
    assert!(stdout.contains("--output"));
}

#[test]
fn graph_help_shows_directions() {
    let output = smart()
        .args(["graph", "--help"])
        .output()
        .expect("failed to run binary");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--upstream"));
    assert!(stdout.contains("--downstream"));
}

#[test]
fn top_help_shows_horizon() {
    let output = smart()
        .args(["top", "--help"])
        .output()
        .expect("failed to run binary");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--horizon"));
}

#[test]
fn unknown_command_fails() {
    let output = smart()
        .arg("explode")
        .output()
        .expect("failed to run binary");
    assert!(!output.status.success());
}

#[test]
fn missing_arguments_fail() {
    let output = smart().arg("diag").output().expect("failed to run binary");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("required") || stderr.contains("error"));
}

#[test]
fn invalid_resource_name_exits_2_before_any_cluster_call() {
    let output = smart()
        .args(["diag", "pod", "bad;name"])
        .env("KUBECTL_SMART_KUBECTL", "/nonexistent/kubectl")
        .output()
        .expect("failed to run binary");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid input"), "stderr was: {stderr}");
}

#[test]
fn out_of_range_horizon_exits_2() {
    for horizon in ["0", "169"] {
        let output = smart()
            .args(["top", "production", "--horizon", horizon])
            .env("KUBECTL_SMART_KUBECTL", "/nonexistent/kubectl")
            .output()
            .expect("failed to run binary");
        assert_eq!(output.status.code(), Some(2), "horizon {horizon}");
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("horizon"), "stderr was: {stderr}");
    }
}

#[test]
fn duplicate_weight_key_is_fatal_before_any_cluster_call() {
    let mut weights = tempfile::NamedTempFile::new().unwrap();
    writeln!(weights, "BackOff = 55\nBackOff = 60").unwrap();

    let output = smart()
        .args(["diag", "pod", "some-pod"])
        .env("KUBECTL_SMART_KUBECTL", "/nonexistent/kubectl")
        .env("KUBECTL_SMART_WEIGHTS_FILE", weights.path())
        .output()
        .expect("failed to run binary");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("configuration error"),
        "stderr was: {stderr}"
    );
}

#[test]
fn invalid_output_format_is_rejected_by_the_parser() {
    let output = smart()
        .args(["diag", "pod", "web", "-o", "yaml"])
        .output()
        .expect("failed to run binary");
    assert!(!output.status.success());
}
