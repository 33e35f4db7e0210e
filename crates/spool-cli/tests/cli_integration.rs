//! Integration tests for the `spool` binary.

use std::io::Write;
use std::process::{Command, Output};

fn spool(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_spool"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to launch spool")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Counters
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_countdown_interleaves_counters() {
    let output = spool(&["countdown", "--down", "2", "--up", "6", "--tick-ms", "20"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 8);
    assert_eq!(lines.iter().filter(|l| l.starts_with("Down")).count(), 2);
    let pos = |s: &str| lines.iter().position(|l| l == s).unwrap();
    assert!(pos("Up 3") < pos("Down 1"));
}

#[test]
fn test_callbacks_print_every_step() {
    let output = spool(&["callbacks", "--down", "3", "--up", "4", "--tick-ms", "2"]);
    assert!(output.status.success());

    let lines = stdout_lines(&output);
    for expected in ["Down 3", "Down 2", "Down 1", "Up 0", "Up 3"] {
        assert!(lines.iter().any(|l| l == expected), "missing {expected}: {lines:?}");
    }
    assert_eq!(lines.len(), 7);
}

#[test]
fn test_generate_counts_down() {
    let output = spool(&["generate", "3"]);
    assert!(output.status.success());
    assert_eq!(
        stdout_lines(&output),
        ["Counting down from 3", "3", "2", "1", "Done counting down"]
    );
}

#[test]
fn test_oversized_tick_is_rejected() {
    for command in ["countdown", "callbacks"] {
        let output = spool(&[command, "--tick-ms", "18446744073709551615"]);
        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("tick-ms"));
        assert!(output.stdout.is_empty());
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_config_is_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "max_tasks = 0").unwrap();

    let path = file.path().to_str().unwrap();
    let output = spool(&["--config", path, "generate", "1"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_tasks"));
}

#[test]
fn test_task_limit_from_environment() {
    let output = Command::new(env!("CARGO_BIN_EXE_spool"))
        .args(["countdown", "--down", "1", "--up", "1", "--tick-ms", "1"])
        .env("SPOOL_MAX_TASKS", "1")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("limit"));
}
