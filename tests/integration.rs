//! Integration tests for the shm-worker CLI.
//!
//! These run the real binary, which forks a worker process per run.

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a command for the shm-worker binary with a clean environment.
fn shm_worker() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("shm-worker").unwrap();
    for var in [
        "SHM_WORKER_LAUNCH_TIMEOUT",
        "SHM_WORKER_CAPACITY",
        "SHM_WORKER_POLL_INTERVAL_MS",
        "SHM_WORKER_VERBOSE",
        "SHM_WORKER_LOG",
        "SHM_WORKER_LOG_LEVEL",
        "SHM_WORKER_LOG_FORMAT",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays() {
    shm_worker()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("worker process"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_version_displays() {
    shm_worker()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("shm-worker"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_run_help() {
    shm_worker()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--shape"))
        .stdout(predicate::str::contains("--period-ms"))
        .stdout(predicate::str::contains("--count"))
        .stdout(predicate::str::contains("--launch-timeout"));
}

// ============================================================================
// Run Command Tests
// ============================================================================

#[test]
fn test_run_prints_doubled_output() {
    let output = shm_worker()
        .args(["run", "--count", "2", "--period-ms", "10"])
        .timeout(std::time::Duration::from_secs(30))
        .output()
        .expect("Failed to run shm-worker");

    assert!(output.status.success(), "run failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("Input:").count(), 2);
    assert_eq!(stdout.matches("Output (2 x Input):").count(), 2);

    // Each printed output is twice the input printed just before it.
    let numbers = |line: &str| -> Vec<i64> {
        line.split(|c: char| !c.is_ascii_digit() && c != '-')
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().unwrap())
            .collect()
    };
    let lines: Vec<&str> = stdout.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if *line == "Input:" {
            let input = numbers(lines[i + 1]);
            assert_eq!(lines[i + 2], "Output (2 x Input):");
            let output = numbers(lines[i + 3]);
            assert_eq!(input.len(), 3);
            let doubled: Vec<i64> = input.iter().map(|x| x * 2).collect();
            assert_eq!(output, doubled);
        }
    }
}

#[test]
fn test_run_with_custom_shape() {
    shm_worker()
        .args(["run", "--count", "1", "--period-ms", "0", "--shape", "2x2"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("Output (2 x Input):"))
        .stdout(predicate::str::contains("[["));
}

#[test]
fn test_run_rejects_bad_shape() {
    shm_worker()
        .args(["run", "--shape", "1xfoo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid dimension"));
}

#[test]
fn test_run_rejects_negative_launch_timeout() {
    shm_worker()
        .args(["run", "--count", "1", "--launch-timeout=-1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error"))
        .stderr(predicate::str::contains("--launch-timeout"));
}

#[test]
fn test_run_accepts_huge_launch_timeout() {
    shm_worker()
        .args(["run", "--count", "1", "--period-ms", "0", "--launch-timeout", "1e15"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("Output (2 x Input):"));
}

#[test]
fn test_run_count_zero_exits_cleanly() {
    shm_worker()
        .args(["run", "--count", "0"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("Input:").not());
}
