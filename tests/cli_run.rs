//! CLI integration tests for the run and bench modes.

use std::process::Command;

fn value_of<'a>(stdout: &'a str, key: &str) -> &'a str {
    let prefix = format!("{key}=");
    stdout
        .lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .unwrap_or_else(|| panic!("{key} line missing"))
        .trim()
}

#[test]
fn run_cli_drains_and_balances() {
    let bin = env!("CARGO_BIN_EXE_queue_leveling");
    let output = Command::new(bin)
        .args([
            "--producers",
            "2",
            "--consumers",
            "2",
            "--duration-ms",
            "300",
            "--produce-ms",
            "0,10",
            "--process-ms",
            "0,10",
            "--status-ms",
            "50",
        ])
        .output()
        .expect("failed to run binary");

    assert!(
        output.status.success(),
        "run exited with non-zero status: {:?}",
        output.status
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("RUN SUMMARY"), "run summary missing from output");
    assert_eq!(value_of(&stdout, "balanced"), "true");
    assert_eq!(value_of(&stdout, "in_flight"), "0");
    assert_eq!(value_of(&stdout, "sentinels_inserted"), "2");
    assert_eq!(value_of(&stdout, "leftover"), "0");
    assert_eq!(value_of(&stdout, "degraded"), "false");
    assert_eq!(value_of(&stdout, "produced"), value_of(&stdout, "processed"));
    assert!(stdout.contains("REPORT"));
}

#[test]
fn relay_run_prints_json() {
    let bin = env!("CARGO_BIN_EXE_queue_leveling");
    let output = Command::new(bin)
        .args([
            "run",
            "--consumers",
            "3",
            "--duration-ms",
            "200",
            "--produce-ms",
            "0,5",
            "--process-ms",
            "0,5",
            "--relay",
            "--json",
            "--no-report",
        ])
        .output()
        .expect("failed to run binary");
    assert!(output.status.success(), "status: {:?}", output.status);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"sentinels_inserted\": 1"));
    assert!(stdout.contains("\"relays\": 2"));
    assert!(stdout.contains("\"degraded\": false"));
    assert!(!stdout.contains("REPORT"));
}

#[test]
fn invalid_config_fails() {
    let bin = env!("CARGO_BIN_EXE_queue_leveling");
    let output = Command::new(bin)
        .args(["--consumers", "0", "--duration-ms", "100"])
        .output()
        .expect("failed to run binary");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("consumers must be > 0"), "stderr: {stderr}");
}

#[test]
fn bench_cli_prints_csv() {
    let bin = env!("CARGO_BIN_EXE_queue_leveling");
    let output = Command::new(bin)
        .args([
            "bench",
            "--producers",
            "1",
            "--consumers",
            "1,2",
            "--capacities",
            "0",
            "--duration-ms",
            "50",
        ])
        .output()
        .expect("failed to run binary");
    assert!(output.status.success(), "status: {:?}", output.status);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    let header = lines.next().expect("csv header");
    assert!(header.starts_with("producers,consumers,capacity"));
    assert_eq!(lines.filter(|line| !line.is_empty()).count(), 2);
}
