// crates/smax-cli/tests/model_commands.rs
// ============================================================================
// Module: CLI Model Command Tests
// Description: Integration tests for the bound, predict, and config commands.
// Purpose: Pin exit codes and output shape of the shipped binary.
// Dependencies: smax binary, serde_json, tempfile
// ============================================================================
//! ## Overview
//! Runs the `smax` binary against reference workloads and checks the
//! reported bottleneck, the `inf` rendering of unbounded rates, and the
//! exit code for malformed input.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use serde_json::Value;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn smax_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_smax"))
}

fn run(args: &[&str]) -> Output {
    Command::new(smax_bin())
        .args(args)
        .env_remove("SMAX_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("run smax")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

const MEASURED_DEVICE: [&str; 10] =
    ["--cr", "0.54", "--wa", "2.87", "--b-w", "1484", "--b-r", "2368", "--b-eff", "2231"];

// ============================================================================
// SECTION: Bound
// ============================================================================

/// Verifies the measured reference device is bound by the mixed bandwidth.
#[test]
fn bound_reports_mixed_bottleneck_as_json() {
    let mut args = vec!["bound", "--format", "json"];
    args.extend(MEASURED_DEVICE);
    let output = run(&args);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let json = stdout_json(&output);
    let s_mix = json["result"]["s_mix"].as_f64().expect("s_mix");
    assert!((s_mix - 871.6).abs() < 0.5);
    assert_eq!(json["result"]["s_max"].as_f64(), Some(s_mix));
    assert_eq!(json["result"]["bottleneck_set"], serde_json::json!(["mixed"]));
    assert_eq!(json["device_source"], "explicit");
    assert_eq!(json["kv_size_bytes"], 1024);
    let ops = json["s_max_ops_per_sec"].as_f64().expect("ops");
    assert!((ops - s_mix * 1024.0).abs() < 1.0);
}

/// Verifies text output names the bottleneck.
#[test]
fn bound_text_output_names_bottleneck() {
    let mut args = vec!["bound"];
    args.extend(MEASURED_DEVICE);
    let output = run(&args);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bottleneck"));
    assert!(stdout.contains("mixed"));
    assert!(stdout.contains("s_max"));
}

/// Verifies unit amplification is write-bound and an unused read path is `inf`.
#[test]
fn bound_unit_amplification_is_write_bound() {
    let output = run(&[
        "bound", "--format", "json", "--cr", "1", "--wa", "1", "--b-w", "100", "--b-r", "400",
        "--b-eff", "500",
    ]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["result"]["s_max"].as_f64(), Some(100.0));
    assert_eq!(json["result"]["s_read"], "inf");
    assert_eq!(json["result"]["bottleneck_set"], serde_json::json!(["write"]));
}

/// Verifies invalid parameters exit with code 1 and a message on stderr.
#[test]
fn bound_rejects_invalid_compression_ratio() {
    let output = run(&[
        "bound", "--cr", "1.5", "--wa", "2", "--b-w", "100", "--b-r", "100", "--b-eff", "100",
    ]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"));
    assert!(stderr.contains("cr"));
    assert!(output.stdout.is_empty());
}

/// Verifies a missing device is malformed input.
#[test]
fn bound_without_device_fails() {
    let output = run(&["bound", "--cr", "0.5", "--wa", "2"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("device bandwidths required"));
}

/// Verifies the read weight flag removes the read term.
#[test]
fn bound_zero_eta_uses_write_demand_only() {
    let output = run(&[
        "bound", "--format", "json", "--cr", "0.5", "--wa", "3", "--eta", "0", "--b-w", "1000",
        "--b-r", "1000", "--b-eff", "300",
    ]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["result"]["s_mix"].as_f64(), Some(200.0));
}

// ============================================================================
// SECTION: Predict
// ============================================================================

/// Verifies the stall discount applies to the feasible rate.
#[test]
fn predict_applies_empirical_stall() {
    let output = run(&[
        "predict", "--format", "json", "--cr", "1", "--wa", "1", "--b-w", "100", "--b-r", "400",
        "--b-eff", "500", "--stall-mode", "empirical", "--stall-percent", "25",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    let prediction = &json["prediction"];
    assert_eq!(prediction["s_feasible"].as_f64(), Some(100.0));
    assert_eq!(prediction["s_final"].as_f64(), Some(75.0));
    assert_eq!(prediction["stall"]["mode"], "empirical");
    assert!(json["waf"].is_null());
}

/// Verifies empirical mode without a measurement is malformed input.
#[test]
fn predict_empirical_without_measurement_fails() {
    let output = run(&[
        "predict", "--cr", "1", "--wa", "1", "--b-w", "100", "--b-r", "400", "--b-eff", "500",
        "--stall-mode", "empirical",
    ]);
    assert_eq!(output.status.code(), Some(1));
}

/// Verifies the logistic mode is labelled as a heuristic in text output.
#[test]
fn predict_text_labels_logistic_stall() {
    let output = run(&[
        "predict", "--cr", "1", "--wa", "1", "--b-w", "100", "--b-r", "400", "--b-eff", "500",
        "--stall-mode", "logistic", "--l0-files", "20",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("logistic (heuristic)"));
    assert!(stdout.contains("s_final"));
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Verifies the printed example validates and drives `bound`.
#[test]
fn config_example_round_trips_through_validate() {
    let output = run(&["config", "example"]);
    assert!(output.status.success());
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("smax.toml");
    fs::write(&path, &output.stdout).expect("write config");
    let path_arg = path.to_string_lossy().to_string();

    let output = run(&["--config", &path_arg, "config", "validate"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("config ok"));

    let output = run(&["--config", &path_arg, "--format", "json", "bound"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["result"]["bottleneck_set"], serde_json::json!(["mixed"]));
}

/// Verifies an invalid config file fails every command with code 1.
#[test]
fn invalid_config_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("smax.toml");
    fs::write(&path, "[model]\ncr = 2.0\n").expect("write config");
    let path_arg = path.to_string_lossy().to_string();
    let output = run(&["--config", &path_arg, "config", "validate"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("model.cr"));
}
