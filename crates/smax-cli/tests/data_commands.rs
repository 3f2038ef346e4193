// crates/smax-cli/tests/data_commands.rs
// ============================================================================
// Module: CLI Data Command Tests
// Description: Integration tests for envelope and WAF commands.
// Purpose: Exercise file ingestion end to end through the shipped binary.
// Dependencies: smax binary, serde_json, tempfile
// ============================================================================
//! ## Overview
//! Builds an envelope from synthetic fio results, queries and consumes it,
//! and analyzes engine logs with balanced and unbalanced byte counters.

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
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use serde_json::Value;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const ENGINE_LOG: &str = "\
** DB Stats **
Uptime(secs): 120.0 total, 60.0 interval
Cumulative writes: 2000K writes, 2000K keys, 1900K commit groups, 1.1 writes per commit group, ingest: 2.00 GB, 17.07 MB/s
Cumulative WAL: 2000K writes, 0 syncs, 2000000.00 writes per sync, written: 2.00 GB, 17.07 MB/s
Cumulative stall: 00:00:6.000 H:M:S, 5.0 percent

** Compaction Stats [default] **
Level    Files   Size     Score Read(GB)  Rn(GB) Rnp1(GB) Write(GB) Wnew(GB) Moved(GB) W-Amp
------------------------------------------------------------------------------------------
  L0      4/0   250.00 MB   1.0      0.0     0.0      0.0       2.0      2.0       0.0   1.0
  L1      3/0   190.00 MB   0.8      3.0     2.0      1.0       2.8      1.8       0.0   1.4
 Sum      7/0   440.00 MB   0.0      3.0     2.0      1.0       4.8      3.8       0.0   2.4

Flush(GB): cumulative 2.000, interval 0.100
Cumulative compaction: 4.80 GB write, 40.96 MB/s write, 3.00 GB read, 25.60 MB/s read, 51.5 seconds
";

/// Statistics that disagree with the level table's device writes.
const SKEWED_STATS: &str = "\
rocksdb.flush.write.bytes COUNT : 1073741824
rocksdb.compact.write.bytes COUNT : 1073741824
";

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

fn arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn write_fio_result(dir: &Path, name: &str, write_kib: f64, read_kib: f64) {
    let body = serde_json::json!({
        "jobs": [{ "read": { "bw": read_kib }, "write": { "bw": write_kib } }]
    });
    fs::write(dir.join(name), body.to_string()).expect("write fio result");
}

/// Writes a 2x2x1x1 grid: rho {0, 100}, iodepth {1, 8}, numjobs 1, bs 4.
fn write_fio_grid(dir: &Path) {
    write_fio_result(dir, "result_0_1_1_4.json", 100.0 * 1024.0, 0.0);
    write_fio_result(dir, "result_0_8_1_4.json", 200.0 * 1024.0, 0.0);
    write_fio_result(dir, "result_100_1_1_4.json", 0.0, 300.0 * 1024.0);
    write_fio_result(dir, "result_100_8_1_4.json", 0.0, 500.0 * 1024.0);
    fs::write(dir.join("result_50_1_1_4.json"), "{ not fio").expect("write broken result");
}

fn build_envelope(root: &Path) -> PathBuf {
    let results = root.join("results");
    fs::create_dir_all(&results).expect("results dir");
    write_fio_grid(&results);
    let out = root.join("envelope.json");
    let output = run(&[
        "envelope", "build", "--dir", &arg(&results), "--out", &arg(&out), "--device", "nvme0",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    out
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Verifies build writes both documents and counts the broken file.
#[test]
fn envelope_build_writes_json_and_csv() {
    let dir = tempfile::tempdir().expect("tempdir");
    let results = dir.path().join("results");
    fs::create_dir_all(&results).expect("results dir");
    write_fio_grid(&results);
    let out = dir.path().join("envelope.json");
    let csv = dir.path().join("envelope.csv");

    let output = run(&[
        "--format",
        "json",
        "envelope",
        "build",
        "--dir",
        &arg(&results),
        "--out",
        &arg(&out),
        "--csv",
        &arg(&csv),
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let metadata = stdout_json(&output);
    assert_eq!(metadata["parsed_count"], 4);
    assert_eq!(metadata["failed_count"], 1);

    let document: Value = serde_json::from_str(&fs::read_to_string(&out).expect("read envelope"))
        .expect("envelope json");
    assert_eq!(document["rho_r_axis"], serde_json::json!([0.0, 100.0]));
    assert_eq!(document["iodepth_axis"], serde_json::json!([1.0, 8.0]));
    assert!(document["bandwidth_grid"].is_array());

    let csv_text = fs::read_to_string(&csv).expect("read csv");
    assert_eq!(csv_text.lines().count(), 5);
}

/// Verifies interpolation at the grid centre and clamping past the bounds.
#[test]
fn envelope_query_interpolates_and_clamps() {
    let dir = tempfile::tempdir().expect("tempdir");
    let envelope = arg(&build_envelope(dir.path()));

    let output = run(&[
        "--format", "json", "envelope", "query", "--envelope", &envelope, "--rho", "50",
        "--iodepth", "4.5", "--numjobs", "1", "--bs", "4",
    ]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert!((json["value"].as_f64().expect("value") - 275.0).abs() < 1e-9);
    assert_eq!(json["status"]["kind"], "complete");
    assert_eq!(json["clamped"], false);

    let output = run(&[
        "--format", "json", "envelope", "query", "--envelope", &envelope, "--rho", "0",
        "--iodepth", "64", "--numjobs", "1", "--bs", "4",
    ]);
    let json = stdout_json(&output);
    assert_eq!(json["value"].as_f64(), Some(200.0));
    assert_eq!(json["clamped"], true);
}

/// Verifies a missing results directory is malformed input.
#[test]
fn envelope_build_fails_without_results() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = run(&[
        "envelope",
        "build",
        "--dir",
        &arg(&dir.path().join("absent")),
        "--out",
        &arg(&dir.path().join("envelope.json")),
    ]);
    assert_eq!(output.status.code(), Some(1));
}

/// Verifies `bound` derives its device from an envelope.
#[test]
fn bound_reads_device_from_envelope() {
    let dir = tempfile::tempdir().expect("tempdir");
    let envelope = arg(&build_envelope(dir.path()));
    let output = run(&[
        "--format", "json", "bound", "--cr", "1", "--wa", "1", "--envelope", &envelope,
        "--iodepth", "4.5", "--numjobs", "1", "--bs", "4",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["device_source"], "envelope");
    assert!((json["inputs"]["device"]["b_w"].as_f64().expect("b_w") - 150.0).abs() < 1e-9);
    assert!((json["inputs"]["device"]["b_r"].as_f64().expect("b_r") - 400.0).abs() < 1e-9);
    assert!((json["result"]["s_max"].as_f64().expect("s_max") - 150.0).abs() < 1e-9);
}

// ============================================================================
// SECTION: WAF
// ============================================================================

/// Verifies a balanced log exits 0 and writes the level CSV.
#[test]
fn waf_analyze_balanced_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("LOG");
    fs::write(&log, ENGINE_LOG).expect("write log");
    let csv = dir.path().join("levels.csv");

    let output = run(&["--format", "json", "waf", "analyze", "--log", &arg(&log), "--csv", &arg(&csv)]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert!((json["total_waf"].as_f64().expect("total_waf") - 3.4).abs() < 1e-9);
    assert!(json["mass_balance_error_percent"].as_f64().expect("error") < 1e-6);
    assert!((json["per_level_waf"]["L1"].as_f64().expect("L1") - 1.4).abs() < 1e-9);

    let csv_text = fs::read_to_string(&csv).expect("read csv");
    assert_eq!(csv_text.lines().next(), Some("level,WAF,files,size_MB"));
    assert!(csv_text.contains("L0,1.00,4,250.00"));
}

/// Verifies a mass-balance mismatch still reports but exits 2.
#[test]
fn waf_analyze_mismatch_exits_two() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("LOG");
    fs::write(&log, format!("{ENGINE_LOG}{SKEWED_STATS}")).expect("write log");

    let output = run(&["waf", "analyze", "--log", &arg(&log)]);
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("WARNING"));
    assert!(stdout.contains("total_waf"));
}

/// Verifies a log without user bytes is malformed input.
#[test]
fn waf_analyze_requires_user_bytes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("LOG");
    fs::write(&log, "Flush(GB): cumulative 2.000, interval 0.100\n").expect("write log");
    let output = run(&["waf", "analyze", "--log", &arg(&log)]);
    assert_eq!(output.status.code(), Some(1));
}

/// Verifies `predict` takes WA, level shares, and stall ratio from a log.
#[test]
fn predict_consumes_engine_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("LOG");
    fs::write(&log, ENGINE_LOG).expect("write log");

    let output = run(&[
        "--format", "json", "predict", "--cr", "1", "--b-w", "1000", "--b-r", "2000", "--b-eff",
        "1500", "--log", &arg(&log),
    ]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert!((json["inputs"]["wa"].as_f64().expect("wa") - 3.4).abs() < 1e-9);
    assert_eq!(json["prediction"]["stall"]["mode"], "empirical");
    assert!((json["prediction"]["stall"]["p_stall"].as_f64().expect("p") - 0.05).abs() < 1e-9);
    assert!(json["prediction"]["level_bound"]["per_level"].is_array());
    assert_eq!(json["prediction"]["level_bound"]["assumption"], "proportional_share_unverified");
    let s_feasible = json["prediction"]["s_feasible"].as_f64().expect("s_feasible");
    let s_final = json["prediction"]["s_final"].as_f64().expect("s_final");
    assert!((s_final - s_feasible * 0.95).abs() < 1e-9);
}

/// Verifies the log's WAF is reported as the WA source only when it was used.
#[test]
fn predict_reports_log_wa_source_only_when_used() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("LOG");
    fs::write(&log, ENGINE_LOG).expect("write log");
    let base = ["predict", "--cr", "1", "--b-w", "1000", "--b-r", "2000", "--b-eff", "1500"];

    let mut args = base.to_vec();
    let log_arg = arg(&log);
    args.extend(["--log", log_arg.as_str()]);
    let output = run(&args);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("wa_source"));

    args.extend(["--wa", "2"]);
    let output = run(&args);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("wa_source"));
    assert!(stdout.contains("s_final"));
}
