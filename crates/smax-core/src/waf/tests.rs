// crates/smax-core/src/waf/tests.rs
// ============================================================================
// Module: WAF Analyzer Tests
// Description: Log parsing, estimator, and mass-balance coverage.
// Purpose: Pin counter precedence and warning behavior on realistic logs.
// Dependencies: smax-core, tempfile
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    reason = "Test-only assertions are permitted."
)]

use std::io::Write as _;

use super::EngineCounters;
use super::LogParser;
use super::MassBalanceStatus;
use super::WafError;
use super::analyze_counters;
use super::analyze_log;
use super::analyze_log_file;
use crate::io::IoBoundaryError;
use crate::io::IoBudget;
use crate::stall::StallParams;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

const SUMMARY_LOG: &str = "\
2026/03/01-10:00:00.000000 7f1c INFO  [db/db_impl/db_impl.cc:1000] ------- DUMPING STATS -------
** DB Stats **
Uptime(secs): 120.0 total, 60.0 interval
Cumulative writes: 2000K writes, 2000K keys, 1900K commit groups, 1.1 writes per commit group, ingest: 2.00 GB, 17.07 MB/s
Cumulative WAL: 2000K writes, 0 syncs, 2000000.00 writes per sync, written: 2.00 GB, 17.07 MB/s
Cumulative stall: 00:00:6.000 H:M:S, 5.0 percent

** Compaction Stats [default] **
Level    Files   Size     Score Read(GB)  Rn(GB) Rnp1(GB) Write(GB) Wnew(GB) Moved(GB) W-Amp Rd(MB/s) Wr(MB/s) Comp(sec) CompMergeCPU(sec) Comp(cnt) Avg(sec) KeyIn KeyDrop
----------------------------------------------------------------------------------------------------------------------------------------------------------------------
  L0      4/0   250.00 MB   1.0      0.0     0.0      0.0       2.0      2.0       0.0   1.0      0.0     95.2     21.51             18.21        32    0.672       0      0
  L1      3/0   190.00 MB   0.8      3.0     2.0      1.0       2.8      1.8       0.0   1.4    102.3     95.4     30.03             27.40         8    3.754     12M    10K
 Sum      7/0   440.00 MB   0.0      3.0     2.0      1.0       4.8      3.8       0.0   2.4     58.1     95.3     51.54             45.61        40    1.288     12M    10K
 Int      0/0     0.00 KB   0.0      0.0     0.0      0.0       0.1      0.1       0.0   1.0      0.0     90.0      1.11              0.90         2    0.555       0      0

Flush(GB): cumulative 2.000, interval 0.100
Cumulative compaction: 4.80 GB write, 40.96 MB/s write, 3.00 GB read, 25.60 MB/s read, 51.5 seconds
";

fn parse(text: &str) -> super::ParsedLog {
    LogParser::new().expect("patterns").parse(text)
}

#[test]
fn mass_balance_holds_for_flush_only_workload() {
    let counters = EngineCounters {
        user_bytes: Some(5.0 * GIB),
        flush_write_bytes: Some(10.0 * GIB),
        ..EngineCounters::default()
    };
    let report = analyze_counters(&counters, &[], 0.10).expect("report");
    assert_eq!(report.estimates.method2, 2.0);
    assert_eq!(report.total_waf, 2.0);
    assert_eq!(report.mass_balance.error_percent, 0.0);
    assert_eq!(report.mass_balance.status, MassBalanceStatus::Ok);
}

#[test]
fn conservative_waf_is_the_largest_method() {
    let counters = EngineCounters {
        user_bytes: Some(GIB),
        flush_write_bytes: Some(GIB),
        compaction_write_bytes: Some(3.0 * GIB),
        wal_bytes: Some(GIB),
        ..EngineCounters::default()
    };
    let report = analyze_counters(&counters, &[], 0.10).expect("report");
    assert_eq!(report.estimates.method1, 4.0);
    assert_eq!(report.estimates.method2, 5.0);
    assert_eq!(report.estimates.method3, 3.0);
    assert_eq!(report.total_waf, 5.0);
}

#[test]
fn mass_balance_mismatch_is_a_warning_not_an_error() {
    let counters = EngineCounters {
        user_bytes: Some(5.0 * GIB),
        flush_write_bytes: Some(10.0 * GIB),
        device_write_bytes: Some(20.0 * GIB),
        ..EngineCounters::default()
    };
    let report = analyze_counters(&counters, &[], 0.10).expect("report");
    assert_eq!(report.mass_balance.status, MassBalanceStatus::Warning);
    assert!((report.mass_balance.error_percent - 50.0).abs() < 1e-9);
    assert_eq!(report.total_waf, 2.0);
}

#[test]
fn missing_user_bytes_is_fatal() {
    let counters = EngineCounters {
        flush_write_bytes: Some(GIB),
        ..EngineCounters::default()
    };
    assert!(matches!(analyze_counters(&counters, &[], 0.10), Err(WafError::MissingUserBytes)));
    let zero = EngineCounters {
        user_bytes: Some(0.0),
        ..counters
    };
    assert!(matches!(analyze_counters(&zero, &[], 0.10), Err(WafError::MissingUserBytes)));
}

#[test]
fn rejects_negative_tolerance() {
    let counters = EngineCounters {
        user_bytes: Some(GIB),
        ..EngineCounters::default()
    };
    assert!(matches!(analyze_counters(&counters, &[], -0.1), Err(WafError::InvalidTolerance(_))));
}

#[test]
fn parses_summary_lines_and_level_table() {
    let parsed = parse(SUMMARY_LOG);
    assert_eq!(parsed.malformed_lines, 0);
    assert_eq!(parsed.levels.len(), 2);
    assert_eq!(parsed.levels[1].level, 1);
    assert_eq!(parsed.levels[1].read_gb, 3.0);
    assert_eq!(parsed.levels[1].write_gb, 2.8);
    assert_eq!(parsed.levels[1].w_amp, 1.4);
    assert_eq!(parsed.levels[0].size_mb, 250.0);
    assert_eq!(parsed.sum_row.map(|row| row.write_gb), Some(4.8));
    assert_eq!(parsed.summary.ingest_bytes, Some(2.0 * GIB));
    assert_eq!(parsed.summary.stall_percent, Some(5.0));
    assert_eq!(parsed.l0_files(), Some(4));
}

#[test]
fn summary_log_produces_balanced_report() {
    let report = analyze_log(&parse(SUMMARY_LOG), 0.10).expect("report");
    assert!((report.estimates.method1 - 2.4).abs() < 1e-9);
    assert!((report.estimates.method2 - 3.4).abs() < 1e-9);
    assert!((report.estimates.method3 - 1.4).abs() < 1e-9);
    assert!((report.total_waf - 3.4).abs() < 1e-9);
    assert!(report.mass_balance.error_percent < 1e-6);
    assert_eq!(report.stall_ratio, Some(0.05));
    assert_eq!(report.l0_files, Some(4));

    let profile = report.level_profile().expect("profile");
    let shares: Vec<f64> = profile.levels().iter().map(|s| s.share_of_total_write).collect();
    assert!((shares[0] - 2.0 / 4.8).abs() < 1e-9);
    assert!((shares[1] - 2.8 / 4.8).abs() < 1e-9);
    assert_eq!(
        report.measured_stall(),
        Some(StallParams::Empirical {
            observed_stall_ratio: 0.05
        })
    );
}

#[test]
fn summary_and_csv_views() {
    let report = analyze_log(&parse(SUMMARY_LOG), 0.10).expect("report");
    let summary = report.summary();
    assert!((summary.user_mb - 2048.0).abs() < 1e-6);
    assert_eq!(summary.per_level_waf.get("L1"), Some(&1.4));
    let json = serde_json::to_value(&summary).expect("json");
    assert!(json.get("total_waf").is_some());
    assert!(json.get("mass_balance_error_percent").is_some());
    assert_eq!(json["per_level_waf"]["L0"], 1.0);

    let csv = report.levels_csv();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines, vec!["level,WAF,files,size_MB", "L0,1.00,4,250.00", "L1,1.40,3,190.00"]);
}

#[test]
fn statistics_dump_overrides_summary_lines() {
    let log = format!(
        "{SUMMARY_LOG}\
rocksdb.bytes.written COUNT : {user}
rocksdb.flush.write.bytes COUNT : {flush}
rocksdb.compact.write.bytes COUNT : {compact}
rocksdb.db.write.micros P50 : 3.2 P95 : 8.1 P99 : 14.0 P100 : 900.0 COUNT : 2000000 SUM : 7000000
rocksdb.wal.bytes COUNT : 0
",
        user = 4 * 1_073_741_824_u64,
        flush = 4 * 1_073_741_824_u64,
        compact = 8 * 1_073_741_824_u64,
    );
    let parsed = parse(&log);
    let counters = parsed.counters();
    assert_eq!(counters.user_bytes, Some(4.0 * GIB));
    assert_eq!(counters.flush_write_bytes, Some(4.0 * GIB));
    assert_eq!(counters.compaction_write_bytes, Some(8.0 * GIB));
    assert_eq!(counters.wal_bytes, Some(0.0));
    let report = analyze_log(&parsed, 0.10).expect("report");
    assert_eq!(report.estimates.method1, 3.0);
}

#[test]
fn last_table_dump_wins() {
    let second = "\
** Compaction Stats [default] **
Level    Files   Size     Score Read(GB)  Rn(GB) Rnp1(GB) Write(GB) Wnew(GB) Moved(GB) W-Amp
------------------------------------------------------------------------------------------
  L0      9/0   500.00 MB   2.2      0.0     0.0      0.0       3.0      3.0       0.0   1.0
";
    let parsed = parse(&format!("{SUMMARY_LOG}{second}"));
    assert_eq!(parsed.levels.len(), 1);
    assert_eq!(parsed.l0_files(), Some(9));
    assert!(parsed.sum_row.is_none());
}

#[test]
fn malformed_lines_are_counted_and_skipped() {
    let log = "\
Cumulative writes: 10 writes, ingest: lots GB, 1 MB/s
** Compaction Stats [default] **
Level    Files   Size     Score Read(GB)  Rn(GB) Rnp1(GB) Write(GB) Wnew(GB) Moved(GB) W-Amp
  L0      x/0   1.00 MB   1.0      0.0     0.0      0.0       1.0      1.0       0.0   1.0
  L1      1/0   1.00 MB   1.0      0.0     0.0      0.0       1.0      1.0       0.0   1.0
";
    let parsed = parse(log);
    assert_eq!(parsed.malformed_lines, 2);
    assert_eq!(parsed.levels.len(), 1);
    assert!(parsed.summary.ingest_bytes.is_none());
}

#[test]
fn corrupted_counter_value_is_malformed() {
    let log = "\
rocksdb.bytes.written COUNT : 12abc
rocksdb.flush.write.bytes COUNT : 4096
";
    let parsed = parse(log);
    assert_eq!(parsed.malformed_lines, 1);
    assert!(parsed.stats.user_bytes.is_none());
    assert_eq!(parsed.stats.flush_write_bytes, Some(4096.0));
}

#[test]
fn analyzes_log_file_within_budget() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(SUMMARY_LOG.as_bytes()).expect("write");
    let report = analyze_log_file(file.path(), &IoBudget::default(), 0.10).expect("report");
    assert!((report.total_waf - 3.4).abs() < 1e-9);

    let tight = IoBudget::default().with_max_file_bytes(16);
    assert!(matches!(
        analyze_log_file(file.path(), &tight, 0.10),
        Err(WafError::Io(IoBoundaryError::TooLarge { .. }))
    ));
}
