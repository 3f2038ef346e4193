// crates/smax-core/src/waf/analysis.rs
// ============================================================================
// Module: WAF Estimation
// Description: Write-amplification estimators and the mass-balance check.
// Purpose: Turn engine byte counters into WA inputs and per-level statistics.
// Dependencies: serde, tracing, crate::levels, crate::stall
// ============================================================================

//! ## Overview
//! Three estimators are reported side by side so they can cross-check each
//! other:
//! - `method1 = (compaction_write + flush_write) / user`
//! - `method2 = total_write / user` (flush + compaction + WAL)
//! - `method3 = compaction_write / user`
//!
//! The conservative total WAF is the largest of the three. The mass balance
//! compares device writes with `total_waf * user`; a discrepancy beyond the
//! tolerance is a warning, never an error, because logs are routinely
//! truncated or rotated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;
use tracing::info;
use tracing::warn;

use super::WafError;
use super::log::EngineCounters;
use super::log::GIB;
use super::log::LevelRow;
use super::log::ParsedLog;
use crate::levels::CompactionLevelStat;
use crate::levels::LevelError;
use crate::levels::LevelProfile;
use crate::stall::StallParams;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default mass-balance tolerance (10%).
pub const DEFAULT_MASS_BALANCE_TOLERANCE: f64 = 0.10;
/// Bytes per MiB.
const MIB: f64 = 1_048_576.0;
/// Header row of the per-level CSV export.
pub const LEVELS_CSV_HEADER: &str = "level,WAF,files,size_MB";

// ============================================================================
// SECTION: Report Types
// ============================================================================

/// Counters after defaults are applied, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedCounters {
    /// Bytes written by the application.
    pub user_bytes: f64,
    /// Flush writes.
    pub flush_write_bytes: f64,
    /// Compaction writes, excluding flushes.
    pub compaction_write_bytes: f64,
    /// Compaction reads.
    pub compaction_read_bytes: f64,
    /// WAL writes.
    pub wal_bytes: f64,
    /// Flush + compaction + WAL writes.
    pub total_write_bytes: f64,
    /// Device-level writes used for the mass balance.
    pub device_write_bytes: f64,
}

/// The three WAF estimators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WafEstimates {
    /// `(compaction_write + flush_write) / user`.
    pub method1: f64,
    /// `total_write / user`.
    pub method2: f64,
    /// `compaction_write / user`.
    pub method3: f64,
}

impl WafEstimates {
    /// The largest estimator, used as the conservative WAF.
    #[must_use]
    pub fn conservative(&self) -> f64 {
        self.method1.max(self.method2).max(self.method3)
    }
}

/// Outcome class of the mass-balance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MassBalanceStatus {
    /// Within tolerance.
    Ok,
    /// Beyond tolerance; counters are suspect but still reported.
    Warning,
}

/// Device writes versus `total_waf * user_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MassBalanceCheck {
    /// Observed device writes.
    pub device_write_bytes: f64,
    /// Writes implied by the WAF estimate.
    pub expected_write_bytes: f64,
    /// Relative discrepancy against device writes, in percent.
    pub error_percent: f64,
    /// Configured tolerance, in percent.
    pub tolerance_percent: f64,
    /// Check outcome.
    pub status: MassBalanceStatus,
}

/// Complete WAF analysis of one log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WafReport {
    /// Resolved byte counters.
    pub counters: ResolvedCounters,
    /// Estimators.
    pub estimates: WafEstimates,
    /// Conservative total WAF.
    pub total_waf: f64,
    /// Mass-balance result.
    pub mass_balance: MassBalanceCheck,
    /// Per-level statistics with shares of total level writes.
    pub levels: Vec<CompactionLevelStat>,
    /// Measured stall-time ratio, when the log carries one.
    pub stall_ratio: Option<f64>,
    /// L0 file count from the level table.
    pub l0_files: Option<u64>,
    /// Recognised lines skipped as malformed.
    pub malformed_lines: usize,
}

/// Compact JSON summary of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WafSummary {
    /// Conservative total WAF.
    pub total_waf: f64,
    /// Total writes in MiB.
    pub total_write_mb: f64,
    /// User writes in MiB.
    pub user_mb: f64,
    /// Mass-balance discrepancy in percent.
    pub mass_balance_error_percent: f64,
    /// Mass-balance outcome.
    pub mass_balance_status: MassBalanceStatus,
    /// Per-level WAF keyed `L0`, `L1`, ...
    pub per_level_waf: BTreeMap<String, f64>,
    /// All three estimators.
    pub methods: WafEstimates,
}

// ============================================================================
// SECTION: Analysis
// ============================================================================

/// Analyzes a parsed log.
///
/// # Errors
///
/// Returns [`WafError::MissingUserBytes`] when no user byte counter exists and
/// [`WafError::InvalidTolerance`] for a bad tolerance.
pub fn analyze_log(parsed: &ParsedLog, tolerance: f64) -> Result<WafReport, WafError> {
    let mut report = analyze_counters(&parsed.counters(), &parsed.levels, tolerance)?;
    report.l0_files = parsed.l0_files();
    report.malformed_lines = parsed.malformed_lines;
    Ok(report)
}

/// Analyzes resolved counters and level rows.
///
/// # Errors
///
/// Returns [`WafError::MissingUserBytes`] when user bytes are absent or zero
/// and [`WafError::InvalidTolerance`] for a bad tolerance.
pub fn analyze_counters(
    counters: &EngineCounters,
    level_rows: &[LevelRow],
    tolerance: f64,
) -> Result<WafReport, WafError> {
    if !(tolerance.is_finite() && tolerance >= 0.0) {
        return Err(WafError::InvalidTolerance(tolerance));
    }
    let user_bytes = counters
        .user_bytes
        .filter(|bytes| bytes.is_finite() && *bytes > 0.0)
        .ok_or(WafError::MissingUserBytes)?;
    let non_negative =
        |value: Option<f64>| value.filter(|v| v.is_finite()).unwrap_or(0.0).max(0.0);
    let flush = non_negative(counters.flush_write_bytes);
    let compaction = non_negative(counters.compaction_write_bytes);
    let wal = non_negative(counters.wal_bytes);
    let total_write = flush + compaction + wal;
    let device_write = counters
        .device_write_bytes
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map_or(total_write, |bytes| bytes + wal);

    let estimates = WafEstimates {
        method1: (compaction + flush) / user_bytes,
        method2: total_write / user_bytes,
        method3: compaction / user_bytes,
    };
    let total_waf = estimates.conservative();
    let mass_balance = mass_balance(device_write, total_waf * user_bytes, tolerance);
    if mass_balance.status == MassBalanceStatus::Warning {
        warn!(
            error_percent = mass_balance.error_percent,
            tolerance_percent = mass_balance.tolerance_percent,
            "mass balance mismatch; log may be truncated or rotated"
        );
    }
    info!(
        total_waf,
        method1 = estimates.method1,
        method2 = estimates.method2,
        method3 = estimates.method3,
        "waf estimated"
    );

    Ok(WafReport {
        counters: ResolvedCounters {
            user_bytes,
            flush_write_bytes: flush,
            compaction_write_bytes: compaction,
            compaction_read_bytes: non_negative(counters.compaction_read_bytes),
            wal_bytes: wal,
            total_write_bytes: total_write,
            device_write_bytes: device_write,
        },
        estimates,
        total_waf,
        mass_balance,
        levels: level_stats(level_rows),
        stall_ratio: counters.stall_ratio,
        l0_files: None,
        malformed_lines: 0,
    })
}

/// Compares device writes with the writes implied by the WAF.
fn mass_balance(device: f64, expected: f64, tolerance: f64) -> MassBalanceCheck {
    let error_percent = if device > 0.0 {
        100.0 * (device - expected).abs() / device
    } else if expected > 0.0 {
        100.0
    } else {
        0.0
    };
    let tolerance_percent = tolerance * 100.0;
    MassBalanceCheck {
        device_write_bytes: device,
        expected_write_bytes: expected,
        error_percent,
        tolerance_percent,
        status: if error_percent > tolerance_percent {
            MassBalanceStatus::Warning
        } else {
            MassBalanceStatus::Ok
        },
    }
}

/// Converts table rows into level statistics with write shares.
fn level_stats(rows: &[LevelRow]) -> Vec<CompactionLevelStat> {
    let stats: Vec<CompactionLevelStat> = rows
        .iter()
        .map(|row| CompactionLevelStat {
            level: row.level,
            files: row.files,
            size_mb: row.size_mb,
            read_bytes: row.read_gb * GIB,
            write_bytes: row.write_gb * GIB,
            write_amplification: row.w_amp,
            share_of_total_write: 0.0,
        })
        .collect();
    match LevelProfile::from_write_bytes(stats.clone()) {
        Ok(profile) => profile.levels().to_vec(),
        Err(_) => stats,
    }
}

// ============================================================================
// SECTION: Report Views
// ============================================================================

impl WafReport {
    /// Validated level profile for the level constraint model.
    ///
    /// # Errors
    ///
    /// Returns [`LevelError`] when the log carried no usable level table.
    pub fn level_profile(&self) -> Result<LevelProfile, LevelError> {
        LevelProfile::new(self.levels.clone())
    }

    /// Stall parameters backed by the measured stall ratio, when present.
    #[must_use]
    pub fn measured_stall(&self) -> Option<StallParams> {
        self.stall_ratio.map(|observed_stall_ratio| StallParams::Empirical {
            observed_stall_ratio,
        })
    }

    /// JSON summary view.
    #[must_use]
    pub fn summary(&self) -> WafSummary {
        WafSummary {
            total_waf: self.total_waf,
            total_write_mb: self.counters.total_write_bytes / MIB,
            user_mb: self.counters.user_bytes / MIB,
            mass_balance_error_percent: self.mass_balance.error_percent,
            mass_balance_status: self.mass_balance.status,
            per_level_waf: self
                .levels
                .iter()
                .map(|stat| (format!("L{}", stat.level), stat.write_amplification))
                .collect(),
            methods: self.estimates,
        }
    }

    /// Per-level CSV view.
    #[must_use]
    pub fn levels_csv(&self) -> String {
        let mut out = String::from(LEVELS_CSV_HEADER);
        out.push('\n');
        for stat in &self.levels {
            let _ = writeln!(
                out,
                "L{},{:.2},{},{:.2}",
                stat.level, stat.write_amplification, stat.files, stat.size_mb
            );
        }
        out
    }
}
