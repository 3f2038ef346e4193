// crates/smax-core/src/levels.rs
// ============================================================================
// Module: Level Constraint Model
// Description: Per-LSM-level feasibility bound on the put rate.
// Purpose: Detect a level that limits throughput despite a small I/O share.
// Dependencies: crate::bounds, serde, thiserror
// ============================================================================

//! ## Overview
//! Each level `l` receives `share_l` of the total write traffic and reads
//! `rtw_l` bytes per byte it writes. Its demand per unit of put rate is
//! `w_l = share_l * w_req` and `r_l = rtw_l * w_l`; its capacity is
//! approximated as `total_capacity * share_l`, giving
//! `S_l = capacity_l / (w_l + r_l)`. The minimum over levels is a fourth
//! candidate bound.
//!
//! The proportional-capacity approximation assumes levels do not contend for
//! bandwidth beyond their measured share. It has not been verified against
//! measurements, so every [`LevelBound`] carries that assumption label.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::bounds::Demand;
use crate::bounds::rate;
use crate::bounds::serialize_rate;
use crate::device::DeviceProfile;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Allowed deviation of the share sum from 1.
pub const SHARE_SUM_TOLERANCE: f64 = 0.01;
/// Label attached to every level bound.
pub const LEVEL_CAPACITY_ASSUMPTION: &str = "proportional_share_unverified";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Level statistics validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LevelError {
    /// No level statistics were supplied.
    #[error("no level statistics supplied")]
    Empty,
    /// A level number appears more than once.
    #[error("level L{0} appears more than once")]
    DuplicateLevel(u32),
    /// A byte counter or amplification is negative or non-finite.
    #[error("level L{level} has invalid {field}: {value}")]
    InvalidCounter {
        /// Level number.
        level: u32,
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: f64,
    },
    /// Shares do not sum to one.
    #[error("level shares sum to {0}, expected 1")]
    InvalidShare(f64),
    /// Capacity is negative or non-finite.
    #[error("invalid level capacity {0}")]
    InvalidCapacity(f64),
}

// ============================================================================
// SECTION: Level Records
// ============================================================================

/// Compaction statistics for one LSM level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionLevelStat {
    /// Level number (0 is the flush level).
    pub level: u32,
    /// Number of SST files at the level.
    #[serde(default)]
    pub files: u64,
    /// On-disk size of the level in MiB.
    #[serde(default)]
    pub size_mb: f64,
    /// Bytes read by compactions into this level.
    #[serde(default)]
    pub read_bytes: f64,
    /// Bytes written by flushes/compactions into this level.
    pub write_bytes: f64,
    /// Write amplification attributed to the level.
    #[serde(default)]
    pub write_amplification: f64,
    /// Fraction of all level writes attributed to this level.
    #[serde(default)]
    pub share_of_total_write: f64,
}

impl CompactionLevelStat {
    /// Read bytes per written byte at this level.
    #[must_use]
    pub fn read_to_write(&self) -> f64 {
        if self.write_bytes > 0.0 { self.read_bytes / self.write_bytes } else { 0.0 }
    }
}

/// Validated, level-ordered statistics.
///
/// # Invariants
/// - Levels are unique and sorted ascending.
/// - Counters are finite and non-negative.
/// - Shares sum to 1 within [`SHARE_SUM_TOLERANCE`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelProfile {
    /// Ordered level records.
    levels: Vec<CompactionLevelStat>,
}

impl LevelProfile {
    /// Validates records whose shares are already populated.
    ///
    /// # Errors
    ///
    /// Returns [`LevelError`] when the records violate the invariants.
    pub fn new(mut levels: Vec<CompactionLevelStat>) -> Result<Self, LevelError> {
        check_records(&mut levels)?;
        for stat in &levels {
            check_counter(stat.level, "share_of_total_write", stat.share_of_total_write)?;
        }
        let sum: f64 = levels.iter().map(|stat| stat.share_of_total_write).sum();
        if (sum - 1.0).abs() > SHARE_SUM_TOLERANCE {
            return Err(LevelError::InvalidShare(sum));
        }
        Ok(Self {
            levels,
        })
    }

    /// Validates records and derives each share from its write bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LevelError`] when the records are invalid or no level wrote
    /// any bytes.
    pub fn from_write_bytes(mut levels: Vec<CompactionLevelStat>) -> Result<Self, LevelError> {
        check_records(&mut levels)?;
        let total: f64 = levels.iter().map(|stat| stat.write_bytes).sum();
        if total <= 0.0 {
            return Err(LevelError::InvalidShare(0.0));
        }
        for stat in &mut levels {
            stat.share_of_total_write = stat.write_bytes / total;
        }
        Ok(Self {
            levels,
        })
    }

    /// Returns the ordered level records.
    #[must_use]
    pub fn levels(&self) -> &[CompactionLevelStat] {
        &self.levels
    }

    /// Returns the L0 file count, when L0 is present.
    #[must_use]
    pub fn l0_files(&self) -> Option<u64> {
        self.levels.iter().find(|stat| stat.level == 0).map(|stat| stat.files)
    }
}

// ============================================================================
// SECTION: Capacity Basis
// ============================================================================

/// Which device bandwidth stands in for total capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityBasis {
    /// Mixed bandwidth `B_eff`.
    #[default]
    Mixed,
    /// Pure-write bandwidth `B_w`.
    Write,
}

impl CapacityBasis {
    /// Selects the capacity from a device profile.
    #[must_use]
    pub const fn capacity(self, device: &DeviceProfile) -> f64 {
        match self {
            Self::Mixed => device.b_eff,
            Self::Write => device.b_w,
        }
    }
}

// ============================================================================
// SECTION: Level Bound
// ============================================================================

/// Feasibility of one level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelFeasibility {
    /// Level number.
    pub level: u32,
    /// Share of total write traffic.
    pub share: f64,
    /// Write demand per unit put rate.
    pub w_l: f64,
    /// Read demand per unit put rate.
    pub r_l: f64,
    /// Bandwidth attributed to the level.
    pub capacity: f64,
    /// Feasible put rate for the level.
    #[serde(serialize_with = "serialize_rate")]
    pub s_l: f64,
}

/// Minimum per-level feasible rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelBound {
    /// Minimum over levels (`+inf` when no level carries traffic).
    #[serde(serialize_with = "serialize_rate")]
    pub s_level: f64,
    /// Level producing the minimum.
    pub limiting_level: Option<u32>,
    /// Per-level detail, skipping levels without traffic.
    pub per_level: Vec<LevelFeasibility>,
    /// Capacity approximation in force.
    pub assumption: &'static str,
}

/// Computes the per-level bound.
///
/// # Errors
///
/// Returns [`LevelError::InvalidCapacity`] for negative or non-finite capacity.
pub fn level_bound(
    profile: &LevelProfile,
    demand: &Demand,
    total_capacity: f64,
) -> Result<LevelBound, LevelError> {
    if !(total_capacity.is_finite() && total_capacity >= 0.0) {
        return Err(LevelError::InvalidCapacity(total_capacity));
    }
    let per_level: Vec<LevelFeasibility> = profile
        .levels()
        .iter()
        .filter(|stat| stat.share_of_total_write > 0.0)
        .map(|stat| {
            let share = stat.share_of_total_write;
            let w_l = share * demand.w_req;
            let r_l = stat.read_to_write() * w_l;
            let capacity = total_capacity * share;
            LevelFeasibility {
                level: stat.level,
                share,
                w_l,
                r_l,
                capacity,
                s_l: rate(capacity, w_l + r_l),
            }
        })
        .collect();

    let mut s_level = f64::INFINITY;
    let mut limiting_level = None;
    for entry in &per_level {
        if entry.s_l < s_level {
            s_level = entry.s_l;
            limiting_level = Some(entry.level);
        }
    }
    Ok(LevelBound {
        s_level,
        limiting_level,
        per_level,
        assumption: LEVEL_CAPACITY_ASSUMPTION,
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Sorts records and checks uniqueness and counter ranges.
fn check_records(levels: &mut [CompactionLevelStat]) -> Result<(), LevelError> {
    if levels.is_empty() {
        return Err(LevelError::Empty);
    }
    levels.sort_by_key(|stat| stat.level);
    for pair in levels.windows(2) {
        if pair[0].level == pair[1].level {
            return Err(LevelError::DuplicateLevel(pair[0].level));
        }
    }
    for stat in levels.iter() {
        check_counter(stat.level, "read_bytes", stat.read_bytes)?;
        check_counter(stat.level, "write_bytes", stat.write_bytes)?;
        check_counter(stat.level, "size_mb", stat.size_mb)?;
        check_counter(stat.level, "write_amplification", stat.write_amplification)?;
    }
    Ok(())
}

/// Checks that a counter is finite and non-negative.
fn check_counter(level: u32, field: &'static str, value: f64) -> Result<(), LevelError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(LevelError::InvalidCounter {
            level,
            field,
            value,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
