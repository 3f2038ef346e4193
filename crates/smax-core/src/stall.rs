// crates/smax-core/src/stall.rs
// ============================================================================
// Module: Stall Duty Cycle
// Description: Discount the feasible put rate for time spent in write stalls.
// Purpose: Turn a stall probability into the final sustainable rate.
// Dependencies: serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! Two ways to obtain the stall fraction `p_stall`:
//!
//! - **Empirical**: the stall-time ratio measured by the engine. This is the
//!   reliable source and should be preferred whenever statistics exist.
//! - **Logistic**: `1 / (1 + exp(-k * (N_L0 - threshold)))`, capped. The curve
//!   depends on L0 file count alone and is uncalibrated; compared against
//!   measured stall ratios it has been off by more than 70 percentage points.
//!
//! Every [`StallEstimate`] states which source produced it and how far it can
//! be trusted. The final rate is `S_feasible * (1 - p_stall)`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default L0 file count at the curve midpoint (RocksDB slowdown trigger).
pub const DEFAULT_L0_THRESHOLD: f64 = 20.0;
/// Default logistic steepness.
pub const DEFAULT_STEEPNESS: f64 = 0.5;
/// Default cap on the logistic stall fraction.
pub const DEFAULT_MAX_STALL_FRACTION: f64 = 0.9;

/// Caveat attached to logistic estimates.
const LOGISTIC_NOTE: &str = "uncalibrated L0-count curve; observed errors exceed 70 percentage \
                             points against measured stall ratios";
/// Caveat attached to empirical estimates.
const EMPIRICAL_NOTE: &str = "measured stall-time ratio";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Stall parameter errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StallError {
    /// A parameter is outside its valid domain.
    #[error("invalid stall parameter {name}={value}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
        /// Constraint that was violated.
        reason: &'static str,
    },
}

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// Stall model selection, fixed for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StallParams {
    /// Logistic curve over the L0 file count.
    Logistic {
        /// L0 file count at the curve midpoint.
        l0_threshold: f64,
        /// Curve steepness.
        steepness: f64,
        /// Upper cap on the stall fraction.
        max_stall_fraction: f64,
        /// Observed L0 file count.
        l0_files: f64,
    },
    /// Measured stall-time ratio.
    Empirical {
        /// Fraction of wall time spent stalled, in `[0, 1]`.
        observed_stall_ratio: f64,
    },
}

impl StallParams {
    /// Logistic parameters with the default curve shape.
    #[must_use]
    pub const fn logistic(l0_files: f64) -> Self {
        Self::Logistic {
            l0_threshold: DEFAULT_L0_THRESHOLD,
            steepness: DEFAULT_STEEPNESS,
            max_stall_fraction: DEFAULT_MAX_STALL_FRACTION,
            l0_files,
        }
    }

    /// Empirical parameters from a percentage such as `12.5`.
    #[must_use]
    pub fn from_percent(percent: f64) -> Self {
        Self::Empirical {
            observed_stall_ratio: percent / 100.0,
        }
    }
}

/// Source of a stall estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallMode {
    /// No stall discount applied.
    None,
    /// Logistic L0-count curve.
    Logistic,
    /// Measured stall ratio.
    Empirical,
}

/// How far a stall estimate can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReliability {
    /// Taken from engine measurements.
    Measured,
    /// Heuristic, not calibrated against measurements.
    Heuristic,
    /// No discount was requested.
    NotApplied,
}

/// Stall fraction and its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StallEstimate {
    /// Model that produced the estimate.
    pub mode: StallMode,
    /// Fraction of time stalled, in `[0, 1]`.
    pub p_stall: f64,
    /// Trust level of the estimate.
    pub reliability: StallReliability,
    /// Human-readable caveat.
    pub note: &'static str,
}

impl StallEstimate {
    /// Estimate used when no stall model is configured.
    pub const NONE: Self = Self {
        mode: StallMode::None,
        p_stall: 0.0,
        reliability: StallReliability::NotApplied,
        note: "no stall discount",
    };

    /// Applies the discount: `S_final = S_feasible * (1 - p_stall)`.
    #[must_use]
    pub fn apply(&self, s_feasible: f64) -> f64 {
        s_feasible * (1.0 - self.p_stall)
    }
}

// ============================================================================
// SECTION: Estimation
// ============================================================================

/// Estimates the stall fraction.
///
/// # Errors
///
/// Returns [`StallError::InvalidParameter`] for out-of-domain parameters.
pub fn estimate_stall(params: &StallParams) -> Result<StallEstimate, StallError> {
    match *params {
        StallParams::Empirical {
            observed_stall_ratio,
        } => {
            require(
                "observed_stall_ratio",
                observed_stall_ratio,
                (0.0 ..= 1.0).contains(&observed_stall_ratio),
                "must be within [0, 1]",
            )?;
            Ok(StallEstimate {
                mode: StallMode::Empirical,
                p_stall: observed_stall_ratio,
                reliability: StallReliability::Measured,
                note: EMPIRICAL_NOTE,
            })
        }
        StallParams::Logistic {
            l0_threshold,
            steepness,
            max_stall_fraction,
            l0_files,
        } => {
            require("l0_threshold", l0_threshold, l0_threshold >= 0.0, "must be >= 0")?;
            require("steepness", steepness, steepness > 0.0, "must be > 0")?;
            require(
                "max_stall_fraction",
                max_stall_fraction,
                (0.0 ..= 1.0).contains(&max_stall_fraction),
                "must be within [0, 1]",
            )?;
            require("l0_files", l0_files, l0_files >= 0.0, "must be >= 0")?;
            warn!(l0_files, "using heuristic logistic stall model; prefer measured stall ratio");
            let p_stall = logistic(l0_files, l0_threshold, steepness).min(max_stall_fraction);
            Ok(StallEstimate {
                mode: StallMode::Logistic,
                p_stall,
                reliability: StallReliability::Heuristic,
                note: LOGISTIC_NOTE,
            })
        }
    }
}

/// Logistic curve value at `x`.
fn logistic(x: f64, midpoint: f64, steepness: f64) -> f64 {
    1.0 / (1.0 + (-steepness * (x - midpoint)).exp())
}

/// Fails with [`StallError::InvalidParameter`] unless `value` is finite and
/// `ok` holds.
fn require(name: &'static str, value: f64, ok: bool, reason: &'static str) -> Result<(), StallError> {
    if value.is_finite() && ok {
        Ok(())
    } else {
        Err(StallError::InvalidParameter {
            name,
            value,
            reason,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::float_cmp,
        reason = "Test-only assertions are permitted."
    )]

    use super::StallEstimate;
    use super::StallMode;
    use super::StallParams;
    use super::StallReliability;
    use super::estimate_stall;

    #[test]
    fn logistic_is_half_at_threshold() {
        let estimate = estimate_stall(&StallParams::logistic(20.0)).expect("estimate");
        assert_eq!(estimate.p_stall, 0.5);
        assert_eq!(estimate.mode, StallMode::Logistic);
        assert_eq!(estimate.reliability, StallReliability::Heuristic);
    }

    #[test]
    fn logistic_is_capped() {
        let estimate = estimate_stall(&StallParams::logistic(200.0)).expect("estimate");
        assert_eq!(estimate.p_stall, 0.9);
        let estimate = estimate_stall(&StallParams::logistic(0.0)).expect("estimate");
        assert!(estimate.p_stall < 1e-4);
    }

    #[test]
    fn empirical_ratio_passes_through() {
        let estimate = estimate_stall(&StallParams::from_percent(25.0)).expect("estimate");
        assert_eq!(estimate.p_stall, 0.25);
        assert_eq!(estimate.reliability, StallReliability::Measured);
        assert_eq!(estimate.apply(800.0), 600.0);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(estimate_stall(&StallParams::from_percent(120.0)).is_err());
        assert!(
            estimate_stall(&StallParams::Logistic {
                l0_threshold: 20.0,
                steepness: 0.0,
                max_stall_fraction: 0.9,
                l0_files: 4.0,
            })
            .is_err()
        );
        assert!(estimate_stall(&StallParams::logistic(f64::NAN)).is_err());
    }

    #[test]
    fn no_stall_leaves_rate_unchanged() {
        assert_eq!(StallEstimate::NONE.apply(871.6), 871.6);
    }
}
