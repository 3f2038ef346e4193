// crates/smax-core/src/predict.rs
// ============================================================================
// Module: Prediction
// Description: End-to-end composition of the bound, level, and stall models.
// Purpose: Produce the final sustainable put rate with every intermediate.
// Dependencies: serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! A prediction runs the stages in a fixed order:
//!
//! 1. device bounds (`s_write`, `s_read`, `s_mix`),
//! 2. the optional per-level bound, folded in as a fourth candidate,
//! 3. the optional stall discount on the feasible rate.
//!
//! Each stage is pure, so a prediction depends only on its inputs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::info;

use crate::bounds::BoundError;
use crate::bounds::BoundInputs;
use crate::bounds::BoundResult;
use crate::bounds::DEFAULT_KV_SIZE_BYTES;
use crate::bounds::compute_bounds;
use crate::bounds::mibs_to_ops;
use crate::bounds::serialize_rate;
use crate::levels::CapacityBasis;
use crate::levels::LevelBound;
use crate::levels::LevelError;
use crate::levels::LevelProfile;
use crate::levels::level_bound;
use crate::stall::StallError;
use crate::stall::StallEstimate;
use crate::stall::StallParams;
use crate::stall::estimate_stall;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors from any prediction stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    /// Bound inputs were rejected.
    #[error(transparent)]
    Bound(#[from] BoundError),
    /// Level statistics were rejected.
    #[error(transparent)]
    Level(#[from] LevelError),
    /// Stall parameters were rejected.
    #[error(transparent)]
    Stall(#[from] StallError),
}

// ============================================================================
// SECTION: Inputs
// ============================================================================

/// Inputs for one end-to-end prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionInputs {
    /// Bound calculator inputs.
    pub bounds: BoundInputs,
    /// Per-level statistics, when available.
    pub levels: Option<LevelProfile>,
    /// Bandwidth used as the level model's total capacity.
    pub capacity_basis: CapacityBasis,
    /// Stall model, when a discount is wanted.
    pub stall: Option<StallParams>,
    /// Key-value size for the ops/sec conversion.
    pub kv_size_bytes: u32,
}

impl PredictionInputs {
    /// Inputs with no level statistics and no stall discount.
    #[must_use]
    pub const fn new(bounds: BoundInputs) -> Self {
        Self {
            bounds,
            levels: None,
            capacity_basis: CapacityBasis::Mixed,
            stall: None,
            kv_size_bytes: DEFAULT_KV_SIZE_BYTES,
        }
    }
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Result of a prediction, in MiB/s of user data unless noted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Device bounds with the level bound folded in.
    pub bounds: BoundResult,
    /// Per-level detail, when level statistics were supplied.
    pub level_bound: Option<LevelBound>,
    /// Stall discount and its provenance.
    pub stall: StallEstimate,
    /// Minimum feasible rate before the stall discount.
    #[serde(serialize_with = "serialize_rate")]
    pub s_feasible: f64,
    /// Sustainable rate after the stall discount.
    #[serde(serialize_with = "serialize_rate")]
    pub s_final: f64,
    /// `s_final` expressed in operations per second.
    #[serde(serialize_with = "serialize_rate")]
    pub ops_per_sec: f64,
    /// Key-value size used for `ops_per_sec`.
    pub kv_size_bytes: u32,
}

// ============================================================================
// SECTION: Composition
// ============================================================================

/// Runs the full prediction pipeline.
///
/// # Errors
///
/// Returns [`PredictError`] from the first stage that rejects its inputs.
pub fn predict(inputs: &PredictionInputs) -> Result<Prediction, PredictError> {
    let device_bounds = compute_bounds(&inputs.bounds)?;
    let (bounds, level_detail) = match &inputs.levels {
        Some(profile) => {
            let capacity = inputs.capacity_basis.capacity(&inputs.bounds.device);
            let detail = level_bound(profile, &device_bounds.demand, capacity)?;
            debug!(s_level = detail.s_level, limiting_level = ?detail.limiting_level, "level bound");
            (device_bounds.with_level_bound(detail.s_level, detail.limiting_level), Some(detail))
        }
        None => (device_bounds, None),
    };
    let stall = match &inputs.stall {
        Some(params) => estimate_stall(params)?,
        None => StallEstimate::NONE,
    };
    let s_feasible = bounds.s_max;
    let s_final = stall.apply(s_feasible);
    info!(s_feasible, s_final, p_stall = stall.p_stall, "prediction complete");
    Ok(Prediction {
        bounds,
        level_bound: level_detail,
        stall,
        s_feasible,
        s_final,
        ops_per_sec: mibs_to_ops(s_final, inputs.kv_size_bytes),
        kv_size_bytes: inputs.kv_size_bytes,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
