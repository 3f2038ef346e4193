// crates/smax-core/src/bounds.rs
// ============================================================================
// Module: Put-Rate Bounds
// Description: Closed-form write, read, and mixed throughput bounds.
// Purpose: Compute the sustainable put rate permitted by device bandwidth.
// Dependencies: crate::device, serde, thiserror
// ============================================================================

//! ## Overview
//! Each user byte put into the engine costs `w_req = CR * WA + w_wal` bytes of
//! device writes and `r_req = CR * max(WA - 1, 0)` bytes of compaction reads.
//! Dividing the available bandwidth by that demand gives three independent
//! bounds; the sustainable rate is their minimum.
//!
//! A bound whose demand is exactly zero is `+inf`, not an error. Invalid
//! parameters are rejected before any division takes place. Evaluation is a
//! pure function of its inputs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

use crate::device::DeviceProfile;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default read weight in the mixed bound.
pub const DEFAULT_ETA: f64 = 1.0;
/// Default WAL write factor.
pub const DEFAULT_WAL_FACTOR: f64 = 0.0;
/// Default average key-value size used for ops/sec conversion.
pub const DEFAULT_KV_SIZE_BYTES: u32 = 1024;
/// Relative tolerance for bottleneck ties.
pub const BOTTLENECK_TOLERANCE: f64 = 1e-9;
/// Bytes per MiB.
pub const BYTES_PER_MIB: f64 = 1_048_576.0;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Bound evaluation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundError {
    /// A parameter is outside its valid domain.
    #[error("invalid parameter {name}={value}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
        /// Constraint that was violated.
        reason: &'static str,
    },
}

impl BoundError {
    /// Shorthand for [`BoundError::InvalidParameter`].
    #[must_use]
    pub const fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value,
            reason,
        }
    }
}

// ============================================================================
// SECTION: Inputs
// ============================================================================

/// Inputs to one bound evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundInputs {
    /// Compression ratio, `0 < CR <= 1`.
    pub cr: f64,
    /// Write amplification, `WA >= 1`.
    pub wa: f64,
    /// Device bandwidths.
    pub device: DeviceProfile,
    /// Read weight in the mixed bound.
    pub eta: f64,
    /// WAL bytes written per user byte.
    pub wal_factor: f64,
}

impl BoundInputs {
    /// Creates inputs with default `eta` and WAL factor.
    #[must_use]
    pub const fn new(cr: f64, wa: f64, device: DeviceProfile) -> Self {
        Self {
            cr,
            wa,
            device,
            eta: DEFAULT_ETA,
            wal_factor: DEFAULT_WAL_FACTOR,
        }
    }

    /// Validates every parameter.
    ///
    /// # Errors
    ///
    /// Returns [`BoundError::InvalidParameter`] for the first violation found.
    pub fn validate(&self) -> Result<(), BoundError> {
        if !(self.cr.is_finite() && self.cr > 0.0 && self.cr <= 1.0) {
            return Err(BoundError::invalid("cr", self.cr, "compression ratio must be in (0, 1]"));
        }
        if !(self.wa.is_finite() && self.wa >= 1.0) {
            return Err(BoundError::invalid("wa", self.wa, "write amplification must be >= 1"));
        }
        if !(self.eta.is_finite() && self.eta >= 0.0) {
            return Err(BoundError::invalid("eta", self.eta, "read weight must be >= 0"));
        }
        if !(self.wal_factor.is_finite() && self.wal_factor >= 0.0) {
            return Err(BoundError::invalid("wal_factor", self.wal_factor, "WAL factor must be >= 0"));
        }
        self.device.validate()
    }
}

/// Device bytes required per user byte.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    /// Write bytes per user byte.
    pub w_req: f64,
    /// Read bytes per user byte.
    pub r_req: f64,
}

impl Demand {
    /// Computes demand from compression ratio, write amplification, and WAL
    /// factor. Inputs are assumed validated.
    #[must_use]
    pub fn new(cr: f64, wa: f64, wal_factor: f64) -> Self {
        Self {
            w_req: cr.mul_add(wa, wal_factor),
            r_req: cr * (wa - 1.0).max(0.0),
        }
    }

    /// Read percentage implied by the demand mix, `r / (w + r)`.
    #[must_use]
    pub fn implied_read_ratio(&self) -> f64 {
        let total = self.w_req + self.r_req;
        if total > 0.0 { 100.0 * self.r_req / total } else { 0.0 }
    }
}

// ============================================================================
// SECTION: Result
// ============================================================================

/// Identifies which bound limits the put rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bottleneck {
    /// Pure-write bandwidth.
    Write,
    /// Pure-read bandwidth.
    Read,
    /// Mixed read/write bandwidth.
    Mixed,
    /// A single LSM level, by level number.
    Level(u32),
}

impl std::fmt::Display for Bottleneck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Write => f.write_str("write"),
            Self::Read => f.write_str("read"),
            Self::Mixed => f.write_str("mixed"),
            Self::Level(level) => write!(f, "level L{level}"),
        }
    }
}

/// Outcome of a bound evaluation. All rates are MiB/s of user data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundResult {
    /// Per-user-byte device demand.
    pub demand: Demand,
    /// Write-bandwidth bound.
    #[serde(serialize_with = "serialize_rate")]
    pub s_write: f64,
    /// Read-bandwidth bound.
    #[serde(serialize_with = "serialize_rate")]
    pub s_read: f64,
    /// Mixed-bandwidth bound.
    #[serde(serialize_with = "serialize_rate")]
    pub s_mix: f64,
    /// Per-level bound, when level statistics were supplied.
    #[serde(serialize_with = "serialize_optional_rate")]
    pub s_level: Option<f64>,
    /// Level whose constraint produced `s_level`.
    pub limiting_level: Option<u32>,
    /// Minimum of all bounds.
    #[serde(serialize_with = "serialize_rate")]
    pub s_max: f64,
    /// Every bound equal to `s_max` within tolerance.
    pub bottleneck_set: Vec<Bottleneck>,
}

impl BoundResult {
    /// Folds a per-level bound into the result as a fourth candidate.
    #[must_use]
    pub fn with_level_bound(&self, s_level: f64, limiting_level: Option<u32>) -> Self {
        let mut candidates = self.base_candidates().to_vec();
        if let Some(level) = limiting_level {
            candidates.push((Bottleneck::Level(level), s_level));
        }
        let (s_max, bottleneck_set) = minimum(&candidates);
        Self {
            demand: self.demand,
            s_write: self.s_write,
            s_read: self.s_read,
            s_mix: self.s_mix,
            s_level: Some(s_level),
            limiting_level,
            s_max,
            bottleneck_set,
        }
    }

    /// Returns the three device bounds as labelled candidates.
    const fn base_candidates(&self) -> [(Bottleneck, f64); 3] {
        [
            (Bottleneck::Write, self.s_write),
            (Bottleneck::Read, self.s_read),
            (Bottleneck::Mixed, self.s_mix),
        ]
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Computes the write, read, and mixed bounds and their minimum.
///
/// # Errors
///
/// Returns [`BoundError::InvalidParameter`] when inputs are out of domain.
pub fn compute_bounds(inputs: &BoundInputs) -> Result<BoundResult, BoundError> {
    inputs.validate()?;
    let demand = Demand::new(inputs.cr, inputs.wa, inputs.wal_factor);
    let device = inputs.device;
    let s_write = rate(device.b_w, demand.w_req);
    let s_read = rate(device.b_r, demand.r_req);
    let s_mix = rate(device.b_eff, inputs.eta.mul_add(demand.r_req, demand.w_req));

    let candidates =
        [(Bottleneck::Write, s_write), (Bottleneck::Read, s_read), (Bottleneck::Mixed, s_mix)];
    let (s_max, bottleneck_set) = minimum(&candidates);
    Ok(BoundResult {
        demand,
        s_write,
        s_read,
        s_mix,
        s_level: None,
        limiting_level: None,
        s_max,
        bottleneck_set,
    })
}

/// Converts MiB/s of user data into operations per second.
#[must_use]
pub fn mibs_to_ops(rate_mibs: f64, kv_size_bytes: u32) -> f64 {
    if kv_size_bytes == 0 {
        return f64::INFINITY;
    }
    rate_mibs * BYTES_PER_MIB / f64::from(kv_size_bytes)
}

/// Returns true when two rates are equal within [`BOTTLENECK_TOLERANCE`].
#[must_use]
pub fn rates_tie(a: f64, b: f64) -> bool {
    if a.is_infinite() || b.is_infinite() {
        return a == b;
    }
    (a - b).abs() <= BOTTLENECK_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Divides bandwidth by demand; zero demand yields `+inf`.
pub(crate) fn rate(bandwidth: f64, demand: f64) -> f64 {
    if demand == 0.0 { f64::INFINITY } else { bandwidth / demand }
}

/// Minimum over labelled candidates and the labels tied with it.
fn minimum(candidates: &[(Bottleneck, f64)]) -> (f64, Vec<Bottleneck>) {
    let s_max = candidates.iter().map(|(_, value)| *value).fold(f64::INFINITY, f64::min);
    let ties = candidates
        .iter()
        .filter(|(_, value)| rates_tie(*value, s_max))
        .map(|(label, _)| *label)
        .collect();
    (s_max, ties)
}

// ============================================================================
// SECTION: Serialization
// ============================================================================

/// Serializes a rate, mapping `+inf` to the string `"inf"`.
///
/// # Errors
///
/// Propagates serializer errors.
pub fn serialize_rate<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_infinite() && value.is_sign_positive() {
        serializer.serialize_str("inf")
    } else {
        serializer.serialize_f64(*value)
    }
}

/// Serializes an optional rate with the same `"inf"` mapping.
///
/// # Errors
///
/// Propagates serializer errors.
#[allow(clippy::ref_option, reason = "serde serialize_with passes &Option<T>.")]
pub fn serialize_optional_rate<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => serialize_rate(value, serializer),
        None => serializer.serialize_none(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
