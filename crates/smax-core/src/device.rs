// crates/smax-core/src/device.rs
// ============================================================================
// Module: Device Profile
// Description: Pure-write, pure-read, and mixed bandwidth at one operating point.
// Purpose: Reduce the envelope to the three bandwidths the bounds consume.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A [`DeviceProfile`] is either given directly, derived from an
//! [`EnvelopeGrid`] at an [`OperatingPoint`], or approximated from pure read
//! and write bandwidths with a harmonic combination. Envelope derivation fails
//! when any of the three lookups is degraded; a missing measurement is never
//! read as zero bandwidth.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::bounds::BoundError;
use crate::envelope::EnvelopeError;
use crate::envelope::EnvelopeGrid;
use crate::envelope::EnvelopePoint;
use crate::envelope::Interpolation;
use crate::envelope::grid::MAX_READ_RATIO;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors deriving a device profile from an envelope.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// An envelope lookup had no measured neighbours.
    #[error("envelope has no measurement near the {role} point (read ratio {read_ratio}%)")]
    Degraded {
        /// Which bandwidth was being derived.
        role: &'static str,
        /// Read ratio of the failed lookup.
        read_ratio: f64,
    },
    /// Envelope query failure.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    /// Derived bandwidths were rejected.
    #[error(transparent)]
    Parameter(#[from] BoundError),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Bandwidths (MiB/s) available to the bound calculator.
///
/// # Invariants
/// - All three values are finite and non-negative once constructed via
///   [`DeviceProfile::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Pure-write bandwidth.
    pub b_w: f64,
    /// Pure-read bandwidth.
    pub b_r: f64,
    /// Mixed bandwidth at the observed read ratio.
    pub b_eff: f64,
}

/// Envelope coordinates of the workload, minus the read ratio axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperatingPoint {
    /// Queue depth per job.
    pub iodepth: f64,
    /// Concurrent jobs.
    pub numjobs: f64,
    /// Block size in KiB.
    pub block_size_kb: f64,
}

/// A derived profile together with the lookups that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeviceDerivation {
    /// Resulting profile.
    pub profile: DeviceProfile,
    /// Read ratio (percent) used for the mixed lookup.
    pub read_ratio: f64,
    /// Pure-write lookup.
    pub write: Interpolation,
    /// Pure-read lookup.
    pub read: Interpolation,
    /// Mixed lookup.
    pub mixed: Interpolation,
}

// ============================================================================
// SECTION: Construction
// ============================================================================

impl DeviceProfile {
    /// Creates a validated profile.
    ///
    /// # Errors
    ///
    /// Returns [`BoundError::InvalidParameter`] for negative or non-finite
    /// bandwidth.
    pub fn new(b_w: f64, b_r: f64, b_eff: f64) -> Result<Self, BoundError> {
        let profile = Self {
            b_w,
            b_r,
            b_eff,
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Approximates the mixed bandwidth as the harmonic combination
    /// `1 / (rho / B_r + (1 - rho) / B_w)` with `rho` a fraction in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`BoundError::InvalidParameter`] for invalid bandwidths or a
    /// read fraction outside `[0, 1]`.
    pub fn harmonic(b_w: f64, b_r: f64, read_fraction: f64) -> Result<Self, BoundError> {
        if !(read_fraction.is_finite() && (0.0 ..= 1.0).contains(&read_fraction)) {
            return Err(BoundError::invalid("read_fraction", read_fraction, "must be within [0, 1]"));
        }
        Self::new(b_w, b_r, 0.0)?;
        let read_time = if read_fraction > 0.0 { read_fraction / b_r } else { 0.0 };
        let write_time = if read_fraction < 1.0 { (1.0 - read_fraction) / b_w } else { 0.0 };
        let per_mib = read_time + write_time;
        let b_eff = if per_mib.is_finite() && per_mib > 0.0 { 1.0 / per_mib } else { 0.0 };
        Self::new(b_w, b_r, b_eff)
    }

    /// Derives the profile from an envelope grid.
    ///
    /// `read_ratio` is the observed read percentage used for `B_eff`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Degraded`] when any lookup has no measured
    /// neighbours.
    pub fn from_envelope(
        grid: &EnvelopeGrid,
        point: &OperatingPoint,
        read_ratio: f64,
    ) -> Result<DeviceDerivation, DeviceError> {
        let base = EnvelopePoint {
            read_ratio: 0.0,
            iodepth: point.iodepth,
            numjobs: point.numjobs,
            block_size_kb: point.block_size_kb,
        };
        let lookup = |role: &'static str, rho: f64| -> Result<Interpolation, DeviceError> {
            let result = grid.query(&base.with_read_ratio(rho))?;
            if result.is_usable() {
                Ok(result)
            } else {
                Err(DeviceError::Degraded {
                    role,
                    read_ratio: rho,
                })
            }
        };
        let write = lookup("write", 0.0)?;
        let read = lookup("read", MAX_READ_RATIO)?;
        let mixed = lookup("mixed", read_ratio)?;
        Ok(DeviceDerivation {
            profile: Self::new(write.value, read.value, mixed.value)?,
            read_ratio,
            write,
            read,
            mixed,
        })
    }

    /// Checks that every bandwidth is finite and non-negative.
    ///
    /// # Errors
    ///
    /// Returns [`BoundError::InvalidParameter`] naming the offending field.
    pub fn validate(&self) -> Result<(), BoundError> {
        for (name, value) in [("b_w", self.b_w), ("b_r", self.b_r), ("b_eff", self.b_eff)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(BoundError::invalid(name, value, "bandwidth must be finite and >= 0"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
