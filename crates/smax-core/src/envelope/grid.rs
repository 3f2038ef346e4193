// crates/smax-core/src/envelope/grid.rs
// ============================================================================
// Module: Envelope Grid
// Description: Four-axis device bandwidth grid with multilinear interpolation.
// Purpose: Store measured bandwidth samples and answer point queries.
// Dependencies: serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! An [`EnvelopeGrid`] is built once from a batch of [`EnvelopeSample`]s and
//! is immutable afterwards. Axis coordinates are the distinct sample values per
//! axis, strictly increasing. Cells with no sample hold `NaN`; they are never
//! treated as zero bandwidth.
//!
//! Queries interpolate multilinearly over the (up to) sixteen surrounding
//! cells. Coordinates outside an axis are clamped to the nearest bound and the
//! result is flagged `clamped`. Missing corners are dropped and the remaining
//! weights renormalised; when every weighted corner is missing the query
//! returns `NaN` with [`CellStatus::Degraded`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::io::IoBoundaryError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of envelope axes.
pub const AXIS_COUNT: usize = 4;
/// Upper bound of the read-ratio axis (fio `rwmixread` percentage).
pub const MAX_READ_RATIO: f64 = 100.0;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Envelope construction and query errors.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// No input files matched the result naming convention.
    #[error("no envelope result files found under {0}")]
    NoInputs(String),
    /// Every sample in the batch was rejected.
    #[error("no envelope samples accepted ({failed} rejected)")]
    NoSamples {
        /// Number of rejected samples or files.
        failed: usize,
    },
    /// Query coordinate is not a finite number.
    #[error("query coordinate {axis} is not finite: {value}")]
    InvalidQuery {
        /// Axis label.
        axis: &'static str,
        /// Offending value.
        value: f64,
    },
    /// A persisted envelope document is inconsistent.
    #[error("invalid envelope document: {0}")]
    InvalidDocument(String),
    /// Bounded I/O failure that aborts the batch.
    #[error(transparent)]
    Io(#[from] IoBoundaryError),
}

// ============================================================================
// SECTION: Axes and Points
// ============================================================================

/// Envelope axis identifiers, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Read percentage of the mixed workload (0-100).
    ReadRatio,
    /// Per-job queue depth.
    IoDepth,
    /// Concurrent fio jobs.
    NumJobs,
    /// Transfer size in KiB.
    BlockSize,
}

impl Axis {
    /// All axes in storage order.
    pub const ALL: [Self; AXIS_COUNT] = [Self::ReadRatio, Self::IoDepth, Self::NumJobs, Self::BlockSize];

    /// Returns the storage index of the axis.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::ReadRatio => 0,
            Self::IoDepth => 1,
            Self::NumJobs => 2,
            Self::BlockSize => 3,
        }
    }

    /// Returns a stable label for the axis.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadRatio => "read_ratio",
            Self::IoDepth => "iodepth",
            Self::NumJobs => "numjobs",
            Self::BlockSize => "block_size_kb",
        }
    }
}

/// A coordinate in envelope space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopePoint {
    /// Read percentage, 0 (pure write) to 100 (pure read).
    pub read_ratio: f64,
    /// Queue depth per job.
    pub iodepth: f64,
    /// Number of concurrent jobs.
    pub numjobs: f64,
    /// Block size in KiB.
    pub block_size_kb: f64,
}

impl EnvelopePoint {
    /// Returns the coordinates in axis storage order.
    #[must_use]
    pub const fn coords(&self) -> [f64; AXIS_COUNT] {
        [self.read_ratio, self.iodepth, self.numjobs, self.block_size_kb]
    }

    /// Builds a point from coordinates in axis storage order.
    #[must_use]
    pub const fn from_coords(coords: [f64; AXIS_COUNT]) -> Self {
        Self {
            read_ratio: coords[0],
            iodepth: coords[1],
            numjobs: coords[2],
            block_size_kb: coords[3],
        }
    }

    /// Returns the same point with a different read ratio.
    #[must_use]
    pub const fn with_read_ratio(mut self, read_ratio: f64) -> Self {
        self.read_ratio = read_ratio;
        self
    }

    /// Checks that the point is a well-formed sample coordinate.
    fn check_sample_coordinate(&self) -> Result<(), String> {
        if !(self.read_ratio.is_finite() && (0.0 ..= MAX_READ_RATIO).contains(&self.read_ratio)) {
            return Err(format!("read_ratio {} outside 0..=100", self.read_ratio));
        }
        for (axis, value) in Axis::ALL.iter().zip(self.coords()).skip(1) {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("{} must be positive, got {value}", axis.as_str()));
            }
        }
        Ok(())
    }
}

/// One measured bandwidth sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeSample {
    /// Sample coordinate.
    pub point: EnvelopePoint,
    /// Measured bandwidth in MiB/s.
    pub bandwidth_mibs: f64,
}

// ============================================================================
// SECTION: Build Statistics
// ============================================================================

/// Counters describing how an envelope was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Samples accepted into the grid.
    pub parsed_count: usize,
    /// Samples or files rejected during the build.
    pub failed_count: usize,
    /// Grid cells with no sample (stored as `NaN`).
    pub missing_cells: usize,
}

// ============================================================================
// SECTION: Interpolation Result
// ============================================================================

/// Coverage of the cells used to answer a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellStatus {
    /// Every weighted corner had a measurement.
    Complete,
    /// Some weighted corners were missing and were dropped.
    Partial {
        /// Number of weighted corners without a measurement.
        missing_corners: usize,
    },
    /// No weighted corner had a measurement; the value is `NaN`.
    Degraded,
}

/// Result of an envelope query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interpolation {
    /// Interpolated bandwidth in MiB/s (`NaN` when degraded).
    pub value: f64,
    /// Coverage of the surrounding cells.
    pub status: CellStatus,
    /// True when any coordinate was clamped to an axis bound.
    pub clamped: bool,
}

impl Interpolation {
    /// Returns true when the value is backed by at least one measurement.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        !matches!(self.status, CellStatus::Degraded)
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Accumulates samples and rejections before freezing an [`EnvelopeGrid`].
#[derive(Debug, Default)]
pub struct EnvelopeGridBuilder {
    /// Accepted samples, in arrival order.
    samples: Vec<EnvelopeSample>,
    /// Bit patterns of accepted coordinates, for duplicate detection.
    seen: HashSet<[u64; AXIS_COUNT]>,
    /// Rejected samples or files.
    failed: usize,
    /// Device identifier recorded in the grid metadata.
    device: Option<String>,
}

impl EnvelopeGridBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the device identifier.
    #[must_use]
    pub fn device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }

    /// Adds a sample. Malformed or duplicate samples are counted and skipped.
    pub fn push(&mut self, mut sample: EnvelopeSample) {
        // Adding zero folds -0.0 into 0.0 so each coordinate has one bit pattern.
        sample.point = EnvelopePoint::from_coords(sample.point.coords().map(|v| v + 0.0));
        if let Err(reason) = sample.point.check_sample_coordinate() {
            self.record_failure(&reason);
            return;
        }
        if !(sample.bandwidth_mibs.is_finite() && sample.bandwidth_mibs >= 0.0) {
            self.record_failure(&format!("invalid bandwidth {}", sample.bandwidth_mibs));
            return;
        }
        let key = sample.point.coords().map(f64::to_bits);
        if !self.seen.insert(key) {
            self.record_failure(&format!("duplicate coordinate {:?}", sample.point.coords()));
            return;
        }
        self.samples.push(sample);
    }

    /// Counts a sample or file that could not be ingested.
    pub fn record_failure(&mut self, reason: &str) {
        warn!(reason, "envelope sample rejected");
        self.failed += 1;
    }

    /// Freezes the accepted samples into a grid.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::NoSamples`] when nothing was accepted.
    pub fn build(self) -> Result<EnvelopeGrid, EnvelopeError> {
        if self.samples.is_empty() {
            return Err(EnvelopeError::NoSamples {
                failed: self.failed,
            });
        }

        let axes: [Vec<f64>; AXIS_COUNT] = std::array::from_fn(|dim| {
            let mut values: Vec<f64> = self.samples.iter().map(|s| s.point.coords()[dim]).collect();
            values.sort_by(f64::total_cmp);
            values.dedup();
            values
        });
        let len = axes.iter().map(Vec::len).product();
        let mut cells = vec![f64::NAN; len];
        for sample in &self.samples {
            let coords = sample.point.coords();
            let mut indices = [0usize; AXIS_COUNT];
            for (dim, index) in indices.iter_mut().enumerate() {
                // Every coordinate is an axis value by construction.
                *index = axes[dim].partition_point(|v| *v < coords[dim]);
            }
            cells[flat_index(&axes, indices)] = sample.bandwidth_mibs;
        }

        let missing_cells = cells.iter().filter(|v| v.is_nan()).count();
        if missing_cells > 0 {
            warn!(missing_cells, total_cells = len, "envelope grid has unmeasured cells");
        }
        let stats = BuildStats {
            parsed_count: self.samples.len(),
            failed_count: self.failed,
            missing_cells,
        };
        debug!(?stats, "envelope grid built");
        Ok(EnvelopeGrid {
            axes,
            cells,
            device: self.device,
            stats,
        })
    }
}

// ============================================================================
// SECTION: Grid
// ============================================================================

/// Immutable four-axis bandwidth grid.
///
/// # Invariants
/// - Each axis is non-empty and strictly increasing.
/// - `cells.len()` equals the product of axis lengths.
/// - Unmeasured cells are `NaN`.
#[derive(Debug, Clone)]
pub struct EnvelopeGrid {
    /// Axis coordinates in storage order.
    axes: [Vec<f64>; AXIS_COUNT],
    /// Row-major bandwidth cells (MiB/s).
    cells: Vec<f64>,
    /// Device identifier, when known.
    device: Option<String>,
    /// Build counters.
    stats: BuildStats,
}

impl EnvelopeGrid {
    /// Builds a grid directly from a batch of samples.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::NoSamples`] when every sample is rejected.
    pub fn from_samples(
        samples: impl IntoIterator<Item = EnvelopeSample>,
    ) -> Result<Self, EnvelopeError> {
        let mut builder = EnvelopeGridBuilder::new();
        for sample in samples {
            builder.push(sample);
        }
        builder.build()
    }

    /// Reassembles a grid from persisted axes and cells.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidDocument`] when axes are empty, not
    /// strictly increasing, or do not match the cell count.
    pub fn from_parts(
        axes: [Vec<f64>; AXIS_COUNT],
        cells: Vec<f64>,
        device: Option<String>,
        mut stats: BuildStats,
    ) -> Result<Self, EnvelopeError> {
        for (axis, values) in Axis::ALL.iter().zip(&axes) {
            if values.is_empty() {
                return Err(EnvelopeError::InvalidDocument(format!("{} axis is empty", axis.as_str())));
            }
            if values.iter().any(|v| !v.is_finite()) || values.windows(2).any(|w| w[0] >= w[1]) {
                return Err(EnvelopeError::InvalidDocument(format!(
                    "{} axis must be finite and strictly increasing",
                    axis.as_str()
                )));
            }
        }
        let expected: usize = axes.iter().map(Vec::len).product();
        if cells.len() != expected {
            return Err(EnvelopeError::InvalidDocument(format!(
                "expected {expected} cells, found {}",
                cells.len()
            )));
        }
        if cells.iter().any(|v| v.is_infinite() || *v < 0.0) {
            return Err(EnvelopeError::InvalidDocument(
                "bandwidth cells must be finite and non-negative".to_string(),
            ));
        }
        stats.missing_cells = cells.iter().filter(|v| v.is_nan()).count();
        Ok(Self {
            axes,
            cells,
            device,
            stats,
        })
    }

    /// Returns the coordinates of one axis.
    #[must_use]
    pub fn axis(&self, axis: Axis) -> &[f64] {
        &self.axes[axis.index()]
    }

    /// Returns the device identifier, if recorded.
    #[must_use]
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Returns the build counters.
    #[must_use]
    pub const fn stats(&self) -> BuildStats {
        self.stats
    }

    /// Returns the number of grid cells.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Returns the raw cell value at axis indices, or `None` when out of range.
    #[must_use]
    pub fn cell(&self, indices: [usize; AXIS_COUNT]) -> Option<f64> {
        if indices.iter().zip(&self.axes).any(|(index, axis)| *index >= axis.len()) {
            return None;
        }
        Some(self.cells[flat_index(&self.axes, indices)])
    }

    /// Iterates measured cells as samples, in row-major order.
    pub fn measured_samples(&self) -> impl Iterator<Item = EnvelopeSample> + '_ {
        let shape = self.axes.each_ref().map(Vec::len);
        (0 .. self.cells.len()).filter_map(move |flat| {
            let value = self.cells[flat];
            if value.is_nan() {
                return None;
            }
            let indices = unflatten(shape, flat);
            let coords = std::array::from_fn(|dim| self.axes[dim][indices[dim]]);
            Some(EnvelopeSample {
                point: EnvelopePoint::from_coords(coords),
                bandwidth_mibs: value,
            })
        })
    }

    /// Interpolates bandwidth at an arbitrary point.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidQuery`] when a coordinate is not finite.
    pub fn query(&self, point: &EnvelopePoint) -> Result<Interpolation, EnvelopeError> {
        let coords = point.coords();
        let mut brackets = [Bracket::default(); AXIS_COUNT];
        let mut clamped = false;
        for (dim, axis) in Axis::ALL.iter().enumerate() {
            let value = coords[dim];
            if !value.is_finite() {
                return Err(EnvelopeError::InvalidQuery {
                    axis: axis.as_str(),
                    value,
                });
            }
            let (bracket, was_clamped) = Bracket::locate(&self.axes[dim], value);
            if was_clamped {
                debug!(axis = axis.as_str(), value, "envelope query clamped to axis bound");
            }
            clamped |= was_clamped;
            brackets[dim] = bracket;
        }

        let mut weighted_sum = 0.0;
        let mut valid_weight = 0.0;
        let mut missing_corners = 0usize;
        for corner in 0 .. (1usize << AXIS_COUNT) {
            let mut indices = [0usize; AXIS_COUNT];
            let mut weight = 1.0;
            let mut duplicate = false;
            for (dim, bracket) in brackets.iter().enumerate() {
                let upper = corner & (1 << dim) != 0;
                if upper && bracket.lo == bracket.hi {
                    duplicate = true;
                    break;
                }
                indices[dim] = if upper { bracket.hi } else { bracket.lo };
                weight *= if upper { bracket.t } else { 1.0 - bracket.t };
            }
            if duplicate || weight <= 0.0 {
                continue;
            }
            let value = self.cells[flat_index(&self.axes, indices)];
            if value.is_nan() {
                missing_corners += 1;
            } else {
                weighted_sum += weight * value;
                valid_weight += weight;
            }
        }

        if valid_weight <= 0.0 {
            warn!(point = ?coords, "degraded envelope cell: no measured neighbours");
            return Ok(Interpolation {
                value: f64::NAN,
                status: CellStatus::Degraded,
                clamped,
            });
        }
        let status = if missing_corners == 0 {
            CellStatus::Complete
        } else {
            CellStatus::Partial {
                missing_corners,
            }
        };
        Ok(Interpolation {
            value: weighted_sum / valid_weight,
            status,
            clamped,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Neighbouring axis indices and the interpolation weight between them.
#[derive(Debug, Clone, Copy, Default)]
struct Bracket {
    /// Lower axis index.
    lo: usize,
    /// Upper axis index (equal to `lo` on an exact hit or at a bound).
    hi: usize,
    /// Fractional position between `lo` and `hi`.
    t: f64,
}

impl Bracket {
    /// Locates `value` on a strictly increasing axis, clamping at the bounds.
    fn locate(axis: &[f64], value: f64) -> (Self, bool) {
        let last = axis.len() - 1;
        if value <= axis[0] {
            return (Self::exact(0), value < axis[0]);
        }
        if value >= axis[last] {
            return (Self::exact(last), value > axis[last]);
        }
        let hi = axis.partition_point(|v| *v <= value);
        let lo = hi - 1;
        if axis[lo] == value {
            return (Self::exact(lo), false);
        }
        let t = (value - axis[lo]) / (axis[hi] - axis[lo]);
        (
            Self {
                lo,
                hi,
                t,
            },
            false,
        )
    }

    /// Bracket collapsed onto a single axis index.
    const fn exact(index: usize) -> Self {
        Self {
            lo: index,
            hi: index,
            t: 0.0,
        }
    }
}

/// Converts axis indices into a row-major cell offset.
fn flat_index(axes: &[Vec<f64>; AXIS_COUNT], indices: [usize; AXIS_COUNT]) -> usize {
    axes.iter().zip(indices).fold(0, |acc, (axis, index)| acc * axis.len() + index)
}

/// Converts a row-major cell offset back into axis indices.
fn unflatten(shape: [usize; AXIS_COUNT], mut flat: usize) -> [usize; AXIS_COUNT] {
    let mut indices = [0usize; AXIS_COUNT];
    for dim in (0 .. AXIS_COUNT).rev() {
        indices[dim] = flat % shape[dim];
        flat /= shape[dim];
    }
    indices
}

// ============================================================================
// SECTION: Tests
// ============================================================================
