// crates/smax-core/src/envelope/document.rs
// ============================================================================
// Module: Envelope Documents
// Description: JSON and CSV persistence for envelope grids.
// Purpose: Round-trip grids through flat files without losing missing cells.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The JSON document carries the four axis vectors, a nested
//! `bandwidth_grid[rho][iodepth][numjobs][bs]`, and build metadata. Missing
//! cells are written as `null`. The CSV export lists measured cells only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use serde::Deserialize;
use serde::Serialize;

use super::grid::AXIS_COUNT;
use super::grid::Axis;
use super::grid::BuildStats;
use super::grid::EnvelopeError;
use super::grid::EnvelopeGrid;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header row of the flat CSV export.
pub const ENVELOPE_CSV_HEADER: &str = "rho_r,iodepth,numjobs,bs_k,bandwidth_mibs";

// ============================================================================
// SECTION: Document Types
// ============================================================================

/// Nested bandwidth cells indexed `[rho][iodepth][numjobs][bs]`.
pub type NestedCells = Vec<Vec<Vec<Vec<Option<f64>>>>>;

/// Build metadata stored alongside the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    /// Device identifier, when known.
    #[serde(default)]
    pub device: Option<String>,
    /// Samples accepted into the grid.
    pub parsed_count: usize,
    /// Samples or files rejected during the build.
    pub failed_count: usize,
    /// Cells with no measurement.
    #[serde(default)]
    pub missing_cells: usize,
}

/// Serialized envelope grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeDocument {
    /// Read-ratio axis (percent).
    pub rho_r_axis: Vec<f64>,
    /// Queue-depth axis.
    pub iodepth_axis: Vec<f64>,
    /// Job-count axis.
    pub numjobs_axis: Vec<f64>,
    /// Block-size axis (KiB).
    pub bs_axis: Vec<f64>,
    /// Bandwidth cells in MiB/s; `null` marks an unmeasured cell.
    pub bandwidth_grid: NestedCells,
    /// Build metadata.
    pub metadata: EnvelopeMetadata,
}

impl EnvelopeDocument {
    /// Captures a grid as a document.
    #[must_use]
    pub fn from_grid(grid: &EnvelopeGrid) -> Self {
        let rho = grid.axis(Axis::ReadRatio);
        let depth = grid.axis(Axis::IoDepth);
        let jobs = grid.axis(Axis::NumJobs);
        let bs = grid.axis(Axis::BlockSize);
        let bandwidth_grid = (0 .. rho.len())
            .map(|r| {
                (0 .. depth.len())
                    .map(|d| {
                        (0 .. jobs.len())
                            .map(|j| {
                                (0 .. bs.len())
                                    .map(|b| grid.cell([r, d, j, b]).filter(|v| !v.is_nan()))
                                    .collect()
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();
        let stats = grid.stats();
        Self {
            rho_r_axis: rho.to_vec(),
            iodepth_axis: depth.to_vec(),
            numjobs_axis: jobs.to_vec(),
            bs_axis: bs.to_vec(),
            bandwidth_grid,
            metadata: EnvelopeMetadata {
                device: grid.device().map(str::to_string),
                parsed_count: stats.parsed_count,
                failed_count: stats.failed_count,
                missing_cells: stats.missing_cells,
            },
        }
    }

    /// Rebuilds the grid described by this document.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidDocument`] when the nested cells do
    /// not match the axis lengths or the axes are malformed.
    pub fn into_grid(self) -> Result<EnvelopeGrid, EnvelopeError> {
        let shape = [
            self.rho_r_axis.len(),
            self.iodepth_axis.len(),
            self.numjobs_axis.len(),
            self.bs_axis.len(),
        ];
        let mut cells = Vec::with_capacity(shape.iter().product());
        check_len("bandwidth_grid", self.bandwidth_grid.len(), shape[0])?;
        for plane in &self.bandwidth_grid {
            check_len("bandwidth_grid[rho]", plane.len(), shape[1])?;
            for row in plane {
                check_len("bandwidth_grid[rho][iodepth]", row.len(), shape[2])?;
                for column in row {
                    check_len("bandwidth_grid[rho][iodepth][numjobs]", column.len(), shape[3])?;
                    cells.extend(column.iter().map(|cell| cell.unwrap_or(f64::NAN)));
                }
            }
        }
        let axes: [Vec<f64>; AXIS_COUNT] =
            [self.rho_r_axis, self.iodepth_axis, self.numjobs_axis, self.bs_axis];
        let stats = BuildStats {
            parsed_count: self.metadata.parsed_count,
            failed_count: self.metadata.failed_count,
            missing_cells: 0,
        };
        EnvelopeGrid::from_parts(axes, cells, self.metadata.device, stats)
    }

    /// Parses a document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidDocument`] when the JSON is malformed.
    pub fn from_json(text: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(text).map_err(|err| EnvelopeError::InvalidDocument(err.to_string()))
    }

    /// Renders the document as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidDocument`] when serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string_pretty(self)
            .map_err(|err| EnvelopeError::InvalidDocument(err.to_string()))
    }
}

/// Renders the measured cells of a grid as flat CSV.
#[must_use]
pub fn envelope_csv(grid: &EnvelopeGrid) -> String {
    let mut out = String::from(ENVELOPE_CSV_HEADER);
    out.push('\n');
    for sample in grid.measured_samples() {
        let p = sample.point;
        let _ = writeln!(
            out,
            "{},{},{},{},{:.3}",
            p.read_ratio, p.iodepth, p.numjobs, p.block_size_kb, sample.bandwidth_mibs
        );
    }
    out
}

/// Checks one nesting level of the bandwidth grid against its axis length.
fn check_len(field: &str, actual: usize, expected: usize) -> Result<(), EnvelopeError> {
    if actual == expected {
        Ok(())
    } else {
        Err(EnvelopeError::InvalidDocument(format!(
            "{field} has {actual} entries, expected {expected}"
        )))
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

    use super::EnvelopeDocument;
    use super::envelope_csv;
    use crate::envelope::EnvelopeGrid;
    use crate::envelope::EnvelopePoint;
    use crate::envelope::EnvelopeSample;

    fn sparse_grid() -> EnvelopeGrid {
        let at = |read_ratio, iodepth, bandwidth_mibs| EnvelopeSample {
            point: EnvelopePoint {
                read_ratio,
                iodepth,
                numjobs: 4.0,
                block_size_kb: 64.0,
            },
            bandwidth_mibs,
        };
        EnvelopeGrid::from_samples([at(0.0, 1.0, 1484.0), at(100.0, 8.0, 2368.0)]).expect("grid")
    }

    #[test]
    fn missing_cells_serialize_as_null() {
        let doc = EnvelopeDocument::from_grid(&sparse_grid());
        let json = serde_json::to_value(&doc).expect("json");
        assert!(json["bandwidth_grid"][0][1][0][0].is_null());
        assert_eq!(json["bandwidth_grid"][0][0][0][0], 1484.0);
        assert_eq!(json["metadata"]["parsed_count"], 2);
        assert_eq!(json["metadata"]["missing_cells"], 2);
        assert_eq!(json["rho_r_axis"], serde_json::json!([0.0, 100.0]));
    }

    #[test]
    fn document_reload_preserves_cells() {
        let grid = sparse_grid();
        let text = EnvelopeDocument::from_grid(&grid).to_json_pretty().expect("render");
        let reloaded = EnvelopeDocument::from_json(&text).expect("parse").into_grid().expect("grid");
        assert_eq!(reloaded.stats(), grid.stats());
        assert!(reloaded.cell([1, 0, 0, 0]).expect("cell").is_nan());
        assert_eq!(reloaded.cell([1, 1, 0, 0]), Some(2368.0));
    }

    #[test]
    fn mismatched_nesting_is_rejected() {
        let mut doc = EnvelopeDocument::from_grid(&sparse_grid());
        doc.bandwidth_grid[0].pop();
        assert!(doc.into_grid().is_err());
    }

    #[test]
    fn csv_lists_measured_cells_only() {
        let csv = envelope_csv(&sparse_grid());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "rho_r,iodepth,numjobs,bs_k,bandwidth_mibs");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "0,1,4,64,1484.000");
        assert_eq!(lines[2], "100,8,4,64,2368.000");
    }
}
