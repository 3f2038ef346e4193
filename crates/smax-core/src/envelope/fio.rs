// crates/smax-core/src/envelope/fio.rs
// ============================================================================
// Module: fio Result Ingestion
// Description: Parse fio JSON result files into envelope samples.
// Purpose: Build an envelope grid from a directory of per-cell benchmark runs.
// Dependencies: serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Each grid cell is one fio run whose JSON output is stored as
//! `result_{read_ratio}_{iodepth}_{numjobs}_{block_size_kb}.json`. The cell
//! coordinate comes from the file name; bandwidth is the sum of every job's
//! `read.bw` and `write.bw` (KiB/s) converted to MiB/s.
//!
//! A file that cannot be read or parsed is counted as a failure and skipped.
//! Only a missing directory, an empty batch, or an exhausted [`IoBudget`]
//! aborts the build.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use tracing::info;

use super::grid::EnvelopeError;
use super::grid::EnvelopeGrid;
use super::grid::EnvelopeGridBuilder;
use super::grid::EnvelopePoint;
use super::grid::EnvelopeSample;
use crate::io::IoBoundaryError;
use crate::io::IoBudget;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File name prefix of fio result files.
pub const RESULT_PREFIX: &str = "result_";
/// File name suffix of fio result files.
pub const RESULT_SUFFIX: &str = ".json";
/// KiB per MiB.
const KIB_PER_MIB: f64 = 1024.0;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failure to extract bandwidth from one fio result.
#[derive(Debug, Error)]
pub enum FioParseError {
    /// The text is not valid fio JSON.
    #[error("malformed fio json: {0}")]
    Json(String),
    /// The result lists no jobs.
    #[error("fio result has no jobs")]
    NoJobs,
    /// A job reported a negative or non-finite bandwidth.
    #[error("fio job reported invalid bandwidth {0}")]
    InvalidBandwidth(f64),
}

// ============================================================================
// SECTION: fio Schema
// ============================================================================

/// Subset of the fio JSON output used here.
#[derive(Debug, Deserialize)]
struct FioOutput {
    /// Per-job statistics.
    #[serde(default)]
    jobs: Vec<FioJob>,
}

/// Per-job statistics.
#[derive(Debug, Deserialize)]
struct FioJob {
    /// Read direction statistics.
    #[serde(default)]
    read: FioDirection,
    /// Write direction statistics.
    #[serde(default)]
    write: FioDirection,
}

/// Per-direction statistics.
#[derive(Debug, Default, Deserialize)]
struct FioDirection {
    /// Bandwidth in KiB/s.
    #[serde(default)]
    bw: f64,
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses a result file name into its cell coordinate.
///
/// Block sizes may carry a `k` suffix (`result_70_32_4_4k.json`). Returns
/// `None` for names outside the convention.
#[must_use]
pub fn parse_result_name(name: &str) -> Option<EnvelopePoint> {
    let stem = name.strip_prefix(RESULT_PREFIX)?.strip_suffix(RESULT_SUFFIX)?;
    let mut parts = stem.split('_');
    let read_ratio = parts.next()?.parse::<f64>().ok()?;
    let iodepth = parts.next()?.parse::<f64>().ok()?;
    let numjobs = parts.next()?.parse::<f64>().ok()?;
    let bs = parts.next()?;
    let bs = bs.strip_suffix(['k', 'K']).unwrap_or(bs);
    let block_size_kb = bs.parse::<f64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(EnvelopePoint {
        read_ratio,
        iodepth,
        numjobs,
        block_size_kb,
    })
}

/// Sums read and write bandwidth across all jobs, in MiB/s.
///
/// # Errors
///
/// Returns [`FioParseError`] when the JSON is malformed, has no jobs, or
/// reports an invalid bandwidth.
pub fn parse_fio_bandwidth(text: &str) -> Result<f64, FioParseError> {
    let output: FioOutput =
        serde_json::from_str(text).map_err(|err| FioParseError::Json(err.to_string()))?;
    if output.jobs.is_empty() {
        return Err(FioParseError::NoJobs);
    }
    let mut total_kib = 0.0;
    for job in &output.jobs {
        for bw in [job.read.bw, job.write.bw] {
            if !(bw.is_finite() && bw >= 0.0) {
                return Err(FioParseError::InvalidBandwidth(bw));
            }
            total_kib += bw;
        }
    }
    Ok(total_kib / KIB_PER_MIB)
}

// ============================================================================
// SECTION: Directory Loader
// ============================================================================

/// Lists result files in a directory, sorted by name.
///
/// # Errors
///
/// Returns [`EnvelopeError::NoInputs`] when the directory cannot be listed.
pub fn result_files(dir: &Path) -> Result<Vec<PathBuf>, EnvelopeError> {
    let entries =
        fs::read_dir(dir).map_err(|err| EnvelopeError::NoInputs(format!("{}: {err}", dir.display())))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(RESULT_PREFIX) && name.ends_with(RESULT_SUFFIX))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Builds an envelope grid from every result file in `dir`.
///
/// # Errors
///
/// Returns [`EnvelopeError::NoInputs`] when no result files exist,
/// [`EnvelopeError::NoSamples`] when none parse, or [`EnvelopeError::Io`]
/// when the budget is cancelled or times out.
pub fn load_envelope_dir(
    dir: &Path,
    device: Option<String>,
    budget: &IoBudget,
) -> Result<EnvelopeGrid, EnvelopeError> {
    let files = result_files(dir)?;
    if files.is_empty() {
        return Err(EnvelopeError::NoInputs(dir.display().to_string()));
    }
    info!(dir = %dir.display(), files = files.len(), "loading fio envelope results");

    let mut builder = EnvelopeGridBuilder::new().device(device);
    for path in &files {
        let name = path.file_name().and_then(|name| name.to_str()).unwrap_or_default();
        let Some(point) = parse_result_name(name) else {
            builder.record_failure(&format!("{name}: unrecognised coordinate"));
            continue;
        };
        let text = match budget.read_to_string(path) {
            Ok(text) => text,
            Err(err @ (IoBoundaryError::Cancelled | IoBoundaryError::TimedOut { .. })) => {
                return Err(err.into());
            }
            Err(err) => {
                builder.record_failure(&err.to_string());
                continue;
            }
        };
        match parse_fio_bandwidth(&text) {
            Ok(bandwidth_mibs) => {
                debug!(file = name, bandwidth_mibs, "parsed fio result");
                builder.push(EnvelopeSample {
                    point,
                    bandwidth_mibs,
                });
            }
            Err(err) => builder.record_failure(&format!("{name}: {err}")),
        }
    }
    builder.build()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
