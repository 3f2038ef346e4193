// crates/smax-core/src/waf/mod.rs
// ============================================================================
// Module: WAF Analyzer
// Description: Write-amplification analysis of engine logs.
// Purpose: Produce WA and per-level inputs for the bound models.
// Dependencies: regex, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! The analyzer parses engine log text into byte counters and a per-level
//! compaction table, then derives WAF estimators, a mass-balance check, and
//! per-level statistics. Only a missing user-byte counter or an exhausted
//! I/O budget is fatal; everything else degrades to warnings and counters.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod analysis;
pub mod log;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use thiserror::Error;

use crate::io::IoBoundaryError;
use crate::io::IoBudget;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use analysis::DEFAULT_MASS_BALANCE_TOLERANCE;
pub use analysis::LEVELS_CSV_HEADER;
pub use analysis::MassBalanceCheck;
pub use analysis::MassBalanceStatus;
pub use analysis::ResolvedCounters;
pub use analysis::WafEstimates;
pub use analysis::WafReport;
pub use analysis::WafSummary;
pub use analysis::analyze_counters;
pub use analysis::analyze_log;
pub use log::EngineCounters;
pub use log::LevelRow;
pub use log::LogParser;
pub use log::ParsedLog;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// WAF analysis errors.
#[derive(Debug, Error)]
pub enum WafError {
    /// A built-in line pattern failed to compile.
    #[error("log pattern failed to compile: {0}")]
    Pattern(String),
    /// No user byte counter was found, so WAF is undefined.
    #[error("log has no user bytes written counter; WAF is undefined")]
    MissingUserBytes,
    /// Mass-balance tolerance is negative or non-finite.
    #[error("invalid mass-balance tolerance {0}")]
    InvalidTolerance(f64),
    /// Bounded I/O failure.
    #[error(transparent)]
    Io(#[from] IoBoundaryError),
}

// ============================================================================
// SECTION: File Entry Point
// ============================================================================

/// Reads, parses, and analyzes a log file.
///
/// # Errors
///
/// Returns [`WafError`] when the file cannot be read within the budget or the
/// log lacks user byte counters.
pub fn analyze_log_file(
    path: &Path,
    budget: &IoBudget,
    tolerance: f64,
) -> Result<WafReport, WafError> {
    let text = budget.read_to_string(path)?;
    let parsed = LogParser::new()?.parse(&text);
    analyze_log(&parsed, tolerance)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
