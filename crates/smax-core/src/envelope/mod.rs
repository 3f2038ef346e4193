// crates/smax-core/src/envelope/mod.rs
// ============================================================================
// Module: Device Envelope
// Description: Measured device bandwidth surface and its file formats.
// Purpose: Group grid storage, fio ingestion, and persistence.
// Dependencies: serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! The device envelope maps (read ratio, queue depth, job count, block size)
//! to measured bandwidth. It is built offline from fio results and queried
//! read-only during bound evaluation.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod document;
pub mod fio;
pub mod grid;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use document::ENVELOPE_CSV_HEADER;
pub use document::EnvelopeDocument;
pub use document::EnvelopeMetadata;
pub use document::envelope_csv;
pub use fio::FioParseError;
pub use fio::load_envelope_dir;
pub use fio::parse_fio_bandwidth;
pub use fio::parse_result_name;
pub use grid::Axis;
pub use grid::BuildStats;
pub use grid::CellStatus;
pub use grid::EnvelopeError;
pub use grid::EnvelopeGrid;
pub use grid::EnvelopeGridBuilder;
pub use grid::EnvelopePoint;
pub use grid::EnvelopeSample;
pub use grid::Interpolation;
