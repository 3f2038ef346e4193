// crates/smax-core/src/lib.rs
// ============================================================================
// Module: S_max Core Library
// Description: Analytical model of sustainable LSM-tree put throughput.
// Purpose: Predict the maximum put rate from a device envelope and WAF data.
// Dependencies: regex, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! `smax-core` predicts the maximum sustainable put rate of a RocksDB-style
//! LSM tree without running the workload. Inputs are a measured device
//! envelope ([`EnvelopeGrid`]) and write-amplification characteristics
//! ([`WafReport`]); the output is a [`Prediction`] carrying every intermediate
//! bound.
//!
//! Invariants:
//! - Missing envelope measurements are `NaN` and never read as zero bandwidth.
//! - A zero demand denominator yields `+inf`, never an error.
//! - `s_max` is the minimum of all candidate bounds and every bound tied with
//!   it is named in the bottleneck set.
//! - The level capacity approximation and heuristic stall mode are always
//!   labelled in results.
//!
//! All evaluation is pure and synchronous; types are `Send + Sync` so a built
//! grid can be queried from many threads.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bounds;
pub mod device;
pub mod envelope;
pub mod io;
pub mod levels;
pub mod predict;
pub mod stall;
pub mod waf;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bounds::Bottleneck;
pub use bounds::BoundError;
pub use bounds::BoundInputs;
pub use bounds::BoundResult;
pub use bounds::DEFAULT_ETA;
pub use bounds::DEFAULT_KV_SIZE_BYTES;
pub use bounds::DEFAULT_WAL_FACTOR;
pub use bounds::Demand;
pub use bounds::compute_bounds;
pub use bounds::mibs_to_ops;
pub use device::DeviceDerivation;
pub use device::DeviceError;
pub use device::DeviceProfile;
pub use device::OperatingPoint;
pub use envelope::EnvelopeDocument;
pub use envelope::EnvelopeError;
pub use envelope::EnvelopeGrid;
pub use envelope::EnvelopePoint;
pub use envelope::Interpolation;
pub use envelope::load_envelope_dir;
pub use io::IoBoundaryError;
pub use io::IoBudget;
pub use levels::CapacityBasis;
pub use levels::CompactionLevelStat;
pub use levels::LevelBound;
pub use levels::LevelError;
pub use levels::LevelProfile;
pub use levels::level_bound;
pub use predict::PredictError;
pub use predict::Prediction;
pub use predict::PredictionInputs;
pub use predict::predict;
pub use stall::StallError;
pub use stall::StallEstimate;
pub use stall::StallParams;
pub use stall::estimate_stall;
pub use waf::WafError;
pub use waf::WafReport;
pub use waf::analyze_log_file;
