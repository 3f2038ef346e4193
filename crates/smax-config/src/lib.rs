// crates/smax-config/src/lib.rs
// ============================================================================
// Module: S_max Config Library
// Description: Canonical config model and validation for `smax.toml`.
// Purpose: Single source of truth for configuration semantics.
// Dependencies: smax-core, serde, toml
// ============================================================================

//! ## Overview
//! `smax-config` defines the configuration model for the `smax` CLI. It
//! provides strict, fail-closed validation and a canonical example file.
//! Values are resolved once and passed by value into model components.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
