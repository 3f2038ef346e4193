// crates/smax-config/src/config.rs
// ============================================================================
// Module: S_max Configuration
// Description: Configuration loading and validation for the S_max model.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: smax-core, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every numeric range is checked once at load time; model components still
//! re-check their own inputs at their API boundary. Unknown keys are rejected
//! so a misspelt parameter never silently falls back to a default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use smax_core::CapacityBasis;
use smax_core::DEFAULT_ETA;
use smax_core::DEFAULT_KV_SIZE_BYTES;
use smax_core::DEFAULT_WAL_FACTOR;
use smax_core::IoBudget;
use smax_core::OperatingPoint;
use smax_core::io::DEFAULT_MAX_FILE_BYTES;
use smax_core::stall::DEFAULT_L0_THRESHOLD;
use smax_core::stall::DEFAULT_MAX_STALL_FRACTION;
use smax_core::stall::DEFAULT_STEEPNESS;
use smax_core::waf::DEFAULT_MASS_BALANCE_TOLERANCE;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "smax.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SMAX_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound on `io.max_file_bytes`.
pub(crate) const MAX_IO_FILE_BYTES: usize = 1024 * 1024 * 1024;
/// Upper bound on `io.timeout_ms` (one hour).
pub(crate) const MAX_IO_TIMEOUT_MS: u64 = 3_600_000;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root configuration for `smax`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmaxConfig {
    /// Workload parameters.
    #[serde(default)]
    pub model: ModelConfig,
    /// Device bandwidth source.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Per-level model inputs.
    #[serde(default)]
    pub levels: LevelsConfig,
    /// Stall model selection.
    #[serde(default)]
    pub stall: StallConfig,
    /// WAF analysis settings.
    #[serde(default)]
    pub waf: WafConfig,
    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,
    /// File I/O limits.
    #[serde(default)]
    pub io: IoConfig,
}

impl SmaxConfig {
    /// Loads configuration from disk using the default resolution rules:
    /// explicit path, then [`CONFIG_ENV_VAR`], then `./smax.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        Self::load_resolved(&resolved.path)
    }

    /// Loads configuration like [`SmaxConfig::load`], but returns defaults
    /// when no path was given and the default file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an explicitly requested file is missing
    /// or any file fails to load or validate.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        if !resolved.explicit && !resolved.path.exists() {
            return Ok(Self::default());
        }
        Self::load_resolved(&resolved.path)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a resolved path.
    fn load_resolved(path: &Path) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;
        self.device.validate()?;
        self.levels.validate()?;
        self.stall.validate()?;
        self.waf.validate()?;
        self.output.validate()?;
        self.io.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Model Config
// ============================================================================

/// Workload parameters for the bound calculator.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Compression ratio in `(0, 1]`.
    #[serde(default)]
    pub cr: Option<f64>,
    /// Write amplification, at least 1. Taken from the WAF report when unset.
    #[serde(default)]
    pub wa: Option<f64>,
    /// Read weight in the mixed bound.
    #[serde(default = "default_eta")]
    pub eta: f64,
    /// WAL bytes per user byte.
    #[serde(default = "default_wal_factor")]
    pub wal_factor: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            cr: None,
            wa: None,
            eta: default_eta(),
            wal_factor: default_wal_factor(),
        }
    }
}

impl ModelConfig {
    /// Validates model parameters.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(cr) = self.cr {
            check(cr.is_finite() && cr > 0.0 && cr <= 1.0, "model.cr must be in (0, 1]")?;
        }
        if let Some(wa) = self.wa {
            check(wa.is_finite() && wa >= 1.0, "model.wa must be >= 1")?;
        }
        check(self.eta.is_finite() && self.eta >= 0.0, "model.eta must be >= 0")?;
        check(
            self.wal_factor.is_finite() && self.wal_factor >= 0.0,
            "model.wal_factor must be >= 0",
        )
    }
}

// ============================================================================
// SECTION: Device Config
// ============================================================================

/// Device bandwidth source: explicit values or an envelope lookup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Pure-write bandwidth in MiB/s.
    #[serde(default)]
    pub b_w: Option<f64>,
    /// Pure-read bandwidth in MiB/s.
    #[serde(default)]
    pub b_r: Option<f64>,
    /// Mixed bandwidth in MiB/s.
    #[serde(default)]
    pub b_eff: Option<f64>,
    /// Envelope JSON document to derive bandwidths from.
    #[serde(default)]
    pub envelope: Option<PathBuf>,
    /// Queue depth of the workload.
    #[serde(default)]
    pub iodepth: Option<f64>,
    /// Job count of the workload.
    #[serde(default)]
    pub numjobs: Option<f64>,
    /// Block size of the workload in KiB.
    #[serde(default)]
    pub block_size_kb: Option<f64>,
    /// Observed read percentage for `B_eff`; implied by demand when unset.
    #[serde(default)]
    pub read_ratio: Option<f64>,
}

impl DeviceConfig {
    /// Returns the envelope operating point when all coordinates are set.
    #[must_use]
    pub const fn operating_point(&self) -> Option<OperatingPoint> {
        match (self.iodepth, self.numjobs, self.block_size_kb) {
            (Some(iodepth), Some(numjobs), Some(block_size_kb)) => Some(OperatingPoint {
                iodepth,
                numjobs,
                block_size_kb,
            }),
            _ => None,
        }
    }

    /// Validates device settings.
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("b_w", self.b_w), ("b_r", self.b_r), ("b_eff", self.b_eff)] {
            if let Some(value) = value {
                check(
                    value.is_finite() && value >= 0.0,
                    &format!("device.{name} must be finite and >= 0"),
                )?;
            }
        }
        for (name, value) in
            [("iodepth", self.iodepth), ("numjobs", self.numjobs), ("block_size_kb", self.block_size_kb)]
        {
            if let Some(value) = value {
                check(value.is_finite() && value > 0.0, &format!("device.{name} must be > 0"))?;
            }
        }
        if let Some(read_ratio) = self.read_ratio {
            check(
                read_ratio.is_finite() && (0.0 ..= 100.0).contains(&read_ratio),
                "device.read_ratio must be within [0, 100]",
            )?;
        }
        if let Some(envelope) = &self.envelope {
            validate_path_string("device.envelope", &envelope.to_string_lossy())?;
            if self.operating_point().is_none() {
                return Err(ConfigError::Invalid(
                    "device.envelope requires iodepth, numjobs, and block_size_kb".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Levels Config
// ============================================================================

/// Per-level model inputs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelsConfig {
    /// Engine log supplying the compaction table and stall ratio.
    #[serde(default)]
    pub log: Option<PathBuf>,
    /// Bandwidth used as total level capacity.
    #[serde(default)]
    pub capacity_basis: CapacityBasis,
}

impl LevelsConfig {
    /// Validates level settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(log) = &self.log {
            validate_path_string("levels.log", &log.to_string_lossy())?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Stall Config
// ============================================================================

/// Stall model selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallModeSetting {
    /// Measured ratio when available, otherwise no discount.
    #[default]
    Auto,
    /// No discount.
    None,
    /// Logistic curve over L0 file count.
    Logistic,
    /// Measured or configured stall ratio.
    Empirical,
}

/// Stall model settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StallConfig {
    /// Model selection.
    #[serde(default)]
    pub mode: StallModeSetting,
    /// Logistic midpoint in L0 files.
    #[serde(default = "default_l0_threshold")]
    pub l0_threshold: f64,
    /// Logistic steepness.
    #[serde(default = "default_steepness")]
    pub steepness: f64,
    /// Cap on the logistic stall fraction.
    #[serde(default = "default_max_stall_fraction")]
    pub max_stall_fraction: f64,
    /// L0 file count override for the logistic mode.
    #[serde(default)]
    pub l0_files: Option<f64>,
    /// Stall percentage override for the empirical mode.
    #[serde(default)]
    pub stall_percent: Option<f64>,
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            mode: StallModeSetting::default(),
            l0_threshold: default_l0_threshold(),
            steepness: default_steepness(),
            max_stall_fraction: default_max_stall_fraction(),
            l0_files: None,
            stall_percent: None,
        }
    }
}

impl StallConfig {
    /// Validates stall settings.
    fn validate(&self) -> Result<(), ConfigError> {
        check(
            self.l0_threshold.is_finite() && self.l0_threshold >= 0.0,
            "stall.l0_threshold must be >= 0",
        )?;
        check(self.steepness.is_finite() && self.steepness > 0.0, "stall.steepness must be > 0")?;
        check(
            self.max_stall_fraction.is_finite() && (0.0 ..= 1.0).contains(&self.max_stall_fraction),
            "stall.max_stall_fraction must be within [0, 1]",
        )?;
        if let Some(files) = self.l0_files {
            check(files.is_finite() && files >= 0.0, "stall.l0_files must be >= 0")?;
        }
        if let Some(percent) = self.stall_percent {
            check(
                percent.is_finite() && (0.0 ..= 100.0).contains(&percent),
                "stall.stall_percent must be within [0, 100]",
            )?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: WAF Config
// ============================================================================

/// WAF analysis settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WafConfig {
    /// Relative mass-balance tolerance (0.10 = 10%).
    #[serde(default = "default_mass_balance_tolerance")]
    pub mass_balance_tolerance: f64,
}

impl Default for WafConfig {
    fn default() -> Self {
        Self {
            mass_balance_tolerance: default_mass_balance_tolerance(),
        }
    }
}

impl WafConfig {
    /// Validates WAF settings.
    fn validate(&self) -> Result<(), ConfigError> {
        check(
            self.mass_balance_tolerance.is_finite()
                && (0.0 ..= 1.0).contains(&self.mass_balance_tolerance),
            "waf.mass_balance_tolerance must be within [0, 1]",
        )
    }
}

// ============================================================================
// SECTION: Output Config
// ============================================================================

/// Output rendering format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Output settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Key-value size for ops/sec conversion.
    #[serde(default = "default_kv_size_bytes")]
    pub kv_size_bytes: u32,
    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            kv_size_bytes: default_kv_size_bytes(),
            format: OutputFormat::default(),
        }
    }
}

impl OutputConfig {
    /// Validates output settings.
    fn validate(&self) -> Result<(), ConfigError> {
        check(self.kv_size_bytes > 0, "output.kv_size_bytes must be > 0")
    }
}

// ============================================================================
// SECTION: I/O Config
// ============================================================================

/// File I/O limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoConfig {
    /// Maximum bytes read from any single input file.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
    /// Deadline for a whole command's file reads, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            timeout_ms: None,
        }
    }
}

impl IoConfig {
    /// Builds an I/O budget starting now.
    #[must_use]
    pub fn budget(&self) -> IoBudget {
        let budget = IoBudget::default().with_max_file_bytes(self.max_file_bytes);
        match self.timeout_ms {
            Some(ms) => budget.with_timeout(Duration::from_millis(ms)),
            None => budget,
        }
    }

    /// Validates I/O limits.
    fn validate(&self) -> Result<(), ConfigError> {
        check(
            (1 ..= MAX_IO_FILE_BYTES).contains(&self.max_file_bytes),
            "io.max_file_bytes must be within [1, 1073741824]",
        )?;
        if let Some(ms) = self.timeout_ms {
            check((1 ..= MAX_IO_TIMEOUT_MS).contains(&ms), "io.timeout_ms must be within [1, 3600000]")?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default read weight.
const fn default_eta() -> f64 {
    DEFAULT_ETA
}

/// Default WAL factor.
const fn default_wal_factor() -> f64 {
    DEFAULT_WAL_FACTOR
}

/// Default logistic midpoint.
const fn default_l0_threshold() -> f64 {
    DEFAULT_L0_THRESHOLD
}

/// Default logistic steepness.
const fn default_steepness() -> f64 {
    DEFAULT_STEEPNESS
}

/// Default logistic cap.
const fn default_max_stall_fraction() -> f64 {
    DEFAULT_MAX_STALL_FRACTION
}

/// Default mass-balance tolerance.
const fn default_mass_balance_tolerance() -> f64 {
    DEFAULT_MASS_BALANCE_TOLERANCE
}

/// Default key-value size.
const fn default_kv_size_bytes() -> u32 {
    DEFAULT_KV_SIZE_BYTES
}

/// Default per-file read limit.
const fn default_max_file_bytes() -> usize {
    DEFAULT_MAX_FILE_BYTES
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// A config path and whether the caller asked for it.
struct ResolvedPath {
    /// Path to load.
    path: PathBuf,
    /// True when taken from the argument or the environment.
    explicit: bool,
}

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<ResolvedPath, ConfigError> {
    if let Some(path) = path {
        return Ok(ResolvedPath {
            path: path.to_path_buf(),
            explicit: true,
        });
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(ResolvedPath {
            path: PathBuf::from(env_path),
            explicit: true,
        });
    }
    Ok(ResolvedPath {
        path: PathBuf::from(DEFAULT_CONFIG_NAME),
        explicit: false,
    })
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Fails with [`ConfigError::Invalid`] carrying `message` unless `ok`.
fn check(ok: bool, message: &str) -> Result<(), ConfigError> {
    if ok { Ok(()) } else { Err(ConfigError::Invalid(message.to_string())) }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
