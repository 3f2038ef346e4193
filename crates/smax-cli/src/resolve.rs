// crates/smax-cli/src/resolve.rs
// ============================================================================
// Module: CLI Input Resolution
// Description: Merge command-line flags over configuration values.
// Purpose: Produce validated model inputs for the bound and predict commands.
// Dependencies: clap, serde, smax-config, smax-core, tracing
// ============================================================================

//! ## Overview
//! Flags always win over `smax.toml`, which wins over built-in defaults.
//! Workload parameters are validated before any device lookup so invalid
//! input is rejected before the first division.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use clap::Args;
use clap::ValueEnum;
use serde::Serialize;
use smax_config::SmaxConfig;
use smax_config::StallModeSetting;
use smax_core::BoundInputs;
use smax_core::CapacityBasis;
use smax_core::Demand;
use smax_core::DeviceDerivation;
use smax_core::DeviceProfile;
use smax_core::EnvelopeDocument;
use smax_core::EnvelopeGrid;
use smax_core::IoBudget;
use smax_core::OperatingPoint;
use smax_core::StallParams;
use smax_core::WafReport;
use tracing::debug;

use crate::CliError;
use crate::CliResult;

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// Workload and device flags shared by `bound` and `predict`.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct ModelArgs {
    /// Compression ratio in (0, 1].
    #[arg(long)]
    pub(crate) cr: Option<f64>,
    /// Write amplification (>= 1).
    #[arg(long)]
    pub(crate) wa: Option<f64>,
    /// Read weight in the mixed bound.
    #[arg(long)]
    pub(crate) eta: Option<f64>,
    /// WAL bytes written per user byte.
    #[arg(long = "wal-factor")]
    pub(crate) wal_factor: Option<f64>,
    /// Pure-write bandwidth in MiB/s.
    #[arg(long = "b-w")]
    pub(crate) b_w: Option<f64>,
    /// Pure-read bandwidth in MiB/s.
    #[arg(long = "b-r")]
    pub(crate) b_r: Option<f64>,
    /// Mixed bandwidth in MiB/s.
    #[arg(long = "b-eff")]
    pub(crate) b_eff: Option<f64>,
    /// Envelope JSON to derive bandwidths from.
    #[arg(long, value_name = "PATH")]
    pub(crate) envelope: Option<PathBuf>,
    /// Workload queue depth for envelope lookups.
    #[arg(long)]
    pub(crate) iodepth: Option<f64>,
    /// Workload job count for envelope lookups.
    #[arg(long)]
    pub(crate) numjobs: Option<f64>,
    /// Workload block size in KiB for envelope lookups.
    #[arg(long = "bs")]
    pub(crate) block_size_kb: Option<f64>,
    /// Observed read percentage (0-100) for B_eff.
    #[arg(long = "read-ratio")]
    pub(crate) read_ratio: Option<f64>,
    /// Key-value size in bytes for ops/sec conversion.
    #[arg(long = "kv-size")]
    pub(crate) kv_size_bytes: Option<u32>,
}

/// Stall model flag values.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StallModeArg {
    /// Measured ratio when available.
    Auto,
    /// No stall discount.
    None,
    /// Logistic curve over L0 file count (uncalibrated).
    Logistic,
    /// Measured stall ratio.
    Empirical,
}

impl From<StallModeArg> for StallModeSetting {
    fn from(value: StallModeArg) -> Self {
        match value {
            StallModeArg::Auto => Self::Auto,
            StallModeArg::None => Self::None,
            StallModeArg::Logistic => Self::Logistic,
            StallModeArg::Empirical => Self::Empirical,
        }
    }
}

/// Level capacity flag values.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CapacityArg {
    /// Mixed bandwidth B_eff.
    Mixed,
    /// Pure-write bandwidth B_w.
    Write,
}

impl From<CapacityArg> for CapacityBasis {
    fn from(value: CapacityArg) -> Self {
        match value {
            CapacityArg::Mixed => Self::Mixed,
            CapacityArg::Write => Self::Write,
        }
    }
}

/// Stall flags for `predict`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StallOverrides {
    /// Mode override.
    pub(crate) mode: Option<StallModeArg>,
    /// L0 file count override.
    pub(crate) l0_files: Option<f64>,
    /// Stall percentage override.
    pub(crate) stall_percent: Option<f64>,
}

// ============================================================================
// SECTION: Resolved Model
// ============================================================================

/// Where device bandwidths came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum DeviceSource {
    /// All three bandwidths were given.
    Explicit,
    /// B_eff was derived from B_w and B_r by harmonic combination.
    Harmonic,
    /// All three bandwidths were looked up in an envelope.
    Envelope,
}

/// Where write amplification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum WaSource {
    /// `--wa` flag.
    Flag,
    /// `model.wa` in the config file.
    Config,
    /// Total WAF measured from an engine log.
    Log,
}

/// Validated inputs for one bound evaluation.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ResolvedModel {
    /// Bound calculator inputs.
    pub(crate) inputs: BoundInputs,
    /// Bandwidth provenance.
    pub(crate) device_source: DeviceSource,
    /// Write amplification provenance.
    pub(crate) wa_source: WaSource,
    /// Envelope lookups, when the envelope was used.
    pub(crate) derivation: Option<DeviceDerivation>,
    /// Key-value size for ops/sec.
    pub(crate) kv_size_bytes: u32,
}

/// Resolves workload and device inputs.
///
/// `wa_log` supplies a measured WA used only when neither flag nor config
/// sets it.
pub(crate) fn resolve_model(
    args: &ModelArgs,
    config: &SmaxConfig,
    budget: &IoBudget,
    wa_log: Option<f64>,
) -> CliResult<ResolvedModel> {
    let cr = args.cr.or(config.model.cr).ok_or_else(|| missing("cr", "--cr"))?;
    let (wa, wa_source) = match (args.wa, config.model.wa, wa_log) {
        (Some(wa), _, _) => (wa, WaSource::Flag),
        (None, Some(wa), _) => (wa, WaSource::Config),
        (None, None, Some(wa)) => (wa, WaSource::Log),
        (None, None, None) => return Err(missing("wa", "--wa")),
    };
    let mut inputs = BoundInputs {
        cr,
        wa,
        device: DeviceProfile {
            b_w: 0.0,
            b_r: 0.0,
            b_eff: 0.0,
        },
        eta: args.eta.unwrap_or(config.model.eta),
        wal_factor: args.wal_factor.unwrap_or(config.model.wal_factor),
    };
    inputs.validate().map_err(|err| CliError::new(err.to_string()))?;

    let kv_size_bytes = args.kv_size_bytes.unwrap_or(config.output.kv_size_bytes);
    if kv_size_bytes == 0 {
        return Err(CliError::new("kv size must be > 0".to_string()));
    }

    let device = &config.device;
    let b_w = args.b_w.or(device.b_w);
    let b_r = args.b_r.or(device.b_r);
    let b_eff = args.b_eff.or(device.b_eff);
    let read_ratio = args.read_ratio.or(device.read_ratio);
    let envelope = args.envelope.clone().or_else(|| device.envelope.clone());
    let wal_factor = inputs.wal_factor;
    let implied_ratio = || Demand::new(cr, wa, wal_factor).implied_read_ratio();

    let (profile, device_source, derivation) = match (b_w, b_r, b_eff, envelope) {
        (Some(b_w), Some(b_r), Some(b_eff), _) => {
            let profile = DeviceProfile::new(b_w, b_r, b_eff)
                .map_err(|err| CliError::new(err.to_string()))?;
            (profile, DeviceSource::Explicit, None)
        }
        (_, _, _, Some(path)) => {
            let point = OperatingPoint {
                iodepth: args.iodepth.or(device.iodepth).ok_or_else(|| missing("iodepth", "--iodepth"))?,
                numjobs: args.numjobs.or(device.numjobs).ok_or_else(|| missing("numjobs", "--numjobs"))?,
                block_size_kb: args
                    .block_size_kb
                    .or(device.block_size_kb)
                    .ok_or_else(|| missing("block_size_kb", "--bs"))?,
            };
            let grid = load_envelope(&path, budget)?;
            let ratio = read_ratio.unwrap_or_else(implied_ratio);
            debug!(read_ratio = ratio, "deriving device profile from envelope");
            let derived = DeviceProfile::from_envelope(&grid, &point, ratio)
                .map_err(|err| CliError::new(err.to_string()))?;
            (derived.profile, DeviceSource::Envelope, Some(derived))
        }
        (Some(b_w), Some(b_r), None, None) => {
            let fraction = read_ratio.unwrap_or_else(implied_ratio) / 100.0;
            let profile =
                DeviceProfile::harmonic(b_w, b_r, fraction).map_err(|err| CliError::new(err.to_string()))?;
            (profile, DeviceSource::Harmonic, None)
        }
        _ => {
            return Err(CliError::new(
                "device bandwidths required: pass --b-w, --b-r and --b-eff, or --envelope with \
                 --iodepth, --numjobs and --bs"
                    .to_string(),
            ));
        }
    };
    inputs.device = profile;
    Ok(ResolvedModel {
        inputs,
        device_source,
        wa_source,
        derivation,
        kv_size_bytes,
    })
}

/// Loads an envelope JSON document into a grid.
pub(crate) fn load_envelope(path: &Path, budget: &IoBudget) -> CliResult<EnvelopeGrid> {
    let text = budget
        .read_to_string(path)
        .map_err(|err| CliError::new(format!("failed to read envelope: {err}")))?;
    EnvelopeDocument::from_json(&text)
        .and_then(EnvelopeDocument::into_grid)
        .map_err(|err| CliError::new(format!("invalid envelope {}: {err}", path.display())))
}

// ============================================================================
// SECTION: Stall Resolution
// ============================================================================

/// Resolves the stall model for `predict`.
pub(crate) fn resolve_stall(
    overrides: StallOverrides,
    config: &SmaxConfig,
    report: Option<&WafReport>,
) -> CliResult<Option<StallParams>> {
    let settings = &config.stall;
    let mode = overrides.mode.map_or(settings.mode, StallModeSetting::from);
    let measured = overrides
        .stall_percent
        .or(settings.stall_percent)
        .map(|percent| percent / 100.0)
        .or_else(|| report.and_then(|report| report.stall_ratio));
    let l0_files = overrides.l0_files.or(settings.l0_files).or_else(|| {
        report
            .and_then(|report| report.l0_files)
            .map(|files| f64::from(u32::try_from(files).unwrap_or(u32::MAX)))
    });
    match mode {
        StallModeSetting::None => Ok(None),
        StallModeSetting::Auto => Ok(measured.map(|observed_stall_ratio| StallParams::Empirical {
            observed_stall_ratio,
        })),
        StallModeSetting::Empirical => {
            let observed_stall_ratio = measured.ok_or_else(|| {
                CliError::new(
                    "empirical stall mode needs --stall-percent or a log with a Cumulative stall line"
                        .to_string(),
                )
            })?;
            Ok(Some(StallParams::Empirical {
                observed_stall_ratio,
            }))
        }
        StallModeSetting::Logistic => {
            let l0_files = l0_files.ok_or_else(|| {
                CliError::new("logistic stall mode needs --l0-files or a log with a level table".to_string())
            })?;
            Ok(Some(StallParams::Logistic {
                l0_threshold: settings.l0_threshold,
                steepness: settings.steepness,
                max_stall_fraction: settings.max_stall_fraction,
                l0_files,
            }))
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Error for a parameter set by neither flag nor config.
fn missing(name: &str, flag: &str) -> CliError {
    CliError::new(format!("missing required parameter {name}: pass {flag} or set it in smax.toml"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
