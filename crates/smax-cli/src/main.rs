// crates/smax-cli/src/main.rs
// ============================================================================
// Module: S_max CLI Entry Point
// Description: Command dispatcher for envelope, bound, WAF, and predict tasks.
// Purpose: Expose the S_max model as a scriptable command-line tool.
// Dependencies: clap, serde, serde_json, smax-config, smax-core, thiserror,
//               tracing, tracing-subscriber
// ============================================================================

//! ## Overview
//! `smax` builds device envelopes from fio results, evaluates put-rate
//! bounds, analyzes engine logs for write amplification, and composes the
//! end-to-end prediction. Results go to stdout as text or JSON; diagnostics
//! go to stderr through `tracing`.
//!
//! Exit codes:
//! - `0`: success.
//! - `1`: malformed input, invalid parameters, or any hard failure.
//! - `2`: completed, but the WAF mass balance exceeded its tolerance.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;
mod render;
mod resolve;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use serde::Serialize;
use smax_config::OutputFormat;
use smax_config::SmaxConfig;
use smax_config::config_toml_example;
use smax_core::BoundInputs;
use smax_core::BoundResult;
use smax_core::DeviceDerivation;
use smax_core::EnvelopeDocument;
use smax_core::EnvelopePoint;
use smax_core::IoBudget;
use smax_core::Prediction;
use smax_core::PredictionInputs;
use smax_core::WafReport;
use smax_core::bounds::serialize_rate;
use smax_core::compute_bounds;
use smax_core::envelope::envelope_csv;
use smax_core::load_envelope_dir;
use smax_core::mibs_to_ops;
use smax_core::predict;
use smax_core::waf::MassBalanceStatus;
use smax_core::waf::WafSummary;
use thiserror::Error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::resolve::CapacityArg;
use crate::resolve::DeviceSource;
use crate::resolve::ModelArgs;
use crate::resolve::StallModeArg;
use crate::resolve::StallOverrides;
use crate::resolve::load_envelope;
use crate::resolve::resolve_model;
use crate::resolve::resolve_stall;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Exit code for a completed run with a mass-balance warning.
const EXIT_MASS_BALANCE_WARNING: u8 = 2;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "smax", version, about = "Predict sustainable LSM-tree put throughput")]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Config file (overrides `SMAX_CONFIG` and `./smax.toml`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Diagnostic verbosity on stderr (`RUST_LOG` takes precedence).
    #[arg(long, value_enum, default_value_t = LogLevelArg::Warn, global = true)]
    log_level: LogLevelArg,
    /// Output format (overrides `output.format`).
    #[arg(long, value_enum, global = true)]
    format: Option<FormatArg>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Device envelope utilities.
    Envelope {
        /// Selected envelope subcommand.
        #[command(subcommand)]
        command: EnvelopeCommand,
    },
    /// Evaluate write, read, and mixed put-rate bounds.
    Bound(BoundCommand),
    /// Write-amplification utilities.
    Waf {
        /// Selected WAF subcommand.
        #[command(subcommand)]
        command: WafCommand,
    },
    /// Full prediction: bounds, level bound, and stall discount.
    Predict(PredictCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Envelope subcommands.
#[derive(Subcommand, Debug)]
enum EnvelopeCommand {
    /// Build an envelope from a directory of fio result files.
    Build(EnvelopeBuildCommand),
    /// Interpolate bandwidth at a point.
    Query(EnvelopeQueryCommand),
}

/// Arguments for `envelope build`.
#[derive(Args, Debug)]
struct EnvelopeBuildCommand {
    /// Directory holding `result_{rho}_{iodepth}_{numjobs}_{bs}.json` files.
    #[arg(long, value_name = "DIR")]
    dir: PathBuf,
    /// Output path for the envelope JSON document.
    #[arg(long, value_name = "PATH")]
    out: PathBuf,
    /// Optional output path for the flat CSV export.
    #[arg(long, value_name = "PATH")]
    csv: Option<PathBuf>,
    /// Device identifier recorded in the metadata.
    #[arg(long)]
    device: Option<String>,
}

/// Arguments for `envelope query`.
#[derive(Args, Debug)]
struct EnvelopeQueryCommand {
    /// Envelope JSON document.
    #[arg(long, value_name = "PATH")]
    envelope: PathBuf,
    /// Read percentage (0-100).
    #[arg(long)]
    rho: f64,
    /// Queue depth.
    #[arg(long)]
    iodepth: f64,
    /// Job count.
    #[arg(long)]
    numjobs: f64,
    /// Block size in KiB.
    #[arg(long = "bs")]
    block_size_kb: f64,
}

/// Arguments for `bound`.
#[derive(Args, Debug)]
struct BoundCommand {
    /// Workload and device inputs.
    #[command(flatten)]
    model: ModelArgs,
}

/// WAF subcommands.
#[derive(Subcommand, Debug)]
enum WafCommand {
    /// Analyze an engine LOG file.
    Analyze(WafAnalyzeCommand),
}

/// Arguments for `waf analyze`.
#[derive(Args, Debug)]
struct WafAnalyzeCommand {
    /// Engine LOG file.
    #[arg(long, value_name = "PATH")]
    log: PathBuf,
    /// Mass-balance tolerance (0.10 = 10%).
    #[arg(long)]
    tolerance: Option<f64>,
    /// Optional output path for the per-level CSV.
    #[arg(long, value_name = "PATH")]
    csv: Option<PathBuf>,
}

/// Arguments for `predict`.
#[derive(Args, Debug)]
struct PredictCommand {
    /// Workload and device inputs.
    #[command(flatten)]
    model: ModelArgs,
    /// Engine LOG supplying WA, level statistics, and stall ratio.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,
    /// Mass-balance tolerance for the log analysis.
    #[arg(long)]
    tolerance: Option<f64>,
    /// Bandwidth used as total level capacity.
    #[arg(long = "capacity-basis", value_enum)]
    capacity_basis: Option<CapacityArg>,
    /// Stall model.
    #[arg(long = "stall-mode", value_enum)]
    stall_mode: Option<StallModeArg>,
    /// L0 file count for the logistic stall model.
    #[arg(long = "l0-files")]
    l0_files: Option<f64>,
    /// Measured stall percentage (0-100).
    #[arg(long = "stall-percent")]
    stall_percent: Option<f64>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate the resolved configuration file.
    Validate,
    /// Print a canonical example `smax.toml`.
    Example,
}

/// Output format flag values.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum FormatArg {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Log level flag values.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevelArg {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Progress information.
    Info,
    /// Per-file detail.
    Debug,
    /// Everything.
    Trace,
}

impl LogLevelArg {
    /// Returns the filter directive for this level.
    const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// JSON output of `bound`.
#[derive(Debug, Serialize)]
struct BoundOutput<'a> {
    /// Resolved inputs.
    inputs: &'a BoundInputs,
    /// Bandwidth provenance.
    device_source: DeviceSource,
    /// Envelope lookups, when used.
    device_derivation: Option<&'a DeviceDerivation>,
    /// Bound results.
    result: &'a BoundResult,
    /// `s_max` in operations per second.
    #[serde(serialize_with = "serialize_rate")]
    s_max_ops_per_sec: f64,
    /// Key-value size used for the conversion.
    kv_size_bytes: u32,
}

/// JSON output of `predict`.
#[derive(Debug, Serialize)]
struct PredictOutput<'a> {
    /// Resolved inputs.
    inputs: &'a BoundInputs,
    /// Bandwidth provenance.
    device_source: DeviceSource,
    /// Envelope lookups, when used.
    device_derivation: Option<&'a DeviceDerivation>,
    /// WAF summary, when a log was analyzed.
    waf: Option<WafSummary>,
    /// Prediction with every intermediate.
    prediction: &'a Prediction,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Parses arguments, initialises logging, and dispatches the command.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);
    let context = Context::load(&cli)?;
    match cli.command {
        Commands::Envelope {
            command,
        } => match command {
            EnvelopeCommand::Build(command) => command_envelope_build(&context, &command),
            EnvelopeCommand::Query(command) => command_envelope_query(&context, &command),
        },
        Commands::Bound(command) => command_bound(&context, &command),
        Commands::Waf {
            command,
        } => match command {
            WafCommand::Analyze(command) => command_waf_analyze(&context, &command),
        },
        Commands::Predict(command) => command_predict(&context, &command),
        Commands::Config {
            command,
        } => command_config(&context, &command),
    }
}

/// Installs the stderr `tracing` subscriber.
fn init_tracing(level: LogLevelArg) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

/// Configuration and global flags shared by every command.
struct Context {
    /// Loaded configuration.
    config: SmaxConfig,
    /// Effective output format.
    format: OutputFormat,
    /// I/O budget for the command's file reads.
    budget: IoBudget,
}

impl Context {
    /// Loads configuration and applies global flag overrides.
    fn load(cli: &Cli) -> CliResult<Self> {
        let config = SmaxConfig::load_or_default(cli.config.as_deref())
            .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
        let format = match cli.format {
            Some(FormatArg::Text) => OutputFormat::Text,
            Some(FormatArg::Json) => OutputFormat::Json,
            None => config.output.format,
        };
        let budget = config.io.budget();
        Ok(Self {
            config,
            format,
            budget,
        })
    }
}

// ============================================================================
// SECTION: Envelope Commands
// ============================================================================

/// Executes `envelope build`.
fn command_envelope_build(context: &Context, command: &EnvelopeBuildCommand) -> CliResult<ExitCode> {
    let grid = load_envelope_dir(&command.dir, command.device.clone(), &context.budget)
        .map_err(|err| CliError::new(format!("envelope build failed: {err}")))?;
    let document = EnvelopeDocument::from_grid(&grid);
    let json = document
        .to_json_pretty()
        .map_err(|err| CliError::new(format!("envelope encoding failed: {err}")))?;
    write_file(&command.out, &json)?;
    if let Some(csv_path) = &command.csv {
        write_file(csv_path, &envelope_csv(&grid))?;
    }
    info!(parsed = grid.stats().parsed_count, failed = grid.stats().failed_count, "envelope written");
    match context.format {
        OutputFormat::Json => write_json(&document.metadata)?,
        OutputFormat::Text => {
            let csv = command.csv.as_ref().map(|path| path.display().to_string());
            write_text(&render::envelope_build(
                &grid,
                &command.out.display().to_string(),
                csv.as_deref(),
            ))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `envelope query`.
fn command_envelope_query(context: &Context, command: &EnvelopeQueryCommand) -> CliResult<ExitCode> {
    let grid = load_envelope(&command.envelope, &context.budget)?;
    let point = EnvelopePoint {
        read_ratio: command.rho,
        iodepth: command.iodepth,
        numjobs: command.numjobs,
        block_size_kb: command.block_size_kb,
    };
    let result = grid.query(&point).map_err(|err| CliError::new(err.to_string()))?;
    match context.format {
        OutputFormat::Json => write_json(&result)?,
        OutputFormat::Text => write_text(&render::interpolation(&result))?,
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Bound Command
// ============================================================================

/// Executes `bound`.
fn command_bound(context: &Context, command: &BoundCommand) -> CliResult<ExitCode> {
    let model = resolve_model(&command.model, &context.config, &context.budget, None)?;
    let result = compute_bounds(&model.inputs).map_err(|err| CliError::new(err.to_string()))?;
    match context.format {
        OutputFormat::Json => write_json(&BoundOutput {
            inputs: &model.inputs,
            device_source: model.device_source,
            device_derivation: model.derivation.as_ref(),
            result: &result,
            s_max_ops_per_sec: mibs_to_ops(result.s_max, model.kv_size_bytes),
            kv_size_bytes: model.kv_size_bytes,
        })?,
        OutputFormat::Text => write_text(&render::bounds(&model, &result))?,
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: WAF Command
// ============================================================================

/// Executes `waf analyze`.
fn command_waf_analyze(context: &Context, command: &WafAnalyzeCommand) -> CliResult<ExitCode> {
    let tolerance = command.tolerance.unwrap_or(context.config.waf.mass_balance_tolerance);
    let report = analyze_log(&command.log, &context.budget, tolerance)?;
    if let Some(csv_path) = &command.csv {
        write_file(csv_path, &report.levels_csv())?;
    }
    match context.format {
        OutputFormat::Json => write_json(&report.summary())?,
        OutputFormat::Text => write_text(&render::waf(&report))?,
    }
    Ok(mass_balance_exit(&report))
}

/// Runs the WAF analyzer on a log file.
fn analyze_log(path: &Path, budget: &IoBudget, tolerance: f64) -> CliResult<WafReport> {
    smax_core::analyze_log_file(path, budget, tolerance)
        .map_err(|err| CliError::new(format!("waf analysis of {} failed: {err}", path.display())))
}

/// Maps the mass-balance outcome to the process exit code.
fn mass_balance_exit(report: &WafReport) -> ExitCode {
    match report.mass_balance.status {
        MassBalanceStatus::Ok => ExitCode::SUCCESS,
        MassBalanceStatus::Warning => ExitCode::from(EXIT_MASS_BALANCE_WARNING),
    }
}

// ============================================================================
// SECTION: Predict Command
// ============================================================================

/// Executes `predict`.
fn command_predict(context: &Context, command: &PredictCommand) -> CliResult<ExitCode> {
    let config = &context.config;
    let log = command.log.as_ref().or(config.levels.log.as_ref());
    let report = match log {
        Some(path) => {
            let tolerance = command.tolerance.unwrap_or(config.waf.mass_balance_tolerance);
            Some(analyze_log(path, &context.budget, tolerance)?)
        }
        None => None,
    };
    let wa_from_log = report.as_ref().map(|report| report.total_waf.max(1.0));
    let model = resolve_model(&command.model, config, &context.budget, wa_from_log)?;

    let levels = match report.as_ref().map(WafReport::level_profile) {
        Some(Ok(profile)) => Some(profile),
        Some(Err(err)) => {
            warn!(error = %err, "log has no usable level table; skipping level bound");
            None
        }
        None => None,
    };
    let stall = resolve_stall(
        StallOverrides {
            mode: command.stall_mode,
            l0_files: command.l0_files,
            stall_percent: command.stall_percent,
        },
        config,
        report.as_ref(),
    )?;
    let inputs = PredictionInputs {
        bounds: model.inputs,
        levels,
        capacity_basis: command.capacity_basis.map_or(config.levels.capacity_basis, Into::into),
        stall,
        kv_size_bytes: model.kv_size_bytes,
    };
    let prediction = predict(&inputs).map_err(|err| CliError::new(err.to_string()))?;

    match context.format {
        OutputFormat::Json => write_json(&PredictOutput {
            inputs: &model.inputs,
            device_source: model.device_source,
            device_derivation: model.derivation.as_ref(),
            waf: report.as_ref().map(WafReport::summary),
            prediction: &prediction,
        })?,
        OutputFormat::Text => write_text(&render::prediction(&model, &prediction, report.as_ref()))?,
    }
    Ok(report.as_ref().map_or(ExitCode::SUCCESS, mass_balance_exit))
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

/// Executes `config` subcommands.
fn command_config(context: &Context, command: &ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate => {
            context.config.validate().map_err(|err| CliError::new(err.to_string()))?;
            write_stdout_line("config ok").map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
        ConfigCommand::Example => write_text(&config_toml_example())?,
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a value as pretty JSON to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to encode json: {err}")))?;
    write_stdout_line(&json).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes pre-rendered text to stdout.
fn write_text(text: &str) -> CliResult<()> {
    write_stdout_line(text.trim_end()).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes an output file.
fn write_file(path: &Path, contents: &str) -> CliResult<()> {
    fs::write(path, contents)
        .map_err(|err| CliError::new(format!("failed to write {}: {err}", path.display())))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output stream error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(&format!("error: {message}"));
    ExitCode::FAILURE
}
