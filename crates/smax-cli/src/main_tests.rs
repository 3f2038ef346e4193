// crates/smax-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Tests
// Description: Unit tests for argument parsing and exit-code mapping.
// Purpose: Pin the command surface and the mass-balance exit code.
// Dependencies: smax-cli main helpers
// ============================================================================

//! ## Overview
//! Parses representative command lines with `Cli::try_parse_from` and checks
//! global flag handling without spawning the binary.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::ExitCode;

use clap::Parser;
use smax_config::OutputFormat;
use smax_core::waf::EngineCounters;
use smax_core::waf::analyze_counters;

use super::Cli;
use super::Commands;
use super::ConfigCommand;
use super::Context;
use super::EnvelopeCommand;
use super::FormatArg;
use super::LogLevelArg;
use super::WafCommand;
use super::mass_balance_exit;
use crate::resolve::CapacityArg;
use crate::resolve::StallModeArg;

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn bound_accepts_model_flags() {
    let cli = Cli::try_parse_from([
        "smax", "bound", "--cr", "0.54", "--wa", "2.87", "--b-w", "1484", "--b-r", "2368",
        "--b-eff", "2231", "--kv-size", "4096",
    ])
    .expect("parse");
    let Commands::Bound(command) = cli.command else {
        panic!("expected bound command");
    };
    assert_eq!(command.model.cr, Some(0.54));
    assert_eq!(command.model.b_eff, Some(2231.0));
    assert_eq!(command.model.kv_size_bytes, Some(4096));
    assert_eq!(command.model.eta, None);
    assert_eq!(cli.log_level, LogLevelArg::Warn);
    assert_eq!(cli.format, None);
}

#[test]
fn global_flags_follow_subcommand() {
    let cli = Cli::try_parse_from([
        "smax", "waf", "analyze", "--log", "LOG", "--format", "json", "--log-level", "debug",
    ])
    .expect("parse");
    assert_eq!(cli.format, Some(FormatArg::Json));
    assert_eq!(cli.log_level, LogLevelArg::Debug);
    let Commands::Waf {
        command: WafCommand::Analyze(command),
    } = cli.command
    else {
        panic!("expected waf analyze");
    };
    assert_eq!(command.log.to_string_lossy(), "LOG");
    assert_eq!(command.tolerance, None);
}

#[test]
fn predict_parses_stall_and_capacity_options() {
    let cli = Cli::try_parse_from([
        "smax",
        "predict",
        "--cr",
        "1",
        "--stall-mode",
        "logistic",
        "--l0-files",
        "18",
        "--capacity-basis",
        "write",
    ])
    .expect("parse");
    let Commands::Predict(command) = cli.command else {
        panic!("expected predict");
    };
    assert_eq!(command.stall_mode, Some(StallModeArg::Logistic));
    assert_eq!(command.l0_files, Some(18.0));
    assert_eq!(command.capacity_basis, Some(CapacityArg::Write));
    assert!(command.log.is_none());
}

#[test]
fn envelope_query_requires_every_coordinate() {
    let err = Cli::try_parse_from([
        "smax", "envelope", "query", "--envelope", "e.json", "--rho", "50", "--iodepth", "8",
    ]);
    assert!(err.is_err());
    let cli = Cli::try_parse_from([
        "smax", "envelope", "query", "--envelope", "e.json", "--rho", "50", "--iodepth", "8",
        "--numjobs", "2", "--bs", "64",
    ])
    .expect("parse");
    let Commands::Envelope {
        command: EnvelopeCommand::Query(query),
    } = cli.command
    else {
        panic!("expected envelope query");
    };
    assert_eq!(query.block_size_kb, 64.0);
}

#[test]
fn non_numeric_values_are_rejected() {
    assert!(Cli::try_parse_from(["smax", "bound", "--cr", "abc"]).is_err());
    assert!(Cli::try_parse_from(["smax", "bound", "--kv-size", "-1"]).is_err());
    assert!(Cli::try_parse_from(["smax", "predict", "--stall-mode", "sometimes"]).is_err());
}

#[test]
fn config_subcommands_parse() {
    let cli = Cli::try_parse_from(["smax", "config", "example"]).expect("parse");
    assert!(matches!(
        cli.command,
        Commands::Config {
            command: ConfigCommand::Example
        }
    ));
}

// ============================================================================
// SECTION: Context
// ============================================================================

#[test]
fn format_flag_overrides_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("smax.toml");
    std::fs::write(&path, "[output]\nformat = \"json\"\nkv_size_bytes = 256\n").expect("write");
    let path_arg = path.to_string_lossy().to_string();

    let cli = Cli::try_parse_from(["smax", "--config", &path_arg, "config", "validate"])
        .expect("parse");
    let context = Context::load(&cli).expect("context");
    assert_eq!(context.format, OutputFormat::Json);
    assert_eq!(context.config.output.kv_size_bytes, 256);

    let cli = Cli::try_parse_from(["smax", "--config", &path_arg, "--format", "text", "config", "validate"])
        .expect("parse");
    let context = Context::load(&cli).expect("context");
    assert_eq!(context.format, OutputFormat::Text);
}

#[test]
fn missing_explicit_config_fails() {
    let cli = Cli::try_parse_from(["smax", "--config", "/nonexistent/smax.toml", "config", "validate"])
        .expect("parse");
    let err = Context::load(&cli).err().expect("error");
    assert!(err.to_string().contains("failed to load config"));
}

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

#[test]
fn mass_balance_warning_maps_to_exit_two() {
    let gib = 1024.0 * 1024.0 * 1024.0;
    let consistent = EngineCounters {
        user_bytes: Some(5.0 * gib),
        flush_write_bytes: Some(10.0 * gib),
        ..EngineCounters::default()
    };
    let report = analyze_counters(&consistent, &[], 0.10).expect("report");
    assert_eq!(mass_balance_exit(&report), ExitCode::SUCCESS);

    let skewed = EngineCounters {
        device_write_bytes: Some(20.0 * gib),
        ..consistent
    };
    let report = analyze_counters(&skewed, &[], 0.10).expect("report");
    assert_eq!(mass_balance_exit(&report), ExitCode::from(2));
}
