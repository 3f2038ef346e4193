// crates/smax-cli/src/render.rs
// ============================================================================
// Module: CLI Text Rendering
// Description: Human-readable renderings of command results.
// Purpose: Keep formatting out of command dispatch.
// Dependencies: smax-core
// ============================================================================

//! ## Overview
//! Text output is aligned `label value` lines. Infinite rates render as
//! `inf`, and missing measurements as `NaN (degraded)`, so the text view
//! never hides an unbounded or unmeasured value.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use smax_core::BoundResult;
use smax_core::EnvelopeGrid;
use smax_core::Interpolation;
use smax_core::LevelBound;
use smax_core::Prediction;
use smax_core::StallEstimate;
use smax_core::WafReport;
use smax_core::envelope::CellStatus;
use smax_core::stall::StallMode;
use smax_core::waf::MassBalanceStatus;

use crate::resolve::DeviceSource;
use crate::resolve::ResolvedModel;
use crate::resolve::WaSource;

// ============================================================================
// SECTION: Primitives
// ============================================================================

/// Formats a rate, rendering `+inf` as `inf`.
pub(crate) fn rate(value: f64) -> String {
    if value.is_infinite() && value.is_sign_positive() {
        "inf".to_string()
    } else {
        format!("{value:.2}")
    }
}

/// Appends one aligned `label value` line.
fn line(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "{label:<22} {value}");
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Renders the result of `envelope build`.
pub(crate) fn envelope_build(grid: &EnvelopeGrid, json_path: &str, csv_path: Option<&str>) -> String {
    let stats = grid.stats();
    let mut out = String::new();
    line(&mut out, "device", grid.device().unwrap_or("unknown"));
    line(&mut out, "parsed_count", &stats.parsed_count.to_string());
    line(&mut out, "failed_count", &stats.failed_count.to_string());
    line(&mut out, "cells", &grid.cell_count().to_string());
    line(&mut out, "missing_cells", &stats.missing_cells.to_string());
    line(&mut out, "envelope_json", json_path);
    if let Some(csv_path) = csv_path {
        line(&mut out, "envelope_csv", csv_path);
    }
    out
}

/// Renders an envelope lookup.
pub(crate) fn interpolation(result: &Interpolation) -> String {
    let mut out = String::new();
    let value = if result.is_usable() {
        format!("{:.3} MiB/s", result.value)
    } else {
        "NaN (degraded)".to_string()
    };
    line(&mut out, "bandwidth", &value);
    let status = match result.status {
        CellStatus::Complete => "complete".to_string(),
        CellStatus::Partial {
            missing_corners,
        } => format!("partial ({missing_corners} missing corners)"),
        CellStatus::Degraded => "degraded".to_string(),
    };
    line(&mut out, "status", &status);
    line(&mut out, "clamped", &result.clamped.to_string());
    out
}

// ============================================================================
// SECTION: Bounds
// ============================================================================

/// Renders resolved inputs and bound results.
pub(crate) fn bounds(model: &ResolvedModel, result: &BoundResult) -> String {
    let mut out = String::new();
    device_lines(&mut out, model);
    bound_lines(&mut out, result);
    let ops = smax_core::mibs_to_ops(result.s_max, model.kv_size_bytes);
    line(&mut out, "s_max_ops_per_sec", &format!("{} @ {} B", rate(ops), model.kv_size_bytes));
    out
}

/// Appends device and workload lines.
fn device_lines(out: &mut String, model: &ResolvedModel) {
    let inputs = &model.inputs;
    let source = match model.device_source {
        DeviceSource::Explicit => "explicit",
        DeviceSource::Harmonic => "harmonic",
        DeviceSource::Envelope => "envelope",
    };
    line(out, "device_source", source);
    line(out, "b_w", &format!("{:.2} MiB/s", inputs.device.b_w));
    line(out, "b_r", &format!("{:.2} MiB/s", inputs.device.b_r));
    line(out, "b_eff", &format!("{:.2} MiB/s", inputs.device.b_eff));
    if let Some(derivation) = &model.derivation {
        line(out, "envelope_read_ratio", &format!("{:.1}%", derivation.read_ratio));
        if derivation.write.clamped || derivation.read.clamped || derivation.mixed.clamped {
            line(out, "envelope_note", "operating point clamped to envelope bounds");
        }
    }
    line(out, "cr", &inputs.cr.to_string());
    line(out, "wa", &inputs.wa.to_string());
    line(out, "eta", &inputs.eta.to_string());
    line(out, "wal_factor", &inputs.wal_factor.to_string());
}

/// Appends demand, bound, and bottleneck lines.
fn bound_lines(out: &mut String, result: &BoundResult) {
    line(out, "w_req", &format!("{:.4}", result.demand.w_req));
    line(out, "r_req", &format!("{:.4}", result.demand.r_req));
    line(out, "s_write", &format!("{} MiB/s", rate(result.s_write)));
    line(out, "s_read", &format!("{} MiB/s", rate(result.s_read)));
    line(out, "s_mix", &format!("{} MiB/s", rate(result.s_mix)));
    if let Some(s_level) = result.s_level {
        line(out, "s_level", &format!("{} MiB/s", rate(s_level)));
    }
    line(out, "s_max", &format!("{} MiB/s", rate(result.s_max)));
    let names: Vec<String> = result.bottleneck_set.iter().map(ToString::to_string).collect();
    line(out, "bottleneck", &names.join(", "));
}

// ============================================================================
// SECTION: Prediction
// ============================================================================

/// Renders an end-to-end prediction.
pub(crate) fn prediction(
    model: &ResolvedModel,
    prediction: &Prediction,
    waf: Option<&WafReport>,
) -> String {
    let mut out = String::new();
    device_lines(&mut out, model);
    if let Some(report) = waf
        && model.wa_source == WaSource::Log
    {
        line(&mut out, "wa_source", &format!("log total_waf {:.3}", report.total_waf));
    }
    bound_lines(&mut out, &prediction.bounds);
    if let Some(levels) = &prediction.level_bound {
        level_lines(&mut out, levels);
    }
    stall_lines(&mut out, &prediction.stall);
    line(&mut out, "s_feasible", &format!("{} MiB/s", rate(prediction.s_feasible)));
    line(&mut out, "s_final", &format!("{} MiB/s", rate(prediction.s_final)));
    line(
        &mut out,
        "ops_per_sec",
        &format!("{} @ {} B", rate(prediction.ops_per_sec), prediction.kv_size_bytes),
    );
    out
}

/// Appends per-level detail.
fn level_lines(out: &mut String, levels: &LevelBound) {
    line(out, "level_assumption", levels.assumption);
    for entry in &levels.per_level {
        line(
            out,
            &format!("level L{}", entry.level),
            &format!("share {:.3} S_l {} MiB/s", entry.share, rate(entry.s_l)),
        );
    }
}

/// Appends the stall estimate and its caveat.
fn stall_lines(out: &mut String, stall: &StallEstimate) {
    let mode = match stall.mode {
        StallMode::None => "none",
        StallMode::Logistic => "logistic (heuristic)",
        StallMode::Empirical => "empirical (measured)",
    };
    line(out, "stall_mode", mode);
    line(out, "p_stall", &format!("{:.4}", stall.p_stall));
    line(out, "stall_note", stall.note);
}

// ============================================================================
// SECTION: WAF
// ============================================================================

/// Renders a WAF analysis with its per-level table.
pub(crate) fn waf(report: &WafReport) -> String {
    let mut out = String::new();
    let mib = 1024.0 * 1024.0;
    line(&mut out, "user_mb", &format!("{:.2}", report.counters.user_bytes / mib));
    line(&mut out, "total_write_mb", &format!("{:.2}", report.counters.total_write_bytes / mib));
    line(&mut out, "method1", &format!("{:.3}", report.estimates.method1));
    line(&mut out, "method2", &format!("{:.3}", report.estimates.method2));
    line(&mut out, "method3", &format!("{:.3}", report.estimates.method3));
    line(&mut out, "total_waf", &format!("{:.3}", report.total_waf));
    let status = match report.mass_balance.status {
        MassBalanceStatus::Ok => "ok",
        MassBalanceStatus::Warning => "WARNING",
    };
    line(
        &mut out,
        "mass_balance",
        &format!(
            "{status} ({:.2}% error, tolerance {:.2}%)",
            report.mass_balance.error_percent, report.mass_balance.tolerance_percent
        ),
    );
    if let Some(ratio) = report.stall_ratio {
        line(&mut out, "stall_ratio", &format!("{ratio:.4}"));
    }
    if report.malformed_lines > 0 {
        line(&mut out, "malformed_lines", &report.malformed_lines.to_string());
    }
    if !report.levels.is_empty() {
        out.push('\n');
        out.push_str(&report.levels_csv());
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
