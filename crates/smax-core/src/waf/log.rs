// crates/smax-core/src/waf/log.rs
// ============================================================================
// Module: Engine Log Parser
// Description: Extract byte counters and level tables from RocksDB LOG text.
// Purpose: Feed the WAF estimators from semi-structured engine output.
// Dependencies: regex, serde, tracing
// ============================================================================

//! ## Overview
//! The engine log format is external and drifts between releases, so parsing
//! is tolerant: unknown lines are ignored, and a recognised line whose numbers
//! do not parse is counted in `malformed_lines` and skipped.
//!
//! Three sources are recognised:
//! - the statistics dump (`rocksdb.flush.write.bytes COUNT : n`),
//! - the periodic summary lines (`Cumulative writes`, `Cumulative WAL`,
//!   `Flush(GB)`, `Cumulative compaction`, `Cumulative stall`, `Uptime`),
//! - the per-level `Compaction Stats` table.
//!
//! Logs dump these blocks repeatedly; the last occurrence wins. Statistics
//! counters take precedence over summary lines when both are present.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use super::WafError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Bytes per KiB.
const KIB: f64 = 1024.0;
/// Bytes per GiB.
pub const GIB: f64 = KIB * KIB * KIB;

/// Default token offsets of Read(GB), Write(GB), and W-Amp in a level row.
const DEFAULT_LAYOUT: TableLayout = TableLayout {
    read: 5,
    write: 8,
    w_amp: 11,
};

// ============================================================================
// SECTION: Parsed Types
// ============================================================================

/// Counters from the statistics dump, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatCounters {
    /// `rocksdb.bytes.written`.
    pub user_bytes: Option<f64>,
    /// `rocksdb.flush.write.bytes`.
    pub flush_write_bytes: Option<f64>,
    /// `rocksdb.compact.write.bytes`.
    pub compaction_write_bytes: Option<f64>,
    /// `rocksdb.compact.read.bytes`.
    pub compaction_read_bytes: Option<f64>,
    /// `rocksdb.wal.bytes`.
    pub wal_bytes: Option<f64>,
    /// `rocksdb.stall.micros`.
    pub stall_micros: Option<f64>,
}

/// Counters from the periodic summary lines, in bytes unless noted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SummaryCounters {
    /// `Cumulative writes ... ingest`.
    pub ingest_bytes: Option<f64>,
    /// `Cumulative WAL ... written`.
    pub wal_bytes: Option<f64>,
    /// `Flush(GB): cumulative`.
    pub flush_bytes: Option<f64>,
    /// `Cumulative compaction ... write` (includes flush output).
    pub compaction_write_bytes: Option<f64>,
    /// `Cumulative compaction ... read`.
    pub compaction_read_bytes: Option<f64>,
    /// `Cumulative stall ... percent`.
    pub stall_percent: Option<f64>,
    /// `Uptime(secs) ... total`, in seconds.
    pub uptime_secs: Option<f64>,
}

/// One row of the per-level compaction table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelRow {
    /// Level number.
    pub level: u32,
    /// SST file count.
    pub files: u64,
    /// Level size in MiB.
    pub size_mb: f64,
    /// Read(GB) column.
    pub read_gb: f64,
    /// Write(GB) column.
    pub write_gb: f64,
    /// W-Amp column.
    pub w_amp: f64,
}

/// Everything extracted from one log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedLog {
    /// Statistics dump counters.
    pub stats: StatCounters,
    /// Summary line counters.
    pub summary: SummaryCounters,
    /// Level rows from the last compaction table.
    pub levels: Vec<LevelRow>,
    /// `Sum` row from the last compaction table.
    pub sum_row: Option<LevelRow>,
    /// Recognised lines that failed to parse.
    pub malformed_lines: usize,
}

/// Byte counters resolved across all sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EngineCounters {
    /// Bytes written by the application.
    pub user_bytes: Option<f64>,
    /// Bytes written by memtable flushes.
    pub flush_write_bytes: Option<f64>,
    /// Bytes written by compactions, excluding flushes.
    pub compaction_write_bytes: Option<f64>,
    /// Bytes read by compactions.
    pub compaction_read_bytes: Option<f64>,
    /// Bytes written to the WAL.
    pub wal_bytes: Option<f64>,
    /// Flush plus compaction writes as reported by the engine (no WAL).
    pub device_write_bytes: Option<f64>,
    /// Fraction of wall time spent stalled.
    pub stall_ratio: Option<f64>,
}

impl ParsedLog {
    /// Resolves counters, preferring statistics over summary lines and
    /// summary lines over level-table sums.
    #[must_use]
    pub fn counters(&self) -> EngineCounters {
        let stats = &self.stats;
        let summary = &self.summary;
        let l0_write = self.levels.iter().find(|row| row.level == 0).map(|row| row.write_gb * GIB);
        let flush = stats.flush_write_bytes.or(summary.flush_bytes).or(l0_write);
        let device = self.sum_row.map(|row| row.write_gb * GIB).or(summary.compaction_write_bytes);
        let deeper_writes = (!self.levels.is_empty()).then(|| {
            self.levels.iter().filter(|row| row.level > 0).map(|row| row.write_gb * GIB).sum::<f64>()
        });
        let compaction_write = stats
            .compaction_write_bytes
            .or_else(|| device.zip(flush).map(|(device, flush)| (device - flush).max(0.0)))
            .or(deeper_writes);
        let compaction_read = stats
            .compaction_read_bytes
            .or(summary.compaction_read_bytes)
            .or_else(|| self.sum_row.map(|row| row.read_gb * GIB));
        let stall_ratio = summary.stall_percent.map(|percent| percent / 100.0).or_else(|| {
            stats
                .stall_micros
                .zip(summary.uptime_secs)
                .filter(|(_, uptime)| *uptime > 0.0)
                .map(|(micros, uptime)| (micros / 1_000_000.0 / uptime).min(1.0))
        });
        EngineCounters {
            user_bytes: stats.user_bytes.or(summary.ingest_bytes),
            flush_write_bytes: flush,
            compaction_write_bytes: compaction_write,
            compaction_read_bytes: compaction_read,
            wal_bytes: stats.wal_bytes.or(summary.wal_bytes),
            device_write_bytes: device,
            stall_ratio,
        }
    }

    /// Returns the L0 file count from the level table.
    #[must_use]
    pub fn l0_files(&self) -> Option<u64> {
        self.levels.iter().find(|row| row.level == 0).map(|row| row.files)
    }
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Token offsets of the columns used from a level row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TableLayout {
    /// Read(GB) offset.
    read: usize,
    /// Write(GB) offset.
    write: usize,
    /// W-Amp offset.
    w_amp: usize,
}

/// Compiled line patterns.
#[derive(Debug)]
pub struct LogParser {
    /// Statistics dump line.
    stat_line: Regex,
    /// `Cumulative writes` line.
    cumulative_writes: Regex,
    /// `Cumulative WAL` line.
    cumulative_wal: Regex,
    /// `Flush(GB)` line.
    flush: Regex,
    /// `Cumulative compaction` line.
    cumulative_compaction: Regex,
    /// `Cumulative stall` line.
    cumulative_stall: Regex,
    /// `Uptime(secs)` line.
    uptime: Regex,
}

impl LogParser {
    /// Compiles the line patterns.
    ///
    /// # Errors
    ///
    /// Returns [`WafError::Pattern`] if a pattern fails to compile.
    pub fn new() -> Result<Self, WafError> {
        let compile = |pattern: &str| Regex::new(pattern).map_err(|err| WafError::Pattern(err.to_string()));
        Ok(Self {
            stat_line: compile(r"^\s*(rocksdb\.[\w.\-]+)\s+COUNT\s*:\s*(\S+)\s*$")?,
            cumulative_writes: compile(r"^Cumulative writes:.*ingest:\s*([\d.]+)\s*(B|KB|MB|GB|TB)\b")?,
            cumulative_wal: compile(r"^Cumulative WAL:.*written:\s*([\d.]+)\s*(B|KB|MB|GB|TB)\b")?,
            flush: compile(r"^Flush\(GB\):\s*cumulative\s+([\d.]+)")?,
            cumulative_compaction: compile(
                r"^Cumulative compaction:\s*([\d.]+)\s*GB write,.*?([\d.]+)\s*GB read",
            )?,
            cumulative_stall: compile(r"^Cumulative stall:.*?([\d.]+)\s*percent")?,
            uptime: compile(r"^Uptime\(secs\):\s*([\d.]+)\s*total")?,
        })
    }

    /// Parses log text.
    #[must_use]
    pub fn parse(&self, text: &str) -> ParsedLog {
        let mut parsed = ParsedLog::default();
        let mut table: Option<TableLayout> = None;
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with("**") {
                table = None;
                continue;
            }
            if line.starts_with("Level") && line.contains("Files") {
                table = Some(table_layout(line));
                parsed.levels.clear();
                parsed.sum_row = None;
                continue;
            }
            if let Some(layout) = table {
                parse_table_line(line, layout, &mut parsed);
                continue;
            }
            self.parse_line(line, &mut parsed);
        }
        parsed
    }

    /// Parses a line outside any table.
    fn parse_line(&self, line: &str, parsed: &mut ParsedLog) {
        if line.starts_with("rocksdb.") {
            let Some(caps) = self.stat_line.captures(line) else {
                // Histogram lines (P50/P99) share the prefix and carry no COUNT.
                return;
            };
            let raw_value = &caps[2];
            if !raw_value.bytes().all(|b| b.is_ascii_digit()) {
                record_malformed(parsed, line);
                return;
            }
            let value = raw_value.parse::<f64>().ok();
            let stats = &mut parsed.stats;
            match &caps[1] {
                "rocksdb.bytes.written" => stats.user_bytes = value,
                "rocksdb.flush.write.bytes" => stats.flush_write_bytes = value,
                "rocksdb.compact.write.bytes" => stats.compaction_write_bytes = value,
                "rocksdb.compact.read.bytes" => stats.compaction_read_bytes = value,
                "rocksdb.wal.bytes" => stats.wal_bytes = value,
                "rocksdb.stall.micros" => stats.stall_micros = value,
                _ => {}
            }
            return;
        }

        let summary = &mut parsed.summary;
        let ok = if line.starts_with("Cumulative writes:") {
            sized(&self.cumulative_writes, line).map(|bytes| summary.ingest_bytes = Some(bytes))
        } else if line.starts_with("Cumulative WAL:") {
            sized(&self.cumulative_wal, line).map(|bytes| summary.wal_bytes = Some(bytes))
        } else if line.starts_with("Flush(GB):") {
            number(&self.flush, line, 1).map(|gb| summary.flush_bytes = Some(gb * GIB))
        } else if line.starts_with("Cumulative compaction:") {
            number(&self.cumulative_compaction, line, 1)
                .zip(number(&self.cumulative_compaction, line, 2))
                .map(|(write, read)| {
                    summary.compaction_write_bytes = Some(write * GIB);
                    summary.compaction_read_bytes = Some(read * GIB);
                })
        } else if line.starts_with("Cumulative stall:") {
            number(&self.cumulative_stall, line, 1).map(|percent| summary.stall_percent = Some(percent))
        } else if line.starts_with("Uptime(secs):") {
            number(&self.uptime, line, 1).map(|secs| summary.uptime_secs = Some(secs))
        } else {
            Some(())
        };
        if ok.is_none() {
            record_malformed(parsed, line);
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a line inside a compaction table.
fn parse_table_line(line: &str, layout: TableLayout, parsed: &mut ParsedLog) {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(label) = tokens.first() else {
        return;
    };
    let level = if *label == "Sum" {
        None
    } else if let Some(number) = label.strip_prefix('L').and_then(|n| n.parse::<u32>().ok()) {
        Some(number)
    } else {
        return;
    };
    match parse_level_row(&tokens, layout, level.unwrap_or(0)) {
        Some(row) => match level {
            Some(_) => parsed.levels.push(row),
            None => parsed.sum_row = Some(row),
        },
        None => record_malformed(parsed, line),
    }
}

/// Derives row token offsets from a table header line.
///
/// The Size column renders as two tokens in data rows (`1.20 GB`), so every
/// column after it shifts by one.
fn table_layout(header: &str) -> TableLayout {
    let tokens: Vec<&str> = header.split_whitespace().collect();
    let size_at = tokens.iter().position(|t| *t == "Size");
    let offset = |name: &str| {
        tokens.iter().position(|t| *t == name).map(|index| match size_at {
            Some(size) if index > size => index + 1,
            _ => index,
        })
    };
    match (offset("Read(GB)"), offset("Write(GB)"), offset("W-Amp")) {
        (Some(read), Some(write), Some(w_amp)) => TableLayout {
            read,
            write,
            w_amp,
        },
        _ => DEFAULT_LAYOUT,
    }
}

/// Parses the tokens of one level or Sum row.
fn parse_level_row(tokens: &[&str], layout: TableLayout, level: u32) -> Option<LevelRow> {
    let files = tokens.get(1)?.split('/').next()?.parse::<u64>().ok()?;
    let size = tokens.get(2)?.parse::<f64>().ok()?;
    let size_mb = size * unit_bytes(tokens.get(3)?)? / (KIB * KIB);
    let column = |index: usize| tokens.get(index).and_then(|t| t.parse::<f64>().ok());
    Some(LevelRow {
        level,
        files,
        size_mb,
        read_gb: column(layout.read)?,
        write_gb: column(layout.write)?,
        w_amp: column(layout.w_amp)?,
    })
}

/// Extracts a numeric capture group.
fn number(pattern: &Regex, line: &str, group: usize) -> Option<f64> {
    pattern.captures(line)?.get(group)?.as_str().parse::<f64>().ok()
}

/// Extracts a `value unit` capture pair as bytes.
fn sized(pattern: &Regex, line: &str) -> Option<f64> {
    let caps = pattern.captures(line)?;
    let value = caps.get(1)?.as_str().parse::<f64>().ok()?;
    Some(value * unit_bytes(caps.get(2)?.as_str())?)
}

/// Bytes per size unit.
fn unit_bytes(unit: &str) -> Option<f64> {
    match unit {
        "B" => Some(1.0),
        "KB" => Some(KIB),
        "MB" => Some(KIB * KIB),
        "GB" => Some(GIB),
        "TB" => Some(GIB * KIB),
        _ => None,
    }
}

/// Counts and logs a recognised line that failed to parse.
fn record_malformed(parsed: &mut ParsedLog, line: &str) {
    warn!(line, "skipping malformed log line");
    parsed.malformed_lines += 1;
}
