// crates/smax-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic starting point for `smax config example`.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example `smax.toml`. The output is deterministic and must always
//! pass [`crate::SmaxConfig::validate`].

/// Returns a canonical example `smax.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[model]
cr = 0.54
wa = 2.87
eta = 1.0
wal_factor = 0.0

[device]
b_w = 1484.0
b_r = 2368.0
b_eff = 2231.0
# envelope = "envelope.json"
# iodepth = 32
# numjobs = 4
# block_size_kb = 64
# read_ratio = 40

[levels]
# log = "LOG"
capacity_basis = "mixed"

[stall]
mode = "auto"
l0_threshold = 20.0
steepness = 0.5
max_stall_fraction = 0.9

[waf]
mass_balance_tolerance = 0.10

[output]
kv_size_bytes = 1024
format = "text"

[io]
max_file_bytes = 67108864
# timeout_ms = 30000
"#,
    )
}
