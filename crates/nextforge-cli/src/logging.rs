// crates/nextforge-cli/src/logging.rs
// ============================================================================
// Module: CLI Logging
// Description: Process-wide tracing subscriber installation.
// Purpose: Route structured events to stderr in text or JSON lines.
// Dependencies: nextforge-config, tracing-subscriber
// ============================================================================

//! ## Overview
//! The subscriber is installed at most once per process. `RUST_LOG`, when
//! set and parseable, overrides the configured level. Events go to stderr so
//! command output on stdout stays machine-readable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Once;

use nextforge_config::LogFormat;
use nextforge_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Init
// ============================================================================

/// Guards subscriber installation.
static INIT_ONCE: Once = Once::new();

/// Installs the global subscriber described by `config`.
///
/// Later calls are no-ops, as is a call made after another subscriber was
/// installed.
pub fn init(config: &LoggingConfig) {
    INIT_ONCE.call_once(|| {
        let filter = build_filter(&config.level);
        let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
        let _ = match config.format {
            LogFormat::Text => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
    });
}

/// Builds the level filter, preferring `RUST_LOG`.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
