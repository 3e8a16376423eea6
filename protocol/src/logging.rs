//! # Structured Logging
//!
//! Installs the global `tracing` subscriber with `RUST_LOG`-style filtering
//! and either human-readable or JSON-lines output. Library code only emits
//! events; whoever embeds the contracts decides whether and how to print
//! them by calling [`init_logging`] once.

use std::str::FromStr;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ProtocolConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, with file and line. For local development.
    Pretty,
    /// One JSON object per line. For log aggregation.
    Json,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    /// Accepts `"json"` (any case); everything else is `Pretty`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        })
    }
}

/// Install the global subscriber.
///
/// `default_level` applies when `RUST_LOG` is unset, e.g. `"info"` or
/// `"pledge_contracts=debug"`. Returns `false` if a subscriber was already
/// installed, which is the normal case when several tests share a process.
pub fn init_logging(default_level: &str, format: LogFormat) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
            .is_ok(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::info!("logging initialized (format={:?})", format);
    }
    installed
}

/// [`init_logging`] driven by a [`ProtocolConfig`].
pub fn init_from_config(config: &ProtocolConfig) -> bool {
    let format = config.log_format.parse().unwrap_or(LogFormat::Pretty);
    init_logging(&config.log_level, format)
}
