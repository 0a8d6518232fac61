//! # PO Telemetry
//!
//! Logging and metrics bootstrap for agreement nodes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use po_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> Result<(), po_telemetry::TelemetryError> {
//!     init_telemetry(&TelemetryConfig::from_env())?;
//!     // logs and metrics are now being collected
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PO_SERVICE_NAME` | `po-node` | Service name in logs and metrics |
//! | `PO_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` also honoured) |
//! | `PO_JSON_LOGS` | `false` | JSON log lines |
//! | `PO_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `PO_METRICS` | `true` | Register Prometheus metrics |

#![warn(missing_docs)]

mod config;
pub mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{gather, register_metrics, registry, NODE_INFO, PEERS_KNOWN};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The global subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// A metric could not be registered or encoded.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and, if enabled, metrics.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if config.metrics_enabled {
        register_metrics(&config.service_name)?;
    }
    init_logging(config)?;
    tracing::info!(service = %config.service_name, "Telemetry initialized");
    Ok(())
}
