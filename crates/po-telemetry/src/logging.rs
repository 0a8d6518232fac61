//! Structured logging.
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and either a
//! pretty or a JSON fmt layer. Every line carries consistent fields:
//! - `service`: node service name
//! - `role`: proposer / counterparty
//! - `session_id`: agreement session
//! - `tx_id`: transaction id, once known

use crate::{TelemetryConfig, TelemetryError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::Config(e.to_string()))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;

    if config.json_logs {
        // JSON output for containers/production
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(config.console_output.then_some(json_layer))
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        // Pretty output for development
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(config.console_output.then_some(fmt_layer))
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    tracing::debug!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Structured logging initialized"
    );
    Ok(())
}

/// Helper to create structured log entries with consistent formatting.
#[macro_export]
macro_rules! log_event {
    (info, $service:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(service = $service, $($($field)*,)? $msg)
    };
    (warn, $service:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(service = $service, $($($field)*,)? $msg)
    };
    (error, $service:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(service = $service, $($($field)*,)? $msg)
    };
    (debug, $service:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(service = $service, $($($field)*,)? $msg)
    };
}

/// Log a transaction-related event with standard fields.
#[macro_export]
macro_rules! log_tx_event {
    ($level:ident, $service:expr, $msg:expr, $tx_id:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            service = $service,
            tx_id = %$tx_id,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a session-related event with standard fields.
#[macro_export]
macro_rules! log_session_event {
    ($level:ident, $service:expr, $msg:expr, $session_id:expr, $role:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            service = $service,
            session_id = %$session_id,
            role = $role,
            $($($field)*,)?
            $msg
        )
    };
}
