//! Structured logging with JSON or pretty output.

use crate::{LogFormat, TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the logging subsystem.
///
/// Sets up tracing-subscriber with either JSON or pretty format,
/// respecting the configured log level unless `RUST_LOG` is set.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => init_json_logging(filter)?,
        LogFormat::Pretty => init_pretty_logging(filter)?,
    }

    tracing::debug!(service = %config.service_name, "Logging initialized");
    Ok(())
}

fn init_json_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_file(false)
        .with_line_number(false)
        .flatten_event(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

fn init_pretty_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let pretty_layer = fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(pretty_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

/// Standard log event names.
pub mod events {
    /// Connection to the studio is open.
    pub const CONNECTED: &str = "connected";

    /// Connection to the studio closed or failed.
    pub const DISCONNECTED: &str = "disconnected";

    /// A reconnect attempt has been scheduled.
    pub const RECONNECT_SCHEDULED: &str = "reconnect_scheduled";

    /// A request failed (rejected, timed out or lost).
    pub const REQUEST_FAILED: &str = "request_failed";

    /// A catalog entry could not be compiled into a binding.
    pub const BINDING_REJECTED: &str = "binding_rejected";

    /// A control activation was aborted before anything was sent.
    pub const ACTIVATION_ABORTED: &str = "activation_aborted";
}

/// Helper macros for structured logging with standard fields.
///
/// These wrap the tracing macros to ensure consistent field naming.
#[macro_export]
macro_rules! log_connected {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::CONNECTED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_disconnected {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::DISCONNECTED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_reconnect_scheduled {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::RECONNECT_SCHEDULED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_request_failed {
    ($($field:tt)*) => {
        tracing::error!(
            event = $crate::logging::events::REQUEST_FAILED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_activation_aborted {
    ($($field:tt)*) => {
        tracing::error!(
            event = $crate::logging::events::ACTIVATION_ABORTED,
            $($field)*
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // Logging initialization touches the global subscriber, so only the
    // configuration logic is tested here.

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("invalid"), None);
    }
}
