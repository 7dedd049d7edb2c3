//! Engine configuration.

use std::time::Duration;

use studiolink_catalog::CompilerConfig;

use crate::connection::{Endpoint, SupervisorConfig};
use crate::correlator::DEFAULT_REQUEST_TIMEOUT;
use crate::error::EngineError;

/// Request type that starts push notifications for a topic.
pub const DEFAULT_NOTIFICATION_ON: &str = "TurnNotificationOn";
/// Request type that stops push notifications for a topic.
pub const DEFAULT_NOTIFICATION_OFF: &str = "TurnNotificationOff";
/// Field of the registration requests naming the topic.
pub const DEFAULT_NOTIFICATION_FIELD: &str = "notificationType";
/// Request type listing the selectable values of a parameter.
pub const DEFAULT_OPTIONS_REQUEST: &str = "commands.parameter.options.get";

/// Everything the engine needs besides the catalog and the host surface.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: Option<String>,
    pub port: u16,
    /// Prefix of correlation ids.
    pub client_name: String,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    /// `None` waits for replies forever.
    pub request_timeout: Option<Duration>,
    pub log_messages: bool,
    pub compiler: CompilerConfig,
    pub notification_on: String,
    pub notification_off: String,
    pub notification_field: String,
    pub options_request: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let supervisor = SupervisorConfig::default();
        Self {
            host: None,
            port: 0,
            client_name: "studiolink".to_string(),
            reconnect_delay: supervisor.reconnect_delay,
            connect_timeout: supervisor.connect_timeout,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            log_messages: supervisor.log_messages,
            compiler: CompilerConfig::default(),
            notification_on: DEFAULT_NOTIFICATION_ON.to_string(),
            notification_off: DEFAULT_NOTIFICATION_OFF.to_string(),
            notification_field: DEFAULT_NOTIFICATION_FIELD.to_string(),
            options_request: DEFAULT_OPTIONS_REQUEST.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = port;
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_log_messages(mut self, enabled: bool) -> Self {
        self.log_messages = enabled;
        self
    }

    pub fn with_compiler(mut self, compiler: CompilerConfig) -> Self {
        self.compiler = compiler;
        self
    }

    /// Override the notification registration request types and topic field.
    pub fn with_notification_requests(
        mut self,
        on: impl Into<String>,
        off: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.notification_on = on.into();
        self.notification_off = off.into();
        self.notification_field = field.into();
        self
    }

    pub fn with_options_request(mut self, request_type: impl Into<String>) -> Self {
        self.options_request = request_type.into();
        self
    }

    /// The studio endpoint, or [`EngineError::BadConfig`] when host or
    /// port is missing.
    pub fn endpoint(&self) -> Result<Endpoint, EngineError> {
        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| EngineError::BadConfig("studio host is not set".to_string()))?;
        if self.port == 0 {
            return Err(EngineError::BadConfig("studio port is not set".to_string()));
        }
        Ok(Endpoint::new(host, self.port))
    }

    pub(crate) fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            reconnect_delay: self.reconnect_delay,
            connect_timeout: self.connect_timeout,
            log_messages: self.log_messages,
        }
    }
}
