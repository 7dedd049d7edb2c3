//! Error types for the binding engine.

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failure to hand a frame to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("not connected to the studio")]
    NotConnected,
}

/// Failure of a single connection attempt.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connecting to {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("websocket handshake with {url} failed: {source}")]
    Handshake {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("connection closed by the studio")]
    ClosedByPeer,

    #[error("websocket error: {0}")]
    Protocol(#[from] tungstenite::Error),

    #[error("connection task stopped before the attempt finished")]
    Aborted,
}

/// Failure of a correlated request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("not connected to the studio")]
    NotConnected,

    /// The studio answered with a non-ok status. Carries the full reply.
    #[error("{request_type} rejected by the studio: {payload}")]
    Rejected { request_type: String, payload: Value },

    #[error("connection lost before {request_type} was answered: {reason}")]
    ConnectionLost { request_type: String, reason: String },

    #[error("no response to {request_type} within {timeout_ms} ms")]
    Timeout { request_type: String, timeout_ms: u64 },

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<TransportError> for RequestError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NotConnected => RequestError::NotConnected,
        }
    }
}

impl RequestError {
    /// Short outcome label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            RequestError::NotConnected => "not_connected",
            RequestError::Rejected { .. } => "rejected",
            RequestError::ConnectionLost { .. } => "connection_lost",
            RequestError::Timeout { .. } => "timeout",
            RequestError::Encode(_) => "encode_error",
        }
    }
}

/// Reasons a control activation did not send anything, or failed remotely.
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("unknown control definition: {0}")]
    UnknownDefinition(String),

    #[error("required parameter {param_id} of {request_type} has no value")]
    RequiredParameterMissing {
        request_type: String,
        param_id: String,
    },

    #[error("current value of {param_id} is unknown, cannot toggle")]
    ValueUnknown { param_id: String },

    #[error("value for {param_id} is not a number: {value}")]
    NotANumber { param_id: String, value: Value },

    #[error("expression for {param_id} could not be evaluated: {message}")]
    InvalidExpression { param_id: String, message: String },

    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Engine lifecycle errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    BadConfig(String),

    #[error("unknown control definition: {0}")]
    UnknownDefinition(String),

    #[error("control {0} is not subscribed")]
    UnknownControl(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
