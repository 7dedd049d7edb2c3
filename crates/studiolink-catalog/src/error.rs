use thiserror::Error;

/// Errors produced while loading a catalog document.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// JSON/YAML parse error.
    #[error("catalog parse error: {0}")]
    Parse(String),

    /// The same request type appears twice.
    #[error("duplicate request type '{request_type}' (groups '{first}' and '{second}')")]
    DuplicateRequest {
        request_type: String,
        first: String,
        second: String,
    },

    /// I/O error reading the catalog file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A catalog entry that cannot be turned into a binding.
///
/// Schema errors only drop the affected binding; the rest of the catalog
/// still compiles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A controllable boolean SET request has no GET counterpart to read
    /// the current value from.
    #[error("{request_type}: controllable parameter '{param_id}' needs GET request '{expected}'")]
    MissingGetRequest {
        request_type: String,
        param_id: String,
        expected: String,
    },

    /// The request type does not follow a naming scheme a paired request
    /// can be derived from.
    #[error("{request_type}: cannot derive paired request type")]
    UnpairableRequestType { request_type: String },
}

impl SchemaError {
    /// Request type of the rejected binding.
    pub fn request_type(&self) -> &str {
        match self {
            SchemaError::MissingGetRequest { request_type, .. }
            | SchemaError::UnpairableRequestType { request_type } => request_type,
        }
    }
}
