//! Error types for the simulated cloud.

use thiserror::Error;

/// Errors raised by simulated provider calls.
#[derive(Debug, Error)]
pub enum Error {
    /// The resource kind is not part of the simulated cloud
    #[error("unknown resource kind: {type_token}")]
    UnknownKind { type_token: String },

    /// A required input property is missing
    #[error("{type_token} requires input '{property}'")]
    MissingInput {
        type_token: String,
        property: String,
    },

    /// No resource with this physical id exists in the catalog
    #[error("no such resource: {physical_id}")]
    NotFound { physical_id: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for simulated cloud operations.
pub type Result<T> = std::result::Result<T, Error>;
