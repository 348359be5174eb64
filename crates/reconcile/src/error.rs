//! Error types for the reconciliation engine.
//!
//! Errors are categorized so callers can tell declaration problems (fatal,
//! raised before any provider call) apart from per-node provider failures,
//! which leave independent branches of a run unaffected.

use thiserror::Error;

/// Categories of reconciliation errors for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid declaration set (cycle, duplicate id, unknown reference)
    Declaration,
    /// A create/update/delete call against a provider failed
    Provider,
    /// State store IO, serialization, or lock contention
    State,
    /// An exported property cell never resolved
    Output,
}

impl ErrorCategory {
    /// Whether this error aborts the run before any provider call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Declaration)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Declaration => "Invalid declaration",
            Self::Provider => "Provider call failed",
            Self::State => "State store problem",
            Self::Output => "Unresolved output",
        }
    }
}

/// Errors that can occur while building, planning, or applying a program.
#[derive(Debug, Error)]
pub enum Error {
    /// Two resources were declared with the same logical id
    #[error("duplicate resource id: {id}")]
    DuplicateNode { id: String },

    /// An input references a node that was never declared
    #[error("resource '{node}' references undeclared node '{reference}'")]
    UnknownReference { node: String, reference: String },

    /// The declared inputs form a reference cycle
    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// No provider is registered for a declared resource type
    #[error("no provider registered for resource type: {type_token}")]
    UnknownType { type_token: String },

    /// A provider call failed; the failure is local to the named node
    #[error("provider call failed for '{node}': {message}")]
    Provider { node: String, message: String },

    /// An exported cell never reached resolved state
    #[error("exported output '{name}' never resolved (producer: {producer})")]
    UnresolvedOutput { name: String, producer: String },

    /// Another run holds the lock for this store or record
    #[error("state conflict: {message}")]
    StateConflict { message: String },

    /// The persisted state could not be read or written
    #[error("state store error: {message}")]
    Store { message: String },

    /// The worker pool could not be built
    #[error("scheduler error: {message}")]
    Scheduler { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Get the error category for reporting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::DuplicateNode { .. }
            | Error::UnknownReference { .. }
            | Error::Cycle { .. }
            | Error::UnknownType { .. } => ErrorCategory::Declaration,
            Error::Provider { .. } => ErrorCategory::Provider,
            Error::UnresolvedOutput { .. } => ErrorCategory::Output,
            Error::StateConflict { .. }
            | Error::Store { .. }
            | Error::Scheduler { .. }
            | Error::Io(_)
            | Error::Json(_) => ErrorCategory::State,
        }
    }

    /// Whether this error aborts the run before any provider call.
    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
