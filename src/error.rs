//! Error types for the storage release operator
//!
//! One error enum covers the release manager, the cluster status probes,
//! the catalog and the reconciling orchestrator. Every variant maps onto an
//! HTTP status so the REST layer never has to inspect error text.

use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Capacity parse error: {0}")]
    CapacityParse(String),

    // =========================================================================
    // Release Manager Errors
    // =========================================================================
    #[error("Release install failed: {0}")]
    Install(String),

    #[error("Release name already in use: {0}")]
    ReleaseNameInUse(String),

    #[error("Release manager error: {operation}: {reason}")]
    ReleaseManager { operation: String, reason: String },

    // =========================================================================
    // Lookup Errors
    // =========================================================================
    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    // =========================================================================
    // Reconciliation Errors
    // =========================================================================
    #[error("Rendered resources could not be decoded: {0}")]
    Decode(String),

    #[error("Catalog persistence error: {0}")]
    Persistence(String),

    #[error("Status probe '{probe}' failed: {reason}")]
    StatusProbe { probe: String, reason: String },

    #[error("Timed out after {limit:?}: {operation}")]
    Timeout { operation: String, limit: Duration },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a missing storage record or release
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// HTTP status the REST layer answers with for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_)
            | Error::CapacityParse(_)
            | Error::Install(_)
            | Error::ReleaseNameInUse(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::Kube(kube::Error::Api(resp)) if resp.code == 404 => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error reports an absent release, record or object
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if this error is transient and worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 429 || resp.code >= 500,
            Error::Kube(kube::Error::HyperError(_)) | Error::Kube(kube::Error::Service(_)) => true,
            _ => false,
        }
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;
