//! Unified error handling for fabricctl-core
//!
//! Every layer of the client returns [`FabricError`]. The variants follow the
//! outcome classification of the HTTP executor, so callers can branch on the
//! kind of failure without parsing messages.
//!
//! # Example
//!
//! ```rust
//! use fabricctl_core::FabricError;
//!
//! fn handle_error(err: FabricError) {
//!     if err.is_not_found() {
//!         println!("Resource is gone, drop it from state");
//!     } else if err.is_retryable() {
//!         println!("Temporary error, the next apply may succeed");
//!     }
//! }
//!
//! let err = FabricError::Request {
//!     url: "https://api.fabric.microsoft.com/v1/workspaces/ws-1".to_string(),
//!     status: 503,
//!     body: "unavailable".to_string(),
//! };
//! assert!(err.is_server_error());
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the token store, HTTP executor, poller and reconciler
#[derive(Error, Debug)]
pub enum FabricError {
    /// Token acquisition or refresh failed
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Transport-level failure (DNS, connection reset, TLS)
    #[error("Network error calling {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The per-request timeout elapsed
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// The API answered 404
    #[error("Resource not found: {url}")]
    NotFound { url: String },

    /// The API answered 400
    #[error("Bad request to {url}: {body}")]
    BadRequest { url: String, body: String },

    /// Any other non-success status; `body` is the raw response text
    #[error("Request to {url} failed with status code {status}: {body}")]
    Request {
        url: String,
        status: u16,
        body: String,
    },

    /// A success response carried a body that could not be decoded
    #[error("Failed to decode response from {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// An asynchronous POST came back without an `x-ms-operation-id` header
    #[error("No operation ID found in response from {url}")]
    OperationNotFound { url: String },

    /// The poll schedule was exhausted before the operation completed
    #[error("Operation {operation_id} did not complete after {attempts} polls")]
    OperationTimeout { operation_id: String, attempts: u32 },

    /// The desired membership list repeats an identity key
    #[error("Duplicate identity found: {key}")]
    DuplicateIdentity { key: String },

    /// Reading or writing the persisted token file failed
    #[error("Token file {path} could not be accessed: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Client construction failed
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, FabricError>;

impl FabricError {
    /// HTTP status attached to this error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            FabricError::NotFound { .. } => Some(404),
            FabricError::BadRequest { .. } => Some(400),
            FabricError::Request { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if this is a "not found" error (404)
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, FabricError::NotFound { .. })
    }

    /// Returns true if this is a bad request error (400)
    #[must_use]
    pub fn is_bad_request(&self) -> bool {
        matches!(self, FabricError::BadRequest { .. })
    }

    /// Returns true if this is an authentication/authorization error
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FabricError::Auth(_)) || matches!(self.status(), Some(401 | 403))
    }

    /// Returns true if this is a server error (5xx)
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(500..=599))
    }

    /// Returns true if a deadline elapsed, either per request or while polling
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FabricError::Timeout { .. } | FabricError::OperationTimeout { .. }
        )
    }

    /// Returns true if this error is potentially retryable
    ///
    /// The client never retries on its own under the default policy; this only
    /// classifies the failure for callers and custom retry policies.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            FabricError::Network { .. } | FabricError::Timeout { .. } => true,
            FabricError::OperationTimeout { .. } => true,
            FabricError::Request { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    pub(crate) fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        FabricError::Decode {
            context: context.into(),
            source,
        }
    }
}
