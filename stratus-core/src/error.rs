//! Error types shared by the reconciliation engine and the API client

use thiserror::Error;

use crate::api::RequestPhase;

/// Errors that can occur while reading or reconciling a deployment
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level or non-2xx failure from the provisioning service
    #[error("API request failed: {0}")]
    Api(String),

    /// A response body could not be decoded
    #[error("Failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),

    /// An asynchronous request reached a terminal failure phase.
    /// The completion details are reported verbatim for operator diagnosis.
    #[error("Request {request_id} finished with phase {phase}: {details}")]
    RequestFailed {
        request_id: String,
        phase: RequestPhase,
        details: String,
    },

    /// The poll budget was exhausted while the request was still running.
    /// The remote side may complete later, so the local state cannot be
    /// trusted until it is refreshed.
    #[error(
        "Request {request_id} did not finish within {waited_secs}s (last phase {phase}). \
         Refresh the deployment state to pick up the final result before retrying"
    )]
    RequestTimedOut {
        request_id: String,
        phase: RequestPhase,
        waited_secs: u64,
    },

    /// The resource configuration names components that do not exist in the
    /// catalog blueprint. Raised before any remote mutation.
    #[error("The resource configuration has invalid component name(s): {}", names.join(", "))]
    InvalidComponents { names: Vec<String> },

    /// Resource view pagination metadata changed between page fetches.
    /// The read should be retried as a whole.
    #[error(
        "Resource view pagination changed while reading ({expected} total pages, then {actual}); \
         retry the read"
    )]
    InconsistentResourceView { expected: u32, actual: u32 },

    /// The deployment behind a provisioning request no longer exists
    #[error("No deployment found for request {0}")]
    DeploymentNotFound(String),

    /// No entitled catalog item carries the given name
    #[error("Catalog item {0} not found")]
    CatalogItemNotFound(String),
}

impl Error {
    /// Create a transport/API error
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api(message.into())
    }
}

/// Result type for engine and client operations
pub type Result<T> = std::result::Result<T, Error>;
