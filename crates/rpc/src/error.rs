//! RPC error types.

use thiserror::Error;

/// Errors returned by sibling service calls.
///
/// `Unavailable` and `Timeout` are transient and may succeed on a later
/// attempt; `NotFound` and `Rejected` are final answers from the service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The requested record does not exist.
    #[error("{service} service: {entity} not found: {id}")]
    NotFound {
        service: &'static str,
        entity: &'static str,
        id: String,
    },

    /// The service refused the request.
    #[error("{service} service rejected the request: {reason}")]
    Rejected {
        service: &'static str,
        reason: String,
    },

    /// The service could not be reached.
    #[error("{service} service unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    /// The call did not complete within its deadline.
    #[error("{service} service timed out after {after_ms}ms")]
    Timeout { service: &'static str, after_ms: u64 },
}

impl RpcError {
    /// Returns true if retrying the call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Unavailable { .. } | RpcError::Timeout { .. })
    }

    /// Name of the service that produced the error.
    pub fn service(&self) -> &'static str {
        match self {
            RpcError::NotFound { service, .. }
            | RpcError::Rejected { service, .. }
            | RpcError::Unavailable { service, .. }
            | RpcError::Timeout { service, .. } => service,
        }
    }

    pub(crate) fn unavailable(service: &'static str) -> Self {
        RpcError::Unavailable {
            service,
            reason: "connection refused".to_string(),
        }
    }
}

/// Convenience type alias for RPC results.
pub type Result<T> = std::result::Result<T, RpcError>;
