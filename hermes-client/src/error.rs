//! Transport-level errors for talking to the control plane.

use thiserror::Error;

/// Errors from the signed HTTP client and the control-plane API wrapper.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to build an outbound request.
    #[error("failed to build request: {0}")]
    Build(#[from] http::Error),

    /// The underlying hyper client failed to send the request.
    #[error("request failed: {0}")]
    Send(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Failed to read the response body.
    #[error("failed to read response body: {0}")]
    ReadBody(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The control plane responded with a non-200 status.
    #[error("control plane returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: http::StatusCode,
        /// Response body, truncated for logging.
        body: String,
    },

    /// The response body was not valid JSON for the expected type.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,
}

/// Convenience alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
