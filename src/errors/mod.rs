//! Error type definitions for the HLS proxy
//!
//! Provides a small hierarchical error system so that every failure mode
//! the proxy engine can hit maps onto a predictable HTTP status and body
//! shape at the handler boundary.

use axum::http::StatusCode;
use thiserror::Error;

/// Top-level proxy error type.
///
/// Every variant carries enough context to be logged once at the handler
/// boundary and rendered into either an HLS-shaped body (channel entry
/// route) or a plain-text body (encoded-resource route).
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Malformed input from the client: bad token, bad scheme, missing query param.
    #[error("{0}")]
    BadRequest(String),

    /// Unknown channel id or unmatched route.
    #[error("{0}")]
    NotFound(String),

    /// Upstream responded with a 4xx status; mirrored back to the client verbatim.
    #[error("upstream returned {status}")]
    UpstreamClientError { status: StatusCode, body: String },

    /// Upstream responded with a 5xx status.
    #[error("upstream server error: {0}")]
    UpstreamServerError(String),

    /// Transport-level failure after exhausting retries (connect/DNS/timeout/reset).
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),
}

impl ProxyError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    pub fn upstream_server_error<S: Into<String>>(message: S) -> Self {
        Self::UpstreamServerError(message.into())
    }

    pub fn upstream_unreachable<S: Into<String>>(message: S) -> Self {
        Self::UpstreamUnreachable(message.into())
    }

    /// The HTTP status this error renders as.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::UpstreamClientError { status, .. } => *status,
            ProxyError::UpstreamServerError(_) | ProxyError::UpstreamUnreachable(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// A short human-readable reason, suitable for embedding in an
    /// `#EXT-X-ERROR` line or a plain-text body.
    pub fn reason(&self) -> String {
        match self {
            ProxyError::BadRequest(msg) => msg.clone(),
            ProxyError::NotFound(msg) => msg.clone(),
            ProxyError::UpstreamClientError { status, .. } => format!("Upstream {}", status),
            ProxyError::UpstreamServerError(msg) => msg.clone(),
            ProxyError::UpstreamUnreachable(msg) => msg.clone(),
        }
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
