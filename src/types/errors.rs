//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. `Error` is `Clone` so a single failed
//! in-flight fetch can be handed to every caller waiting on the same cache key.

use crate::filter::FilterError;
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the Stash MCP server.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Filter validation errors, raised before any remote call.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Protocol-level argument errors (wrong JSON type, missing parameter).
    #[error("validation error: {0}")]
    Validation(String),

    /// The remote service could not be reached (transport, timeout, auth).
    #[error("stash unreachable: {0}")]
    Connectivity(String),

    /// The remote service answered but rejected the query.
    #[error("stash query failed: {0}")]
    Remote(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A sub-fetch inside an analysis failed.
    #[error("{stage} fetch failed: {source}")]
    SubFetch {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// Startup-fatal configuration problems.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(String),
}

impl Error {
    /// Stable category name reported to protocol clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Filter(_) | Error::Validation(_) => "validation",
            Error::Connectivity(_) => "connectivity",
            Error::Remote(_) => "remote",
            Error::NotFound(_) => "not_found",
            Error::SubFetch { source, .. } => source.kind(),
            Error::Config(_) => "config",
            Error::Internal(_) | Error::Serialization(_) | Error::Io(_) => "internal",
        }
    }

    /// Only connectivity failures are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == "connectivity"
    }

    /// Name of the failed sub-fetch, if this error came out of an analysis.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Error::SubFetch { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Tag an error with the analysis sub-fetch it came from.
    pub fn sub_fetch(stage: &'static str, source: Error) -> Self {
        Self::SubFetch {
            stage,
            source: Box::new(source),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Remote(format!("malformed response: {err}"))
        } else {
            Self::Connectivity(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterError;

    #[test]
    fn test_kinds_distinguish_retry_from_reformulate() {
        let filter = Error::from(FilterError::InvalidField {
            field: "hair_length".to_string(),
        });
        assert_eq!(filter.kind(), "validation");
        assert!(!filter.is_retryable());

        let conn = Error::connectivity("connection refused");
        assert_eq!(conn.kind(), "connectivity");
        assert!(conn.is_retryable());
        assert!(conn.to_string().contains("unreachable"));
    }

    #[test]
    fn test_sub_fetch_keeps_source_kind() {
        let err = Error::sub_fetch("similar_performers", Error::connectivity("timeout"));
        assert_eq!(err.kind(), "connectivity");
        assert_eq!(err.stage(), Some("similar_performers"));
        assert_eq!(
            err.to_string(),
            "similar_performers fetch failed: stash unreachable: timeout"
        );
    }

    #[test]
    fn test_serde_error_converts() {
        let parse = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: Error = parse.into();
        assert_eq!(err.kind(), "internal");
    }
}
