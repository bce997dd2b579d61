use std::time::Duration;

use thiserror::Error;

/// An error that happens when fetching data from the upstream inventory API.
///
/// Variants are kept coarse on purpose: callers only ever branch on "not
/// found", "upstream trouble" and "our bug", everything else is detail for the
/// logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The requested entity does not exist upstream.
    #[error("not found")]
    NotFound,
    /// The upstream request exceeded the configured timeout.
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),
    /// The upstream request failed due to connection loss, a 5xx response, or
    /// an explicit failure payload.
    ///
    /// The attached string contains the upstream's reason.
    #[error("upstream request failed: {0}")]
    Upstream(String),
    /// The upstream responded, but the payload could not be interpreted.
    #[error("malformed upstream response: {0}")]
    Malformed(String),
    /// An unexpected error in assetwatch itself.
    #[error("internal error")]
    InternalError,
}

impl CacheError {
    #[track_caller]
    pub fn from_std_error<E: std::error::Error + 'static>(e: E) -> Self {
        let dynerr: &dyn std::error::Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::InternalError
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// A result from a cache, containing either `Ok(T)` or an error denoting why
/// the data could not be fetched.
pub type CacheEntry<T = ()> = Result<T, CacheError>;
