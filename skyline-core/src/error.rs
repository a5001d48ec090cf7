use std::time::Duration;

use crate::trace::{AttemptOutcome, FetchTrace};

/// Failure of a single provider call. Recorded in the trace, never returned
/// from a resolution on its own.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid payload: {0}")]
    Validation(String),

    #[error("no location matched '{0}'")]
    NotFound(String),
}

impl FetchError {
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            FetchError::Network(_) => AttemptOutcome::NetworkError,
            FetchError::Timeout(_) => AttemptOutcome::Timeout,
            FetchError::Http { .. } => AttemptOutcome::HttpError,
            FetchError::Validation(_) => AttemptOutcome::InvalidPayload,
            FetchError::NotFound(_) => AttemptOutcome::NoMatch,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose the configured deadline here
            return FetchError::Timeout(Duration::ZERO);
        }
        // The URL carries the API key; keep it out of messages and traces.
        FetchError::Network(err.without_url().to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Validation(err.to_string())
    }
}

/// Error returned to callers of the resolver.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("location query is empty")]
    EmptyQuery,

    #[error("coordinates out of range: lat {lat}, lon {lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("every weather provider failed for '{query}':\n{trace}")]
    ResolutionFailed { query: String, trace: FetchTrace },
}

impl ResolveError {
    /// Diagnostic trace, present when resolution was attempted.
    pub fn trace(&self) -> Option<&FetchTrace> {
        match self {
            ResolveError::ResolutionFailed { trace, .. } => Some(trace),
            _ => None,
        }
    }
}
