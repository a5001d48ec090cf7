//! Diagnostic record of the provider calls made during one resolution.

use serde::Serialize;

use crate::{error::FetchError, provider::ProviderId, resolver::Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptOutcome {
    Success,
    HttpError,
    NetworkError,
    Timeout,
    InvalidPayload,
    NoMatch,
    /// The strategy was selected but its provider is not configured.
    Skipped,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::HttpError => "http-error",
            AttemptOutcome::NetworkError => "network-error",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::InvalidPayload => "invalid-payload",
            AttemptOutcome::NoMatch => "no-match",
            AttemptOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub strategy: Strategy,
    pub provider: ProviderId,
    pub target: String,
    pub outcome: AttemptOutcome,
    pub status_code: Option<u16>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchTrace {
    attempts: Vec<Attempt>,
}

impl FetchTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn strategies(&self) -> Vec<Strategy> {
        self.attempts.iter().map(|a| a.strategy).collect()
    }

    pub(crate) fn record_success(&mut self, strategy: Strategy, target: String) {
        self.attempts.push(Attempt {
            strategy,
            provider: strategy.provider(),
            target,
            outcome: AttemptOutcome::Success,
            status_code: Some(200),
            detail: None,
        });
    }

    pub(crate) fn record_failure(&mut self, strategy: Strategy, target: String, err: &FetchError) {
        self.attempts.push(Attempt {
            strategy,
            provider: strategy.provider(),
            target,
            outcome: err.outcome(),
            status_code: err.status_code(),
            detail: Some(err.to_string()),
        });
    }

    /// A geocoding step that failed outright. Recorded as `no-match` for the
    /// strategy, with the provider's status and error kept in the detail.
    pub(crate) fn record_geocode_failure(
        &mut self,
        strategy: Strategy,
        target: String,
        err: &FetchError,
    ) {
        self.attempts.push(Attempt {
            strategy,
            provider: strategy.provider(),
            target,
            outcome: AttemptOutcome::NoMatch,
            status_code: err.status_code(),
            detail: Some(format!("geocoding {}: {err}", err.outcome().as_str())),
        });
    }

    pub(crate) fn record_skipped(&mut self, strategy: Strategy, target: String, reason: &str) {
        self.attempts.push(Attempt {
            strategy,
            provider: strategy.provider(),
            target,
            outcome: AttemptOutcome::Skipped,
            status_code: None,
            detail: Some(reason.to_string()),
        });
    }
}

impl std::fmt::Display for FetchTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.attempts.is_empty() {
            return f.write_str("  (no provider attempted)");
        }
        for (i, a) in self.attempts.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {}. [{}] {} -> {}", i + 1, a.provider, a.target, a.outcome.as_str())?;
            if let Some(status) = a.status_code {
                write!(f, " ({status})")?;
            }
            if let Some(detail) = a.detail.as_deref().filter(|_| a.outcome != AttemptOutcome::Success) {
                write!(f, ": {detail}")?;
            }
        }
        Ok(())
    }
}
