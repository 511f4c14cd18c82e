//! Failure classification for resolution attempts.
//!
//! Every strategy failure maps to exactly one [`ErrorKind`]; the kind
//! decides whether the orchestrator retries the same strategy (transient)
//! or advances down the chain (everything else). Callers never see
//! individual attempt errors, only [`ResolveError`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed classification of why a single strategy attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Upstream demands credentials the bundle does not satisfy.
    AuthRequired,
    /// Content unavailable for the apparent network origin.
    GeoRestricted,
    /// Upstream signaled throttling. Transient.
    RateLimited,
    /// No response within the attempt timeout. Transient.
    NetworkTimeout,
    /// Upstream answered but returned no usable stream.
    NoMediaFound,
    /// Strategy reported success but the returned URL failed validation.
    Unreachable,
    /// Anything else.
    Unclassified,
}

impl ErrorKind {
    /// Transient kinds are eligible for same-strategy backoff-retry;
    /// all others advance the chain immediately.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::RateLimited | Self::NetworkTimeout)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthRequired => "auth-required",
            Self::GeoRestricted => "geo-restricted",
            Self::RateLimited => "rate-limited",
            Self::NetworkTimeout => "network-timeout",
            Self::NoMediaFound => "no-media-found",
            Self::Unreachable => "unreachable",
            Self::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal error returned to the caller.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("invalid media identifier: {0}")]
    InvalidIdentifier(String),

    #[error("resolution exhausted after {attempts} attempt(s) in {elapsed:?}: last failure was {last_kind}")]
    Exhausted {
        /// Classification of the final failed attempt.
        last_kind: ErrorKind,
        /// Total attempts made across all strategies (retries included).
        attempts: usize,
        /// Wall-clock time spent before giving up.
        elapsed: Duration,
    },
}

impl ResolveError {
    /// The last observed failure kind, for transport-layer messaging.
    #[must_use]
    pub fn last_kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentifier(_) => ErrorKind::Unclassified,
            Self::Exhausted { last_kind, .. } => *last_kind,
        }
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
