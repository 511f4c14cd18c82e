//! Core data model: media identifiers, requests, relays, strategy metadata,
//! and the terminal [`ResolutionResult`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

use crate::credentials::CredentialBundle;
use crate::resolver::error::{ResolveError, Result};

/// Bare 11-character media id charset.
static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

/// Validated opaque reference to the remote content to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MediaId(String);

impl MediaId {
    /// Parse a raw id or any of the accepted URL shapes:
    /// `watch?v=`, `youtu.be/`, `music.…/watch?v=`, `/embed/`, `/v/`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if ID_RE.is_match(input) {
            return Ok(Self(input.to_string()));
        }

        let candidate = if input.starts_with("http://") || input.starts_with("https://") {
            input.to_string()
        } else {
            format!("https://{input}")
        };

        let url = Url::parse(&candidate)
            .map_err(|_| ResolveError::InvalidIdentifier(input.to_string()))?;

        let host = url.host_str().unwrap_or_default();
        let id = if host.ends_with("youtu.be") {
            url.path().trim_start_matches('/').to_string()
        } else if host.ends_with("youtube.com") || host.ends_with("youtube-nocookie.com") {
            let path = url.path();
            if path == "/watch" {
                url.query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned())
                    .unwrap_or_default()
            } else if let Some(rest) = path.strip_prefix("/embed/") {
                rest.to_string()
            } else if let Some(rest) = path.strip_prefix("/v/") {
                rest.to_string()
            } else {
                String::new()
            }
        } else {
            String::new()
        };

        if ID_RE.is_match(&id) {
            Ok(Self(id))
        } else {
            Err(ResolveError::InvalidIdentifier(input.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch-page URL form, used by the subprocess strategy.
    #[must_use]
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One resolution request. Immutable once created; exactly one terminal
/// outcome is produced for it.
#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    /// Correlation id for logs.
    pub id: Uuid,
    pub media: MediaId,
    pub requested_at: DateTime<Utc>,
    /// Absolute global deadline. Authoritative: once reached, no further
    /// attempts are launched.
    pub deadline: Instant,
    /// Session material loaded once per process, read-only.
    pub credentials: Option<Arc<CredentialBundle>>,
}

impl ResolutionRequest {
    #[must_use]
    pub fn new(
        media: MediaId,
        global_timeout: Duration,
        credentials: Option<Arc<CredentialBundle>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            media,
            requested_at: Utc::now(),
            deadline: Instant::now() + global_timeout,
            credentials,
        }
    }

    /// Budget left before the global deadline. Zero once past it.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Where a relay candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayOrigin {
    Registry,
    StaticFallback,
}

/// Probe verdict for a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Unknown,
    Alive,
    Dead,
}

/// A candidate network egress point. Request-scoped; each probe writes to
/// its own copy and the health checker merges results under one collector.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateRelay {
    /// `host:port` or a full base URL.
    pub address: String,
    pub origin: RelayOrigin,
    /// Measured round-trip, set once per probe cycle.
    pub latency: Option<Duration>,
    pub liveness: Liveness,
}

impl CandidateRelay {
    #[must_use]
    pub fn new(address: impl Into<String>, origin: RelayOrigin) -> Self {
        Self {
            address: address.into(),
            origin,
            latency: None,
            liveness: Liveness::Unknown,
        }
    }

    /// Proxy URL form accepted by the HTTP client.
    #[must_use]
    pub fn proxy_url(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        }
    }

    /// Endpoint probed for liveness.
    #[must_use]
    pub fn probe_url(&self) -> String {
        self.proxy_url()
    }
}

/// Static identity of a strategy in the chain.
#[derive(Debug, Clone, Copy)]
pub struct StrategyDescriptor {
    pub name: &'static str,
    /// Position in the declared chain order (lower runs first).
    pub priority: u8,
    /// Upper bound for one attempt; always clamped to the remaining
    /// global budget before use.
    pub attempt_timeout: Duration,
    pub needs_relay: bool,
    pub needs_credentials: bool,
}

/// Terminal artifact of a successful resolution. The URL passed
/// validation at the moment this was produced; validity may lapse later.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionResult {
    pub url: String,
    pub title: String,
    pub author: String,
    pub thumbnail: Option<String>,
    /// Zero when the upstream did not report a duration.
    pub duration_seconds: u64,
    pub mime_type: Option<String>,
    /// Name of the strategy that produced the URL.
    pub strategy: &'static str,
    /// Total wall-clock time for the whole resolution.
    pub elapsed: Duration,
}

/// Result of one strategy attempt. Consumed immediately by the
/// orchestrator, retained only in the attempt trail.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub strategy: &'static str,
    pub result: Outcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Success(ResolutionResult),
    Failure {
        kind: crate::resolver::error::ErrorKind,
        detail: String,
    },
    TimedOut,
}

impl StrategyOutcome {
    #[must_use]
    pub fn success(strategy: &'static str, result: ResolutionResult, elapsed: Duration) -> Self {
        Self {
            strategy,
            result: Outcome::Success(result),
            elapsed,
        }
    }

    #[must_use]
    pub fn failure(
        strategy: &'static str,
        kind: crate::resolver::error::ErrorKind,
        detail: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            strategy,
            result: Outcome::Failure {
                kind,
                detail: detail.into(),
            },
            elapsed,
        }
    }

    #[must_use]
    pub fn timed_out(strategy: &'static str, elapsed: Duration) -> Self {
        Self {
            strategy,
            result: Outcome::TimedOut,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_id() {
        let id = MediaId::parse("dQw4w9WgXcQ").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_parse_watch_url() {
        let id = MediaId::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10s").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_parse_music_url() {
        let id = MediaId::parse("https://music.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_parse_short_url() {
        let id = MediaId::parse("https://youtu.be/dQw4w9WgXcQ?si=xyz").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_parse_embed_and_v_paths() {
        let id = MediaId::parse("https://www.youtube.com/embed/dQw4w9WgXcQ").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
        let id = MediaId::parse("https://www.youtube.com/v/dQw4w9WgXcQ").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_parse_without_scheme() {
        let id = MediaId::parse("youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(MediaId::parse("").is_err());
        assert!(MediaId::parse("not a url").is_err());
        assert!(MediaId::parse("https://example.com/watch?v=abc").is_err());
        // Wrong id length
        assert!(MediaId::parse("https://youtu.be/short").is_err());
    }

    #[test]
    fn test_watch_url() {
        let id = MediaId::parse("dQw4w9WgXcQ").unwrap();
        assert_eq!(id.watch_url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn test_relay_proxy_url() {
        let relay = CandidateRelay::new("10.0.0.1:8080", RelayOrigin::Registry);
        assert_eq!(relay.proxy_url(), "http://10.0.0.1:8080");

        let relay = CandidateRelay::new("socks5://10.0.0.2:1080", RelayOrigin::StaticFallback);
        assert_eq!(relay.proxy_url(), "socks5://10.0.0.2:1080");
    }

    #[tokio::test]
    async fn test_request_remaining_saturates() {
        let media = MediaId::parse("dQw4w9WgXcQ").unwrap();
        let request = ResolutionRequest::new(media, Duration::ZERO, None);
        assert_eq!(request.remaining(), Duration::ZERO);
    }
}
