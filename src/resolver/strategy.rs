//! Strategy trait and the shared upstream-attempt plumbing.
//!
//! A strategy is one named technique for producing a stream URL. The set
//! is closed: direct, credentialed, relayed, alternate-path, and
//! external-process. Each attempt reports a [`StrategyOutcome`] with a
//! classified failure — never an unclassified error type — so the
//! orchestrator can decide retry vs. fallback without inspecting
//! strategy internals.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::identity::ClientIdentity;
use crate::resolver::model::{
    CandidateRelay, ResolutionRequest, ResolutionResult, StrategyDescriptor, StrategyOutcome,
};
use crate::upstream::{CallOptions, UpstreamClient};

/// One resolution technique.
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    /// Static identity: name, chain position, timeout, prerequisites.
    fn descriptor(&self) -> StrategyDescriptor;

    /// Run one attempt. Must be safe to wrap in the deadline governor
    /// (no shared mutable state the caller could observe mid-flight).
    async fn attempt(
        &self,
        request: &ResolutionRequest,
        relay: Option<&CandidateRelay>,
    ) -> StrategyOutcome;
}

/// Shared attempt body for the in-process upstream strategies.
///
/// `attach_credentials` attaches the request's bundle when one is loaded;
/// strategies that require credentials are skipped upstream of this when
/// the bundle is missing.
pub(crate) async fn attempt_upstream(
    descriptor: StrategyDescriptor,
    upstream: &dyn UpstreamClient,
    identity: &ClientIdentity,
    request: &ResolutionRequest,
    relay: Option<&CandidateRelay>,
    attach_credentials: bool,
) -> StrategyOutcome {
    let start = Instant::now();

    let credentials = if attach_credentials {
        request.credentials.as_deref()
    } else {
        None
    };

    let opts = CallOptions {
        identity,
        relay,
        credentials,
        timeout: descriptor.attempt_timeout,
    };

    debug!(
        request = %request.id,
        strategy = descriptor.name,
        identity = identity.name,
        relay = relay.map(|r| r.address.as_str()),
        "attempting upstream call"
    );

    match upstream.player(&request.media, &opts).await {
        Ok(candidate) => {
            let elapsed = start.elapsed();
            let result = ResolutionResult {
                url: candidate.url,
                title: candidate.title,
                author: candidate.author,
                thumbnail: candidate.thumbnail,
                duration_seconds: candidate.duration_seconds,
                mime_type: candidate.mime_type,
                strategy: descriptor.name,
                // Attempt-local elapsed; the orchestrator replaces this
                // with the whole-resolution time before returning.
                elapsed,
            };
            StrategyOutcome::success(descriptor.name, result, elapsed)
        }
        Err(err) => StrategyOutcome::failure(descriptor.name, err.kind, err.detail, start.elapsed()),
    }
}

/// Per-attempt timeout defaults, strictly smaller than any sane global
/// budget so a single attempt cannot monopolize it.
pub(crate) const DIRECT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const RELAYED_TIMEOUT: Duration = Duration::from_secs(12);
pub(crate) const EXTERNAL_TIMEOUT: Duration = Duration::from_secs(20);
