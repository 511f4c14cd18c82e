//! Credentialed strategy: the direct call with the session cookie jar
//! and visitor id attached. Skipped by the orchestrator when no bundle
//! was loaded — a bare attempt would just duplicate `direct`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::identity::{web_identity, ClientIdentity};
use crate::resolver::model::{CandidateRelay, ResolutionRequest, StrategyDescriptor, StrategyOutcome};
use crate::resolver::strategy::{attempt_upstream, ResolveStrategy, DIRECT_TIMEOUT};
use crate::upstream::UpstreamClient;

pub struct CredentialedStrategy {
    upstream: Arc<dyn UpstreamClient>,
    identity: ClientIdentity,
}

impl CredentialedStrategy {
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            upstream,
            identity: web_identity(),
        }
    }
}

#[async_trait]
impl ResolveStrategy for CredentialedStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor {
            name: "credentialed",
            priority: 1,
            attempt_timeout: DIRECT_TIMEOUT,
            needs_relay: false,
            needs_credentials: true,
        }
    }

    async fn attempt(
        &self,
        request: &ResolutionRequest,
        relay: Option<&CandidateRelay>,
    ) -> StrategyOutcome {
        attempt_upstream(
            self.descriptor(),
            self.upstream.as_ref(),
            &self.identity,
            request,
            relay,
            true,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialBundle;
    use crate::resolver::model::{MediaId, Outcome};
    use crate::upstream::{CallError, CallOptions, MediaCandidate};
    use std::time::Duration;

    struct CredentialAsserting;

    #[async_trait]
    impl UpstreamClient for CredentialAsserting {
        async fn player(
            &self,
            _media: &MediaId,
            opts: &CallOptions<'_>,
        ) -> Result<MediaCandidate, CallError> {
            let bundle = opts.credentials.expect("bundle must be attached");
            assert_eq!(bundle.get("SID"), Some("session-x"));
            Ok(MediaCandidate {
                url: "https://cdn.example/c".into(),
                title: "T".into(),
                author: "A".into(),
                thumbnail: None,
                duration_seconds: 0,
                mime_type: None,
            })
        }
    }

    #[tokio::test]
    async fn test_attaches_bundle() {
        let bundle = CredentialBundle::parse(".youtube.com\tTRUE\t/\tTRUE\t0\tSID\tsession-x");
        let request = ResolutionRequest::new(
            MediaId::parse("dQw4w9WgXcQ").unwrap(),
            Duration::from_secs(10),
            Some(Arc::new(bundle)),
        );
        let strategy = CredentialedStrategy::new(Arc::new(CredentialAsserting));
        let outcome = strategy.attempt(&request, None).await;
        assert!(matches!(outcome.result, Outcome::Success(_)));
        assert_eq!(outcome.strategy, "credentialed");
    }

    #[test]
    fn test_descriptor_requires_credentials() {
        let strategy = CredentialedStrategy::new(Arc::new(CredentialAsserting));
        assert!(strategy.descriptor().needs_credentials);
        assert!(!strategy.descriptor().needs_relay);
    }
}
