//! Relayed strategy: routes the upstream call through a ranked relay.
//!
//! Uses the android identity — the most permissive shape for plain
//! extraction — since the relay is already doing the origin work. The
//! orchestrator hands it relays fastest-first and skips it entirely
//! when the health checker found none alive.

use std::sync::Arc;

use async_trait::async_trait;

use crate::identity::{android_identity, ClientIdentity};
use crate::resolver::error::ErrorKind;
use crate::resolver::model::{CandidateRelay, ResolutionRequest, StrategyDescriptor, StrategyOutcome};
use crate::resolver::strategy::{attempt_upstream, ResolveStrategy, RELAYED_TIMEOUT};
use crate::upstream::UpstreamClient;

pub struct RelayedStrategy {
    upstream: Arc<dyn UpstreamClient>,
    identity: ClientIdentity,
}

impl RelayedStrategy {
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            upstream,
            identity: android_identity(),
        }
    }
}

#[async_trait]
impl ResolveStrategy for RelayedStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor {
            name: "relayed",
            priority: 2,
            attempt_timeout: RELAYED_TIMEOUT,
            needs_relay: true,
            needs_credentials: false,
        }
    }

    async fn attempt(
        &self,
        request: &ResolutionRequest,
        relay: Option<&CandidateRelay>,
    ) -> StrategyOutcome {
        let Some(relay) = relay else {
            return StrategyOutcome::failure(
                "relayed",
                ErrorKind::Unclassified,
                "relayed attempt invoked without a relay",
                std::time::Duration::ZERO,
            );
        };

        attempt_upstream(
            self.descriptor(),
            self.upstream.as_ref(),
            &self.identity,
            request,
            Some(relay),
            false,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::model::{MediaId, Outcome, RelayOrigin};
    use crate::upstream::{CallError, CallOptions, MediaCandidate};
    use std::time::Duration;

    struct RelayAsserting;

    #[async_trait]
    impl UpstreamClient for RelayAsserting {
        async fn player(
            &self,
            _media: &MediaId,
            opts: &CallOptions<'_>,
        ) -> Result<MediaCandidate, CallError> {
            let relay = opts.relay.expect("relay must be passed through");
            assert_eq!(relay.address, "10.0.0.1:8080");
            assert_eq!(opts.identity.client_name, "ANDROID");
            Ok(MediaCandidate {
                url: "https://cdn.example/r".into(),
                title: "T".into(),
                author: "A".into(),
                thumbnail: None,
                duration_seconds: 0,
                mime_type: None,
            })
        }
    }

    fn request() -> ResolutionRequest {
        ResolutionRequest::new(
            MediaId::parse("dQw4w9WgXcQ").unwrap(),
            Duration::from_secs(10),
            None,
        )
    }

    #[tokio::test]
    async fn test_routes_through_given_relay() {
        let strategy = RelayedStrategy::new(Arc::new(RelayAsserting));
        let relay = CandidateRelay::new("10.0.0.1:8080", RelayOrigin::Registry);
        let outcome = strategy.attempt(&request(), Some(&relay)).await;
        assert!(matches!(outcome.result, Outcome::Success(_)));
    }

    #[tokio::test]
    async fn test_fails_without_relay() {
        let strategy = RelayedStrategy::new(Arc::new(RelayAsserting));
        let outcome = strategy.attempt(&request(), None).await;
        match outcome.result {
            Outcome::Failure { kind, .. } => assert_eq!(kind, ErrorKind::Unclassified),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
