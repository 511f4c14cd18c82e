//! Alternate-path strategy: retries the call with the music client
//! identity against the music host form. That request shape sits behind
//! different upstream checks and sometimes clears restrictions the
//! primary web shape triggers. Credentials ride along when loaded.

use std::sync::Arc;

use async_trait::async_trait;

use crate::identity::{music_identity, ClientIdentity};
use crate::resolver::model::{CandidateRelay, ResolutionRequest, StrategyDescriptor, StrategyOutcome};
use crate::resolver::strategy::{attempt_upstream, ResolveStrategy, DIRECT_TIMEOUT};
use crate::upstream::UpstreamClient;

pub struct AlternatePathStrategy {
    upstream: Arc<dyn UpstreamClient>,
    identity: ClientIdentity,
}

impl AlternatePathStrategy {
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            upstream,
            identity: music_identity(),
        }
    }
}

#[async_trait]
impl ResolveStrategy for AlternatePathStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor {
            name: "alternate-path",
            priority: 3,
            attempt_timeout: DIRECT_TIMEOUT,
            needs_relay: false,
            needs_credentials: false,
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
    use crate::resolver::model::{MediaId, Outcome};
    use crate::upstream::{CallError, CallOptions, MediaCandidate};
    use std::time::Duration;

    struct IdentityAsserting;

    #[async_trait]
    impl UpstreamClient for IdentityAsserting {
        async fn player(
            &self,
            _media: &MediaId,
            opts: &CallOptions<'_>,
        ) -> Result<MediaCandidate, CallError> {
            assert_eq!(opts.identity.client_name, "WEB_REMIX");
            assert_eq!(opts.identity.host, "music.youtube.com");
            Ok(MediaCandidate {
                url: "https://cdn.example/alt".into(),
                title: "T".into(),
                author: "A".into(),
                thumbnail: None,
                duration_seconds: 0,
                mime_type: None,
            })
        }
    }

    #[tokio::test]
    async fn test_uses_music_shape() {
        let request = ResolutionRequest::new(
            MediaId::parse("dQw4w9WgXcQ").unwrap(),
            Duration::from_secs(10),
            None,
        );
        let strategy = AlternatePathStrategy::new(Arc::new(IdentityAsserting));
        let outcome = strategy.attempt(&request, None).await;
        assert!(matches!(outcome.result, Outcome::Success(_)));
        assert_eq!(outcome.strategy, "alternate-path");
    }
}
