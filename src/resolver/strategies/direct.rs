//! Direct strategy: the upstream call with no relay and the default
//! web identity. First in the chain; succeeds for unrestricted content.

use std::sync::Arc;

use async_trait::async_trait;

use crate::identity::{web_identity, ClientIdentity};
use crate::resolver::model::{CandidateRelay, ResolutionRequest, StrategyDescriptor, StrategyOutcome};
use crate::resolver::strategy::{attempt_upstream, ResolveStrategy, DIRECT_TIMEOUT};
use crate::upstream::UpstreamClient;

pub struct DirectStrategy {
    upstream: Arc<dyn UpstreamClient>,
    identity: ClientIdentity,
}

impl DirectStrategy {
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            upstream,
            identity: web_identity(),
        }
    }
}

#[async_trait]
impl ResolveStrategy for DirectStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor {
            name: "direct",
            priority: 0,
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
            false,
        )
        .await
    }
}
