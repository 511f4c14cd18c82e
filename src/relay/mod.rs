//! Relay discovery and ranking.
//!
//! [`RelayRegistry`] fetches candidates from a remote directory (or the
//! static fallback), [`HealthChecker`] probes and ranks them, and
//! [`RelayPool`] glues the two behind the [`RelayFinder`] seam the
//! orchestrator consumes. Everything here is request-scoped: no relay
//! state is shared between resolutions.

pub mod health;
pub mod registry;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

pub use health::{HealthChecker, HttpRelayProber, RelayProber};
pub use registry::RelayRegistry;

use crate::resolver::model::CandidateRelay;

/// Source of ranked, alive relay candidates for one resolution.
#[async_trait]
pub trait RelayFinder: Send + Sync {
    /// Discover and rank relays within `budget`. An empty result means
    /// relay-routed strategies should be skipped entirely.
    async fn ranked(&self, budget: Duration) -> Vec<CandidateRelay>;
}

/// Registry fetch + health ranking under one discovery budget.
pub struct RelayPool {
    registry: RelayRegistry,
    checker: HealthChecker,
    registry_timeout: Duration,
    per_probe_timeout: Duration,
    overall_probe_timeout: Duration,
}

impl RelayPool {
    #[must_use]
    pub fn new(
        registry: RelayRegistry,
        checker: HealthChecker,
        registry_timeout: Duration,
        per_probe_timeout: Duration,
        overall_probe_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            checker,
            registry_timeout,
            per_probe_timeout,
            overall_probe_timeout,
        }
    }
}

#[async_trait]
impl RelayFinder for RelayPool {
    async fn ranked(&self, budget: Duration) -> Vec<CandidateRelay> {
        let start = Instant::now();

        let fetch_timeout = self.registry_timeout.min(budget);
        let candidates = self.registry.fetch_relays(fetch_timeout).await;
        if candidates.is_empty() {
            return Vec::new();
        }

        let left = budget.saturating_sub(start.elapsed());
        if left.is_zero() {
            debug!("discovery budget spent on registry fetch, skipping ranking");
            return Vec::new();
        }

        self.checker
            .rank(
                candidates,
                self.per_probe_timeout.min(left),
                self.overall_probe_timeout.min(left),
            )
            .await
    }
}
