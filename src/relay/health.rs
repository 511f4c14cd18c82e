//! Relay health checking.
//!
//! Probes every candidate concurrently under a worker cap, collects
//! results as they land, and returns the alive relays ordered
//! fastest-first. Collection stops at whichever comes first: all probes
//! done, a good-enough count of alive relays, or the overall timeout.
//! Probes still in flight at that point are abandoned — each one writes
//! only to its own slot via the channel, so a late result lands on a
//! closed channel and is discarded, never merged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};

use crate::probe::{ProbeResult, ReachabilityProbe};
use crate::resolver::model::{CandidateRelay, Liveness};

/// Default concurrent probe cap; bounds the fan-out storm.
const DEFAULT_WORKER_CAP: usize = 10;

/// Default "good enough" alive count for early stop.
const DEFAULT_GOOD_ENOUGH: usize = 3;

/// Seam between the health checker and the wire-level probe.
#[async_trait]
pub trait RelayProber: Send + Sync {
    async fn probe_relay(&self, relay: &CandidateRelay, timeout: Duration) -> ProbeResult;
}

/// Probe a relay as an HTTP endpoint.
pub struct HttpRelayProber {
    probe: ReachabilityProbe,
}

impl HttpRelayProber {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            probe: ReachabilityProbe::new()?,
        })
    }
}

#[async_trait]
impl RelayProber for HttpRelayProber {
    async fn probe_relay(&self, relay: &CandidateRelay, timeout: Duration) -> ProbeResult {
        self.probe.probe(&relay.probe_url(), timeout).await
    }
}

pub struct HealthChecker {
    prober: Arc<dyn RelayProber>,
    worker_cap: usize,
    good_enough: usize,
}

impl HealthChecker {
    #[must_use]
    pub fn new(prober: Arc<dyn RelayProber>) -> Self {
        Self {
            prober,
            worker_cap: DEFAULT_WORKER_CAP,
            good_enough: DEFAULT_GOOD_ENOUGH,
        }
    }

    #[must_use]
    pub fn with_worker_cap(mut self, cap: usize) -> Self {
        self.worker_cap = cap.max(1);
        self
    }

    #[must_use]
    pub fn with_good_enough(mut self, count: usize) -> Self {
        self.good_enough = count.max(1);
        self
    }

    /// Probe all candidates and return the alive ones, ascending latency.
    pub async fn rank(
        &self,
        relays: Vec<CandidateRelay>,
        per_probe: Duration,
        overall: Duration,
    ) -> Vec<CandidateRelay> {
        if relays.is_empty() {
            return Vec::new();
        }

        let deadline = Instant::now() + overall;
        let (tx, mut rx) = mpsc::channel::<(usize, ProbeResult)>(relays.len());
        let semaphore = Arc::new(Semaphore::new(self.worker_cap));

        for (idx, relay) in relays.iter().cloned().enumerate() {
            let tx = tx.clone();
            let semaphore = Arc::clone(&semaphore);
            let prober = Arc::clone(&self.prober);
            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                let result = prober.probe_relay(&relay, per_probe).await;
                trace!(relay = %relay.address, alive = result.alive, "probe finished");
                // Each probe writes only its own slot; if the collector is
                // gone this send fails and the result is discarded.
                let _ = tx.send((idx, result)).await;
            });
        }
        drop(tx);

        let mut slots: Vec<Option<ProbeResult>> = vec![None; relays.len()];
        let mut alive = 0usize;
        let mut finished = 0usize;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(finished, alive, "health check window elapsed, abandoning stragglers");
                break;
            }
            match timeout(remaining, rx.recv()).await {
                Ok(Some((idx, result))) => {
                    if result.alive {
                        alive += 1;
                    }
                    slots[idx] = Some(result);
                    finished += 1;
                    if alive >= self.good_enough {
                        debug!(alive, "good-enough alive relays reached, stopping early");
                        break;
                    }
                    if finished == slots.len() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(finished, alive, "health check window elapsed, abandoning stragglers");
                    break;
                }
            }
        }
        drop(rx);

        let mut ranked: Vec<CandidateRelay> = relays
            .into_iter()
            .zip(slots)
            .filter_map(|(mut relay, slot)| match slot {
                Some(result) if result.alive => {
                    relay.latency = Some(result.latency);
                    relay.liveness = Liveness::Alive;
                    Some(relay)
                }
                _ => None,
            })
            .collect();

        ranked.sort_by_key(|r| r.latency.unwrap_or(Duration::MAX));
        debug!(alive = ranked.len(), "relay ranking complete");
        ranked
    }
}
