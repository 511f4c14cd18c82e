//! The resolution orchestrator: walks the strategy chain under the
//! global deadline and produces exactly one terminal outcome.
//!
//! Chain order is fixed at construction. Per attempt the orchestrator
//! clamps the strategy's timeout to the remaining budget, governs the
//! attempt, validates any returned URL before trusting it, and retries
//! transient failures with exponential backoff only while the budget
//! allows. Relay discovery is lazy: nothing is fetched or probed until
//! the first relay-routed strategy is reached.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::credentials::CredentialBundle;
use crate::probe::{ReachabilityProbe, UrlValidator};
use crate::relay::{HealthChecker, HttpRelayProber, RelayFinder, RelayPool, RelayRegistry};
use crate::resolver::deadline::{run_with_deadline, Governed};
use crate::resolver::error::{ErrorKind, ResolveError};
use crate::resolver::model::{
    CandidateRelay, MediaId, Outcome, ResolutionRequest, ResolutionResult, StrategyOutcome,
};
use crate::resolver::strategies::{
    AlternatePathStrategy, CredentialedStrategy, DirectStrategy, ExternalProcessStrategy,
    RelayedStrategy,
};
use crate::resolver::strategy::ResolveStrategy;
use crate::upstream::{InnerTubeClient, UpstreamClient};

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    max_retries: u32,
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(base: Duration, max_retries: u32) -> Self {
        Self { base, max_retries }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `retry` (zero-based): base doubled per
    /// prior retry.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// One line of the attempt trail, kept for the exhaustion report.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub strategy: &'static str,
    /// `None` for the successful attempt.
    pub kind: Option<ErrorKind>,
    pub elapsed: Duration,
    pub relay: Option<String>,
}

pub struct Resolver {
    config: ResolverConfig,
    chain: Vec<Arc<dyn ResolveStrategy>>,
    relay_finder: Arc<dyn RelayFinder>,
    validator: Arc<dyn UrlValidator>,
    credentials: Option<Arc<CredentialBundle>>,
    backoff: BackoffPolicy,
}

impl Resolver {
    /// Build the default chain from configuration. Credential loading is
    /// best-effort: a missing or malformed cookie file only disables the
    /// credentialed strategy.
    pub fn new(config: ResolverConfig) -> anyhow::Result<Self> {
        let upstream: Arc<dyn UpstreamClient> = Arc::new(InnerTubeClient::new()?);

        let credentials = match &config.credential_file {
            Some(path) => match CredentialBundle::from_file(path) {
                Ok(bundle) if !bundle.is_empty() => Some(Arc::new(bundle)),
                Ok(_) => {
                    debug!(path = %path.display(), "cookie file held no usable entries");
                    None
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to load cookie file");
                    None
                }
            },
            None => None,
        };

        let chain: Vec<Arc<dyn ResolveStrategy>> = vec![
            Arc::new(DirectStrategy::new(Arc::clone(&upstream))),
            Arc::new(CredentialedStrategy::new(Arc::clone(&upstream))),
            Arc::new(RelayedStrategy::new(Arc::clone(&upstream))),
            Arc::new(AlternatePathStrategy::new(Arc::clone(&upstream))),
            Arc::new(ExternalProcessStrategy::new()),
        ];

        let registry =
            RelayRegistry::new(config.registry_url.clone(), config.static_relays.clone())?;
        let checker = HealthChecker::new(Arc::new(HttpRelayProber::new()?))
            .with_worker_cap(config.probe_worker_cap)
            .with_good_enough(config.good_enough_relays);
        let relay_finder: Arc<dyn RelayFinder> = Arc::new(RelayPool::new(
            registry,
            checker,
            config.registry_timeout,
            config.probe_timeout,
            config.relay_overall_timeout,
        ));

        let validator: Arc<dyn UrlValidator> = Arc::new(ReachabilityProbe::new()?);
        let backoff = BackoffPolicy::new(config.backoff_base, config.max_retries);

        Ok(Self {
            config,
            chain,
            relay_finder,
            validator,
            credentials,
            backoff,
        })
    }

    /// Assemble from explicit parts. Used by tests to substitute the
    /// chain, relay source, and validator.
    #[must_use]
    pub fn with_parts(
        config: ResolverConfig,
        chain: Vec<Arc<dyn ResolveStrategy>>,
        relay_finder: Arc<dyn RelayFinder>,
        validator: Arc<dyn UrlValidator>,
        credentials: Option<Arc<CredentialBundle>>,
    ) -> Self {
        let backoff = BackoffPolicy::new(config.backoff_base, config.max_retries);
        Self {
            config,
            chain,
            relay_finder,
            validator,
            credentials,
            backoff,
        }
    }

    /// Resolve to a playable URL within `global_timeout`.
    pub async fn resolve(
        &self,
        media: MediaId,
        global_timeout: Duration,
    ) -> Result<ResolutionResult, ResolveError> {
        self.resolve_with_report(media, global_timeout).await.0
    }

    /// Resolve and return the attempt trail alongside the outcome.
    pub async fn resolve_with_report(
        &self,
        media: MediaId,
        global_timeout: Duration,
    ) -> (Result<ResolutionResult, ResolveError>, Vec<AttemptRecord>) {
        let started = Instant::now();
        let request = ResolutionRequest::new(media, global_timeout, self.credentials.clone());
        let mut records: Vec<AttemptRecord> = Vec::new();
        let mut last_kind = ErrorKind::Unclassified;
        // Discovered once, on the first relay-routed strategy.
        let mut relays: Option<Vec<CandidateRelay>> = None;

        info!(
            request = %request.id,
            media = %request.media,
            timeout = ?global_timeout,
            "starting resolution"
        );

        'chain: for strategy in &self.chain {
            let desc = strategy.descriptor();

            if request.remaining().is_zero() {
                debug!(request = %request.id, "global deadline reached before {}", desc.name);
                break;
            }

            if desc.needs_credentials && request.credentials.is_none() {
                debug!(request = %request.id, strategy = desc.name, "no credentials loaded, skipping");
                continue;
            }

            let passes: Vec<Option<CandidateRelay>> = if desc.needs_relay {
                if relays.is_none() {
                    let budget = request
                        .remaining()
                        .min(self.config.registry_timeout + self.config.relay_overall_timeout);
                    relays = Some(self.relay_finder.ranked(budget).await);
                }
                let ranked = relays.as_deref().unwrap_or_default();
                if ranked.is_empty() {
                    debug!(request = %request.id, strategy = desc.name, "no alive relays, skipping");
                    continue;
                }
                ranked
                    .iter()
                    .take(self.config.max_relay_attempts)
                    .cloned()
                    .map(Some)
                    .collect()
            } else {
                vec![None]
            };

            for relay in passes {
                let mut retry = 0u32;

                loop {
                    let remaining = request.remaining();
                    if remaining.is_zero() {
                        break 'chain;
                    }
                    let budget = desc.attempt_timeout.min(remaining);

                    let governed = {
                        let strategy = Arc::clone(strategy);
                        let request = request.clone();
                        let relay = relay.clone();
                        run_with_deadline(budget, async move {
                            strategy.attempt(&request, relay.as_ref()).await
                        })
                        .await
                    };

                    let outcome = match governed {
                        Governed::Finished(outcome) => outcome,
                        Governed::TimedOut => StrategyOutcome::timed_out(desc.name, budget),
                    };

                    match outcome.result {
                        Outcome::Success(mut result) => {
                            let validate_budget =
                                self.config.validate_timeout.min(request.remaining());
                            let reachable = !validate_budget.is_zero()
                                && self.validator.validate(&result.url, validate_budget).await;

                            if reachable {
                                records.push(AttemptRecord {
                                    strategy: desc.name,
                                    kind: None,
                                    elapsed: outcome.elapsed,
                                    relay: relay.as_ref().map(|r| r.address.clone()),
                                });
                                result.elapsed = started.elapsed();
                                info!(
                                    request = %request.id,
                                    strategy = desc.name,
                                    elapsed = ?result.elapsed,
                                    "resolution succeeded"
                                );
                                return (Ok(result), records);
                            }

                            // The provider said yes but the URL does not
                            // answer. Record it as unreachable and move on.
                            warn!(
                                request = %request.id,
                                strategy = desc.name,
                                "candidate URL failed validation"
                            );
                            last_kind = ErrorKind::Unreachable;
                            records.push(AttemptRecord {
                                strategy: desc.name,
                                kind: Some(ErrorKind::Unreachable),
                                elapsed: outcome.elapsed,
                                relay: relay.as_ref().map(|r| r.address.clone()),
                            });
                            break;
                        }
                        Outcome::Failure { kind, detail } => {
                            warn!(
                                request = %request.id,
                                strategy = desc.name,
                                %kind,
                                detail,
                                "attempt failed"
                            );
                            last_kind = kind;
                            records.push(AttemptRecord {
                                strategy: desc.name,
                                kind: Some(kind),
                                elapsed: outcome.elapsed,
                                relay: relay.as_ref().map(|r| r.address.clone()),
                            });

                            if kind.is_transient() && retry < self.backoff.max_retries() {
                                let delay = self.backoff.delay(retry);
                                if request.remaining() > delay {
                                    debug!(
                                        request = %request.id,
                                        strategy = desc.name,
                                        ?delay,
                                        "transient failure, backing off"
                                    );
                                    retry += 1;
                                    sleep(delay).await;
                                    continue;
                                }
                            }
                            break;
                        }
                        Outcome::TimedOut => {
                            warn!(
                                request = %request.id,
                                strategy = desc.name,
                                ?budget,
                                "attempt hit its deadline"
                            );
                            last_kind = ErrorKind::NetworkTimeout;
                            records.push(AttemptRecord {
                                strategy: desc.name,
                                kind: Some(ErrorKind::NetworkTimeout),
                                elapsed: outcome.elapsed,
                                relay: relay.as_ref().map(|r| r.address.clone()),
                            });

                            if retry < self.backoff.max_retries() {
                                let delay = self.backoff.delay(retry);
                                if request.remaining() > delay {
                                    debug!(
                                        request = %request.id,
                                        strategy = desc.name,
                                        ?delay,
                                        "attempt timed out, backing off"
                                    );
                                    retry += 1;
                                    sleep(delay).await;
                                    continue;
                                }
                            }
                            break;
                        }
                    }
                }
            }
        }

        let elapsed = started.elapsed();
        warn!(
            request = %request.id,
            attempts = records.len(),
            ?elapsed,
            last = %last_kind,
            "resolution exhausted"
        );
        (
            Err(ResolveError::Exhausted {
                last_kind,
                attempts: records.len(),
                elapsed,
            }),
            records,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::resolver::model::{RelayOrigin, StrategyDescriptor};

    fn media() -> MediaId {
        MediaId::parse("dQw4w9WgXcQ").unwrap()
    }

    fn result_for(strategy: &'static str) -> ResolutionResult {
        ResolutionResult {
            url: format!("https://cdn.example.com/{strategy}"),
            title: "Title".to_string(),
            author: "Author".to_string(),
            thumbnail: None,
            duration_seconds: 212,
            mime_type: None,
            strategy,
            elapsed: Duration::ZERO,
        }
    }

    /// Returns scripted outcomes in sequence; repeats the last one.
    struct ScriptedStrategy {
        descriptor: StrategyDescriptor,
        script: Mutex<Vec<Outcome>>,
        calls: AtomicUsize,
    }

    impl ScriptedStrategy {
        fn new(name: &'static str, priority: u8, script: Vec<Outcome>) -> Self {
            Self {
                descriptor: StrategyDescriptor {
                    name,
                    priority,
                    attempt_timeout: Duration::from_secs(10),
                    needs_relay: false,
                    needs_credentials: false,
                },
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        fn needs_credentials(mut self) -> Self {
            self.descriptor.needs_credentials = true;
            self
        }

        fn needs_relay(mut self) -> Self {
            self.descriptor.needs_relay = true;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResolveStrategy for ScriptedStrategy {
        fn descriptor(&self) -> StrategyDescriptor {
            self.descriptor
        }

        async fn attempt(
            &self,
            _request: &ResolutionRequest,
            _relay: Option<&CandidateRelay>,
        ) -> StrategyOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let outcome = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            };
            StrategyOutcome {
                strategy: self.descriptor.name,
                result: outcome,
                elapsed: Duration::from_millis(5),
            }
        }
    }

    struct StaticFinder(Vec<CandidateRelay>);

    #[async_trait]
    impl RelayFinder for StaticFinder {
        async fn ranked(&self, _budget: Duration) -> Vec<CandidateRelay> {
            self.0.clone()
        }
    }

    struct FixedValidator(bool);

    #[async_trait]
    impl UrlValidator for FixedValidator {
        async fn validate(&self, _url: &str, _timeout: Duration) -> bool {
            self.0
        }
    }

    fn resolver(chain: Vec<Arc<dyn ResolveStrategy>>, validator_ok: bool) -> Resolver {
        Resolver::with_parts(
            ResolverConfig::default(),
            chain,
            Arc::new(StaticFinder(Vec::new())),
            Arc::new(FixedValidator(validator_ok)),
            None,
        )
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = BackoffPolicy::new(Duration::from_secs(2), 2);
        assert_eq!(policy.delay(0), Duration::from_secs(2));
        assert_eq!(policy.delay(1), Duration::from_secs(4));
        assert_eq!(policy.delay(2), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let first = Arc::new(ScriptedStrategy::new(
            "direct",
            0,
            vec![Outcome::Success(result_for("direct"))],
        ));
        let second = Arc::new(ScriptedStrategy::new(
            "external-process",
            4,
            vec![Outcome::Success(result_for("external-process"))],
        ));
        let r = resolver(vec![first.clone(), second.clone()], true);

        let result = r.resolve(media(), Duration::from_secs(30)).await.unwrap();
        assert_eq!(result.strategy, "direct");
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_credentialed_skipped_without_bundle() {
        let cred = Arc::new(
            ScriptedStrategy::new(
                "credentialed",
                1,
                vec![Outcome::Success(result_for("credentialed"))],
            )
            .needs_credentials(),
        );
        let fallback = Arc::new(ScriptedStrategy::new(
            "external-process",
            4,
            vec![Outcome::Success(result_for("external-process"))],
        ));
        let r = resolver(vec![cred.clone(), fallback], true);

        let result = r.resolve(media(), Duration::from_secs(30)).await.unwrap();
        assert_eq!(result.strategy, "external-process");
        assert_eq!(cred.calls(), 0);
    }

    #[tokio::test]
    async fn test_relayed_skipped_with_no_alive_relays() {
        let relayed = Arc::new(
            ScriptedStrategy::new("relayed", 2, vec![Outcome::Success(result_for("relayed"))])
                .needs_relay(),
        );
        let r = resolver(vec![relayed.clone()], true);

        let err = r.resolve(media(), Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, ResolveError::Exhausted { attempts: 0, .. }));
        assert_eq!(relayed.calls(), 0);
    }

    #[tokio::test]
    async fn test_relay_attempts_are_capped() {
        let relayed = Arc::new(
            ScriptedStrategy::new(
                "relayed",
                2,
                vec![Outcome::Failure {
                    kind: ErrorKind::Unreachable,
                    detail: "refused".to_string(),
                }],
            )
            .needs_relay(),
        );
        let relays: Vec<CandidateRelay> = (1..=5)
            .map(|n| CandidateRelay::new(format!("10.0.0.{n}:8080"), RelayOrigin::Registry))
            .collect();
        let r = Resolver::with_parts(
            ResolverConfig::default(),
            vec![relayed.clone()],
            Arc::new(StaticFinder(relays)),
            Arc::new(FixedValidator(true)),
            None,
        );

        let (result, records) = r.resolve_with_report(media(), Duration::from_secs(30)).await;
        assert!(result.is_err());
        // Only the top-ranked relays are tried, not all five.
        assert_eq!(relayed.calls(), 2);
        assert_eq!(records[0].relay.as_deref(), Some("10.0.0.1:8080"));
        assert_eq!(records[1].relay.as_deref(), Some("10.0.0.2:8080"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retries_with_backoff() {
        let strategy = Arc::new(ScriptedStrategy::new(
            "direct",
            0,
            vec![
                Outcome::Failure {
                    kind: ErrorKind::RateLimited,
                    detail: "429".to_string(),
                },
                Outcome::Failure {
                    kind: ErrorKind::RateLimited,
                    detail: "429".to_string(),
                },
                Outcome::Success(result_for("direct")),
            ],
        ));
        let r = resolver(vec![strategy.clone()], true);

        let result = r.resolve(media(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(result.strategy, "direct");
        assert_eq!(strategy.calls(), 3);
        // Two backoff sleeps were taken: 2s then 4s.
        assert!(result.elapsed >= Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_terminal_failure_never_retried() {
        let strategy = Arc::new(ScriptedStrategy::new(
            "direct",
            0,
            vec![Outcome::Failure {
                kind: ErrorKind::AuthRequired,
                detail: "login required".to_string(),
            }],
        ));
        let r = resolver(vec![strategy.clone()], false);

        let err = r.resolve(media(), Duration::from_secs(30)).await.unwrap_err();
        assert_eq!(strategy.calls(), 1);
        assert_eq!(err.last_kind(), ErrorKind::AuthRequired);
    }

    #[tokio::test]
    async fn test_validation_failure_advances_chain() {
        let first = Arc::new(ScriptedStrategy::new(
            "direct",
            0,
            vec![Outcome::Success(result_for("direct"))],
        ));
        let second = Arc::new(ScriptedStrategy::new(
            "alternate-path",
            3,
            vec![Outcome::Failure {
                kind: ErrorKind::NoMediaFound,
                detail: "gone".to_string(),
            }],
        ));
        let r = resolver(vec![first.clone(), second.clone()], false);

        let (result, records) = r.resolve_with_report(media(), Duration::from_secs(30)).await;
        assert!(result.is_err());
        // The provider's yes was overruled by the probe.
        assert_eq!(records[0].kind, Some(ErrorKind::Unreachable));
        assert_eq!(second.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_deadline_bounds_the_chain() {
        struct StallingStrategy;

        #[async_trait]
        impl ResolveStrategy for StallingStrategy {
            fn descriptor(&self) -> StrategyDescriptor {
                StrategyDescriptor {
                    name: "direct",
                    priority: 0,
                    attempt_timeout: Duration::from_secs(10),
                    needs_relay: false,
                    needs_credentials: false,
                }
            }

            async fn attempt(
                &self,
                _request: &ResolutionRequest,
                _relay: Option<&CandidateRelay>,
            ) -> StrategyOutcome {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                StrategyOutcome::timed_out("direct", Duration::ZERO)
            }
        }

        let chain: Vec<Arc<dyn ResolveStrategy>> =
            vec![Arc::new(StallingStrategy), Arc::new(StallingStrategy)];
        let r = Resolver::with_parts(
            ResolverConfig::default(),
            chain,
            Arc::new(StaticFinder(Vec::new())),
            Arc::new(FixedValidator(true)),
            None,
        );

        let started = Instant::now();
        let err = r.resolve(media(), Duration::from_secs(15)).await.unwrap_err();
        assert_eq!(err.last_kind(), ErrorKind::NetworkTimeout);
        // Attempts and backoffs are clamped to the 15s budget.
        assert!(started.elapsed() <= Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_attempt_is_retried_with_backoff() {
        struct StallingCounter(AtomicUsize);

        #[async_trait]
        impl ResolveStrategy for StallingCounter {
            fn descriptor(&self) -> StrategyDescriptor {
                StrategyDescriptor {
                    name: "direct",
                    priority: 0,
                    attempt_timeout: Duration::from_secs(10),
                    needs_relay: false,
                    needs_credentials: false,
                }
            }

            async fn attempt(
                &self,
                _request: &ResolutionRequest,
                _relay: Option<&CandidateRelay>,
            ) -> StrategyOutcome {
                self.0.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(3600)).await;
                StrategyOutcome::timed_out("direct", Duration::ZERO)
            }
        }

        let strategy = Arc::new(StallingCounter(AtomicUsize::new(0)));
        let r = Resolver::with_parts(
            ResolverConfig::default(),
            vec![strategy.clone()],
            Arc::new(StaticFinder(Vec::new())),
            Arc::new(FixedValidator(true)),
            None,
        );

        let err = r.resolve(media(), Duration::from_secs(120)).await.unwrap_err();
        // Initial attempt plus two backoff retries, like any transient kind.
        assert_eq!(strategy.0.load(Ordering::SeqCst), 3);
        match err {
            ResolveError::Exhausted {
                last_kind, attempts, ..
            } => {
                assert_eq!(last_kind, ErrorKind::NetworkTimeout);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_kind_and_count() {
        let first = Arc::new(ScriptedStrategy::new(
            "direct",
            0,
            vec![Outcome::Failure {
                kind: ErrorKind::GeoRestricted,
                detail: "blocked".to_string(),
            }],
        ));
        let second = Arc::new(ScriptedStrategy::new(
            "external-process",
            4,
            vec![Outcome::Failure {
                kind: ErrorKind::NoMediaFound,
                detail: "gone".to_string(),
            }],
        ));
        let r = resolver(vec![first, second], true);

        let err = r.resolve(media(), Duration::from_secs(30)).await.unwrap_err();
        match err {
            ResolveError::Exhausted {
                last_kind, attempts, ..
            } => {
                assert_eq!(last_kind, ErrorKind::NoMediaFound);
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
