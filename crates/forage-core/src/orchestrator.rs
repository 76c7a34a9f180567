//! The quota-aware source orchestrator.
//!
//! Walks the candidate backend chain for a query in registry order:
//! coverage check → credential check → cache probe → quota reservation →
//! backend call with bounded retry → cache write + normalize. Soft and
//! transient conditions never fail the request — they become entries in
//! the [`SelectionReport`] and the chain falls through to the next
//! candidate. Only configuration-fatal conditions return an error.

use std::collections::HashMap;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::cache::ResponseCache;
use crate::config::OrchestratorConfig;
use crate::error::AppError;
use crate::ledger::{QuotaLedger, Reservation};
use crate::query::{PlatformSelector, Priority, Query, classify};
use crate::record::{JobRecord, RawListing, merge_records};
use crate::registry::{BackendDescriptor, SourceKindFilter, SourceRegistry};
use crate::report::{BackendOutcome, SelectionReport, SkipReason};
use crate::traits::JobSource;

/// Result of one orchestrated fetch: deduplicated records plus the
/// selection audit trail.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub records: Vec<JobRecord>,
    pub report: SelectionReport,
}

/// Outcome of a single backend call after retries.
enum CallOutcome {
    Success(Vec<RawListing>),
    Failed(AppError),
    Cancelled,
}

/// Orchestrates the fallback chain across all registered backends.
///
/// Generic over the backend implementation via [`JobSource`], with the
/// quota ledger and response cache as explicitly owned, injectable
/// components shared safely across concurrently running fetches (the
/// orchestrator is `Clone`; clones share ledger and cache state).
#[derive(Clone)]
pub struct Orchestrator<S: JobSource> {
    registry: SourceRegistry,
    sources: HashMap<String, S>,
    ledger: QuotaLedger,
    cache: ResponseCache,
    config: OrchestratorConfig,
}

impl<S: JobSource> Orchestrator<S> {
    /// Build an orchestrator, opening the quota ledger at the configured
    /// path. Fails only if the ledger location is unusable.
    pub fn new(
        registry: SourceRegistry,
        sources: HashMap<String, S>,
        config: OrchestratorConfig,
    ) -> Result<Self, AppError> {
        let limits = registry.metered_limits(&config.quota_overrides);
        let ledger = QuotaLedger::open(config.ledger_path.clone(), limits)?;
        let cache = ResponseCache::new(config.cache_ttl);
        Ok(Self::with_components(registry, sources, config, ledger, cache))
    }

    /// Build from pre-constructed components (dependency injection).
    pub fn with_components(
        registry: SourceRegistry,
        sources: HashMap<String, S>,
        config: OrchestratorConfig,
        ledger: QuotaLedger,
        cache: ResponseCache,
    ) -> Self {
        Self {
            registry,
            sources,
            ledger,
            cache,
            config,
        }
    }

    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Fetch with no kind restriction and no external cancellation.
    pub async fn fetch(&self, query: &Query) -> Result<FetchOutcome, AppError> {
        self.fetch_with(query, SourceKindFilter::Any, &CancellationToken::new())
            .await
    }

    /// Execute the fallback chain for `query`.
    ///
    /// For a single-platform query the chain stops at the first backend
    /// yielding at least one record; a multi-source query consults every
    /// covering backend and merges, because different sources surface
    /// different postings. Cancellation is honored at each backend-call
    /// boundary: accumulated results are returned, not discarded.
    pub async fn fetch_with(
        &self,
        query: &Query,
        kinds: SourceKindFilter,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, AppError> {
        let priority = classify(query);
        let candidates = self.registry.candidates(kinds);

        if let PlatformSelector::One(platform) = &query.platforms
            && !self.registry.any_covering(platform, kinds)
        {
            return Err(AppError::ConfigError(format!(
                "no configured backend can serve platform '{platform}'"
            )));
        }
        if candidates.is_empty() {
            return Err(AppError::ConfigError(
                "no backends registered for the requested source kinds".into(),
            ));
        }

        let single_platform = matches!(query.platforms, PlatformSelector::One(_));
        let mut report = SelectionReport::new(priority);
        let mut collected: Vec<(usize, JobRecord)> = Vec::new();
        let mut success_order = 0usize;

        tracing::info!(
            terms = %query.terms,
            %priority,
            candidates = candidates.len(),
            "Starting fallback chain"
        );

        for descriptor in candidates {
            if cancel.is_cancelled() {
                break;
            }

            if let PlatformSelector::One(platform) = &query.platforms
                && !descriptor.covers(platform)
            {
                report.record(
                    &descriptor.name,
                    BackendOutcome::Skipped {
                        reason: SkipReason::NotCoveringPlatform,
                    },
                );
                continue;
            }

            let missing = self
                .config
                .credentials
                .missing(&descriptor.required_credentials);
            if !missing.is_empty() {
                tracing::debug!(backend = %descriptor.name, ?missing, "Skipping: credentials absent");
                report.record(
                    &descriptor.name,
                    BackendOutcome::Skipped {
                        reason: SkipReason::MissingCredentials,
                    },
                );
                continue;
            }

            let Some(source) = self.sources.get(&descriptor.name) else {
                report.record(
                    &descriptor.name,
                    BackendOutcome::Failed {
                        error: "no client registered for backend".into(),
                    },
                );
                continue;
            };

            // Cache probe: a hit serves the stored payload without any
            // quota reservation.
            let key = ResponseCache::key(query, &descriptor.name);
            if let Some(cached) = self.cache.get(&key).await {
                let records = self.normalize(&cached, &descriptor.name);
                let count = records.len();
                tracing::info!(backend = %descriptor.name, count, "Cache hit");
                report.record(&descriptor.name, BackendOutcome::ServedFromCache { records: count });
                collected.extend(records.into_iter().map(|r| (success_order, r)));
                success_order += 1;
                if single_platform && count > 0 {
                    break;
                }
                continue;
            }

            if descriptor.is_metered() && !self.reserve(descriptor, priority, &mut report) {
                continue;
            }

            match self.call_with_retry(source, query, cancel).await {
                CallOutcome::Success(listings) => {
                    self.cache.put(key, listings.clone()).await;
                    let records = self.normalize(&listings, &descriptor.name);
                    let count = records.len();
                    tracing::info!(backend = %descriptor.name, count, "Backend returned listings");
                    report.record(&descriptor.name, BackendOutcome::Fetched { records: count });
                    collected.extend(records.into_iter().map(|r| (success_order, r)));
                    success_order += 1;
                    if single_platform && count > 0 {
                        break;
                    }
                }
                CallOutcome::Failed(error) => {
                    tracing::warn!(backend = %descriptor.name, %error, "Backend failed; falling through");
                    report.record(
                        &descriptor.name,
                        BackendOutcome::Failed {
                            error: error.to_string(),
                        },
                    );
                }
                CallOutcome::Cancelled => {
                    tracing::info!(backend = %descriptor.name, "Cancelled mid-call; returning partial results");
                    report.record(&descriptor.name, BackendOutcome::Cancelled);
                    break;
                }
            }
        }

        let records = merge_records(collected);
        tracing::info!(
            records = records.len(),
            attempted = report.entries.len(),
            "Fallback chain complete"
        );
        Ok(FetchOutcome { records, report })
    }

    /// Reserve one call against a metered backend's quota.
    ///
    /// Low-priority queries are additionally held back from the last
    /// `reserve_fraction` of the limit, so broad searches never drain a
    /// strict quota that a High-priority query may need later. Both
    /// denials are the same soft condition: a quota-exceeded skip.
    fn reserve(
        &self,
        descriptor: &BackendDescriptor,
        priority: Priority,
        report: &mut SelectionReport,
    ) -> bool {
        if priority == Priority::Low
            && let Some(status) = self.ledger.status(&descriptor.name)
        {
            let floor = (status.limit as f32 * self.config.reserve_fraction) as u32;
            if status.limit.saturating_sub(status.used) <= floor {
                tracing::debug!(
                    backend = %descriptor.name,
                    remaining = status.limit - status.used,
                    floor,
                    "Preserving metered quota for higher-priority queries"
                );
                report.record(
                    &descriptor.name,
                    BackendOutcome::Skipped {
                        reason: SkipReason::QuotaExceeded,
                    },
                );
                return false;
            }
        }

        match self.ledger.try_reserve(&descriptor.name, 1) {
            Reservation::Granted { warning } => {
                if warning {
                    report.warn(format!(
                        "backend '{}' crossed 80% of its monthly quota",
                        descriptor.name
                    ));
                }
                true
            }
            Reservation::Exhausted => {
                report.record(
                    &descriptor.name,
                    BackendOutcome::Skipped {
                        reason: SkipReason::QuotaExceeded,
                    },
                );
                false
            }
        }
    }

    /// Call one backend, retrying transient failures with exponential
    /// backoff. Permanent failures (contract violations) return
    /// immediately without retry. Cancellation abandons in-flight retries.
    async fn call_with_retry(
        &self,
        source: &S,
        query: &Query,
        cancel: &CancellationToken,
    ) -> CallOutcome {
        let retry = &self.config.retry;
        for attempt in 1..=retry.max_attempts {
            let result = tokio::select! {
                () = cancel.cancelled() => return CallOutcome::Cancelled,
                result = source.fetch(query) => result,
            };

            match result {
                Ok(listings) => return CallOutcome::Success(listings),
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    let delay = retry.delay_for_attempt(attempt + 1);
                    tracing::warn!(
                        backend = source.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient backend failure; retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return CallOutcome::Cancelled,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return CallOutcome::Failed(e),
            }
        }
        // Loop always returns from within; max_attempts >= 1 is assumed.
        CallOutcome::Failed(AppError::Generic("retry budget exhausted".into()))
    }

    fn normalize(&self, listings: &[RawListing], source: &str) -> Vec<JobRecord> {
        let date_found = Utc::now().date_naive();
        listings
            .iter()
            .cloned()
            .map(|raw| JobRecord::from_raw(raw, source, date_found))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::RetryConfig;
    use crate::registry::BackendKind;
    use crate::testutil::{MockSource, make_listing};

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig::default().with_retry(fast_retry())
    }

    fn metered(name: &str, limit: u32, platforms: &[&str]) -> BackendDescriptor {
        BackendDescriptor::new(name, BackendKind::MeteredApi {
            monthly_limit: limit,
        })
        .covering(platforms)
    }

    fn free(name: &str, platforms: &[&str]) -> BackendDescriptor {
        BackendDescriptor::new(name, BackendKind::FreeApi).covering(platforms)
    }

    fn orchestrator(
        descriptors: Vec<BackendDescriptor>,
        sources: Vec<MockSource>,
        config: OrchestratorConfig,
    ) -> Orchestrator<MockSource> {
        let map = sources
            .into_iter()
            .map(|s| (s.name().to_string(), s))
            .collect();
        Orchestrator::new(SourceRegistry::new(descriptors), map, config).unwrap()
    }

    fn indeed_query() -> Query {
        Query::new("developer").with_platforms(PlatformSelector::One("indeed".into()))
    }

    #[tokio::test]
    async fn exhausted_metered_backend_falls_through_to_free_backend() {
        let orch = orchestrator(
            vec![metered("paid", 2, &["indeed"]), free("open", &["indeed"])],
            vec![
                MockSource::new("paid", vec![make_listing("paid-1", "Paid Engineer")]),
                MockSource::new("open", vec![make_listing("open-1", "Open Engineer")]),
            ],
            config(),
        );
        // Drain the metered quota.
        assert!(orch.ledger().try_reserve("paid", 2).is_granted());

        let outcome = orch.fetch(&indeed_query()).await.unwrap();

        assert_eq!(
            outcome.report.outcome_for("paid"),
            Some(&BackendOutcome::Skipped {
                reason: SkipReason::QuotaExceeded
            })
        );
        assert_eq!(
            outcome.report.outcome_for("open"),
            Some(&BackendOutcome::Fetched { records: 1 })
        );
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].source, "open");
    }

    #[tokio::test]
    async fn cache_hit_serves_payload_without_reservation() {
        let orch = orchestrator(
            vec![metered("paid", 10, &["indeed"])],
            vec![MockSource::new(
                "paid",
                vec![make_listing("j-1", "Engineer")],
            )],
            config(),
        );
        // High-priority query so the low-priority reserve floor never interferes.
        let query =
            Query::new("senior engineer").with_platforms(PlatformSelector::One("indeed".into()));

        let first = orch.fetch(&query).await.unwrap();
        assert_eq!(
            first.report.outcome_for("paid"),
            Some(&BackendOutcome::Fetched { records: 1 })
        );
        assert_eq!(orch.ledger().remaining("paid"), 9);

        let second = orch.fetch(&query).await.unwrap();
        assert_eq!(
            second.report.outcome_for("paid"),
            Some(&BackendOutcome::ServedFromCache { records: 1 })
        );
        // No further quota spent, identical payload.
        assert_eq!(orch.ledger().remaining("paid"), 9);
        assert_eq!(first.records, second.records);
    }

    #[tokio::test]
    async fn permanent_failure_falls_through_without_retry() {
        let broken = MockSource::with_error(
            "broken",
            AppError::ContractViolation {
                backend: "broken".into(),
                detail: "results field missing".into(),
            },
        );
        let orch = orchestrator(
            vec![free("broken", &["indeed"]), free("open", &["indeed"])],
            vec![
                broken.clone(),
                MockSource::new("open", vec![make_listing("open-1", "Engineer")]),
            ],
            config(),
        );

        let outcome = orch.fetch(&indeed_query()).await.unwrap();

        assert_eq!(broken.call_count(), 1);
        assert!(matches!(
            outcome.report.outcome_for("broken"),
            Some(BackendOutcome::Failed { .. })
        ));
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_then_succeeds() {
        let flaky = MockSource::with_responses("flaky", vec![
            Err(AppError::NetworkError("connection reset".into())),
            Ok(vec![make_listing("f-1", "Engineer")]),
        ]);
        let orch = orchestrator(vec![free("flaky", &["indeed"])], vec![flaky.clone()], config());

        let outcome = orch.fetch(&indeed_query()).await.unwrap();

        assert_eq!(flaky.call_count(), 2);
        assert_eq!(
            outcome.report.outcome_for("flaky"),
            Some(&BackendOutcome::Fetched { records: 1 })
        );
    }

    #[tokio::test]
    async fn transient_failure_exhausts_retries_then_falls_through() {
        let down = MockSource::with_responses("down", vec![
            Err(AppError::NetworkError("reset".into())),
            Err(AppError::Timeout(30)),
            Err(AppError::NetworkError("reset".into())),
        ]);
        let orch = orchestrator(
            vec![free("down", &["indeed"]), free("open", &["indeed"])],
            vec![
                down.clone(),
                MockSource::new("open", vec![make_listing("o-1", "Engineer")]),
            ],
            config(),
        );

        let outcome = orch.fetch(&indeed_query()).await.unwrap();

        assert_eq!(down.call_count(), 3);
        assert!(matches!(
            outcome.report.outcome_for("down"),
            Some(BackendOutcome::Failed { .. })
        ));
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_mid_chain_returns_accumulated_results() {
        let hanging = MockSource::hanging("stuck");
        let orch = orchestrator(
            vec![
                free("a", &["indeed"]),
                free("b", &["indeed"]),
                free("stuck", &["indeed"]),
                free("never", &["indeed"]),
            ],
            vec![
                MockSource::new("a", vec![make_listing("a-1", "A Engineer")]),
                MockSource::new("b", vec![make_listing("b-1", "B Engineer")]),
                hanging,
                MockSource::new("never", vec![make_listing("n-1", "N Engineer")]),
            ],
            config(),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let query = Query::new("developer"); // All platforms: walk every backend.
        let outcome = orch
            .fetch_with(&query, SourceKindFilter::Any, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(
            outcome.report.outcome_for("stuck"),
            Some(&BackendOutcome::Cancelled)
        );
        assert!(outcome.report.outcome_for("never").is_none());
    }

    #[tokio::test]
    async fn single_platform_stops_at_first_yielding_backend() {
        let second = MockSource::new("second", vec![make_listing("s-1", "Engineer")]);
        let orch = orchestrator(
            vec![free("first", &["indeed"]), free("second", &["indeed"])],
            vec![
                MockSource::new("first", vec![make_listing("f-1", "Engineer")]),
                second.clone(),
            ],
            config(),
        );

        let outcome = orch.fetch(&indeed_query()).await.unwrap();

        assert_eq!(second.call_count(), 0);
        assert!(outcome.report.outcome_for("second").is_none());
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn single_platform_falls_through_on_empty_result() {
        let orch = orchestrator(
            vec![free("empty", &["indeed"]), free("full", &["indeed"])],
            vec![
                MockSource::new("empty", vec![]),
                MockSource::new("full", vec![make_listing("f-1", "Engineer")]),
            ],
            config(),
        );

        let outcome = orch.fetch(&indeed_query()).await.unwrap();

        assert_eq!(
            outcome.report.outcome_for("empty"),
            Some(&BackendOutcome::Fetched { records: 0 })
        );
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn multi_source_request_queries_every_covering_backend() {
        let orch = orchestrator(
            vec![free("a", &["indeed"]), free("b", &["linkedin"])],
            vec![
                MockSource::new("a", vec![make_listing("a-1", "A Engineer")]),
                MockSource::new("b", vec![make_listing("b-1", "B Engineer")]),
            ],
            config(),
        );

        let outcome = orch.fetch(&Query::new("developer")).await.unwrap();

        assert_eq!(outcome.report.successes(), 2);
        assert_eq!(outcome.records.len(), 2);
    }

    #[tokio::test]
    async fn missing_credentials_skip_is_soft() {
        let gated = BackendDescriptor::new("gated", BackendKind::FreeApi)
            .covering(&["indeed"])
            .requiring(&["SECRET_KEY"]);
        let orch = orchestrator(
            vec![gated, free("open", &["indeed"])],
            vec![
                MockSource::new("gated", vec![make_listing("g-1", "Engineer")]),
                MockSource::new("open", vec![make_listing("o-1", "Engineer")]),
            ],
            config(),
        );

        let outcome = orch.fetch(&indeed_query()).await.unwrap();

        assert_eq!(
            outcome.report.outcome_for("gated"),
            Some(&BackendOutcome::Skipped {
                reason: SkipReason::MissingCredentials
            })
        );
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn non_covering_backend_is_skipped_with_reason() {
        let orch = orchestrator(
            vec![free("boards", &["indeed"]), free("social", &["linkedin"])],
            vec![
                MockSource::new("boards", vec![]),
                MockSource::new("social", vec![make_listing("s-1", "Engineer")]),
            ],
            config(),
        );

        let query = Query::new("developer").with_platforms(PlatformSelector::One("linkedin".into()));
        let outcome = orch.fetch(&query).await.unwrap();

        assert_eq!(
            outcome.report.outcome_for("boards"),
            Some(&BackendOutcome::Skipped {
                reason: SkipReason::NotCoveringPlatform
            })
        );
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn uncovered_platform_is_configuration_fatal() {
        let orch = orchestrator(
            vec![free("a", &["indeed"])],
            vec![MockSource::new("a", vec![])],
            config(),
        );

        let query = Query::new("developer").with_platforms(PlatformSelector::One("myspace".into()));
        let err = orch.fetch(&query).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn low_priority_query_preserves_strict_quota() {
        let orch = orchestrator(
            vec![metered("strict", 4, &["indeed"])],
            vec![MockSource::new(
                "strict",
                vec![make_listing("s-1", "Engineer")],
            )],
            config(),
        );
        // 3 of 4 used: remaining (1) is within the 25% reserve floor.
        assert!(orch.ledger().try_reserve("strict", 3).is_granted());

        let low = orch.fetch(&indeed_query()).await.unwrap();
        assert_eq!(
            low.report.outcome_for("strict"),
            Some(&BackendOutcome::Skipped {
                reason: SkipReason::QuotaExceeded
            })
        );
        assert_eq!(orch.ledger().remaining("strict"), 1);

        // A High-priority query may still spend the reserve.
        let high_query =
            Query::new("senior engineer").with_platforms(PlatformSelector::One("indeed".into()));
        let high = orch.fetch(&high_query).await.unwrap();
        assert_eq!(
            high.report.outcome_for("strict"),
            Some(&BackendOutcome::Fetched { records: 1 })
        );
        assert_eq!(orch.ledger().remaining("strict"), 0);
    }

    #[tokio::test]
    async fn quota_warning_surfaces_in_report() {
        let orch = orchestrator(
            vec![metered("paid", 5, &["indeed"])],
            vec![MockSource::new(
                "paid",
                vec![make_listing("p-1", "Engineer")],
            )],
            config(),
        );
        assert!(orch.ledger().try_reserve("paid", 3).is_granted());

        let query =
            Query::new("senior engineer").with_platforms(PlatformSelector::One("indeed".into()));
        let outcome = orch.fetch(&query).await.unwrap();

        assert_eq!(outcome.report.warnings.len(), 1);
        assert!(outcome.report.warnings[0].contains("80%"));
    }

    #[tokio::test]
    async fn overlapping_results_deduplicate_across_backends() {
        // Same posting, no native id, surfaced by two sources: content
        // hash collides and the merge keeps one record.
        let mut shared = make_listing("x", "Shared Engineer");
        shared.source_id = None;
        let orch = orchestrator(
            vec![free("a", &["indeed"]), free("b", &["linkedin"])],
            vec![
                MockSource::new("a", vec![shared.clone()]),
                MockSource::new("b", vec![shared]),
            ],
            config(),
        );

        let outcome = orch.fetch(&Query::new("developer")).await.unwrap();

        assert_eq!(outcome.report.successes(), 2);
        assert_eq!(outcome.records.len(), 1);
        // Earlier-successful backend wins the tie.
        assert_eq!(outcome.records[0].source, "a");
    }
}
