//! Healing coordinator
//!
//! Runs strategies in priority order against one pair of snapshots, stops
//! early once a candidate is good enough, and merges everything that ran
//! into one ranked list on a [`HealingAttempt`].
//!
//! # Ranking
//! - Descending confidence; ties go to the cheaper strategy
//! - A selector proposed twice keeps its best entry
//! - With an expected element type, candidates matching other tags are
//!   demoted ×0.8
//!
//! # Early exit
//! - Once any candidate reaches `thresholds.short_circuit` the remaining
//!   strategies are skipped
//! - ai-powered-analysis only runs while nothing reaches
//!   `thresholds.acceptance`, and under `ai.timeout_ms`
//!
//! An explicit strategy override runs that strategy alone, unconditionally.
//!
//! # Strategy health
//! A strategy that returns an error is skipped by later attempts until
//! [`HealingCoordinator::reset_strategy_health`] puts it back. Timeouts do
//! not count.

use crate::attempt::{AttemptStatus, HealingAttempt, StrategyOutcome, StrategyRun};
use crate::cache::{CacheKey, CachedHeal, HealCache};
use crate::config::HealingConfig;
use crate::error::HealError;
use crate::stats::{FlakinessTracker, HealingStats, StatsRecorder, StrategyHealth};
use mender_dom::DomSnapshot;
use mender_selector::Selector;
use mender_strategy::{
    Candidate, Confidence, HealingContext, HealingStrategy, HeuristicScorer, StrategyError, StrategyKind,
    StrategyRegistry,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

const COORDINATOR: &str = "coordinator";
const TYPE_MISMATCH_FACTOR: f64 = 0.8;

/// One selector to heal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealRequest {
    pub page_url: String,
    pub selector: String,
    pub test_id: Option<String>,
    /// Run only this strategy
    pub strategy: Option<String>,
    /// Tag the healed element should have
    pub expected_element_type: Option<String>,
}

impl HealRequest {
    /// Create new request
    #[must_use]
    pub fn new(page_url: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            selector: selector.into(),
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_test_id(mut self, test_id: impl Into<String>) -> Self {
        self.test_id = Some(test_id.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_expected_element_type(mut self, tag: impl Into<String>) -> Self {
        self.expected_element_type = Some(tag.into());
        self
    }

    /// Reject empty input before any work begins
    ///
    /// # Errors
    /// Returns [`HealError::Validation`] if the page URL or selector is empty
    pub fn validate(&self) -> Result<(), HealError> {
        require_non_empty("page url", &self.page_url)?;
        require_non_empty("selector", &self.selector)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchItem {
    pub test_id: Option<String>,
    pub selector: String,
    pub expected_element_type: Option<String>,
}

impl BatchItem {
    #[must_use]
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            ..Self::default()
        }
    }
}

/// Selectors of one page healed against one shared capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRequest {
    pub page_url: String,
    pub items: Vec<BatchItem>,
}

impl BatchRequest {
    #[must_use]
    pub fn new<I, S>(page_url: impl Into<String>, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            page_url: page_url.into(),
            items: selectors.into_iter().map(BatchItem::new).collect(),
        }
    }

    /// Reject empty input before any work begins
    ///
    /// # Errors
    /// Returns [`HealError::Validation`] for an empty page URL, an empty
    /// selector list or an empty selector
    pub fn validate(&self) -> Result<(), HealError> {
        require_non_empty("page url", &self.page_url)?;
        if self.items.is_empty() {
            return Err(HealError::Validation("selectors must not be empty".to_string()));
        }
        for (index, item) in self.items.iter().enumerate() {
            require_non_empty(&format!("selector {index}"), &item.selector)?;
        }
        Ok(())
    }
}

/// Counts over a batch's attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl BatchSummary {
    /// Successful means the top candidate reaches `acceptance`
    #[must_use]
    pub fn from_attempts(attempts: &[HealingAttempt], acceptance: f64) -> Self {
        Self::for_request(attempts, attempts.len(), acceptance)
    }

    /// Counts over `requested` selectors; those without an attempt failed
    #[must_use]
    pub fn for_request(attempts: &[HealingAttempt], requested: usize, acceptance: f64) -> Self {
        let successful = attempts.iter().filter(|a| a.is_healed(acceptance)).count();
        let total = requested.max(attempts.len());
        Self {
            total,
            successful,
            failed: total - successful,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// In request order; shorter than the request if cancelled
    pub attempts: Vec<HealingAttempt>,
    /// Covers every requested selector, unscheduled ones as failed
    pub summary: BatchSummary,
    pub cancelled: bool,
}

/// Runs strategies and produces attempts
#[derive(Debug, Clone)]
pub struct HealingCoordinator {
    config: Arc<HealingConfig>,
    registry: StrategyRegistry,
    cache: Option<HealCache>,
    stats: Arc<StatsRecorder>,
    flakiness: Arc<FlakinessTracker>,
    health: Arc<StrategyHealth>,
}

impl HealingCoordinator {
    /// Create new coordinator with the built-in strategies
    #[must_use]
    pub fn new(config: HealingConfig) -> Self {
        let registry = StrategyRegistry::with_scorer(
            Arc::new(HeuristicScorer::default()),
            config.ai.top_k,
            config.ai.min_score,
        );
        Self::with_registry(config, registry)
    }

    /// Create coordinator over a custom registry
    #[must_use]
    pub fn with_registry(config: HealingConfig, registry: StrategyRegistry) -> Self {
        Self {
            cache: HealCache::from_config(&config.cache),
            flakiness: Arc::new(FlakinessTracker::new(config.flakiness.clone())),
            stats: Arc::new(StatsRecorder::new()),
            health: Arc::new(StrategyHealth::new()),
            registry,
            config: Arc::new(config),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &HealingConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    #[must_use]
    pub fn stats(&self) -> HealingStats {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    #[inline]
    #[must_use]
    pub fn flakiness(&self) -> &FlakinessTracker {
        &self.flakiness
    }

    pub fn clear_flakiness(&self) {
        self.flakiness.clear();
        info!("flakiness records cleared");
    }

    /// Drop every cached heal
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
            info!("heal cache cleared");
        }
    }

    #[inline]
    #[must_use]
    pub fn strategy_health(&self) -> &StrategyHealth {
        &self.health
    }

    /// Put a failed strategy back into rotation, or all of them with `None`
    pub fn reset_strategy_health(&self, strategy: Option<&str>) {
        match strategy {
            Some(name) => {
                if self.health.reset(name) {
                    info!(strategy = name, "strategy back in rotation");
                }
            }
            None => self.health.reset_all(),
        }
    }

    /// Heal one selector
    ///
    /// A selector that does not parse still yields an attempt, in
    /// `rejected-invalid-input` with the error attached.
    ///
    /// # Errors
    /// - [`HealError::Validation`] if the page URL or selector is empty
    /// - [`HealError::UnknownStrategy`] if the override names no registered strategy
    pub async fn heal_single(
        &self,
        original: Arc<DomSnapshot>,
        current: Arc<DomSnapshot>,
        request: &HealRequest,
    ) -> Result<HealingAttempt, HealError> {
        request.validate()?;
        if let Some(name) = &request.strategy {
            if !self.registry.contains(name) {
                return Err(HealError::UnknownStrategy(name.clone()));
            }
        }
        Ok(self.run(original, current, request).await)
    }

    /// Heal every selector of a batch over a bounded pool
    ///
    /// Cancelling stops scheduling; attempts already running complete and
    /// are reported with `cancelled` set. Unscheduled selectors count as
    /// failed in the summary.
    ///
    /// # Errors
    /// Returns [`HealError::Validation`] for an empty page URL, an empty
    /// selector list or an empty selector
    pub async fn heal_batch(
        &self,
        original: Arc<DomSnapshot>,
        current: Arc<DomSnapshot>,
        request: &BatchRequest,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, HealError> {
        request.validate()?;

        let semaphore = Arc::new(Semaphore::new(self.config.batch.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut scheduled = 0;
        let mut cancelled = false;

        for (index, item) in request.items.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                cancelled = true;
                info!(scheduled = index, total = request.items.len(), "batch cancelled");
                break;
            };

            let coordinator = self.clone();
            let (original, current) = (Arc::clone(&original), Arc::clone(&current));
            let heal = HealRequest {
                page_url: request.page_url.clone(),
                selector: item.selector.clone(),
                test_id: item.test_id.clone(),
                strategy: None,
                expected_element_type: item.expected_element_type.clone(),
            };
            tasks.spawn(async move {
                let attempt = coordinator.run(original, current, &heal).await;
                drop(permit);
                (index, attempt)
            });
            scheduled = index + 1;
        }

        let mut slots: Vec<Option<HealingAttempt>> = vec![None; scheduled];
        let mut panicked = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, attempt)) => slots[index] = Some(attempt),
                Err(err) => {
                    error!(error = %err, "heal task failed");
                    panicked = Some(err.to_string());
                }
            }
        }
        // A task that died still owes its selector an attempt.
        let attempts: Vec<HealingAttempt> = slots
            .into_iter()
            .zip(&request.items)
            .map(|(slot, item)| {
                slot.unwrap_or_else(|| {
                    let reason = panicked.as_deref().unwrap_or("task lost");
                    self.lost(&original, &current, &request.page_url, item, reason)
                })
            })
            .collect();

        let summary = BatchSummary::for_request(&attempts, request.items.len(), self.config.thresholds.acceptance);
        info!(
            page_url = %request.page_url,
            total = summary.total,
            successful = summary.successful,
            cancelled,
            "batch finished"
        );
        Ok(BatchOutcome {
            attempts,
            summary,
            cancelled,
        })
    }

    fn lost(
        &self,
        original: &Arc<DomSnapshot>,
        current: &Arc<DomSnapshot>,
        page_url: &str,
        item: &BatchItem,
        reason: &str,
    ) -> HealingAttempt {
        let mut attempt = HealingAttempt::new(
            page_url.to_string(),
            item.selector.clone(),
            Arc::clone(original),
            Arc::clone(current),
        )
        .with_test_id(item.test_id.clone());
        attempt.rationale = Some(format!("heal task failed: {reason}"));
        settle(&mut attempt, AttemptStatus::Proposed);
        self.record(&attempt);
        attempt
    }

    async fn run(&self, original: Arc<DomSnapshot>, current: Arc<DomSnapshot>, request: &HealRequest) -> HealingAttempt {
        let attempt = HealingAttempt::new(
            request.page_url.clone(),
            request.selector.clone(),
            Arc::clone(&original),
            Arc::clone(&current),
        )
        .with_test_id(request.test_id.clone());
        let span = info_span!(
            "heal",
            page_url = %request.page_url,
            selector = %request.selector,
            attempt_id = %attempt.id
        );
        self.run_attempt(attempt, &original, &current, request)
            .instrument(span)
            .await
    }

    async fn run_attempt(
        &self,
        mut attempt: HealingAttempt,
        original: &DomSnapshot,
        current: &DomSnapshot,
        request: &HealRequest,
    ) -> HealingAttempt {
        info!("attempt created");

        let broken = match Selector::parse(&request.selector) {
            Ok(selector) => selector,
            Err(err) => {
                warn!(error = %err, "broken selector does not parse");
                attempt.rationale = Some(err.to_string());
                attempt.syntax_error = Some(err);
                settle(&mut attempt, AttemptStatus::RejectedInvalidInput);
                return attempt;
            }
        };

        if !self.config.enabled {
            attempt.rationale = Some("healing disabled".to_string());
            settle(&mut attempt, AttemptStatus::Proposed);
            return attempt;
        }

        let key = CacheKey {
            page_url: request.page_url.clone(),
            selector: request.selector.clone(),
            strategy: request.strategy.clone(),
            baseline: original.fingerprint(),
            fingerprint: current.fingerprint(),
        };
        let cached = match &self.cache {
            Some(cache) => cache.get(&key).await,
            None => None,
        };

        let (candidates, runs) = match cached {
            Some(hit) => {
                debug!(candidates = hit.candidates.len(), "cache hit");
                attempt.from_cache = true;
                (hit.candidates.clone(), hit.strategy_runs.clone())
            }
            None => {
                let ctx = HealingContext::new(original, &broken, current);
                let (candidates, runs) = self.propose(&ctx, request.strategy.as_deref()).await;
                if let Some(cache) = &self.cache {
                    cache
                        .insert(
                            key,
                            CachedHeal {
                                candidates: candidates.clone(),
                                strategy_runs: runs.clone(),
                            },
                        )
                        .await;
                }
                (candidates, runs)
            }
        };

        attempt.candidates = match &request.expected_element_type {
            Some(tag) => demote_mismatched(candidates, current, tag),
            None => candidates,
        };
        attempt.strategy_runs = runs;
        if attempt.candidates.is_empty() {
            attempt.rationale = Some("no strategy produced a candidate".to_string());
        }
        settle(&mut attempt, AttemptStatus::Proposed);
        self.record(&attempt);
        attempt
    }

    async fn propose(&self, ctx: &HealingContext<'_>, only: Option<&str>) -> (Vec<Candidate>, Vec<StrategyRun>) {
        let strategies: Vec<Arc<dyn HealingStrategy>> = match only {
            Some(name) => self.registry.get(name).cloned().into_iter().collect(),
            None => self.registry.filtered(&self.config.strategies).iter().cloned().collect(),
        };
        let thresholds = &self.config.thresholds;
        let mut ranked: Vec<(usize, Candidate)> = Vec::new();
        let mut runs = Vec::with_capacity(strategies.len());
        let mut best = Confidence::ZERO;

        for strategy in strategies {
            let name = strategy.name();
            if only.is_none() {
                let skip = if !self.health.is_healthy(name) {
                    Some("unhealthy".to_string())
                } else if best.value() >= thresholds.short_circuit {
                    Some(format!("short-circuited at {best}"))
                } else if strategy.kind() == StrategyKind::AiPowered && best.value() >= thresholds.acceptance {
                    Some(format!("cheaper strategies reached {best}"))
                } else {
                    None
                };
                if let Some(reason) = skip {
                    debug!(strategy = name, %reason, "strategy skipped");
                    runs.push(StrategyRun {
                        strategy: name.to_string(),
                        outcome: StrategyOutcome::Skipped { reason },
                        elapsed_ms: 0,
                    });
                    continue;
                }
            }

            let started = Instant::now();
            let result = if strategy.kind() == StrategyKind::AiPowered {
                match tokio::time::timeout(self.config.ai.timeout(), strategy.propose(ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(StrategyError::Timeout {
                        timeout_ms: self.config.ai.timeout_ms,
                    }),
                }
            } else {
                strategy.propose(ctx).await
            };
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let outcome = match result {
                Ok(candidates) => {
                    debug!(strategy = name, candidates = candidates.len(), elapsed_ms, "strategy completed");
                    let priority = self.registry.priority(name).unwrap_or(usize::MAX);
                    let count = candidates.len();
                    if let Some(top) = candidates.iter().map(|c| c.confidence).max() {
                        best = best.max(top);
                    }
                    ranked.extend(candidates.into_iter().map(|c| (priority, c)));
                    StrategyOutcome::Completed { candidates: count }
                }
                Err(StrategyError::Timeout { timeout_ms }) => {
                    let err = HealError::StrategyTimeout {
                        strategy: name.to_string(),
                        timeout_ms,
                    };
                    warn!(error = %err, "strategy contributed nothing");
                    StrategyOutcome::TimedOut { timeout_ms }
                }
                Err(err) => {
                    let reason = err.to_string();
                    warn!(strategy = name, error = %reason, "strategy failed");
                    self.health.mark_unhealthy(name, &reason);
                    StrategyOutcome::Failed { reason }
                }
            };
            runs.push(StrategyRun {
                strategy: name.to_string(),
                outcome,
                elapsed_ms,
            });
        }

        (merge(ranked), runs)
    }

    fn record(&self, attempt: &HealingAttempt) {
        let acceptance = self.config.thresholds.acceptance;
        let healed_by = attempt
            .proposed_fix()
            .filter(|c| c.confidence.value() >= acceptance)
            .map(|c| (c.strategy.as_str(), c.confidence.value()));
        self.stats.record(healed_by, attempt.from_cache);
        self.flakiness.record(&attempt.original_selector, healed_by.is_some());
        info!(
            status = %attempt.status(),
            confidence = attempt.confidence().value(),
            strategy = healed_by.map_or("none", |(name, _)| name),
            from_cache = attempt.from_cache,
            "attempt proposed"
        );
    }
}

fn require_non_empty(what: &str, value: &str) -> Result<(), HealError> {
    if value.trim().is_empty() {
        Err(HealError::Validation(format!("{what} must not be empty")))
    } else {
        Ok(())
    }
}

// Coordinator-driven transitions out of `pending` are always legal.
fn settle(attempt: &mut HealingAttempt, to: AttemptStatus) {
    if let Err(err) = attempt.transition(to, COORDINATOR) {
        error!(error = %err, "coordinator transition refused");
    }
}

/// Rank by confidence, cheaper strategy first on ties, one entry per selector
fn merge(mut ranked: Vec<(usize, Candidate)>) -> Vec<Candidate> {
    ranked.sort_by(|(pa, a), (pb, b)| b.confidence.cmp(&a.confidence).then(pa.cmp(pb)));
    let mut out: Vec<Candidate> = Vec::with_capacity(ranked.len());
    for (_, candidate) in ranked {
        if !out.iter().any(|c| c.selector == candidate.selector) {
            out.push(candidate);
        }
    }
    out
}

fn demote_mismatched(candidates: Vec<Candidate>, current: &DomSnapshot, tag: &str) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = candidates
        .into_iter()
        .map(|c| {
            let all_match = c
                .matched_node_ids
                .iter()
                .all(|id| current.node(*id).is_some_and(|n| n.tag().eq_ignore_ascii_case(tag)));
            if all_match {
                c
            } else {
                c.demoted(TYPE_MISMATCH_FACTOR, &format!("expected <{tag}>"))
            }
        })
        .collect();
    // stable, so earlier ties keep strategy priority
    out.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    out
}
