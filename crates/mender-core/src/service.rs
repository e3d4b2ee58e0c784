//! Inbound operations
//!
//! [`HealingService`] binds the coordinator to its collaborators: snapshots
//! come from a [`SnapshotSource`], attempts land on a [`ReviewBoard`], and
//! applied fixes go out through a [`FixPublisher`].

use crate::attempt::{AttemptId, AttemptStatus, HealingAttempt};
use crate::config::HealingConfig;
use crate::coordinator::{BatchOutcome, BatchRequest, HealRequest, HealingCoordinator};
use crate::dto::{
    BatchHealRequestDto, BatchHealResponseDto, DecisionRequest, HealRequestDto, HealResponseDto, PlaygroundRequest,
    PlaygroundResponse, ReviewQueueItem,
};
use crate::error::HealError;
use crate::review::{ReviewBoard, AUTO_HEAL_POLICY};
use crate::source::{FixPublisher, SnapshotSource};
use mender_dom::DomSnapshot;
use mender_strategy::StrategyInfo;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
pub struct HealingService {
    coordinator: HealingCoordinator,
    board: Arc<ReviewBoard>,
    source: Arc<dyn SnapshotSource>,
    publisher: Arc<dyn FixPublisher>,
}

impl HealingService {
    /// Create new service with the built-in strategies
    #[must_use]
    pub fn new(config: HealingConfig, source: Arc<dyn SnapshotSource>, publisher: Arc<dyn FixPublisher>) -> Self {
        Self::with_coordinator(HealingCoordinator::new(config), source, publisher)
    }

    #[must_use]
    pub fn with_coordinator(
        coordinator: HealingCoordinator,
        source: Arc<dyn SnapshotSource>,
        publisher: Arc<dyn FixPublisher>,
    ) -> Self {
        Self {
            coordinator,
            board: Arc::new(ReviewBoard::new()),
            source,
            publisher,
        }
    }

    #[inline]
    #[must_use]
    pub fn coordinator(&self) -> &HealingCoordinator {
        &self.coordinator
    }

    #[inline]
    #[must_use]
    pub fn board(&self) -> &ReviewBoard {
        &self.board
    }

    fn acceptance(&self) -> f64 {
        self.coordinator.config().thresholds.acceptance
    }

    // Current first: without it no attempt means anything.
    async fn snapshots(&self, page_url: &str) -> Result<(Arc<DomSnapshot>, Arc<DomSnapshot>), HealError> {
        let current = self.source.capture(page_url).await?;
        let baseline = self.source.baseline(page_url).await?;
        Ok((baseline, current))
    }

    /// Heal one selector and put the attempt up for review
    ///
    /// # Errors
    /// - [`HealError::Validation`] for an empty url or selector
    /// - [`HealError::UnknownStrategy`] for an unregistered override
    /// - [`HealError::SnapshotUnavailable`] if either snapshot cannot be had
    /// - [`HealError::SelectorSyntax`] if the selector does not parse; the
    ///   rejected attempt is still recorded on the board
    pub async fn heal(&self, dto: HealRequestDto) -> Result<HealResponseDto, HealError> {
        let request = HealRequest::from(dto);
        request.validate()?;
        let (baseline, current) = self.snapshots(&request.page_url).await?;
        let attempt = self.coordinator.heal_single(baseline, current, &request).await?;
        let syntax_error = attempt.syntax_error.clone();
        let attempt = self.admit(attempt).await?;
        if let Some(err) = syntax_error {
            return Err(err.into());
        }
        Ok(HealResponseDto::from_attempt(&attempt, self.acceptance()))
    }

    /// Heal every selector of a page against one capture
    ///
    /// # Errors
    /// - [`HealError::Validation`] for an empty url or selector list
    /// - [`HealError::SnapshotUnavailable`] if either snapshot cannot be had
    pub async fn heal_batch(
        &self,
        dto: BatchHealRequestDto,
        cancel: &CancellationToken,
    ) -> Result<BatchHealResponseDto, HealError> {
        let request = BatchRequest::from(dto);
        request.validate()?;
        let (baseline, current) = self.snapshots(&request.page_url).await?;
        let BatchOutcome {
            attempts,
            summary,
            cancelled,
        } = self
            .coordinator
            .heal_batch(baseline, current, &request, cancel)
            .await?;

        let mut admitted = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            admitted.push(self.admit(attempt).await?);
        }
        Ok(BatchHealResponseDto::from_attempts(
            &admitted,
            summary,
            cancelled,
            self.acceptance(),
        ))
    }

    /// Record on the board, approving by policy when confident enough
    async fn admit(&self, attempt: HealingAttempt) -> Result<HealingAttempt, HealError> {
        let auto_approve = self.coordinator.config().thresholds.auto_approve;
        let eligible = attempt.status() == AttemptStatus::Proposed
            && attempt.proposed_fix().is_some()
            && auto_approve.is_some_and(|bar| attempt.confidence().value() >= bar);
        let id = self.board.insert(attempt);
        if eligible {
            info!(attempt_id = %id, "auto-approving");
            let reason = Some("confidence reached the auto-approve threshold".to_string());
            return self.board.approve(id, AUTO_HEAL_POLICY, reason).await;
        }
        self.board.get(id).await
    }

    /// Registered strategies in priority order
    #[must_use]
    pub fn strategies(&self) -> Vec<StrategyInfo> {
        self.coordinator.registry().catalog()
    }

    /// Evaluate a selector against a snapshot
    ///
    /// # Errors
    /// Returns [`HealError::SelectorSyntax`] if the selector does not parse
    pub fn playground(&self, snapshot: &DomSnapshot, request: &PlaygroundRequest) -> Result<PlaygroundResponse, HealError> {
        let matched_node_ids = mender_selector::evaluate(&request.selector, snapshot)?;
        Ok(PlaygroundResponse {
            count: matched_node_ids.len(),
            matched_node_ids,
        })
    }

    /// Proposed attempts at or above `min_confidence`
    pub async fn review_queue(&self, min_confidence: f64) -> Vec<ReviewQueueItem> {
        self.board
            .pending_review(min_confidence)
            .await
            .iter()
            .map(ReviewQueueItem::from_attempt)
            .collect()
    }

    /// # Errors
    /// Returns [`HealError::AttemptNotFound`] for unknown ids
    pub async fn attempt(&self, id: AttemptId) -> Result<HealingAttempt, HealError> {
        self.board.get(id).await
    }

    /// # Errors
    /// Returns [`HealError::StaleState`] if the attempt was already decided
    pub async fn approve(&self, id: AttemptId, decision: DecisionRequest) -> Result<HealingAttempt, HealError> {
        self.board.approve(id, &decision.reviewer, decision.reason).await
    }

    /// # Errors
    /// Returns [`HealError::StaleState`] if the attempt was already decided
    pub async fn reject(&self, id: AttemptId, decision: DecisionRequest) -> Result<HealingAttempt, HealError> {
        self.board.reject(id, &decision.reviewer, decision.reason).await
    }

    /// Publish an approved fix
    ///
    /// # Errors
    /// - [`HealError::StaleState`] if the attempt is not approved
    /// - [`HealError::Publish`] if the publisher fails
    pub async fn apply(&self, id: AttemptId, actor: &str) -> Result<HealingAttempt, HealError> {
        self.board.apply(id, actor, self.publisher.as_ref()).await
    }

    /// # Errors
    /// Returns [`HealError::StaleState`] if the attempt is not rejected
    pub async fn discard(&self, id: AttemptId, actor: &str) -> Result<HealingAttempt, HealError> {
        self.board.discard(id, actor).await
    }
}
