//! Review board
//!
//! Holds every attempt behind its own lock. Each write names the status it
//! expects to find; whoever finds something else gets
//! [`HealError::StaleState`], so of two concurrent approvals exactly one wins.

use crate::attempt::{AttemptId, AttemptStatus, HealingAttempt};
use crate::error::HealError;
use crate::source::{AppliedFix, FixPublisher};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Reviewer identity used by the auto-approve policy
pub const AUTO_HEAL_POLICY: &str = "auto-heal-policy";

/// Attempts awaiting or past review
#[derive(Debug, Default)]
pub struct ReviewBoard {
    attempts: DashMap<AttemptId, Arc<Mutex<HealingAttempt>>>,
}

impl ReviewBoard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an attempt
    pub fn insert(&self, attempt: HealingAttempt) -> AttemptId {
        let id = attempt.id;
        self.attempts.insert(id, Arc::new(Mutex::new(attempt)));
        id
    }

    fn slot(&self, id: AttemptId) -> Result<Arc<Mutex<HealingAttempt>>, HealError> {
        self.attempts
            .get(&id)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or(HealError::AttemptNotFound(id))
    }

    /// Copy of an attempt
    ///
    /// # Errors
    /// Returns [`HealError::AttemptNotFound`] for unknown ids
    pub async fn get(&self, id: AttemptId) -> Result<HealingAttempt, HealError> {
        Ok(self.slot(id)?.lock().await.clone())
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Proposed attempts with at least one candidate reaching
    /// `min_confidence`, oldest first
    pub async fn pending_review(&self, min_confidence: f64) -> Vec<HealingAttempt> {
        let slots: Vec<_> = self.attempts.iter().map(|e| Arc::clone(e.value())).collect();
        let mut out = Vec::new();
        for slot in slots {
            let attempt = slot.lock().await;
            if attempt.status() == AttemptStatus::Proposed
                && attempt.proposed_fix().is_some()
                && attempt.confidence().value() >= min_confidence
            {
                out.push(attempt.clone());
            }
        }
        out.sort_by_key(|a| a.id);
        out
    }

    /// Compare-and-set a status
    ///
    /// # Errors
    /// - [`HealError::StaleState`] if the attempt is no longer in `expected`
    /// - [`HealError::IllegalTransition`] if `expected -> to` is not allowed
    pub async fn transition(
        &self,
        id: AttemptId,
        expected: AttemptStatus,
        to: AttemptStatus,
        actor: &str,
    ) -> Result<HealingAttempt, HealError> {
        let slot = self.slot(id)?;
        let mut attempt = slot.lock().await;
        check_expected(&attempt, expected)?;
        attempt.transition(to, actor)?;
        info!(attempt_id = %id, from = %expected, to = %to, actor, "attempt transitioned");
        Ok(attempt.clone())
    }

    async fn decide(
        &self,
        id: AttemptId,
        to: AttemptStatus,
        reviewer: &str,
        reason: Option<String>,
    ) -> Result<HealingAttempt, HealError> {
        let slot = self.slot(id)?;
        let mut attempt = slot.lock().await;
        check_expected(&attempt, AttemptStatus::Proposed)?;
        attempt.decide(to, reviewer, reason)?;
        info!(attempt_id = %id, decision = %to, reviewer, "attempt decided");
        Ok(attempt.clone())
    }

    /// `proposed -> approved`
    ///
    /// # Errors
    /// Returns [`HealError::StaleState`] if the attempt is not proposed
    pub async fn approve(&self, id: AttemptId, reviewer: &str, reason: Option<String>) -> Result<HealingAttempt, HealError> {
        self.decide(id, AttemptStatus::Approved, reviewer, reason).await
    }

    /// `proposed -> rejected`
    ///
    /// # Errors
    /// Returns [`HealError::StaleState`] if the attempt is not proposed
    pub async fn reject(&self, id: AttemptId, reviewer: &str, reason: Option<String>) -> Result<HealingAttempt, HealError> {
        self.decide(id, AttemptStatus::Rejected, reviewer, reason).await
    }

    /// Publish the approved fix, then `approved -> applied`
    ///
    /// The attempt stays locked across publishing, so it is published at most
    /// once. A failed publish leaves it approved.
    ///
    /// # Errors
    /// - [`HealError::StaleState`] if the attempt is not approved
    /// - [`HealError::Publish`] if the publisher fails
    pub async fn apply(&self, id: AttemptId, actor: &str, publisher: &dyn FixPublisher) -> Result<HealingAttempt, HealError> {
        let slot = self.slot(id)?;
        let mut attempt = slot.lock().await;
        check_expected(&attempt, AttemptStatus::Approved)?;

        let Some(fix) = attempt.proposed_fix() else {
            return Err(HealError::Validation(format!("attempt {id} has no candidate to apply")));
        };
        let fix = AppliedFix {
            attempt_id: id,
            test_id: attempt.test_id.clone(),
            page_url: attempt.page_url.clone(),
            original_selector: attempt.original_selector.clone(),
            healed_selector: fix.selector.to_string(),
            strategy: fix.strategy.clone(),
            confidence: fix.confidence.value(),
        };
        if let Err(err) = publisher.publish(&fix).await {
            error!(attempt_id = %id, error = %err, "failed to publish fix");
            return Err(err);
        }
        attempt.transition(AttemptStatus::Applied, actor)?;
        info!(attempt_id = %id, healed = %fix.healed_selector, "fix applied");
        Ok(attempt.clone())
    }

    /// `rejected -> discarded`
    ///
    /// # Errors
    /// Returns [`HealError::StaleState`] if the attempt is not rejected
    pub async fn discard(&self, id: AttemptId, actor: &str) -> Result<HealingAttempt, HealError> {
        self.transition(id, AttemptStatus::Rejected, AttemptStatus::Discarded, actor)
            .await
    }
}

fn check_expected(attempt: &HealingAttempt, expected: AttemptStatus) -> Result<(), HealError> {
    if attempt.status() == expected {
        Ok(())
    } else {
        Err(HealError::StaleState {
            attempt: attempt.id,
            expected,
            actual: attempt.status(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RecordingPublisher;
    use mender_selector::Selector;
    use mender_strategy::{Candidate, Evidence};
    use mender_test_utils::{login_original, snapshot};

    fn proposed() -> HealingAttempt {
        let page = Arc::new(snapshot(login_original()));
        let mut attempt = HealingAttempt::new("https://app.example.com/login", "#old", page.clone(), page);
        let selector: Selector = "#submit-btn".parse().unwrap();
        attempt.candidates.push(Candidate::new(
            "text-content-matching",
            selector,
            vec![mender_dom::NodeId(14)],
            0.95,
            "reads \"Login\"",
            Evidence::Text {
                original_text: "Login".into(),
                matched_text: "Login".into(),
                similarity: 1.0,
                same_text_matches: 1,
            },
        ));
        attempt.transition(AttemptStatus::Proposed, "coordinator").unwrap();
        attempt
    }

    #[tokio::test]
    async fn second_decision_is_stale() {
        let board = ReviewBoard::new();
        let id = board.insert(proposed());

        board.approve(id, "alice", None).await.unwrap();
        let err = board.reject(id, "bob", Some("late".into())).await.unwrap_err();
        assert!(matches!(
            err,
            HealError::StaleState {
                expected: AttemptStatus::Proposed,
                actual: AttemptStatus::Approved,
                ..
            }
        ));
        assert_eq!(board.get(id).await.unwrap().decision().unwrap().reviewer, "alice");
    }

    #[tokio::test]
    async fn apply_publishes_once() {
        let board = ReviewBoard::new();
        let publisher = RecordingPublisher::new();
        let id = board.insert(proposed());

        assert!(board.apply(id, "ci", &publisher).await.is_err());
        board.approve(id, "alice", None).await.unwrap();
        let applied = board.apply(id, "ci", &publisher).await.unwrap();
        assert_eq!(applied.status(), AttemptStatus::Applied);
        assert!(board.apply(id, "ci", &publisher).await.is_err());

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].healed_selector, "#submit-btn");
        assert_eq!(published[0].original_selector, "#old");
    }

    #[tokio::test]
    async fn failed_publish_stays_approved() {
        let board = ReviewBoard::new();
        let id = board.insert(proposed());
        board.approve(id, "alice", None).await.unwrap();

        let err = board
            .apply(id, "ci", &RecordingPublisher::failing("pipeline down"))
            .await
            .unwrap_err();
        assert!(matches!(err, HealError::Publish(_)));
        assert_eq!(board.get(id).await.unwrap().status(), AttemptStatus::Approved);
    }

    #[tokio::test]
    async fn reject_then_discard() {
        let board = ReviewBoard::new();
        let id = board.insert(proposed());
        board.reject(id, "alice", Some("wrong element".into())).await.unwrap();
        let discarded = board.discard(id, "alice").await.unwrap();
        assert_eq!(discarded.status(), AttemptStatus::Discarded);
        assert_eq!(discarded.decision().unwrap().reason.as_deref(), Some("wrong element"));
    }

    #[tokio::test]
    async fn queue_filters_by_confidence() {
        let board = ReviewBoard::new();
        board.insert(proposed());
        assert_eq!(board.pending_review(0.9).await.len(), 1);
        assert!(board.pending_review(0.99).await.is_empty());
        assert!(matches!(
            board.get(AttemptId::new()).await.unwrap_err(),
            HealError::AttemptNotFound(_)
        ));
    }
}
