//! Healing attempts
//!
//! A [`HealingAttempt`] is the unit of work and the audit record. Its
//! candidates are fixed once strategies have run; only the review state
//! machine moves its status afterwards.

use crate::error::HealError;
use crate::state::validate_transition;
use chrono::{DateTime, Utc};
use mender_dom::DomSnapshot;
use mender_selector::SelectorSyntaxError;
use mender_strategy::{Candidate, Confidence};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use ulid::Ulid;

/// Unique attempt identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub Ulid);

impl AttemptId {
    /// Generate new attempt ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for AttemptId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AttemptId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Review lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    /// Created, strategies not yet run
    Pending,
    /// Strategies ran; candidates (possibly none) attached
    Proposed,
    Approved,
    Rejected,
    /// Approved fix handed to the publisher
    Applied,
    Discarded,
    /// Broken selector did not parse
    RejectedInvalidInput,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Applied => "applied",
            Self::Discarded => "discarded",
            Self::RejectedInvalidInput => "rejected-invalid-input",
        }
    }
}

impl Display for AttemptStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reviewer verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub reviewer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// One entry of the status history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// `None` for creation
    pub from: Option<AttemptStatus>,
    pub to: AttemptStatus,
    pub actor: String,
    pub at: DateTime<Utc>,
}

/// What happened to one strategy during an attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum StrategyOutcome {
    Completed { candidates: usize },
    Skipped { reason: String },
    TimedOut { timeout_ms: u64 },
    Failed { reason: String },
}

impl Display for StrategyOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { candidates } => write!(f, "completed({candidates})"),
            Self::Skipped { .. } => f.write_str("skipped"),
            Self::TimedOut { .. } => f.write_str("timed_out"),
            Self::Failed { reason } => write!(f, "failed({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRun {
    pub strategy: String,
    #[serde(flatten)]
    pub outcome: StrategyOutcome,
    pub elapsed_ms: u64,
}

/// Unit of healing work and its audit trail
#[derive(Debug, Clone, Serialize)]
pub struct HealingAttempt {
    pub id: AttemptId,
    pub test_id: Option<String>,
    pub original_selector: String,
    pub page_url: String,
    pub original_snapshot: Arc<DomSnapshot>,
    pub current_snapshot: Arc<DomSnapshot>,
    /// Descending confidence; the first is the proposed fix
    pub candidates: Vec<Candidate>,
    pub strategy_runs: Vec<StrategyRun>,
    pub from_cache: bool,
    /// Why there is nothing to review, when there isn't
    pub rationale: Option<String>,
    pub syntax_error: Option<SelectorSyntaxError>,
    pub created_at: DateTime<Utc>,
    status: AttemptStatus,
    decision: Option<Decision>,
    history: Vec<StatusChange>,
}

impl HealingAttempt {
    /// Create new pending attempt
    #[must_use]
    pub fn new(
        page_url: impl Into<String>,
        original_selector: impl Into<String>,
        original_snapshot: Arc<DomSnapshot>,
        current_snapshot: Arc<DomSnapshot>,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: AttemptId::new(),
            test_id: None,
            original_selector: original_selector.into(),
            page_url: page_url.into(),
            original_snapshot,
            current_snapshot,
            candidates: Vec::new(),
            strategy_runs: Vec::new(),
            from_cache: false,
            rationale: None,
            syntax_error: None,
            created_at,
            status: AttemptStatus::Pending,
            decision: None,
            history: vec![StatusChange {
                from: None,
                to: AttemptStatus::Pending,
                actor: "coordinator".to_string(),
                at: created_at,
            }],
        }
    }

    #[inline]
    #[must_use]
    pub fn with_test_id(mut self, test_id: Option<String>) -> Self {
        self.test_id = test_id;
        self
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[inline]
    #[must_use]
    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    /// Top candidate
    #[inline]
    #[must_use]
    pub fn proposed_fix(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// Top candidate's confidence, zero when there is none
    #[must_use]
    pub fn confidence(&self) -> Confidence {
        self.proposed_fix().map_or(Confidence::ZERO, |c| c.confidence)
    }

    /// Whether the top candidate reaches `acceptance`
    #[must_use]
    pub fn is_healed(&self, acceptance: f64) -> bool {
        self.proposed_fix().is_some_and(|c| c.confidence.value() >= acceptance)
    }

    /// Proposed replacement, rendered
    #[must_use]
    pub fn healed_selector(&self) -> Option<String> {
        self.proposed_fix().map(|c| c.selector.to_string())
    }

    /// Move to `to`, recording `actor`
    ///
    /// # Errors
    /// Returns [`HealError::IllegalTransition`] for transitions the state machine forbids
    pub(crate) fn transition(&mut self, to: AttemptStatus, actor: &str) -> Result<(), HealError> {
        validate_transition(self.status, to)?;
        self.history.push(StatusChange {
            from: Some(self.status),
            to,
            actor: actor.to_string(),
            at: Utc::now(),
        });
        self.status = to;
        Ok(())
    }

    /// Approve or reject, recording the verdict
    pub(crate) fn decide(&mut self, to: AttemptStatus, reviewer: &str, reason: Option<String>) -> Result<(), HealError> {
        self.transition(to, reviewer)?;
        self.decision = Some(Decision {
            reviewer: reviewer.to_string(),
            reason,
            decided_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mender_test_utils::{login_original, snapshot};
    use pretty_assertions::assert_eq;

    fn attempt() -> HealingAttempt {
        let page = Arc::new(snapshot(login_original()));
        HealingAttempt::new("https://app.example.com/login", "#submit-btn", page.clone(), page)
    }

    #[test]
    fn new_attempt_is_pending_with_no_confidence() {
        let attempt = attempt();
        assert_eq!(attempt.status(), AttemptStatus::Pending);
        assert_eq!(attempt.confidence(), Confidence::ZERO);
        assert!(!attempt.is_healed(0.0));
        assert_eq!(attempt.history().len(), 1);
    }

    #[test]
    fn decisions_are_recorded() {
        let mut attempt = attempt();
        attempt.transition(AttemptStatus::Proposed, "coordinator").unwrap();
        attempt
            .decide(AttemptStatus::Rejected, "alice", Some("wrong button".into()))
            .unwrap();

        assert_eq!(attempt.status(), AttemptStatus::Rejected);
        assert_eq!(attempt.decision().unwrap().reviewer, "alice");
        let actors: Vec<_> = attempt.history().iter().map(|c| c.actor.as_str()).collect();
        assert_eq!(actors, vec!["coordinator", "coordinator", "alice"]);
    }

    #[test]
    fn illegal_transition_leaves_state_alone() {
        let mut attempt = attempt();
        let err = attempt.transition(AttemptStatus::Applied, "bob").unwrap_err();
        assert!(matches!(err, HealError::IllegalTransition { .. }));
        assert_eq!(attempt.status(), AttemptStatus::Pending);
        assert_eq!(attempt.history().len(), 1);
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&AttemptStatus::RejectedInvalidInput).unwrap(),
            "\"rejected-invalid-input\""
        );
        assert_eq!(AttemptStatus::RejectedInvalidInput.to_string(), "rejected-invalid-input");
        let run = StrategyRun {
            strategy: "ai-powered-analysis".into(),
            outcome: StrategyOutcome::TimedOut { timeout_ms: 100 },
            elapsed_ms: 101,
        };
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["outcome"], "timed-out");
        assert_eq!(json["timeout_ms"], 100);
    }
}
