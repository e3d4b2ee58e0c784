//! Error types for the healing core
//!
//! Input-shape errors ([`HealError::Validation`], [`HealError::SelectorSyntax`],
//! [`HealError::UnknownStrategy`]) are rejected before any strategy runs.
//! [`HealError::SnapshotUnavailable`] aborts the whole call.
//! [`HealError::StrategyTimeout`] is only ever recorded in an attempt's audit
//! trail.

use crate::attempt::{AttemptId, AttemptStatus};
use crate::config::ConfigError;
use mender_dom::SnapshotError;
use mender_selector::SelectorSyntaxError;

/// Main healing error type
#[derive(Debug, thiserror::Error)]
pub enum HealError {
    /// Malformed locator
    #[error(transparent)]
    SelectorSyntax(#[from] SelectorSyntaxError),

    /// Snapshot collaborator failed
    #[error("snapshot unavailable for {page_url}: {reason}")]
    SnapshotUnavailable { page_url: String, reason: String },

    /// A strategy ran out of time
    #[error("strategy {strategy} timed out after {timeout_ms} ms")]
    StrategyTimeout { strategy: String, timeout_ms: u64 },

    /// Lost a concurrent review race
    #[error("attempt {attempt} is {actual}, expected {expected}")]
    StaleState {
        attempt: AttemptId,
        expected: AttemptStatus,
        actual: AttemptStatus,
    },

    /// Request shape rejected
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transition not in the review state machine
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: AttemptStatus, to: AttemptStatus },

    #[error("attempt {0} not found")]
    AttemptNotFound(AttemptId),

    #[error("unknown strategy `{0}`")]
    UnknownStrategy(String),

    /// Applied-fix sink failed
    #[error("failed to publish fix: {0}")]
    Publish(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HealError {
    /// Check if the caller may retry the same call
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SnapshotUnavailable { .. } | Self::StaleState { .. } | Self::Publish(_)
        )
    }

    /// Check if the request itself was at fault (400-class)
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::SelectorSyntax(_)
                | Self::Validation(_)
                | Self::UnknownStrategy(_)
                | Self::IllegalTransition { .. }
                | Self::AttemptNotFound(_)
        )
    }

    /// Snapshot failure for `page_url`
    #[inline]
    pub fn snapshot_unavailable(page_url: impl Into<String>, reason: impl ToString) -> Self {
        Self::SnapshotUnavailable {
            page_url: page_url.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<SnapshotError> for HealError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::CaptureFailed { page_url, reason } => Self::SnapshotUnavailable { page_url, reason },
            other => Self::SnapshotUnavailable {
                page_url: String::new(),
                reason: other.to_string(),
            },
        }
    }
}
