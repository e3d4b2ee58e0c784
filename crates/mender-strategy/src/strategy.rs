//! Healing strategy trait and core types
//!
//! Provides the [`HealingStrategy`] trait. A strategy is a pure function of
//! its [`HealingContext`]: it reads two immutable snapshots and a parsed
//! selector and returns candidates, never touching shared state.

use crate::candidate::Candidate;
use async_trait::async_trait;
use mender_dom::{DomNode, DomSnapshot, NodeId};
use mender_selector::Selector;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Healing strategy
///
/// Implementations must be deterministic for identical inputs, except
/// where a pluggable scorer is not.
#[async_trait]
pub trait HealingStrategy: Send + Sync + std::fmt::Debug {
    /// Stable name used in config, overrides and audit records
    fn name(&self) -> &'static str;

    /// One-line description for the strategy catalog
    fn description(&self) -> &'static str;

    /// Rule-based or model-backed
    fn kind(&self) -> StrategyKind;

    /// Propose replacement selectors
    ///
    /// An empty list means "nothing plausible", which is not an error.
    async fn propose(&self, ctx: &HealingContext<'_>) -> Result<Vec<Candidate>, StrategyError>;
}

/// Strategy family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    RuleBased,
    AiPowered,
}

impl Display for StrategyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RuleBased => "rule-based",
            Self::AiPowered => "ai-powered",
        })
    }
}

/// Errors a strategy may report
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    /// Scorer rejected or failed on its input
    #[error("scoring failed: {0}")]
    Scoring(String),

    /// Remote scorer exceeded its budget
    #[error("strategy timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Bug or broken invariant
    #[error("internal strategy error: {0}")]
    Internal(String),
}

/// Inputs of one healing run
#[derive(Debug, Clone)]
pub struct HealingContext<'a> {
    original: &'a DomSnapshot,
    current: &'a DomSnapshot,
    broken: &'a Selector,
    targets: Vec<NodeId>,
}

impl<'a> HealingContext<'a> {
    /// Create new context, resolving the broken selector in `original`
    #[must_use]
    pub fn new(original: &'a DomSnapshot, broken: &'a Selector, current: &'a DomSnapshot) -> Self {
        Self {
            original,
            current,
            broken,
            targets: broken.select(original),
        }
    }

    /// Snapshot from when the selector still worked
    #[inline]
    #[must_use]
    pub fn original(&self) -> &'a DomSnapshot {
        self.original
    }

    /// Snapshot the selector no longer works against
    #[inline]
    #[must_use]
    pub fn current(&self) -> &'a DomSnapshot {
        self.current
    }

    /// The broken selector
    #[inline]
    #[must_use]
    pub fn broken(&self) -> &'a Selector {
        self.broken
    }

    /// Ids in `original` the broken selector used to match
    #[inline]
    #[must_use]
    pub fn target_ids(&self) -> &[NodeId] {
        &self.targets
    }

    /// Nodes in `original` the broken selector used to match
    pub fn targets(&self) -> impl Iterator<Item = &'a DomNode> + '_ {
        self.targets.iter().filter_map(|id| self.original.node(*id))
    }
}
