//! Strategy registry
//!
//! Provides [`StrategyRegistry`], the ordered set of strategies a coordinator
//! runs. Registration order is priority order: cheapest first.

use crate::ai::{AiPoweredAnalysis, SimilarityScorer};
use crate::hierarchy::CssHierarchyAnalysis;
use crate::strategy::{HealingStrategy, StrategyKind};
use crate::testid::DataTestIdRecovery;
use crate::text::TextContentMatching;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Catalog entry for one strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: StrategyKind,
}

/// Ordered registry of healing strategies
#[derive(Debug, Default, Clone)]
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn HealingStrategy>>,
}

impl StrategyRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Create registry with the four built-in strategies
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DataTestIdRecovery::new()));
        registry.register(Arc::new(TextContentMatching::new()));
        registry.register(Arc::new(CssHierarchyAnalysis::new()));
        registry.register(Arc::new(AiPoweredAnalysis::default()));
        registry
    }

    /// Built-in strategies with ai-powered-analysis backed by `scorer`
    #[must_use]
    pub fn with_scorer(scorer: Arc<dyn SimilarityScorer>, top_k: usize, min_score: f64) -> Self {
        let mut registry = Self::with_defaults();
        registry.register(Arc::new(
            AiPoweredAnalysis::new(scorer)
                .with_top_k(top_k)
                .with_min_score(min_score),
        ));
        registry
    }

    /// Register a strategy
    ///
    /// A strategy with the same name is replaced in place, keeping its
    /// priority; otherwise the new one goes last.
    pub fn register(&mut self, strategy: Arc<dyn HealingStrategy>) {
        match self.strategies.iter_mut().find(|s| s.name() == strategy.name()) {
            Some(slot) => *slot = strategy,
            None => self.strategies.push(strategy),
        }
    }

    /// Look up by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn HealingStrategy>> {
        self.strategies.iter().find(|s| s.name() == name)
    }

    /// Check if strategy exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Position in priority order, 0 being the first to run
    #[must_use]
    pub fn priority(&self, name: &str) -> Option<usize> {
        self.strategies.iter().position(|s| s.name() == name)
    }

    /// Registered names in priority order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Get number of registered strategies
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Registry keeping only `enabled`, still in priority order
    #[must_use]
    pub fn filtered(&self, enabled: &[String]) -> Self {
        Self {
            strategies: self
                .strategies
                .iter()
                .filter(|s| enabled.iter().any(|name| name == s.name()))
                .cloned()
                .collect(),
        }
    }

    /// Name, description and type of every strategy
    #[must_use]
    pub fn catalog(&self) -> Vec<StrategyInfo> {
        self.strategies
            .iter()
            .map(|s| StrategyInfo {
                name: s.name().to_string(),
                description: s.description().to_string(),
                kind: s.kind(),
            })
            .collect()
    }

    /// Iterate in priority order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn HealingStrategy>> {
        self.strategies.iter()
    }
}
