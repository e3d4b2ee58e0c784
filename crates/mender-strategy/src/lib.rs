//! Mender Healing Strategies
//!
//! Pluggable algorithms that propose replacement selectors for a selector
//! that stopped matching.
//!
//! # Built-in strategies
//!
//! In priority order, cheapest first:
//!
//! 1. [`DataTestIdRecovery`]: the element again, through a test-id attribute
//! 2. [`TextContentMatching`]: interactive elements by visible or label text
//! 3. [`CssHierarchyAnalysis`]: minimal CSS path from the stable ancestor chain
//! 4. [`AiPoweredAnalysis`]: every node scored by a [`SimilarityScorer`]
//!
//! Strategies are pure functions of a [`HealingContext`]; ranking, merging
//! and early exit belong to the coordinator.
//!
//! # Example
//!
//! ```rust,ignore
//! use mender_strategy::{HealingContext, StrategyRegistry};
//!
//! let broken: Selector = "#submit-btn".parse()?;
//! let ctx = HealingContext::new(&original, &broken, &current);
//! for strategy in StrategyRegistry::with_defaults().iter() {
//!     let candidates = strategy.propose(&ctx).await?;
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod ai;
mod candidate;
mod hierarchy;
pub mod locator;
mod registry;
pub mod similarity;
mod strategy;
mod testid;
mod text;

pub use ai::{AiPoweredAnalysis, HeuristicScorer, NodeContext, NodeScore, SimilarityScorer};
pub use candidate::{Candidate, Confidence, Evidence, ScoreBreakdown};
pub use hierarchy::CssHierarchyAnalysis;
pub use locator::unique_locator;
pub use registry::{StrategyInfo, StrategyRegistry};
pub use strategy::{HealingContext, HealingStrategy, StrategyError, StrategyKind};
pub use testid::DataTestIdRecovery;
pub use text::{associated_text, is_interactive, TextContentMatching};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
