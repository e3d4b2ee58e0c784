//! ai-powered-analysis
//!
//! Every node of the current page is serialised into a [`NodeContext`] and
//! scored against the original element by a [`SimilarityScorer`]. The scorer
//! is the only part that may be remote; [`HeuristicScorer`] is local and
//! deterministic.

use crate::candidate::{Candidate, Evidence, ScoreBreakdown};
use crate::locator::unique_locator;
use crate::similarity::{jaccard, text_similarity};
use crate::strategy::{HealingContext, HealingStrategy, StrategyError, StrategyKind};
use async_trait::async_trait;
use mender_dom::volatile::{is_volatile_attribute, stable_classes};
use mender_dom::{DomNode, DomSnapshot, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

const CONFIDENCE_FACTOR: f64 = 0.9;

/// What a scorer sees of one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeContext {
    pub tag: String,
    /// Non-volatile attributes, `class` excluded
    pub attributes: BTreeMap<String, String>,
    pub classes: Vec<String>,
    pub text: Option<String>,
    pub depth: usize,
    pub sibling_index: usize,
    pub sibling_count: usize,
    pub parent_tag: Option<String>,
}

impl NodeContext {
    /// Serialise `node` of `snapshot`
    #[must_use]
    pub fn of(snapshot: &DomSnapshot, node: &DomNode) -> Self {
        let parent = snapshot.parent_of(node.id());
        Self {
            tag: node.tag().to_string(),
            attributes: node
                .attributes()
                .iter()
                .filter(|(name, _)| name.as_str() != "class" && !is_volatile_attribute(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            classes: stable_classes(node.attr("class").unwrap_or_default())
                .map(str::to_string)
                .collect(),
            text: node.text().map(str::to_string),
            depth: node.depth(),
            sibling_index: node.sibling_index(),
            sibling_count: parent.map_or(1, |p| p.children().len()),
            parent_tag: parent.map(|p| p.tag().to_string()),
        }
    }

    fn attribute_tokens(&self) -> BTreeSet<String> {
        self.attributes
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .chain(self.classes.iter().map(|c| format!(".{c}")))
            .collect()
    }
}

/// One scorer verdict
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeScore {
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
}

/// Pluggable similarity model
///
/// Must return exactly one score per candidate, in order.
#[async_trait]
pub trait SimilarityScorer: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    async fn score(&self, original: &NodeContext, candidates: &[NodeContext]) -> Result<Vec<NodeScore>, StrategyError>;
}

/// Weighted feature comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicScorer {
    pub tag_weight: f64,
    pub attribute_weight: f64,
    pub text_weight: f64,
    pub position_weight: f64,
    pub sibling_weight: f64,
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self {
            tag_weight: 0.25,
            attribute_weight: 0.25,
            text_weight: 0.3,
            position_weight: 0.1,
            sibling_weight: 0.1,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn closeness(a: usize, b: usize) -> f64 {
    1.0 / (1.0 + a.abs_diff(b) as f64)
}

impl HeuristicScorer {
    /// Feature scores of `candidate` against `original`
    #[must_use]
    pub fn breakdown(&self, original: &NodeContext, candidate: &NodeContext) -> ScoreBreakdown {
        let text = match (&original.text, &candidate.text) {
            (None, None) => 0.5,
            (Some(a), Some(b)) => text_similarity(a, b),
            _ => 0.0,
        };
        ScoreBreakdown {
            tag: f64::from(u8::from(original.tag == candidate.tag)),
            attributes: jaccard(&original.attribute_tokens(), &candidate.attribute_tokens()),
            text,
            position: 0.5 * closeness(original.depth, candidate.depth)
                + 0.5 * closeness(original.sibling_index, candidate.sibling_index),
            siblings: 0.5 * f64::from(u8::from(original.parent_tag == candidate.parent_tag))
                + 0.5 * closeness(original.sibling_count, candidate.sibling_count),
        }
    }

    /// Weighted sum of a breakdown
    #[must_use]
    pub fn weigh(&self, b: &ScoreBreakdown) -> f64 {
        self.tag_weight * b.tag
            + self.attribute_weight * b.attributes
            + self.text_weight * b.text
            + self.position_weight * b.position
            + self.sibling_weight * b.siblings
    }
}

#[async_trait]
impl SimilarityScorer for HeuristicScorer {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn score(&self, original: &NodeContext, candidates: &[NodeContext]) -> Result<Vec<NodeScore>, StrategyError> {
        Ok(candidates
            .iter()
            .map(|candidate| {
                let breakdown = self.breakdown(original, candidate);
                NodeScore {
                    score: self.weigh(&breakdown),
                    breakdown: Some(breakdown),
                }
            })
            .collect())
    }
}

/// Model-backed fallback strategy
#[derive(Debug, Clone)]
pub struct AiPoweredAnalysis {
    scorer: Arc<dyn SimilarityScorer>,
    top_k: usize,
    min_score: f64,
}

impl Default for AiPoweredAnalysis {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicScorer::default()))
    }
}

impl AiPoweredAnalysis {
    pub const NAME: &'static str = "ai-powered-analysis";

    /// Create new strategy over `scorer`, keeping the top 3 at score 0.5 or more
    #[must_use]
    pub fn new(scorer: Arc<dyn SimilarityScorer>) -> Self {
        Self {
            scorer,
            top_k: 3,
            min_score: 0.5,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Scorer in use
    #[must_use]
    pub fn scorer(&self) -> &Arc<dyn SimilarityScorer> {
        &self.scorer
    }
}

#[async_trait]
impl HealingStrategy for AiPoweredAnalysis {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Scores every element of the page against the original with a pluggable similarity model"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::AiPowered
    }

    async fn propose(&self, ctx: &HealingContext<'_>) -> Result<Vec<Candidate>, StrategyError> {
        let current = ctx.current();
        let nodes: Vec<&DomNode> = current.iter().collect();
        let contexts: Vec<NodeContext> = nodes.iter().map(|n| NodeContext::of(current, n)).collect();
        let mut out = Vec::new();

        for target in ctx.targets() {
            let original = NodeContext::of(ctx.original(), target);
            let scores = self.scorer.score(&original, &contexts).await?;
            if scores.len() != contexts.len() {
                return Err(StrategyError::Scoring(format!(
                    "{} returned {} scores for {} nodes",
                    self.scorer.name(),
                    scores.len(),
                    contexts.len()
                )));
            }

            let mut ranked: Vec<(NodeId, NodeScore)> = nodes
                .iter()
                .map(|n| n.id())
                .zip(scores)
                .filter(|(_, s)| s.score.is_finite() && s.score >= self.min_score)
                .collect();
            ranked.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
            ranked.truncate(self.top_k);
            debug!(scorer = self.scorer.name(), kept = ranked.len(), "scored page");

            for (rank, (id, scored)) in ranked.into_iter().enumerate() {
                let Some(selector) = unique_locator(current, id) else {
                    continue;
                };
                let matched = selector.select(current);
                out.push(Candidate::new(
                    Self::NAME,
                    selector,
                    matched,
                    scored.score * CONFIDENCE_FACTOR,
                    format!("{} similarity {:.2}, rank {}", self.scorer.name(), scored.score, rank + 1),
                    Evidence::Scored {
                        scorer: self.scorer.name().to_string(),
                        score: scored.score,
                        breakdown: scored.breakdown,
                        rank: rank + 1,
                    },
                ));
            }
        }

        Ok(crate::testid::keep_best_per_selector(out))
    }
}
