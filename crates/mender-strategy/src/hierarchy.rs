//! css-hierarchy-analysis
//!
//! The original element's ancestor chain (tags plus stable classes) is
//! matched against the current page, dropping levels from the root end until
//! something matches. Each dropped level costs confidence.

use crate::candidate::{Candidate, Evidence};
use crate::similarity::normalize_text;
use crate::strategy::{HealingContext, HealingStrategy, StrategyError, StrategyKind};
use async_trait::async_trait;
use mender_dom::volatile::stable_classes;
use mender_dom::{DomNode, DomSnapshot, NodeId};
use mender_selector::{is_identifier, Combinator, CompoundSelector, Selector};
use tracing::debug;

const BASE_CONFIDENCE: f64 = 0.8;
const RELAX_DECAY: f64 = 0.85;
const NTH_CHILD_FACTOR: f64 = 0.9;
const TEXT_MISMATCH_FACTOR: f64 = 0.8;
const MAX_MATCHES: usize = 5;

/// Rebuild a CSS path from the original element's ancestry
#[derive(Debug, Clone, Copy, Default)]
pub struct CssHierarchyAnalysis;

impl CssHierarchyAnalysis {
    pub const NAME: &'static str = "css-hierarchy-analysis";

    /// Create new strategy
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn level(node: &DomNode) -> CompoundSelector {
    let classes = node.attr("class").unwrap_or_default();
    stable_classes(classes)
        .filter(|c| is_identifier(c))
        .fold(CompoundSelector::tag(node.tag()), CompoundSelector::with_class)
}

fn descendant_chain(levels: &[CompoundSelector]) -> Option<Selector> {
    let (first, rest) = levels.split_first()?;
    Some(
        rest.iter()
            .cloned()
            .fold(Selector::new(first.clone()), |s, c| s.then(Combinator::Descendant, c)),
    )
}

// Drop leading levels while `id` stays the only match.
fn minimize(mut levels: Vec<CompoundSelector>, snapshot: &DomSnapshot, id: NodeId) -> Option<Selector> {
    while levels.len() > 1 {
        let shorter = descendant_chain(&levels[1..])?;
        if !shorter.matches_only(snapshot, id) {
            break;
        }
        levels.remove(0);
    }
    descendant_chain(&levels)
}

// Pin `:nth-child` on the lowest level that makes `id` the only match. Each
// level lines up with the nearest ancestor matching it, subject first.
fn pin_position(levels: &[CompoundSelector], snapshot: &DomSnapshot, id: NodeId) -> Option<Vec<CompoundSelector>> {
    let mut node = snapshot.node(id)?;
    for (i, level) in levels.iter().enumerate().rev() {
        if i + 1 < levels.len() {
            let step = Selector::new(level.clone());
            node = snapshot.ancestors(node.id()).find(|a| step.matches(snapshot, a.id()))?;
        }
        let mut pinned = levels.to_vec();
        pinned[i].nth_child = Some(node.sibling_index() + 1);
        if descendant_chain(&pinned).is_some_and(|s| s.matches_only(snapshot, id)) {
            return Some(pinned);
        }
    }
    None
}

#[async_trait]
impl HealingStrategy for CssHierarchyAnalysis {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Rebuilds a minimal CSS path from the element's stable ancestor chain"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::RuleBased
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    async fn propose(&self, ctx: &HealingContext<'_>) -> Result<Vec<Candidate>, StrategyError> {
        let current = ctx.current();
        let mut out = Vec::new();

        for target in ctx.targets() {
            let mut chain: Vec<&DomNode> = ctx.original().ancestors(target.id()).collect();
            chain.reverse();
            chain.push(target);
            let mut levels: Vec<CompoundSelector> = chain.iter().map(|n| level(n)).collect();
            let total = levels.len();

            // Longest suffix first; as a last resort the bare tag.
            let mut found = (0..total).find_map(|relaxed| {
                let selector = descendant_chain(&levels[relaxed..])?;
                let matched = selector.select(current);
                (!matched.is_empty()).then_some((relaxed, matched))
            });
            if found.is_none() {
                let tag_only = CompoundSelector::tag(target.tag());
                let matched = Selector::new(tag_only.clone()).select(current);
                if !matched.is_empty() {
                    levels = vec![tag_only];
                    found = Some((total, matched));
                }
            }
            let Some((relaxed, matched)) = found else {
                continue;
            };
            let suffix: Vec<CompoundSelector> = levels[relaxed.min(levels.len() - 1)..].to_vec();
            debug!(relaxed, matches = matched.len(), "hierarchy suffix matched");

            let target_text = target.text().map(normalize_text);
            let spread = 1.0 + 0.5 * (matched.len().saturating_sub(1)) as f64;
            let base = BASE_CONFIDENCE * RELAX_DECAY.powi(relaxed as i32);

            for id in matched.iter().take(MAX_MATCHES).copied() {
                let Some(node) = current.node(id) else {
                    continue;
                };
                let (selector, nth_child) = if matched.len() == 1 {
                    (minimize(suffix.clone(), current, id), false)
                } else {
                    let Some(pinned) = pin_position(&suffix, current, id) else {
                        continue;
                    };
                    (minimize(pinned, current, id), true)
                };
                let Some(selector) = selector else {
                    continue;
                };

                let mut confidence = base / spread;
                let mut notes = vec![format!("{} of {total} ancestor levels matched", total - relaxed.min(total))];
                if nth_child {
                    confidence *= NTH_CHILD_FACTOR;
                    notes.push("position needed to disambiguate".to_string());
                }
                let text_differs = target_text.is_some() && node.text().map(normalize_text) != target_text;
                if text_differs {
                    confidence *= TEXT_MISMATCH_FACTOR;
                    notes.push("text differs".to_string());
                }

                let matched_ids = selector.select(current);
                out.push(Candidate::new(
                    Self::NAME,
                    selector,
                    matched_ids,
                    confidence,
                    notes.join("; "),
                    Evidence::Hierarchy {
                        ancestor_chain: chain.iter().map(|n| level(n).to_string()).collect(),
                        matched_levels: suffix.len(),
                        relaxed_levels: relaxed,
                        nth_child,
                    },
                ));
            }
        }

        Ok(crate::testid::keep_best_per_selector(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mender_dom::RawNode;
    use mender_test_utils::{login_original, login_relabelled, login_with_renamed_id, product_grid, snapshot};

    async fn run(original: &DomSnapshot, broken: &str, current: &DomSnapshot) -> Vec<Candidate> {
        let broken: Selector = broken.parse().unwrap();
        let ctx = HealingContext::new(original, &broken, current);
        CssHierarchyAnalysis::new().propose(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn full_chain_is_minimized() {
        let original = snapshot(login_original());
        let current = snapshot(login_with_renamed_id());
        let candidates = run(&original, "#submit-btn", &current).await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].selector.to_string(), "button.btn.btn-primary");
        assert!((candidates[0].confidence.value() - 0.8).abs() < 1e-9);
        match &candidates[0].evidence {
            Evidence::Hierarchy {
                relaxed_levels,
                ancestor_chain,
                ..
            } => {
                assert_eq!(*relaxed_levels, 0);
                // css-1x2y3z is generated and left out
                assert_eq!(ancestor_chain[3], "form.login-form");
            }
            other => panic!("unexpected evidence {other:?}"),
        }
    }

    #[tokio::test]
    async fn text_change_is_penalized() {
        let original = snapshot(login_original());
        let current = snapshot(login_relabelled());
        let candidates = run(&original, "#submit-btn", &current).await;
        assert!((candidates[0].confidence.value() - 0.64).abs() < 1e-9);
    }

    #[tokio::test]
    async fn dropped_levels_decay() {
        let original = snapshot(
            RawNode::element("div")
                .attr("class", "sidebar")
                .child(RawNode::element("a").attr("class", "nav-link").attr("id", "old").text("Docs")),
        );
        let current = snapshot(
            RawNode::element("div")
                .attr("class", "drawer")
                .child(RawNode::element("a").attr("class", "nav-link").text("Docs")),
        );
        let candidates = run(&original, "#old", &current).await;

        assert_eq!(candidates[0].selector.to_string(), "a.nav-link");
        assert!((candidates[0].confidence.value() - 0.8 * 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn repeated_siblings_use_nth_child() {
        let products = ["Lamp", "Desk", "Chair"];
        let original = snapshot(product_grid(&products));
        let current = snapshot(product_grid(&products));
        let candidates = run(&original, "div.card:nth-child(2) button", &current).await;

        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|c| c.is_unique()));
        assert!(candidates
            .iter()
            .any(|c| c.selector.to_string() == "div.card.product:nth-child(2) button.btn.add-to-cart"));
        assert!(candidates
            .iter()
            .all(|c| matches!(c.evidence, Evidence::Hierarchy { nth_child: true, .. })));
    }

    #[tokio::test]
    async fn unmatched_broken_selector_yields_nothing() {
        let original = snapshot(login_original());
        let current = snapshot(login_with_renamed_id());
        assert!(run(&original, ".nonexistent-class", &current).await.is_empty());
    }
}
