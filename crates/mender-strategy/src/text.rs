//! text-content-matching

use crate::candidate::{Candidate, Evidence};
use crate::locator::unique_locator;
use crate::similarity::{text_similarity, INTERACTIVE_ROLES, INTERACTIVE_TAGS};
use crate::strategy::{HealingContext, HealingStrategy, StrategyError, StrategyKind};
use async_trait::async_trait;
use mender_dom::{DomNode, DomSnapshot};
use tracing::debug;

const DEFAULT_THRESHOLD: f64 = 0.8;
const INTERACTIVE_BOOST: f64 = 1.1;
const TEXT_CEILING: f64 = 0.95;

/// Whether a node is something a test would click or type into
#[must_use]
pub fn is_interactive(node: &DomNode) -> bool {
    INTERACTIVE_TAGS.contains(&node.tag())
        || node.attr("role").is_some_and(|r| INTERACTIVE_ROLES.contains(&r))
}

/// Text a user would read as this element's label
///
/// Own text first, then `aria-label`; form controls also look at their
/// `<label>`, `placeholder` and button-like `value`.
#[must_use]
pub fn associated_text(snapshot: &DomSnapshot, node: &DomNode) -> Option<String> {
    if let Some(text) = node.text() {
        return Some(text.to_string());
    }
    if let Some(label) = node.attr("aria-label").filter(|l| !l.trim().is_empty()) {
        return Some(label.to_string());
    }
    if !matches!(node.tag(), "input" | "select" | "textarea") {
        return None;
    }

    let by_for = node.attr("id").and_then(|id| {
        snapshot
            .iter()
            .find(|n| n.tag() == "label" && n.attr("for") == Some(id))
            .and_then(DomNode::text)
    });
    let wrapping = || {
        snapshot
            .ancestors(node.id())
            .find(|a| a.tag() == "label")
            .and_then(DomNode::text)
    };
    let button_value = || {
        matches!(node.attr("type"), Some("submit" | "button" | "reset"))
            .then(|| node.attr("value"))
            .flatten()
    };
    by_for
        .or_else(wrapping)
        .or_else(|| node.attr("placeholder"))
        .or_else(button_value)
        .map(str::to_string)
}

/// Match interactive elements by their visible or label text
#[derive(Debug, Clone, Copy)]
pub struct TextContentMatching {
    threshold: f64,
}

impl Default for TextContentMatching {
    fn default() -> Self {
        Self::new()
    }
}

impl TextContentMatching {
    pub const NAME: &'static str = "text-content-matching";

    /// Create new strategy with the 0.8 similarity threshold
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Set the minimum text similarity
    #[inline]
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

#[async_trait]
impl HealingStrategy for TextContentMatching {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Matches interactive elements by their visible or label text"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::RuleBased
    }

    #[allow(clippy::cast_precision_loss)]
    async fn propose(&self, ctx: &HealingContext<'_>) -> Result<Vec<Candidate>, StrategyError> {
        let current = ctx.current();
        let mut out = Vec::new();

        for target in ctx.targets().filter(|t| is_interactive(t)) {
            let Some(original_text) = associated_text(ctx.original(), target) else {
                continue;
            };

            let matches: Vec<(&DomNode, String, f64)> = current
                .iter()
                .filter_map(|node| {
                    let text = associated_text(current, node)?;
                    let similarity = text_similarity(&original_text, &text);
                    (similarity >= self.threshold).then_some((node, text, similarity))
                })
                .collect();
            debug!(text = %original_text, matches = matches.len(), "text candidates");

            let spread = 1.0 + 0.5 * (matches.len().saturating_sub(1)) as f64;
            for (node, text, similarity) in &matches {
                let boosted = if is_interactive(node) {
                    (similarity * INTERACTIVE_BOOST).min(1.0)
                } else {
                    *similarity
                };
                let Some(selector) = unique_locator(current, node.id()) else {
                    continue;
                };
                let matched = selector.select(current);
                out.push(Candidate::new(
                    Self::NAME,
                    selector,
                    matched,
                    boosted * TEXT_CEILING / spread,
                    format!(
                        "<{}> reads \"{text}\" ({:.0}% similar to \"{original_text}\"), {} element(s) share it",
                        node.tag(),
                        similarity * 100.0,
                        matches.len()
                    ),
                    Evidence::Text {
                        original_text: original_text.clone(),
                        matched_text: text.clone(),
                        similarity: *similarity,
                        same_text_matches: matches.len(),
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
    use mender_dom::{NodeId, RawNode};
    use mender_selector::Selector;
    use mender_test_utils::{
        login_original, login_relabelled, login_with_duplicate_text, login_with_renamed_id, snapshot,
    };

    async fn run(original: &DomSnapshot, broken: &str, current: &DomSnapshot) -> Vec<Candidate> {
        let broken: Selector = broken.parse().unwrap();
        let ctx = HealingContext::new(original, &broken, current);
        TextContentMatching::new().propose(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn unique_text_match() {
        let original = snapshot(login_original());
        let current = snapshot(login_with_renamed_id());
        let candidates = run(&original, "#submit-btn", &current).await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].selector.to_string(), "#login-btn");
        assert!((candidates[0].confidence.value() - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn shared_text_lowers_confidence() {
        let original = snapshot(login_original());
        let current = snapshot(login_with_duplicate_text());
        let candidates = run(&original, "#submit-btn", &current).await;

        assert_eq!(candidates.len(), 2);
        for candidate in &candidates {
            assert!(candidate.confidence.value() < 0.7);
            assert!(candidate.is_unique());
        }
    }

    #[tokio::test]
    async fn relabelled_button_is_not_matched() {
        let original = snapshot(login_original());
        let current = snapshot(login_relabelled());
        assert!(run(&original, "#submit-btn", &current).await.is_empty());
    }

    #[tokio::test]
    async fn non_interactive_targets_are_skipped() {
        let original = snapshot(login_original());
        let current = snapshot(login_with_renamed_id());
        assert!(run(&original, "label[for=email]", &current).await.is_empty());
    }

    #[test]
    fn label_association() {
        let page = snapshot(login_original());
        let email = page.node(NodeId(10)).unwrap();
        assert_eq!(associated_text(&page, email).as_deref(), Some("Email"));

        let wrapped = snapshot(
            RawNode::element("label")
                .text("Remember me")
                .child(RawNode::element("input").attr("type", "checkbox")),
        );
        let checkbox = wrapped.node(NodeId(1)).unwrap();
        assert_eq!(associated_text(&wrapped, checkbox).as_deref(), Some("Remember me"));
    }

    #[test]
    fn role_makes_interactive() {
        let page = snapshot(RawNode::element("div").attr("role", "button").text("Go"));
        assert!(is_interactive(page.root()));
    }
}
