//! data-testid-recovery
//!
//! Two paths feed this strategy:
//!
//! - Structural: the element the broken selector used to match is looked up
//!   in the current page among elements that carry a test id, agreeing on
//!   tag and text (or ancestor classes when the element has no text).
//! - Fuzzy: when the broken selector itself names a test id, every test id
//!   in the current page is compared against it by edit distance.

use crate::candidate::{Candidate, Evidence};
use crate::locator::{test_id_of, TEST_ID_ATTRIBUTES};
use crate::similarity::{jaccard, normalize_text, test_id_similarity};
use crate::strategy::{HealingContext, HealingStrategy, StrategyError, StrategyKind};
use async_trait::async_trait;
use mender_dom::volatile::{is_volatile_attribute, stable_classes};
use mender_dom::{DomNode, DomSnapshot};
use mender_selector::{CompoundSelector, Selector};
use std::collections::BTreeSet;

const TAG_WEIGHT: f64 = 0.45;
const TEXT_WEIGHT: f64 = 0.45;
const ATTRIBUTE_WEIGHT: f64 = 0.1;
const NON_UNIQUE_FACTOR: f64 = 0.9;
const FUZZY_THRESHOLD: f64 = 0.7;
const FUZZY_FACTOR: f64 = 0.95;

/// Recover selectors through test-id attributes
#[derive(Debug, Clone, Copy, Default)]
pub struct DataTestIdRecovery;

impl DataTestIdRecovery {
    pub const NAME: &'static str = "data-testid-recovery";

    /// Create new strategy
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn structural(ctx: &HealingContext<'_>, out: &mut Vec<Candidate>) {
        let current = ctx.current();
        for target in ctx.targets() {
            let target_text = target.text().map(normalize_text);
            let target_fingerprint = ancestor_classes(ctx.original(), target);

            for node in current.iter() {
                let Some((attribute, value)) = test_id_of(current, node.id()) else {
                    continue;
                };
                let tag_match = node.tag() == target.tag();
                // Without text, ancestor classes stand in, and only for same-tag nodes.
                let (text_score, text_match) = match &target_text {
                    Some(text) => {
                        let same = node.text().map(normalize_text).as_ref() == Some(text);
                        (f64::from(u8::from(same)), same)
                    }
                    None if tag_match => (
                        fingerprint_agreement(&target_fingerprint, &ancestor_classes(current, node)),
                        false,
                    ),
                    None => continue,
                };
                if !tag_match && !text_match {
                    continue;
                }

                let overlap = attribute_overlap(target, node, value);
                let confidence = TAG_WEIGHT * f64::from(u8::from(tag_match))
                    + TEXT_WEIGHT * text_score
                    + ATTRIBUTE_WEIGHT * overlap;

                let selector = Selector::new(CompoundSelector::default().with_attr(attribute, value));
                let matched = selector.select(current);
                let confidence = if matched.len() > 1 {
                    confidence * NON_UNIQUE_FACTOR
                } else {
                    confidence
                };

                out.push(Candidate::new(
                    Self::NAME,
                    selector,
                    matched,
                    confidence,
                    format!(
                        "<{}> with {attribute}=\"{value}\" agrees on {}",
                        node.tag(),
                        agreement(tag_match, text_match)
                    ),
                    Evidence::TestId {
                        attribute: attribute.to_string(),
                        value: value.to_string(),
                        tag_match,
                        text_match,
                        attribute_overlap: overlap,
                        value_similarity: None,
                    },
                ));
            }
        }
    }

    fn fuzzy(ctx: &HealingContext<'_>, out: &mut Vec<Candidate>) {
        let current = ctx.current();
        let wanted: Vec<&str> = ctx
            .broken()
            .parts()
            .iter()
            .flat_map(|p| {
                TEST_ID_ATTRIBUTES
                    .iter()
                    .filter_map(move |name| p.compound.attribute_value(name))
            })
            .collect();

        for old_value in wanted {
            for node in current.iter() {
                let Some((attribute, value)) = test_id_of(current, node.id()) else {
                    continue;
                };
                let similarity = test_id_similarity(old_value, value);
                if similarity <= FUZZY_THRESHOLD {
                    continue;
                }
                let selector = Selector::new(CompoundSelector::default().with_attr(attribute, value));
                let matched = selector.select(current);
                let mut confidence = similarity * FUZZY_FACTOR;
                if matched.len() > 1 {
                    confidence *= NON_UNIQUE_FACTOR;
                }
                out.push(Candidate::new(
                    Self::NAME,
                    selector,
                    matched,
                    confidence,
                    format!("test id \"{old_value}\" resembles \"{value}\" ({:.0}%)", similarity * 100.0),
                    Evidence::TestId {
                        attribute: attribute.to_string(),
                        value: value.to_string(),
                        tag_match: false,
                        text_match: false,
                        attribute_overlap: 0.0,
                        value_similarity: Some(similarity),
                    },
                ));
            }
        }
    }
}

#[async_trait]
impl HealingStrategy for DataTestIdRecovery {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Finds the element again through data-testid style attributes"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::RuleBased
    }

    async fn propose(&self, ctx: &HealingContext<'_>) -> Result<Vec<Candidate>, StrategyError> {
        let mut out = Vec::new();
        Self::structural(ctx, &mut out);
        Self::fuzzy(ctx, &mut out);
        Ok(keep_best_per_selector(out))
    }
}

fn agreement(tag: bool, text: bool) -> &'static str {
    match (tag, text) {
        (true, true) => "tag and text",
        (true, false) => "tag",
        _ => "text",
    }
}

// Stable classes of every ancestor, as one set.
fn ancestor_classes<'a>(snapshot: &'a DomSnapshot, node: &DomNode) -> BTreeSet<&'a str> {
    snapshot
        .ancestors(node.id())
        .flat_map(|a| stable_classes(a.attr("class").unwrap_or_default()))
        .collect()
}

// Two class-less ancestries say nothing either way.
fn fingerprint_agreement(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        0.5
    } else {
        jaccard(a, b)
    }
}

// Best of attribute-name overlap and how close an identifying value of the
// old element is to the new test id.
fn attribute_overlap(old: &DomNode, new: &DomNode, new_test_id: &str) -> f64 {
    let names = |n: &DomNode| -> BTreeSet<String> {
        n.attributes()
            .keys()
            .filter(|k| !is_volatile_attribute(k))
            .cloned()
            .collect()
    };
    let name_overlap = jaccard(&names(old), &names(new));

    let value_overlap = ["id", "name"]
        .iter()
        .chain(TEST_ID_ATTRIBUTES)
        .filter_map(|attr| old.attr(attr))
        .map(|value| test_id_similarity(value, new_test_id))
        .fold(0.0, f64::max);

    name_overlap.max(value_overlap)
}

pub(crate) fn keep_best_per_selector(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut best: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match best.iter_mut().find(|c| c.selector == candidate.selector) {
            Some(existing) if existing.confidence < candidate.confidence => *existing = candidate,
            Some(_) => {}
            None => best.push(candidate),
        }
    }
    best.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use mender_dom::RawNode;
    use mender_test_utils::{login_original, login_with_renamed_id, scenario_testid, snapshot};

    async fn run(original: &DomSnapshot, broken: &str, current: &DomSnapshot) -> Vec<Candidate> {
        let broken: Selector = broken.parse().unwrap();
        let ctx = HealingContext::new(original, &broken, current);
        DataTestIdRecovery::new().propose(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn recovers_id_turned_test_id() {
        let (original, current) = scenario_testid();
        let candidates = run(&original, "#submit-btn", &current).await;

        let top = &candidates[0];
        assert_eq!(top.selector.to_string(), r#"[data-testid="submit-btn"]"#);
        assert!(top.confidence.value() >= 0.9);
        assert!(top.is_unique());
        assert!(matches!(
            top.evidence,
            Evidence::TestId {
                tag_match: true,
                text_match: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn nothing_without_test_ids() {
        let original = snapshot(login_original());
        let current = snapshot(login_with_renamed_id());
        assert!(run(&original, "#submit-btn", &current).await.is_empty());
    }

    #[tokio::test]
    async fn fuzzy_match_on_renamed_test_id() {
        let page = |test_id: &str| {
            snapshot(
                RawNode::element("form")
                    .child(RawNode::element("input").attr("data-testid", test_id))
                    .child(RawNode::element("div").attr("data-testid", "footer")),
            )
        };
        let original = page("emailInput");
        let current = page("email-input");

        let candidates = run(&original, r#"[data-testid="emailInput"]"#, &current).await;
        assert_eq!(candidates[0].selector.to_string(), r#"[data-testid="email-input"]"#);
        assert!(candidates.iter().all(|c| !c.selector.to_string().contains("footer")));
    }

    #[tokio::test]
    async fn fuzzy_path_works_without_original_match() {
        let original = snapshot(RawNode::element("div"));
        let current = snapshot(
            RawNode::element("div").child(RawNode::element("button").attr("data-cy", "save-button")),
        );
        let candidates = run(&original, r#"[data-cy="save-btn"]"#, &current).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].selector.to_string(), r#"[data-cy="save-button"]"#);
    }

    #[test]
    fn keep_best_dedupes() {
        let c = |conf: f64| {
            Candidate::new(
                DataTestIdRecovery::NAME,
                "[data-testid=\"x\"]".parse().unwrap(),
                vec![],
                conf,
                "",
                Evidence::TestId {
                    attribute: "data-testid".into(),
                    value: "x".into(),
                    tag_match: true,
                    text_match: false,
                    attribute_overlap: 0.0,
                    value_similarity: None,
                },
            )
        };
        let kept = keep_best_per_selector(vec![c(0.5), c(0.8), c(0.6)]);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence.value() - 0.8).abs() < 1e-9);
    }
}
