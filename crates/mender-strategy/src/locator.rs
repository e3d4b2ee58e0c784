//! Unique locator construction
//!
//! Given a node in a snapshot, build the shortest conventional selector that
//! matches it and nothing else.

use mender_dom::volatile::{is_volatile_class, stable_classes};
use mender_dom::{DomSnapshot, NodeId};
use mender_selector::{is_identifier, Combinator, CompoundSelector, Selector};

/// Attributes that carry test ids, in preference order
pub const TEST_ID_ATTRIBUTES: &[&str] = &["data-testid", "data-test-id", "data-cy", "data-test"];

/// First test-id attribute present on a node
#[must_use]
pub fn test_id_of(snapshot: &DomSnapshot, id: NodeId) -> Option<(&'static str, &str)> {
    let node = snapshot.node(id)?;
    TEST_ID_ATTRIBUTES
        .iter()
        .find_map(|name| node.attr(name).map(|value| (*name, value)))
}

/// Candidate locators for a node, most conventional first
///
/// Not all of them are unique; see [`unique_locator`].
#[must_use]
pub fn locator_candidates(snapshot: &DomSnapshot, id: NodeId) -> Vec<Selector> {
    let Some(node) = snapshot.node(id) else {
        return Vec::new();
    };
    let tag = node.tag();
    let mut out = Vec::new();

    if let Some(value) = node.attr("id").filter(|v| !v.is_empty() && !is_volatile_class(v)) {
        out.push(Selector::new(CompoundSelector::default().with_id(value)));
    }
    if let Some((name, value)) = test_id_of(snapshot, id) {
        out.push(Selector::new(CompoundSelector::tag(tag).with_attr(name, value)));
    }
    for name in ["name", "aria-label", "role"] {
        if let Some(value) = node.attr(name).filter(|v| !v.is_empty()) {
            out.push(Selector::new(CompoundSelector::tag(tag).with_attr(name, value)));
        }
    }

    let classes: Vec<&str> = node
        .attr("class")
        .map(|c| stable_classes(c).filter(|c| is_identifier(c)).collect())
        .unwrap_or_default();
    for class_name in &classes {
        out.push(Selector::new(CompoundSelector::tag(tag).with_class(*class_name)));
    }
    if classes.len() > 1 {
        let all = classes
            .iter()
            .fold(CompoundSelector::tag(tag), |c, class_name| c.with_class(*class_name));
        out.push(Selector::new(all));
    }

    out.push(Selector::new(CompoundSelector::tag(tag)));
    out
}

/// Shortest conventional selector matching only `id`
///
/// Falls back to a child path from the root, with `:nth-child` on steps whose
/// tag is shared by a sibling. Returns `None` if `id` is not in the snapshot.
#[must_use]
pub fn unique_locator(snapshot: &DomSnapshot, id: NodeId) -> Option<Selector> {
    snapshot.node(id)?;
    locator_candidates(snapshot, id)
        .into_iter()
        .find(|selector| selector.matches_only(snapshot, id))
        .or_else(|| child_path(snapshot, id))
}

/// Root-anchored `>` path to `id`
#[must_use]
pub fn child_path(snapshot: &DomSnapshot, id: NodeId) -> Option<Selector> {
    let node = snapshot.node(id)?;
    let mut chain: Vec<_> = snapshot.ancestors(id).collect();
    chain.reverse();
    chain.push(node);

    let mut steps = chain.into_iter().map(|n| {
        let mut compound = CompoundSelector::tag(n.tag());
        let shared_tag = snapshot
            .parent_of(n.id())
            .map(|p| snapshot.children_of(p.id()).filter(|s| s.tag() == n.tag()).count() > 1)
            .unwrap_or(false);
        if shared_tag {
            compound = compound.with_nth_child(n.sibling_index() + 1);
        }
        compound
    });

    let first = Selector::new(steps.next()?);
    Some(steps.fold(first, |selector, step| selector.then(Combinator::Child, step)))
}
