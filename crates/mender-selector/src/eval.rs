//! Selector evaluation
//!
//! Matching runs right to left: a node is tested against the subject
//! compound first, then the combinator chain is checked by walking its
//! ancestors. No re-traversal of the tree happens per candidate node.

use crate::ast::{Combinator, CompoundSelector, Selector, SelectorPart};
use crate::error::SelectorSyntaxError;
use mender_dom::{DomNode, DomSnapshot, NodeId};

/// Parse `expr` and return matching node ids in document order
///
/// An empty result means nothing matched; malformed input is always an error.
///
/// # Errors
/// Returns error if `expr` is not a valid selector
pub fn evaluate(expr: &str, snapshot: &DomSnapshot) -> Result<Vec<NodeId>, SelectorSyntaxError> {
    Ok(Selector::parse(expr)?.select(snapshot))
}

impl Selector {
    /// Matching node ids in document order
    #[must_use]
    pub fn select(&self, snapshot: &DomSnapshot) -> Vec<NodeId> {
        snapshot
            .iter()
            .filter(|node| self.matches_node(snapshot, node))
            .map(DomNode::id)
            .collect()
    }

    /// Number of matching nodes
    #[must_use]
    pub fn count(&self, snapshot: &DomSnapshot) -> usize {
        snapshot.iter().filter(|node| self.matches_node(snapshot, node)).count()
    }

    /// Whether exactly `id` and nothing else matches
    #[must_use]
    pub fn matches_only(&self, snapshot: &DomSnapshot, id: NodeId) -> bool {
        let mut matched = snapshot.iter().filter(|node| self.matches_node(snapshot, node));
        matched.next().is_some_and(|n| n.id() == id) && matched.next().is_none()
    }

    /// Whether the node `id` matches
    #[must_use]
    pub fn matches(&self, snapshot: &DomSnapshot, id: NodeId) -> bool {
        snapshot
            .node(id)
            .is_some_and(|node| self.matches_node(snapshot, node))
    }

    fn matches_node(&self, snapshot: &DomSnapshot, node: &DomNode) -> bool {
        matches_from(self.parts(), self.parts().len() - 1, snapshot, node)
    }
}

// Backtracks over descendant combinators: `a b c` must try every `b`
// ancestor, not just the nearest.
fn matches_from(parts: &[SelectorPart], index: usize, snapshot: &DomSnapshot, node: &DomNode) -> bool {
    let part = &parts[index];
    if !compound_matches(&part.compound, node) {
        return false;
    }
    if index == 0 {
        return true;
    }
    match part.combinator {
        Some(Combinator::Child) => snapshot
            .parent_of(node.id())
            .is_some_and(|parent| matches_from(parts, index - 1, snapshot, parent)),
        Some(Combinator::Descendant) | None => snapshot
            .ancestors(node.id())
            .any(|ancestor| matches_from(parts, index - 1, snapshot, ancestor)),
    }
}

fn compound_matches(compound: &CompoundSelector, node: &DomNode) -> bool {
    if let Some(tag) = &compound.tag {
        if !node.tag().eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if node.attr("id") != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.iter().all(|c| node.has_class(c)) {
        return false;
    }
    let attributes_hold = compound.attributes.iter().all(|a| match &a.value {
        None => node.has_attr(&a.name),
        Some(value) => node.attr(&a.name) == Some(value.as_str()),
    });
    if !attributes_hold {
        return false;
    }
    compound
        .nth_child
        .map_or(true, |n| node.sibling_index() + 1 == n)
}
