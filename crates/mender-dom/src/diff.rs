//! Structural snapshot diff
//!
//! Nodes are paired across snapshots by a similarity key (tag, non-volatile
//! attribute names, own text), never by [`NodeId`]. Roots are always paired;
//! below a paired parent the children are aligned with a longest common
//! subsequence over their keys, so an inserted sibling shows up as one
//! `added` node instead of shifting every later sibling into `modified`.

use crate::node::{DomNode, NodeId};
use crate::snapshot::DomSnapshot;
use crate::volatile::is_volatile_attribute;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Change classification of a diffed node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    Unchanged,
}

impl ChangeKind {
    /// Label with `added` and `removed` exchanged
    #[inline]
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Added => Self::Removed,
            Self::Removed => Self::Added,
            other => other,
        }
    }
}

impl Display for ChangeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
            Self::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

/// One attribute that differs between a paired node's two versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub name: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// A node of the annotated diff tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffNode {
    /// Classification
    pub change: ChangeKind,

    /// Tag (from the newer side when both exist)
    pub tag: String,

    /// Id in the older snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<NodeId>,

    /// Id in the newer snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<NodeId>,

    /// Attributes (from the newer side when both exist)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    /// Own text (from the newer side when both exist)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Per-attribute differences of a `modified` node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_changes: Vec<AttributeChange>,

    /// Aligned children
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DiffNode>,
}

impl DiffNode {
    /// Short description such as `button#login-btn (modified: id)`
    #[must_use]
    pub fn describe(&self) -> String {
        let mut label = self.tag.clone();
        if let Some(id) = self.attributes.get("id") {
            label.push('#');
            label.push_str(id);
        }
        if self.attribute_changes.is_empty() {
            format!("{label} ({})", self.change)
        } else {
            let names: Vec<_> = self.attribute_changes.iter().map(|c| c.name.as_str()).collect();
            format!("{label} ({}: {})", self.change, names.join(", "))
        }
    }
}

/// Counts per change kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    /// Number of nodes that are not `unchanged`
    #[inline]
    #[must_use]
    pub fn changed(&self) -> usize {
        self.added + self.removed + self.modified
    }

    fn record(&mut self, change: ChangeKind) {
        match change {
            ChangeKind::Added => self.added += 1,
            ChangeKind::Removed => self.removed += 1,
            ChangeKind::Modified => self.modified += 1,
            ChangeKind::Unchanged => self.unchanged += 1,
        }
    }
}

impl Display for DiffSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} modified, {} unchanged",
            self.added, self.removed, self.modified, self.unchanged
        )
    }
}

/// Result of [`diff`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    root: DiffNode,
    summary: DiffSummary,
}

impl SnapshotDiff {
    /// Annotated tree
    #[inline]
    #[must_use]
    pub fn root(&self) -> &DiffNode {
        &self.root
    }

    /// Counts per change kind
    #[inline]
    #[must_use]
    pub fn summary(&self) -> DiffSummary {
        self.summary
    }

    /// Whether nothing changed
    #[inline]
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.summary.changed() == 0
    }

    /// All diff nodes, pre-order
    pub fn iter(&self) -> impl Iterator<Item = &DiffNode> {
        PreOrder { stack: vec![&self.root] }
    }

    /// Diff nodes that are not `unchanged`, pre-order
    pub fn changes(&self) -> impl Iterator<Item = &DiffNode> {
        self.iter().filter(|n| n.change != ChangeKind::Unchanged)
    }
}

struct PreOrder<'a> {
    stack: Vec<&'a DiffNode>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a DiffNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct SimilarityKey<'a> {
    tag: &'a str,
    attribute_names: Vec<&'a str>,
    text: Option<&'a str>,
}

impl<'a> SimilarityKey<'a> {
    fn of(node: &'a DomNode) -> Self {
        // BTreeMap keys are already sorted.
        let attribute_names = node
            .attributes()
            .keys()
            .map(String::as_str)
            .filter(|name| !is_volatile_attribute(name))
            .collect();
        Self {
            tag: node.tag(),
            attribute_names,
            text: node.text(),
        }
    }
}

/// Compare two snapshots
///
/// `a` is the older side: nodes only in `a` are `removed`, nodes only in `b`
/// are `added`.
#[must_use]
pub fn diff(a: &DomSnapshot, b: &DomSnapshot) -> SnapshotDiff {
    let mut summary = DiffSummary::default();
    let root = Differ { a, b }.paired(a.root(), b.root(), &mut summary);
    SnapshotDiff { root, summary }
}

struct Differ<'s> {
    a: &'s DomSnapshot,
    b: &'s DomSnapshot,
}

enum Step {
    Pair(usize, usize),
    OnlyA(usize),
    OnlyB(usize),
}

impl Step {
    fn swapped(self) -> Self {
        match self {
            Self::Pair(i, j) => Self::Pair(j, i),
            Self::OnlyA(i) => Self::OnlyB(i),
            Self::OnlyB(j) => Self::OnlyA(j),
        }
    }
}

impl Differ<'_> {
    fn paired(&self, before: &DomNode, after: &DomNode, summary: &mut DiffSummary) -> DiffNode {
        let attribute_changes = attribute_changes(before, after);
        let change = if attribute_changes.is_empty()
            && before.tag() == after.tag()
            && before.text() == after.text()
        {
            ChangeKind::Unchanged
        } else {
            ChangeKind::Modified
        };
        summary.record(change);

        let left: Vec<&DomNode> = self.a.children_of(before.id()).collect();
        let right: Vec<&DomNode> = self.b.children_of(after.id()).collect();

        let children = align(&left, &right)
            .into_iter()
            .map(|step| match step {
                Step::Pair(i, j) => self.paired(left[i], right[j], summary),
                Step::OnlyA(i) => unpaired(self.a, left[i], ChangeKind::Removed, summary),
                Step::OnlyB(j) => unpaired(self.b, right[j], ChangeKind::Added, summary),
            })
            .collect();

        DiffNode {
            change,
            tag: after.tag().to_string(),
            before: Some(before.id()),
            after: Some(after.id()),
            attributes: after.attributes().clone(),
            text: after.text().map(str::to_string),
            attribute_changes,
            children,
        }
    }
}

fn unpaired(
    snapshot: &DomSnapshot,
    node: &DomNode,
    change: ChangeKind,
    summary: &mut DiffSummary,
) -> DiffNode {
    summary.record(change);
    let (before, after) = match change {
        ChangeKind::Removed => (Some(node.id()), None),
        _ => (None, Some(node.id())),
    };
    DiffNode {
        change,
        tag: node.tag().to_string(),
        before,
        after,
        attributes: node.attributes().clone(),
        text: node.text().map(str::to_string),
        attribute_changes: Vec::new(),
        children: snapshot
            .children_of(node.id())
            .map(|c| unpaired(snapshot, c, change, summary))
            .collect(),
    }
}

fn attribute_changes(before: &DomNode, after: &DomNode) -> Vec<AttributeChange> {
    let mut changes = Vec::new();
    for (name, old) in before.attributes() {
        match after.attr(name) {
            Some(new) if new == old => {}
            new => changes.push(AttributeChange {
                name: name.clone(),
                before: Some(old.clone()),
                after: new.map(str::to_string),
            }),
        }
    }
    for (name, new) in after.attributes() {
        if !before.has_attr(name) {
            changes.push(AttributeChange {
                name: name.clone(),
                before: None,
                after: Some(new.clone()),
            });
        }
    }
    changes.sort_by(|x, y| x.name.cmp(&y.name));
    changes
}

// LCS alignment of two sibling lists. The table is always built with the
// smaller key list on the left, so swapping the arguments yields the same
// pairs in the same order with the sides exchanged.
fn align(left: &[&DomNode], right: &[&DomNode]) -> Vec<Step> {
    let lk: Vec<_> = left.iter().map(|n| SimilarityKey::of(n)).collect();
    let rk: Vec<_> = right.iter().map(|n| SimilarityKey::of(n)).collect();
    if rk < lk {
        return lcs(&rk, &lk).into_iter().map(Step::swapped).collect();
    }
    lcs(&lk, &rk)
}

fn lcs(lk: &[SimilarityKey<'_>], rk: &[SimilarityKey<'_>]) -> Vec<Step> {
    let (n, m) = (lk.len(), rk.len());

    // table[i][j] = LCS length of lk[i..] and rk[j..]
    let mut table = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if lk[i] == rk[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut steps = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if lk[i] == rk[j] {
            steps.push(Step::Pair(i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            steps.push(Step::OnlyA(i));
            i += 1;
        } else {
            steps.push(Step::OnlyB(j));
            j += 1;
        }
    }
    steps.extend((i..n).map(Step::OnlyA));
    steps.extend((j..m).map(Step::OnlyB));
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawNode;
    use pretty_assertions::assert_eq;

    fn snap(root: RawNode) -> DomSnapshot {
        DomSnapshot::capture(root).unwrap()
    }

    fn form(buttons: Vec<RawNode>) -> RawNode {
        RawNode::element("form").children(buttons)
    }

    #[test]
    fn identical_snapshots_are_unchanged() {
        let page = form(vec![
            RawNode::element("input").attr("name", "email"),
            RawNode::element("button").attr("id", "submit-btn").text("Login"),
        ]);
        let result = diff(&snap(page.clone()), &snap(page));

        assert!(result.is_unchanged());
        assert_eq!(result.summary().unchanged, 3);
        assert!(result.iter().all(|n| n.change == ChangeKind::Unchanged));
    }

    #[test]
    fn changed_id_is_modified_not_replaced() {
        let before = snap(form(vec![RawNode::element("button").attr("id", "submit-btn").text("Login")]));
        let after = snap(form(vec![RawNode::element("button").attr("id", "login-btn").text("Login")]));

        let result = diff(&before, &after);
        let button = &result.root().children[0];

        assert_eq!(button.change, ChangeKind::Modified);
        assert_eq!(
            button.attribute_changes,
            vec![AttributeChange {
                name: "id".into(),
                before: Some("submit-btn".into()),
                after: Some("login-btn".into()),
            }]
        );
        assert_eq!(
            result.summary(),
            DiffSummary {
                added: 0,
                removed: 0,
                modified: 1,
                unchanged: 1,
            }
        );
        assert_eq!(button.describe(), "button#login-btn (modified: id)");
    }

    #[test]
    fn inserted_sibling_does_not_cascade() {
        let a = RawNode::element("li").text("A");
        let b = RawNode::element("li").text("B");
        let c = RawNode::element("li").text("C");
        let inserted = RawNode::element("li").text("X");

        let before = snap(RawNode::element("ul").children([a.clone(), b.clone(), c.clone()]));
        let after = snap(RawNode::element("ul").children([a, inserted, b, c]));

        let result = diff(&before, &after);
        let kinds: Vec<_> = result.root().children.iter().map(|n| n.change).collect();

        assert_eq!(
            kinds,
            vec![
                ChangeKind::Unchanged,
                ChangeKind::Added,
                ChangeKind::Unchanged,
                ChangeKind::Unchanged,
            ]
        );
        assert_eq!(result.summary().added, 1);
        assert_eq!(result.root().children[1].after, Some(NodeId(2)));
        assert_eq!(result.root().children[1].before, None);
    }

    #[test]
    fn removed_subtree_is_removed_throughout() {
        let before = snap(form(vec![RawNode::element("div")
            .attr("class", "group")
            .child(RawNode::element("span").text("hint"))]));
        let after = snap(form(vec![]));

        let result = diff(&before, &after);
        assert_eq!(result.summary().removed, 2);
        let removed: Vec<_> = result.changes().map(|n| (n.tag.as_str(), n.change)).collect();
        assert_eq!(
            removed,
            vec![("div", ChangeKind::Removed), ("span", ChangeKind::Removed)]
        );
    }

    #[test]
    fn volatile_attribute_names_do_not_break_pairing() {
        let before = snap(form(vec![RawNode::element("button").text("Save")]));
        let after = snap(form(vec![RawNode::element("button")
            .attr("style", "color: red")
            .text("Save")]));

        let result = diff(&before, &after);
        assert_eq!(result.root().children.len(), 1);
        assert_eq!(result.root().children[0].change, ChangeKind::Modified);
    }

    #[test]
    fn renamed_attribute_set_is_replacement() {
        let before = snap(form(vec![RawNode::element("button").attr("id", "submit-btn").text("Login")]));
        let after = snap(form(vec![RawNode::element("button")
            .attr("data-testid", "submit-btn")
            .text("Login")]));

        let summary = diff(&before, &after).summary();
        assert_eq!((summary.removed, summary.added), (1, 1));
    }

    #[test]
    fn swapping_sides_inverts_labels() {
        let before = snap(RawNode::element("ul").children([
            RawNode::element("li").attr("id", "one").text("A"),
            RawNode::element("li").text("B"),
        ]));
        let after = snap(RawNode::element("ul").children([
            RawNode::element("li").attr("id", "uno").text("A"),
            RawNode::element("li").text("B"),
            RawNode::element("li").text("C"),
        ]));

        let forward: Vec<_> = diff(&before, &after).iter().map(|n| n.change).collect();
        let backward: Vec<_> = diff(&after, &before)
            .iter()
            .map(|n| n.change.inverse())
            .collect();
        assert_eq!(forward, backward);
    }

    #[test]
    fn reordered_siblings_pair_the_same_node_both_ways() {
        let x = RawNode::element("li").text("X");
        let y = RawNode::element("li").text("Y");
        let before = snap(RawNode::element("ul").children([x.clone(), y.clone()]));
        let after = snap(RawNode::element("ul").children([y, x]));

        let kept = |result: &SnapshotDiff| -> Vec<Option<String>> {
            result
                .root()
                .children
                .iter()
                .filter(|n| n.change == ChangeKind::Unchanged)
                .map(|n| n.text.clone())
                .collect()
        };
        let forward = diff(&before, &after);
        let backward = diff(&after, &before);

        assert_eq!(kept(&forward), kept(&backward));
        assert_eq!(forward.summary(), backward.summary());
        assert_eq!((forward.summary().added, forward.summary().removed), (1, 1));

        let forward_kinds: Vec<_> = forward.iter().map(|n| n.change).collect();
        let backward_kinds: Vec<_> = backward.iter().map(|n| n.change.inverse()).collect();
        assert_eq!(forward_kinds, backward_kinds);

        let forward_ids: Vec<_> = forward.iter().map(|n| (n.before, n.after)).collect();
        let backward_ids: Vec<_> = backward.iter().map(|n| (n.after, n.before)).collect();
        assert_eq!(forward_ids, backward_ids);
    }

    #[test]
    fn change_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ChangeKind::Modified).unwrap(), r#""modified""#);
    }
}
