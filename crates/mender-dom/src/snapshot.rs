//! Immutable DOM snapshots
//!
//! Provides [`DomSnapshot`], an arena of [`DomNode`]s captured from a
//! [`RawNode`] tree. Node ids are assigned in document order, so iterating the
//! arena is a depth-first pre-order walk.

use crate::fingerprint::SnapshotFingerprint;
use crate::node::{DomNode, NodeId, RawNode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors while capturing a snapshot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// Element without a tag name
    #[error("element at depth {depth} has an empty tag name")]
    EmptyTag { depth: usize },

    /// Tree larger than the id space
    #[error("snapshot exceeds {max} nodes")]
    TooManyNodes { max: u64 },

    /// Driver could not provide the page
    #[error("snapshot capture failed for {page_url}: {reason}")]
    CaptureFailed { page_url: String, reason: String },
}

/// Serialized form of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    /// Page the snapshot was taken from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,

    /// Capture time
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,

    /// Nested element tree
    pub root: RawNode,
}

/// Captured DOM state at one point in time
///
/// Immutable once created. Two captures of an identical page are still
/// distinct snapshots; compare them with [`DomSnapshot::fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotDocument", into = "SnapshotDocument")]
pub struct DomSnapshot {
    nodes: Vec<DomNode>,
    page_url: Option<String>,
    captured_at: DateTime<Utc>,
}

impl DomSnapshot {
    /// Capture a tree now
    ///
    /// # Errors
    /// Returns error if an element has no tag or the tree exceeds `u32::MAX` nodes
    pub fn capture(root: RawNode) -> Result<Self, SnapshotError> {
        Self::from_raw(root, Utc::now())
    }

    /// Capture a tree with an explicit timestamp
    ///
    /// # Errors
    /// Returns error if an element has no tag or the tree exceeds `u32::MAX` nodes
    pub fn from_raw(root: RawNode, captured_at: DateTime<Utc>) -> Result<Self, SnapshotError> {
        let mut nodes = Vec::with_capacity(root.subtree_len());
        push_tree(&mut nodes, root)?;
        Ok(Self {
            nodes,
            page_url: None,
            captured_at,
        })
    }

    /// Attach the page URL
    #[inline]
    #[must_use]
    pub fn with_page_url(mut self, page_url: impl Into<String>) -> Self {
        self.page_url = Some(page_url.into());
        self
    }

    /// Root element
    #[inline]
    #[must_use]
    pub fn root(&self) -> &DomNode {
        &self.nodes[0]
    }

    /// Look up a node by id
    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.nodes.get(id.index())
    }

    /// Number of elements
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a snapshot has at least its root
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Page URL, if recorded
    #[inline]
    #[must_use]
    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }

    /// Capture time
    #[inline]
    #[must_use]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// All nodes in document order
    pub fn iter(&self) -> impl Iterator<Item = &DomNode> {
        self.nodes.iter()
    }

    /// Children of `id` in document order
    pub fn children_of(&self, id: NodeId) -> impl Iterator<Item = &DomNode> {
        self.node(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|c| self.node(*c))
    }

    /// Parent of `id`
    #[inline]
    #[must_use]
    pub fn parent_of(&self, id: NodeId) -> Option<&DomNode> {
        self.node(id).and_then(|n| n.parent).and_then(|p| self.node(p))
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself
    #[inline]
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            snapshot: self,
            next: self.node(id).and_then(|n| n.parent),
        }
    }

    /// Whether `ancestor` is a strict ancestor of `id`
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|a| a.id == ancestor)
    }

    /// Number of elements in the subtree rooted at `id`, including `id`
    #[must_use]
    pub fn subtree_len(&self, id: NodeId) -> usize {
        // Pre-order ids make a subtree a contiguous range.
        let Some(node) = self.node(id) else {
            return 0;
        };
        let end = self.nodes[id.index() + 1..]
            .iter()
            .position(|n| n.depth <= node.depth)
            .map_or(self.nodes.len(), |p| id.index() + 1 + p);
        end - id.index()
    }

    /// Content digest over tags, attributes, text and shape
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> SnapshotFingerprint {
        SnapshotFingerprint::of(self)
    }

    /// Rebuild the nested tree
    #[must_use]
    pub fn to_raw(&self) -> RawNode {
        self.subtree_raw(NodeId::ROOT)
    }

    /// Rebuild the nested tree below `id`
    #[must_use]
    pub fn subtree_raw(&self, id: NodeId) -> RawNode {
        let start = id.index();
        let len = self.subtree_len(id);
        // Back to front over the pre-order range: children are built first.
        let mut built: Vec<Option<RawNode>> = std::iter::repeat_with(|| None).take(len).collect();
        for offset in (0..len).rev() {
            let node = &self.nodes[start + offset];
            let children = node
                .children
                .iter()
                .filter_map(|c| built[c.index() - start].take())
                .collect();
            built[offset] = Some(RawNode {
                tag: node.tag.clone(),
                attributes: node.attributes.clone(),
                text: node.text.clone(),
                children,
            });
        }
        built.first_mut().and_then(Option::take).unwrap_or_default()
    }

    /// Serializable form
    #[must_use]
    pub fn to_document(&self) -> SnapshotDocument {
        SnapshotDocument {
            page_url: self.page_url.clone(),
            captured_at: self.captured_at,
            root: self.to_raw(),
        }
    }
}

impl TryFrom<SnapshotDocument> for DomSnapshot {
    type Error = SnapshotError;

    fn try_from(doc: SnapshotDocument) -> Result<Self, Self::Error> {
        let snapshot = Self::from_raw(doc.root, doc.captured_at)?;
        Ok(match doc.page_url {
            Some(url) => snapshot.with_page_url(url),
            None => snapshot,
        })
    }
}

impl From<DomSnapshot> for SnapshotDocument {
    fn from(snapshot: DomSnapshot) -> Self {
        snapshot.to_document()
    }
}

/// Iterator over a node's ancestors, nearest first
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    snapshot: &'a DomSnapshot,
    next: Option<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a DomNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.snapshot.node(self.next?)?;
        self.next = node.parent;
        Some(node)
    }
}

// Explicit stack, so depth is bounded by memory rather than the call stack.
// Children go on in reverse to keep ids in pre-order.
fn push_tree(nodes: &mut Vec<DomNode>, root: RawNode) -> Result<(), SnapshotError> {
    let mut stack: Vec<(RawNode, Option<NodeId>, usize, usize)> = vec![(root, None, 0, 0)];

    while let Some((mut raw, parent, depth, sibling_index)) = stack.pop() {
        let tag = raw.tag.trim().to_ascii_lowercase();
        if tag.is_empty() {
            return Err(SnapshotError::EmptyTag { depth });
        }
        let id = u32::try_from(nodes.len())
            .map(NodeId)
            .map_err(|_| SnapshotError::TooManyNodes {
                max: u64::from(u32::MAX),
            })?;

        let text = raw
            .text
            .take()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let children = std::mem::take(&mut raw.children);

        nodes.push(DomNode {
            id,
            tag,
            attributes: std::mem::take(&mut raw.attributes),
            text,
            children: Vec::with_capacity(children.len()),
            parent,
            depth,
            sibling_index,
        });
        if let Some(parent) = parent {
            nodes[parent.index()].children.push(id);
        }

        for (index, child) in children.into_iter().enumerate().rev() {
            stack.push((child, Some(id), depth + 1, index));
        }
    }

    Ok(())
}
