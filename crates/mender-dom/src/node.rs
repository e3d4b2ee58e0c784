//! DOM node types
//!
//! [`RawNode`] is the nested, ownership-based tree used for I/O. Once captured
//! into a [`DomSnapshot`](crate::DomSnapshot) every element becomes a [`DomNode`]
//! in an arena, addressed by a snapshot-local [`NodeId`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Snapshot-local node identifier
///
/// Assigned in document (pre-)order at capture time. Ids are only meaningful
/// within the snapshot that issued them and are never compared across snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Root node of every snapshot
    pub const ROOT: Self = Self(0);

    /// Position in the snapshot arena
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Element tree as delivered by a browser driver
///
/// Children are owned and kept in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawNode {
    /// Element tag name
    pub tag: String,

    /// Attribute name to value
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    /// Text owned directly by this element (not by descendants)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Child elements in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RawNode>,
}

impl RawNode {
    /// Create an element with no attributes, text or children
    #[inline]
    #[must_use]
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Set an attribute
    #[inline]
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the element's own text
    #[inline]
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Append a child element
    #[inline]
    #[must_use]
    pub fn child(mut self, child: RawNode) -> Self {
        self.children.push(child);
        self
    }

    /// Append several child elements
    #[inline]
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = RawNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Number of elements in this subtree, including self
    #[must_use]
    pub fn subtree_len(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(&node.children);
        }
        count
    }
}

/// A captured element
///
/// Immutable. Structural links (`parent`, `children`) are arena ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomNode {
    pub(crate) id: NodeId,
    pub(crate) tag: String,
    pub(crate) attributes: BTreeMap<String, String>,
    pub(crate) text: Option<String>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) depth: usize,
    pub(crate) sibling_index: usize,
}

impl DomNode {
    /// Node id
    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Lowercase tag name
    #[inline]
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// All attributes
    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Single attribute value
    #[inline]
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whether an attribute is present
    #[inline]
    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Own text, trimmed; `None` when absent or blank
    #[inline]
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Child ids in document order
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Parent id (`None` for the root)
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Distance from the root (root is 0)
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Zero-based position among the parent's children
    #[inline]
    #[must_use]
    pub fn sibling_index(&self) -> usize {
        self.sibling_index
    }

    /// Whitespace-separated tokens of the `class` attribute
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    /// Whether the `class` attribute contains `class_name` as a token
    #[inline]
    #[must_use]
    pub fn has_class(&self, class_name: &str) -> bool {
        self.classes().any(|c| c == class_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_node_builder() {
        let node = RawNode::element("form")
            .attr("class", "login")
            .child(RawNode::element("input").attr("name", "user"))
            .child(RawNode::element("button").text("Login"));

        assert_eq!(node.tag, "form");
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.subtree_len(), 3);
        assert_eq!(node.children[1].text.as_deref(), Some("Login"));
    }

    #[test]
    fn raw_node_json_omits_empty_fields() {
        let json = serde_json::to_string(&RawNode::element("div")).unwrap();
        assert_eq!(json, r#"{"tag":"div"}"#);

        let parsed: RawNode =
            serde_json::from_str(r#"{"tag":"a","attributes":{"href":"/x"},"text":"Go"}"#).unwrap();
        assert_eq!(parsed.attributes.get("href").map(String::as_str), Some("/x"));
        assert_eq!(parsed.text.as_deref(), Some("Go"));
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId(7).to_string(), "n7");
        assert_eq!(NodeId::ROOT.index(), 0);
    }
}
