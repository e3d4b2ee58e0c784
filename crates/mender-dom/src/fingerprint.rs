//! Snapshot content digests
//!
//! Provides [`SnapshotFingerprint`], a 32-byte Blake3 digest over a snapshot's
//! tags, attributes, text and tree shape. Capture time, page URL and node ids
//! are excluded, so two captures of an identical page share a fingerprint.

use crate::snapshot::DomSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Blake3 digest of a snapshot's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotFingerprint([u8; 32]);

impl SnapshotFingerprint {
    /// Digest a snapshot
    #[must_use]
    pub fn of(snapshot: &DomSnapshot) -> Self {
        let mut hasher = blake3::Hasher::new();
        for node in snapshot.iter() {
            // Depth makes the pre-order sequence unambiguous.
            hasher.update(&(node.depth() as u64).to_le_bytes());
            write_field(&mut hasher, node.tag());
            hasher.update(&(node.attributes().len() as u64).to_le_bytes());
            for (name, value) in node.attributes() {
                write_field(&mut hasher, name);
                write_field(&mut hasher, value);
            }
            match node.text() {
                Some(text) => {
                    hasher.update(&[1]);
                    write_field(&mut hasher, text);
                }
                None => {
                    hasher.update(&[0]);
                }
            }
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for SnapshotFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

fn write_field(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use crate::{DomSnapshot, RawNode};

    fn page(button_id: &str) -> RawNode {
        RawNode::element("body").child(RawNode::element("button").attr("id", button_id).text("Save"))
    }

    #[test]
    fn identical_content_same_fingerprint() {
        let a = DomSnapshot::capture(page("save")).unwrap();
        let b = DomSnapshot::capture(page("save"))
            .unwrap()
            .with_page_url("https://example.com");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn attribute_change_changes_fingerprint() {
        let a = DomSnapshot::capture(page("save")).unwrap();
        let b = DomSnapshot::capture(page("save-v2")).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn shape_is_part_of_fingerprint() {
        // Same pre-order tags, different nesting.
        let nested = RawNode::element("div").child(RawNode::element("span").child(RawNode::element("a")));
        let flat = RawNode::element("div")
            .child(RawNode::element("span"))
            .child(RawNode::element("a"));

        let a = DomSnapshot::capture(nested).unwrap();
        let b = DomSnapshot::capture(flat).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().short().len(), 16);
    }
}
