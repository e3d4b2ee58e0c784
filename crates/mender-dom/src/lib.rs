//! Mender DOM Snapshots
//!
//! Immutable, arena-backed captures of a page's DOM with structural diffing.
//!
//! # Core Concepts
//!
//! - [`RawNode`]: Nested element tree as supplied by a browser driver (serde I/O form)
//! - [`DomSnapshot`]: Immutable capture with snapshot-local [`NodeId`]s in document order
//! - [`SnapshotFingerprint`]: Blake3 digest of a snapshot's structure and content
//! - [`diff`]: Top-down, LCS-aligned comparison producing a [`SnapshotDiff`]
//! - [`volatile`]: Rules for generated classes and state attributes
//!
//! # Example
//!
//! ```rust,ignore
//! use mender_dom::{diff, DomSnapshot, RawNode};
//!
//! let before = DomSnapshot::capture(RawNode::element("button").attr("id", "submit-btn").text("Login"))?;
//! let after = DomSnapshot::capture(RawNode::element("button").attr("id", "login-btn").text("Login"))?;
//!
//! let changes = diff(&before, &after);
//! assert_eq!(changes.summary().modified, 1);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod diff;
mod fingerprint;
mod node;
mod snapshot;
pub mod volatile;

pub use diff::{diff, AttributeChange, ChangeKind, DiffNode, DiffSummary, SnapshotDiff};
pub use fingerprint::SnapshotFingerprint;
pub use node::{DomNode, NodeId, RawNode};
pub use snapshot::{Ancestors, DomSnapshot, SnapshotDocument, SnapshotError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
