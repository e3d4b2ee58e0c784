//! Snapshot files

use anyhow::{Context, Result};
use mender_dom::{DomSnapshot, RawNode};
use serde::Deserialize;
use std::path::Path;

/// Either a full snapshot document or a bare element tree
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Document(DomSnapshot),
    Tree(RawNode),
}

/// Read a JSON snapshot; `page_url` fills in a missing URL
pub(crate) fn load_snapshot(path: &Path, page_url: Option<&str>) -> Result<DomSnapshot> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: SnapshotFile =
        serde_json::from_str(&content).with_context(|| format!("{} is not a snapshot", path.display()))?;
    let snapshot = match file {
        SnapshotFile::Document(snapshot) => snapshot,
        SnapshotFile::Tree(root) => {
            DomSnapshot::capture(root).with_context(|| format!("{} has an invalid tree", path.display()))?
        }
    };
    Ok(match page_url {
        Some(url) if snapshot.page_url().is_none() => snapshot.with_page_url(url),
        _ => snapshot,
    })
}
