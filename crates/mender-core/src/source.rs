//! Snapshot and publishing collaborators
//!
//! The browser driver and the pipeline that persists fixes live outside this
//! crate. [`SnapshotSource`] and [`FixPublisher`] are the seams; the in-memory
//! implementations serve tests and the CLI.

use crate::attempt::AttemptId;
use crate::error::HealError;
use async_trait::async_trait;
use dashmap::DashMap;
use mender_dom::DomSnapshot;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Provides DOM snapshots by page
#[async_trait]
pub trait SnapshotSource: Send + Sync + std::fmt::Debug {
    /// Current state of `page_url`
    async fn capture(&self, page_url: &str) -> Result<Arc<DomSnapshot>, HealError>;

    /// Last known-good state of `page_url`, from when its selectors worked
    async fn baseline(&self, page_url: &str) -> Result<Arc<DomSnapshot>, HealError>;
}

/// Fixed snapshots per page
#[derive(Debug, Default)]
pub struct StaticSnapshotSource {
    baselines: DashMap<String, Arc<DomSnapshot>>,
    current: DashMap<String, Arc<DomSnapshot>>,
}

impl StaticSnapshotSource {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register both states of a page
    #[must_use]
    pub fn with_page(self, page_url: &str, baseline: DomSnapshot, current: DomSnapshot) -> Self {
        self.baselines.insert(page_url.to_string(), Arc::new(baseline));
        self.current.insert(page_url.to_string(), Arc::new(current));
        self
    }

    /// Replace the current state of a page
    pub fn set_current(&self, page_url: &str, current: DomSnapshot) {
        self.current.insert(page_url.to_string(), Arc::new(current));
    }

    fn lookup(map: &DashMap<String, Arc<DomSnapshot>>, page_url: &str, what: &str) -> Result<Arc<DomSnapshot>, HealError> {
        map.get(page_url)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| HealError::snapshot_unavailable(page_url, format!("no {what} snapshot registered")))
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshotSource {
    async fn capture(&self, page_url: &str) -> Result<Arc<DomSnapshot>, HealError> {
        Self::lookup(&self.current, page_url, "current")
    }

    async fn baseline(&self, page_url: &str) -> Result<Arc<DomSnapshot>, HealError> {
        Self::lookup(&self.baselines, page_url, "baseline")
    }
}

/// Healed selector handed to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFix {
    pub attempt_id: AttemptId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    pub page_url: String,
    pub original_selector: String,
    pub healed_selector: String,
    pub strategy: String,
    pub confidence: f64,
}

/// Outbound sink for approved fixes
#[async_trait]
pub trait FixPublisher: Send + Sync + std::fmt::Debug {
    async fn publish(&self, fix: &AppliedFix) -> Result<(), HealError>;
}

/// Keeps published fixes in memory
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<AppliedFix>>,
    fail_with: Option<String>,
}

impl RecordingPublisher {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publisher that rejects every fix with `reason`
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            published: Mutex::default(),
            fail_with: Some(reason.into()),
        }
    }

    #[must_use]
    pub fn published(&self) -> Vec<AppliedFix> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl FixPublisher for RecordingPublisher {
    async fn publish(&self, fix: &AppliedFix) -> Result<(), HealError> {
        if let Some(reason) = &self.fail_with {
            return Err(HealError::Publish(reason.clone()));
        }
        self.published.lock().push(fix.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mender_test_utils::{login_original, login_with_testid, snapshot, LOGIN_URL};

    #[tokio::test]
    async fn static_source_serves_registered_pages() {
        let source =
            StaticSnapshotSource::new().with_page(LOGIN_URL, snapshot(login_original()), snapshot(login_with_testid()));

        let current = source.capture(LOGIN_URL).await.unwrap();
        let baseline = source.baseline(LOGIN_URL).await.unwrap();
        assert_ne!(current.fingerprint(), baseline.fingerprint());

        let err = source.capture("https://elsewhere.example.com").await.unwrap_err();
        assert!(matches!(err, HealError::SnapshotUnavailable { .. }));
    }
}
