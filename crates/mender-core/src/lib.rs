//! Mender Core
//!
//! Turns a broken selector plus two DOM snapshots into a reviewable
//! [`HealingAttempt`], and carries that attempt through review.
//!
//! # Architecture
//!
//! ```text
//! HealingService ──> SnapshotSource (capture, baseline)
//!       │
//!       ├──> HealingCoordinator ──> StrategyRegistry ──> strategies
//!       │          ├──> HealCache
//!       │          └──> StatsRecorder, FlakinessTracker
//!       │
//!       └──> ReviewBoard ──> FixPublisher
//! ```
//!
//! # Attempt lifecycle
//!
//! See [`state`].
//!
//! Everything up to `proposed` is driven by the coordinator. Later
//! transitions go through the [`ReviewBoard`], which serializes writers per
//! attempt and rejects stale ones.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod attempt;
mod cache;
pub mod config;
mod coordinator;
pub mod dto;
mod error;
mod review;
mod service;
mod source;
pub mod state;
mod stats;

pub use attempt::{AttemptId, AttemptStatus, Decision, HealingAttempt, StatusChange, StrategyOutcome, StrategyRun};
pub use cache::{CacheKey, CachedHeal, HealCache};
pub use config::{ConfigError, HealingConfig};
pub use coordinator::{BatchItem, BatchOutcome, BatchRequest, BatchSummary, HealRequest, HealingCoordinator};
pub use error::HealError;
pub use review::{ReviewBoard, AUTO_HEAL_POLICY};
pub use service::HealingService;
pub use source::{AppliedFix, FixPublisher, RecordingPublisher, SnapshotSource, StaticSnapshotSource};
pub use stats::{FlakinessTracker, HealingStats, SelectorHealth, StatsRecorder, StrategyHealth};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
