//! Wire shapes of the inbound and outbound contracts
//!
//! Field names are camelCase on the wire. Conversions from domain values
//! live here so the service only moves data between the two.

use crate::attempt::{AttemptId, AttemptStatus, HealingAttempt};
use crate::coordinator::{BatchItem, BatchRequest, BatchSummary, HealRequest};
use mender_dom::{diff, DiffSummary, NodeId, SnapshotDocument};
use serde::{Deserialize, Serialize};

/// Review category of every attempt produced here
pub const SELECTOR_HEALING: &str = "selector-healing";

/// Inbound single heal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealRequestDto {
    pub url: String,
    #[serde(alias = "selector")]
    pub broken_selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
}

impl From<HealRequestDto> for HealRequest {
    fn from(dto: HealRequestDto) -> Self {
        Self {
            page_url: dto.url,
            selector: dto.broken_selector,
            test_id: dto.test_id,
            strategy: dto.strategy,
            expected_element_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealResponseDto {
    pub success: bool,
    pub original: String,
    pub healed: Option<String>,
    pub confidence: f64,
    pub strategy: Option<String>,
    pub attempt_id: AttemptId,
    pub status: AttemptStatus,
    pub from_cache: bool,
}

impl HealResponseDto {
    /// Render an attempt; `success` means the top candidate reaches `acceptance`
    #[must_use]
    pub fn from_attempt(attempt: &HealingAttempt, acceptance: f64) -> Self {
        let fix = attempt.proposed_fix();
        Self {
            success: attempt.is_healed(acceptance),
            original: attempt.original_selector.clone(),
            healed: fix.map(|c| c.selector.to_string()),
            confidence: attempt.confidence().value(),
            strategy: fix.map(|c| c.strategy.clone()),
            attempt_id: attempt.id,
            status: attempt.status(),
            from_cache: attempt.from_cache,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSelectorDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_element_type: Option<String>,
}

/// Inbound batch heal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchHealRequestDto {
    pub url: String,
    pub selectors: Vec<BatchSelectorDto>,
}

impl From<BatchHealRequestDto> for BatchRequest {
    fn from(dto: BatchHealRequestDto) -> Self {
        Self {
            page_url: dto.url,
            items: dto
                .selectors
                .into_iter()
                .map(|s| BatchItem {
                    test_id: s.id,
                    selector: s.selector,
                    expected_element_type: s.expected_element_type,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResultDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub result: HealResponseDto,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchHealResponseDto {
    pub results: Vec<BatchResultDto>,
    pub summary: BatchSummary,
    pub cancelled: bool,
}

impl BatchHealResponseDto {
    #[must_use]
    pub fn from_attempts(attempts: &[HealingAttempt], summary: BatchSummary, cancelled: bool, acceptance: f64) -> Self {
        let results = attempts
            .iter()
            .map(|attempt| BatchResultDto {
                id: attempt.test_id.clone(),
                result: HealResponseDto::from_attempt(attempt, acceptance),
                error: attempt.syntax_error.as_ref().map(ToString::to_string),
            })
            .collect();
        Self {
            results,
            summary,
            cancelled,
        }
    }
}

/// Selector playground input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaygroundRequest {
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaygroundResponse {
    pub matched_node_ids: Vec<NodeId>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedFix {
    pub description: String,
    pub code: String,
    pub diff: String,
}

/// Outbound review queue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueueItem {
    pub attempt_id: AttemptId,
    pub test_id: Option<String>,
    pub category: String,
    pub root_cause: String,
    pub proposed_fix: Option<ProposedFix>,
    pub confidence: f64,
    pub dom_snapshot: SnapshotDocument,
    pub status: AttemptStatus,
}

impl ReviewQueueItem {
    #[must_use]
    pub fn from_attempt(attempt: &HealingAttempt) -> Self {
        let changes: DiffSummary = diff(&attempt.original_snapshot, &attempt.current_snapshot).summary();
        let root_cause = if changes.changed() == 0 {
            format!("`{}` no longer matches; page structure unchanged", attempt.original_selector)
        } else {
            format!("`{}` no longer matches; page changed: {changes}", attempt.original_selector)
        };
        let proposed_fix = attempt.proposed_fix().map(|c| {
            let code = c.selector.to_string();
            ProposedFix {
                description: format!("{} via {}: {}", code, c.strategy, c.rationale),
                diff: selector_diff(&attempt.original_selector, &code),
                code,
            }
        });
        Self {
            attempt_id: attempt.id,
            test_id: attempt.test_id.clone(),
            category: SELECTOR_HEALING.to_string(),
            root_cause,
            proposed_fix,
            confidence: attempt.confidence().value(),
            dom_snapshot: attempt.current_snapshot.to_document(),
            status: attempt.status(),
        }
    }
}

/// Reviewer callback body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub reviewer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One-line unified diff between two selectors
#[must_use]
pub fn selector_diff(before: &str, after: &str) -> String {
    format!("- {before}\n+ {after}")
}
