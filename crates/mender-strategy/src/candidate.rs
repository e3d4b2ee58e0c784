//! Proposed replacement selectors
//!
//! A [`Candidate`] is immutable once a strategy returns it. The coordinator
//! may derive adjusted copies (see [`Candidate::demoted`]) but never edits
//! one in place.

use mender_dom::NodeId;
use mender_selector::Selector;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

/// Reliability score in `[0, 1]`
///
/// Construction clamps; NaN becomes zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub const ZERO: Self = Self(0.0);
    pub const ONE: Self = Self(1.0);

    /// Create new confidence, clamped to `[0, 1]`
    #[inline]
    #[must_use]
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self::ZERO
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// Raw value
    #[inline]
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Scaled by `factor`, clamped again
    #[inline]
    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.0 * factor)
    }
}

impl Eq for Confidence {}

impl PartialOrd for Confidence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Confidence {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for Confidence {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(confidence: Confidence) -> Self {
        confidence.0
    }
}

impl Display for Confidence {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}%", self.0 * 100.0)
    }
}

/// Breakdown of a heuristic similarity score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub tag: f64,
    pub attributes: f64,
    pub text: f64,
    pub position: f64,
    pub siblings: f64,
}

/// Strategy-specific detail backing a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Evidence {
    /// Matched through a test-id attribute
    TestId {
        attribute: String,
        value: String,
        tag_match: bool,
        text_match: bool,
        attribute_overlap: f64,
        /// Set when found by comparing test-id values directly
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_similarity: Option<f64>,
    },

    /// Matched through visible or associated text
    Text {
        original_text: String,
        matched_text: String,
        similarity: f64,
        same_text_matches: usize,
    },

    /// Matched through the ancestor chain
    Hierarchy {
        ancestor_chain: Vec<String>,
        matched_levels: usize,
        relaxed_levels: usize,
        nth_child: bool,
    },

    /// Scored by a similarity model
    Scored {
        scorer: String,
        score: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        breakdown: Option<ScoreBreakdown>,
        rank: usize,
    },
}

/// A proposed replacement selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub selector: Selector,
    /// Matches of `selector` in the current snapshot, document order
    pub matched_node_ids: Vec<NodeId>,
    pub confidence: Confidence,
    pub strategy: String,
    pub rationale: String,
    pub evidence: Evidence,
}

impl Candidate {
    /// Create new candidate
    #[must_use]
    pub fn new(
        strategy: &str,
        selector: Selector,
        matched_node_ids: Vec<NodeId>,
        confidence: impl Into<Confidence>,
        rationale: impl Into<String>,
        evidence: Evidence,
    ) -> Self {
        Self {
            selector,
            matched_node_ids,
            confidence: confidence.into(),
            strategy: strategy.to_string(),
            rationale: rationale.into(),
            evidence,
        }
    }

    /// Copy with confidence scaled by `factor`
    #[must_use]
    pub fn demoted(&self, factor: f64, reason: &str) -> Self {
        Self {
            confidence: self.confidence.scaled(factor),
            rationale: format!("{}; {reason}", self.rationale),
            ..self.clone()
        }
    }

    /// Whether the selector pins down exactly one element
    #[inline]
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.matched_node_ids.len() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn confidence_clamps_and_zeroes_nan() {
        assert_eq!(Confidence::new(1.7).value(), 1.0);
        assert_eq!(Confidence::new(-0.2).value(), 0.0);
        assert_eq!(Confidence::new(f64::NAN).value(), 0.0);
        assert_eq!(Confidence::new(0.42).to_string(), "42%");
    }

    #[test]
    fn deserializing_clamps() {
        let c: Confidence = serde_json::from_str("3.5").unwrap();
        assert_eq!(c, Confidence::ONE);
    }

    #[test]
    fn demoted_keeps_identity() {
        let candidate = Candidate::new(
            "text-content-matching",
            "button".parse().unwrap(),
            vec![NodeId(3)],
            0.9,
            "text matches",
            Evidence::Text {
                original_text: "Login".into(),
                matched_text: "Login".into(),
                similarity: 1.0,
                same_text_matches: 1,
            },
        );
        let demoted = candidate.demoted(0.8, "expected element type `a`");
        assert!((demoted.confidence.value() - 0.72).abs() < 1e-9);
        assert_eq!(demoted.selector, candidate.selector);
        assert!(demoted.rationale.ends_with("expected element type `a`"));
        assert!(demoted.is_unique());
    }

    proptest! {
        #[test]
        fn prop_confidence_always_in_unit_range(value in proptest::num::f64::ANY, factor in proptest::num::f64::ANY) {
            let c = Confidence::new(value).scaled(factor);
            prop_assert!((0.0..=1.0).contains(&c.value()));
        }
    }
}
