use serde::{Deserialize, Serialize};

/// Malformed selector expression
///
/// `position` is the byte offset of the offending token in the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("invalid selector at {position} near `{token}`: {message}")]
pub struct SelectorSyntaxError {
    pub position: usize,
    pub token: String,
    pub message: String,
}

impl SelectorSyntaxError {
    /// Create new syntax error
    #[inline]
    #[must_use]
    pub fn new(position: usize, token: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            position,
            token: token.into(),
            message: message.into(),
        }
    }
}
