//! Review state machine
//!
//! ```text
//! pending ──► proposed ──► approved ──► applied
//!    │            └──────► rejected ──► discarded
//!    └──► rejected-invalid-input
//! ```

use crate::attempt::AttemptStatus;
use crate::error::HealError;

/// Validates a status transition
///
/// # Errors
/// Returns [`HealError::IllegalTransition`] if `to` is not reachable from `from`
pub fn validate_transition(from: AttemptStatus, to: AttemptStatus) -> Result<(), HealError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(HealError::IllegalTransition { from, to })
    }
}

#[must_use]
pub fn allowed_transitions(from: AttemptStatus) -> &'static [AttemptStatus] {
    use AttemptStatus::*;
    match from {
        Pending => &[Proposed, RejectedInvalidInput],
        Proposed => &[Approved, Rejected],
        Approved => &[Applied],
        Rejected => &[Discarded],
        Applied | Discarded | RejectedInvalidInput => &[],
    }
}

/// No further transitions
#[inline]
#[must_use]
pub fn is_terminal(status: AttemptStatus) -> bool {
    allowed_transitions(status).is_empty()
}

fn allowed(from: AttemptStatus, to: AttemptStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use AttemptStatus::*;

    const ALL: [AttemptStatus; 7] = [Pending, Proposed, Approved, Rejected, Applied, Discarded, RejectedInvalidInput];

    fn arb_status() -> impl Strategy<Value = AttemptStatus> {
        proptest::sample::select(ALL.to_vec())
    }

    #[test]
    fn happy_paths() {
        for path in [
            [Pending, Proposed, Approved, Applied],
            [Pending, Proposed, Rejected, Discarded],
        ] {
            for pair in path.windows(2) {
                validate_transition(pair[0], pair[1]).unwrap();
            }
        }
        validate_transition(Pending, RejectedInvalidInput).unwrap();
    }

    #[test]
    fn decided_attempts_cannot_be_re_reviewed() {
        assert!(validate_transition(Approved, Rejected).is_err());
        assert!(validate_transition(Rejected, Approved).is_err());
        assert!(validate_transition(Approved, Approved).is_err());
        assert!(validate_transition(Pending, Approved).is_err());
    }

    #[test]
    fn terminal_states() {
        let terminal: Vec<_> = ALL.into_iter().filter(|s| is_terminal(*s)).collect();
        assert_eq!(terminal, vec![Applied, Discarded, RejectedInvalidInput]);
    }

    proptest! {
        #[test]
        fn prop_validation_agrees_with_table(from in arb_status(), to in arb_status()) {
            let listed = allowed_transitions(from).contains(&to);
            prop_assert_eq!(validate_transition(from, to).is_ok(), listed);
        }

        #[test]
        fn prop_no_self_loops(status in arb_status()) {
            prop_assert!(validate_transition(status, status).is_err());
        }

        #[test]
        fn prop_nothing_returns_to_pending(from in arb_status()) {
            prop_assert!(validate_transition(from, Pending).is_err());
        }
    }
}
