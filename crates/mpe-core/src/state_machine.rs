//! Mission status transitions
//!
//! Status only moves forward, with one exception: a moderator rejection
//! returns a PENDING_REVIEW mission to AVAILABLE.

use crate::error::TransitionError;
use crate::types::MissionStatus;

/// Validates a status transition.
///
/// With the `strict-debug` feature an illegal transition panics, which
/// surfaces caller bugs during development.
pub fn validate_transition(from: MissionStatus, to: MissionStatus) -> Result<(), TransitionError> {
    if allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal status transition attempted: {from:?} -> {to:?}");

        #[cfg(not(feature = "strict-debug"))]
        Err(TransitionError { from, to })
    }
}

/// Statuses reachable in one step from `from`
#[must_use]
pub fn allowed_transitions(from: MissionStatus) -> Vec<MissionStatus> {
    use MissionStatus::*;
    match from {
        Locked => vec![Available],
        Available => vec![InProgress, PendingReview, Completed],
        InProgress => vec![PendingReview, Completed],
        PendingReview => vec![Completed, Available],
        Completed => vec![],
    }
}

/// The single backward edge of the matrix
#[inline]
#[must_use]
pub fn is_rejection(from: MissionStatus, to: MissionStatus) -> bool {
    from == MissionStatus::PendingReview && to == MissionStatus::Available
}

fn allowed(from: MissionStatus, to: MissionStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_only() {
        for from in MissionStatus::ALL {
            for to in allowed_transitions(from) {
                assert!(
                    to.progress_rank() > from.progress_rank() || is_rejection(from, to),
                    "{from} -> {to} moves backwards"
                );
            }
        }
    }

    #[test]
    fn completed_is_terminal() {
        assert!(allowed_transitions(MissionStatus::Completed).is_empty());
        assert!(validate_transition(MissionStatus::Completed, MissionStatus::Available).is_err());
    }

    #[test]
    fn locked_cannot_skip_to_completed() {
        let err = validate_transition(MissionStatus::Locked, MissionStatus::Completed).unwrap_err();
        assert_eq!(err.from, MissionStatus::Locked);
        assert_eq!(err.to, MissionStatus::Completed);
    }
}
