//! Moderator decisions on PENDING_REVIEW submissions
//!
//! The engine only defines the valid targets; who decides is up to the
//! moderation collaborator.

use crate::config::ModerationPolicy;
use crate::error::ModerationError;
use crate::state_machine::validate_transition;
use crate::types::{Mission, MissionStatus, RewardGrant, UserMission};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decision taken on a pending submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationDecision {
    /// Complete the mission and grant its rewards
    Approve,
    /// Reopen the mission for another submission
    Reject {
        #[serde(default)]
        note: Option<String>,
    },
}

impl ModerationDecision {
    /// Rejection with a note for the cadet
    #[must_use]
    pub fn reject(note: impl Into<String>) -> Self {
        Self::Reject {
            note: Some(note.into()),
        }
    }

    fn target(&self) -> MissionStatus {
        match self {
            Self::Approve => MissionStatus::Completed,
            Self::Reject { .. } => MissionStatus::Available,
        }
    }
}

/// Applied decision
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationOutcome {
    pub record: UserMission,
    pub status: MissionStatus,
    /// Present when the decision completed the mission
    pub reward: Option<RewardGrant>,
}

/// Apply a moderator decision.
///
/// Approval completes the mission and emits its reward. Rejection returns
/// it to AVAILABLE, keeping the submission for reference and recording the
/// note; quiz attempts are reset only if the policy says so.
///
/// # Errors
/// `NotPending` unless the record is PENDING_REVIEW.
pub fn moderate(
    mission: &Mission,
    record: &UserMission,
    decision: ModerationDecision,
    now: DateTime<Utc>,
    policy: ModerationPolicy,
) -> Result<ModerationOutcome, ModerationError> {
    if record.status != MissionStatus::PendingReview {
        return Err(ModerationError::NotPending {
            mission: mission.id,
            status: record.status,
        });
    }
    let target = decision.target();
    validate_transition(record.status, target)?;

    let mut next = record.clone().with_status(target);
    let reward = match decision {
        ModerationDecision::Approve => {
            next.completed_at = Some(now);
            next.review_note = None;
            Some(RewardGrant::for_mission(record.user_id, mission))
        }
        ModerationDecision::Reject { note } => {
            next.review_note = note;
            if policy.reset_attempts_on_rejection {
                next.attempts = 0;
            }
            None
        }
    };

    tracing::info!(
        user = %record.user_id,
        mission = %mission.id,
        to = %target,
        "moderation decision applied"
    );

    Ok(ModerationOutcome {
        record: next,
        status: target,
        reward,
    })
}
