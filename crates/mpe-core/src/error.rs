//! Error types for the progression engine
//!
//! Provides the error taxonomy for:
//! - Graph construction (fatal to the construction call)
//! - Evaluation (cycles are fatal, bad records are recovered)
//! - Submissions and moderation (expected, user-facing outcomes)
//! - Test mode and configuration

use crate::evaluator::LockReason;
use crate::types::{CampaignId, MissionId, MissionStatus, UserId};
use std::path::PathBuf;

/// Message shown to users when progression cannot be computed
pub const PROGRESSION_UNAVAILABLE: &str = "unable to load progression";

/// Graph construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The dependency edges contain a cycle
    #[error("dependency cycle detected: {}", format_path(.path))]
    CycleDetected { path: Vec<MissionId> },

    /// An edge references a mission outside the mission set
    #[error("dependency {from} -> {to} references unknown mission {missing}")]
    DanglingEdge {
        from: MissionId,
        to: MissionId,
        missing: MissionId,
    },

    /// The same mission id was supplied twice
    #[error("mission {0} appears more than once")]
    DuplicateMission(MissionId),

    /// A mission from another campaign was supplied
    #[error("mission {mission} belongs to campaign {found}, expected {expected}")]
    ForeignMission {
        mission: MissionId,
        expected: CampaignId,
        found: CampaignId,
    },

    /// Mission not in the graph
    #[error("mission {0} not found")]
    MissionNotFound(MissionId),
}

fn format_path(path: &[MissionId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Evaluation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    /// Topological ordering could not place these missions
    #[error("campaign data is corrupt: {} mission(s) caught in a dependency cycle", .unresolved.len())]
    UnresolvedCycle { unresolved: Vec<MissionId> },

    /// A user record points at a mission outside the graph; recovered by
    /// ignoring the record
    #[error("record of user {user} references unknown mission {mission}")]
    UnknownMissionReference { user: UserId, mission: MissionId },
}

impl EvaluationError {
    /// Whether the evaluation result must be discarded
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnresolvedCycle { .. })
    }
}

/// Illegal status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: MissionStatus,
    pub to: MissionStatus,
}

/// Submission outcomes that leave the record unchanged
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    /// Mission is locked or waiting for review
    #[error("mission {mission} is not open for submission (status {status})")]
    NotAvailable {
        mission: MissionId,
        status: MissionStatus,
    },

    /// Payload failed validation
    #[error("invalid submission: {field}: {reason}")]
    InvalidPayload { field: String, reason: String },

    /// Mission already completed; nothing is awarded twice
    #[error("mission {mission} is already completed")]
    AlreadyCompleted { mission: MissionId },

    /// Quiz scored below the passing score
    #[error("quiz failed: scored {score}% of {passing_score}% needed (attempt {attempts_used})")]
    QuizFailed {
        score: u8,
        passing_score: u8,
        attempts_used: u32,
        retry_allowed: bool,
    },

    /// No quiz attempts left
    #[error("no attempts left ({attempts_used} used)")]
    AttemptsExhausted { attempts_used: u32 },

    /// Status change rejected by the state machine
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl SubmissionError {
    /// Field-level validation failure
    #[inline]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the cadet can try again
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidPayload { .. } => true,
            Self::QuizFailed { retry_allowed, .. } => *retry_allowed,
            _ => false,
        }
    }
}

/// Moderation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModerationError {
    /// Only pending submissions can be moderated
    #[error("mission {mission} is not pending review (status {status})")]
    NotPending {
        mission: MissionId,
        status: MissionStatus,
    },

    /// Status change rejected by the state machine
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Test mode errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    /// Mission is not part of the simulated campaign
    #[error("mission {0} is not in the simulated campaign")]
    UnknownMission(MissionId),

    /// Quick completion never bypasses unmet prerequisites or rank
    #[error("mission {mission} is locked in the simulation")]
    MissionLocked {
        mission: MissionId,
        reason: Option<LockReason>,
    },

    /// Evaluation failed
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Submission rejected
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// Moderation rejected
    #[error(transparent)]
    Moderation(#[from] ModerationError),

    /// Status change rejected
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML did not parse
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two rank thresholds share a level
    #[error("rank level {0} is defined more than once")]
    DuplicateRankLevel(u32),

    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("submission rejected: {0}")]
    Submission(#[from] SubmissionError),

    #[error("moderation rejected: {0}")]
    Moderation(#[from] ModerationError),

    #[error("test mode error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Expected outcomes the caller can act on
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Submission(_) | EngineError::Moderation(_) => true,
            EngineError::Simulation(e) => !matches!(e, SimulationError::Evaluation(inner) if inner.is_fatal()),
            EngineError::Evaluation(e) => !e.is_fatal(),
            EngineError::Graph(_) | EngineError::Config(_) => false,
        }
    }

    /// Errors meaning stored campaign data is inconsistent
    #[must_use]
    pub fn is_data_integrity(&self) -> bool {
        match self {
            EngineError::Graph(_) => true,
            EngineError::Evaluation(e) => e.is_fatal(),
            EngineError::Simulation(SimulationError::Evaluation(e)) => e.is_fatal(),
            _ => false,
        }
    }

    /// Text safe to show to the acting user. Submission and moderation
    /// errors are returned verbatim; graph and evaluation failures are
    /// reduced to a generic message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Submission(e) => e.to_string(),
            EngineError::Moderation(e) => e.to_string(),
            EngineError::Simulation(e) => e.to_string(),
            EngineError::Graph(_) | EngineError::Evaluation(_) | EngineError::Config(_) => {
                PROGRESSION_UNAVAILABLE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_lists_path() {
        let a = MissionId::new();
        let b = MissionId::new();
        let err = GraphError::CycleDetected { path: vec![a, b, a] };
        let text = err.to_string();
        assert!(text.contains(&format!("{a} -> {b} -> {a}")));
    }

    #[test]
    fn graph_errors_hide_details_from_users() {
        let err = EngineError::from(GraphError::MissionNotFound(MissionId::new()));
        assert_eq!(err.user_message(), PROGRESSION_UNAVAILABLE);
        assert!(err.is_data_integrity());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn submission_errors_are_verbatim() {
        let err = EngineError::from(SubmissionError::invalid("files", "at least 1 file required"));
        assert_eq!(err.user_message(), "invalid submission: files: at least 1 file required");
        assert!(err.is_recoverable());
    }

    #[test]
    fn unknown_reference_is_not_fatal() {
        let err = EvaluationError::UnknownMissionReference {
            user: UserId::new(),
            mission: MissionId::new(),
        };
        assert!(!err.is_fatal());
        assert!(EngineError::from(err).is_recoverable());

        let cycle = EvaluationError::UnresolvedCycle { unresolved: vec![MissionId::new()] };
        assert!(cycle.is_fatal());
    }

    #[test]
    fn quiz_failure_retry_flag() {
        let failed = SubmissionError::QuizFailed {
            score: 60,
            passing_score: 75,
            attempts_used: 1,
            retry_allowed: true,
        };
        assert!(failed.is_retryable());
        assert!(!SubmissionError::AlreadyCompleted { mission: MissionId::new() }.is_retryable());
    }
}
