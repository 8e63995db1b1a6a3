//! Mission Progression Engine (mpe-core)
//!
//! Computes, for one campaign and one cadet:
//! 1. **Graph**: missions and prerequisite edges, proven acyclic
//! 2. **Evaluation**: a status for every mission
//! 3. **Rewards**: experience, mana, competency points and rank
//! 4. **Submissions**: validation, quiz scoring and confirmation routing
//!
//! Everything here is synchronous and pure: callers fetch records, hand
//! them in, and persist what comes back.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use mpe_core::prelude::*;
//!
//! let graph = MissionGraph::build(campaign_id, missions, dependencies)?;
//! let evaluation = evaluate(&graph, &records, user_rank)?;
//!
//! let record = evaluation.record_for(user_id, mission_id, existing.as_ref()).unwrap();
//! let outcome = SubmissionPipeline::new(&config).submit(&mission, &record, payload, Utc::now())?;
//! if let Some(grant) = outcome.reward {
//!     // apply exactly once
//! }
//! ```

// Model
pub mod error;
pub mod payload;
pub mod types;

// Engine
pub mod aggregator;
pub mod evaluator;
pub mod graph;
pub mod moderation;
pub mod state_machine;
pub mod submission;

pub mod config;
pub mod test_mode;

// Test harness
pub mod test_harness;

// Re-exports
pub use error::*;
pub use types::*;

/// Commonly used types and entry points
pub mod prelude {
    pub use crate::aggregator::{
        aggregate, reconcile, MissionCatalog, RankLadder, RankProgress, RankThreshold, ReconciliationReport,
        RewardTotals, StoredCounters,
    };
    pub use crate::config::{EngineConfig, ModerationPolicy};
    pub use crate::error::{
        EngineError, EvaluationError, GraphError, ModerationError, SimulationError, SubmissionError,
    };
    pub use crate::evaluator::{evaluate, Evaluation, LockReason, StatusCounts};
    pub use crate::graph::{CampaignSnapshot, GraphKind, MissionGraph};
    pub use crate::moderation::{moderate, ModerationDecision, ModerationOutcome};
    pub use crate::payload::{MissionPayload, SubmissionPayload, UploadedFile};
    pub use crate::submission::{QuizScore, SubmissionOutcome, SubmissionPipeline};
    pub use crate::test_mode::{RankMode, SimulationState, TestModeSession};
    pub use crate::types::{
        CampaignId, CompetencyId, ConfirmationType, Mission, MissionDependency, MissionId, MissionStatus,
        MissionType, RewardGrant, UserId, UserMission,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if running with strict debugging enabled
#[must_use]
pub const fn strict_debug() -> bool {
    cfg!(feature = "strict-debug")
}
