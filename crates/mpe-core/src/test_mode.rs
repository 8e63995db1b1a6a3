//! Test-Mode Simulator
//!
//! A per-architect sandbox over a synthetic user. It keeps its own record
//! map and never sees real cadet data, but every status, total and rank it
//! reports comes from the same [`evaluate`], [`aggregate`] and
//! [`RankLadder`] code used in production.
//!
//! `quick_complete` on a LOCKED mission is rejected with
//! [`SimulationError::MissionLocked`]; the sandbox never fabricates a
//! completion whose prerequisites or rank are unmet.

use crate::aggregator::{aggregate, RankLadder, RankProgress, RewardTotals};
use crate::config::{EngineConfig, ModerationPolicy};
use crate::error::{SimulationError, SubmissionError};
use crate::evaluator::{evaluate, Evaluation};
use crate::graph::MissionGraph;
use crate::moderation::{moderate, ModerationDecision};
use crate::payload::SubmissionPayload;
use crate::state_machine::validate_transition;
use crate::submission::{QuizScore, SubmissionPipeline};
use crate::types::{Mission, MissionId, MissionStatus, UserId, UserMission, BASE_RANK_LEVEL};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Where the simulated user's rank comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RankMode {
    /// Computed from the simulated totals, like a real cadet
    #[default]
    Derived,
    /// Pinned, to preview rank-gated missions
    Fixed(u32),
}

/// Snapshot rendered by the test-mode panel
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub evaluation: Evaluation,
    pub totals: RewardTotals,
    pub rank_level: u32,
    pub next_rank: Option<RankProgress>,
    /// Score of the last quiz submitted in this session
    pub last_quiz: Option<QuizScore>,
}

/// Sandboxed progression for one architect session
#[derive(Debug, Clone)]
pub struct TestModeSession {
    graph: Arc<MissionGraph>,
    ladder: RankLadder,
    pipeline: SubmissionPipeline,
    policy: ModerationPolicy,
    user_id: UserId,
    records: BTreeMap<MissionId, UserMission>,
    rank_mode: RankMode,
    last_quiz: Option<QuizScore>,
}

impl TestModeSession {
    /// Start a session with zero history
    ///
    /// # Errors
    /// `Evaluation` if the graph cannot be evaluated.
    pub fn initialize(
        graph: Arc<MissionGraph>,
        ladder: RankLadder,
        config: &EngineConfig,
    ) -> Result<(Self, SimulationState), SimulationError> {
        let session = Self {
            graph,
            ladder,
            pipeline: SubmissionPipeline::new(config),
            policy: config.moderation,
            user_id: UserId::new(),
            records: BTreeMap::new(),
            rank_mode: RankMode::Derived,
            last_quiz: None,
        };
        let state = session.state()?;
        tracing::info!(
            campaign = %session.graph.campaign_id(),
            simulated_user = %session.user_id,
            missions = session.graph.mission_count(),
            "test mode session started"
        );
        Ok((session, state))
    }

    /// Synthetic user id of this session
    #[inline]
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Graph under test
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &MissionGraph {
        &self.graph
    }

    /// Simulated records
    pub fn records(&self) -> impl Iterator<Item = &UserMission> + '_ {
        self.records.values()
    }

    /// Current rank mode
    #[inline]
    #[must_use]
    pub fn rank_mode(&self) -> RankMode {
        self.rank_mode
    }

    /// Recompute the state from the simulated records
    ///
    /// # Errors
    /// `Evaluation` if the graph cannot be evaluated.
    pub fn state(&self) -> Result<SimulationState, SimulationError> {
        let records: Vec<UserMission> = self.records.values().cloned().collect();
        let totals = aggregate(&records, self.graph.as_ref());
        let rank_level = match self.rank_mode {
            RankMode::Derived => self.ladder.level_for(&totals),
            RankMode::Fixed(level) => level.max(BASE_RANK_LEVEL),
        };
        let evaluation = evaluate(&self.graph, &records, rank_level)?;
        Ok(SimulationState {
            next_rank: self.ladder.next(&totals),
            evaluation,
            totals,
            rank_level,
            last_quiz: self.last_quiz,
        })
    }

    /// Complete a mission without a submission, whatever its confirmation
    /// type. PENDING_REVIEW missions are approved.
    ///
    /// # Errors
    /// - `UnknownMission` for missions outside the graph
    /// - `MissionLocked` for LOCKED missions
    /// - `Submission(AlreadyCompleted)` for COMPLETED missions
    pub fn quick_complete(&mut self, mission_id: MissionId) -> Result<SimulationState, SimulationError> {
        let (evaluation, record) = self.open_record(mission_id)?;
        match record.status {
            MissionStatus::Locked => Err(SimulationError::MissionLocked {
                mission: mission_id,
                reason: evaluation.lock_reason(mission_id).cloned(),
            }),
            MissionStatus::Completed => Err(SubmissionError::AlreadyCompleted { mission: mission_id }.into()),
            MissionStatus::PendingReview => self.approve(mission_id),
            MissionStatus::Available | MissionStatus::InProgress => {
                validate_transition(record.status, MissionStatus::Completed)?;
                let now = Utc::now();
                let mut next = record.with_status(MissionStatus::Completed);
                next.started_at.get_or_insert(now);
                next.completed_at = Some(now);
                tracing::debug!(mission = %mission_id, "test mode quick completion");
                self.records.insert(mission_id, next);
                self.state()
            }
        }
    }

    /// Submit through the production pipeline
    ///
    /// # Errors
    /// `UnknownMission`, or any `SubmissionError`. A failed quiz attempt is
    /// still counted.
    pub fn submit(
        &mut self,
        mission_id: MissionId,
        payload: SubmissionPayload,
    ) -> Result<SimulationState, SimulationError> {
        let (_, record) = self.open_record(mission_id)?;
        let mission = self.mission(mission_id)?;

        match self.pipeline.submit(mission, &record, payload, Utc::now()) {
            Ok(outcome) => {
                self.last_quiz = outcome.quiz;
                self.records.insert(mission_id, outcome.record);
                self.state()
            }
            Err(err) => {
                if let SubmissionError::QuizFailed { attempts_used, .. } = &err {
                    let mut failed = record;
                    failed.attempts = *attempts_used;
                    self.records.insert(mission_id, failed);
                }
                Err(err.into())
            }
        }
    }

    /// Mark a mission IN_PROGRESS
    ///
    /// # Errors
    /// `UnknownMission` or `Transition`.
    pub fn start(&mut self, mission_id: MissionId) -> Result<SimulationState, SimulationError> {
        let (_, record) = self.open_record(mission_id)?;
        let started = self.pipeline.start(&record, Utc::now())?;
        self.records.insert(mission_id, started);
        self.state()
    }

    /// Approve a pending submission
    ///
    /// # Errors
    /// `UnknownMission` or `Moderation(NotPending)`.
    pub fn approve(&mut self, mission_id: MissionId) -> Result<SimulationState, SimulationError> {
        self.decide(mission_id, ModerationDecision::Approve)
    }

    /// Reject a pending submission
    ///
    /// # Errors
    /// `UnknownMission` or `Moderation(NotPending)`.
    pub fn reject(&mut self, mission_id: MissionId, note: Option<String>) -> Result<SimulationState, SimulationError> {
        self.decide(mission_id, ModerationDecision::Reject { note })
    }

    /// Switch between derived and pinned rank
    ///
    /// # Errors
    /// `Evaluation` if the graph cannot be evaluated.
    pub fn set_rank_mode(&mut self, mode: RankMode) -> Result<SimulationState, SimulationError> {
        self.rank_mode = mode;
        self.state()
    }

    /// Drop all simulated history; the rank mode is kept
    ///
    /// # Errors
    /// `Evaluation` if the graph cannot be evaluated.
    pub fn reset(&mut self) -> Result<SimulationState, SimulationError> {
        self.records.clear();
        self.last_quiz = None;
        tracing::debug!(simulated_user = %self.user_id, "test mode session reset");
        self.state()
    }

    fn decide(&mut self, mission_id: MissionId, decision: ModerationDecision) -> Result<SimulationState, SimulationError> {
        let (_, record) = self.open_record(mission_id)?;
        let mission = self.mission(mission_id)?;
        let outcome = moderate(mission, &record, decision, Utc::now(), self.policy)?;
        self.records.insert(mission_id, outcome.record);
        self.state()
    }

    fn mission(&self, mission_id: MissionId) -> Result<&Mission, SimulationError> {
        self.graph
            .mission(mission_id)
            .ok_or(SimulationError::UnknownMission(mission_id))
    }

    /// Current evaluation and the record it implies for `mission_id`
    fn open_record(&self, mission_id: MissionId) -> Result<(Evaluation, UserMission), SimulationError> {
        let state = self.state()?;
        let record = state
            .evaluation
            .record_for(self.user_id, mission_id, self.records.get(&mission_id))
            .ok_or(SimulationError::UnknownMission(mission_id))?;
        Ok((state.evaluation, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::LockReason;
    use crate::types::{CampaignId, ConfirmationType, MissionDependency, MissionType};

    fn session() -> (TestModeSession, Vec<MissionId>) {
        let campaign = CampaignId::new();
        let a = Mission::new(campaign, "A", MissionType::Custom).with_rewards(100, 10);
        let b = Mission::new(campaign, "B", MissionType::Custom)
            .with_confirmation(ConfirmationType::ManualReview)
            .with_rewards(50, 5);
        let c = Mission::new(campaign, "C", MissionType::Custom).with_min_rank(3);
        let ids = vec![a.id, b.id, c.id];
        let graph = MissionGraph::build(
            campaign,
            [a, b, c],
            [MissionDependency::new(ids[0], ids[1]), MissionDependency::new(ids[1], ids[2])],
        )
        .unwrap();
        let config = EngineConfig::default();
        let (session, state) =
            TestModeSession::initialize(Arc::new(graph), config.rank_ladder().unwrap(), &config).unwrap();
        assert_eq!(state.evaluation.available(), vec![ids[0]]);
        (session, ids)
    }

    #[test]
    fn quick_complete_locked_is_rejected() {
        let (mut s, ids) = session();
        let err = s.quick_complete(ids[1]).unwrap_err();
        assert_eq!(
            err,
            SimulationError::MissionLocked {
                mission: ids[1],
                reason: Some(LockReason::Prerequisites { missing: vec![ids[0]] }),
            }
        );
        assert_eq!(s.records().count(), 0);
    }

    #[test]
    fn quick_complete_unlocks_dependents() {
        let (mut s, ids) = session();
        let state = s.quick_complete(ids[0]).unwrap();
        assert_eq!(state.evaluation.status(ids[0]), Some(MissionStatus::Completed));
        assert_eq!(state.evaluation.status(ids[1]), Some(MissionStatus::Available));
        assert_eq!(state.totals.total_experience, 100);
        assert_eq!(state.rank_level, 2);

        assert!(matches!(
            s.quick_complete(ids[0]),
            Err(SimulationError::Submission(SubmissionError::AlreadyCompleted { .. }))
        ));
    }

    #[test]
    fn submit_review_and_reject_round() {
        let (mut s, ids) = session();
        s.quick_complete(ids[0]).unwrap();

        let state = s
            .submit(ids[1], SubmissionPayload::Custom { response: "done".into() })
            .unwrap();
        assert_eq!(state.evaluation.status(ids[1]), Some(MissionStatus::PendingReview));

        let state = s.reject(ids[1], Some("try again".into())).unwrap();
        assert_eq!(state.evaluation.status(ids[1]), Some(MissionStatus::Available));

        s.submit(ids[1], SubmissionPayload::Custom { response: "again".into() })
            .unwrap();
        let state = s.quick_complete(ids[1]).unwrap();
        assert_eq!(state.evaluation.status(ids[1]), Some(MissionStatus::Completed));
        assert_eq!(state.totals.total_experience, 150);
    }

    #[test]
    fn fixed_rank_previews_gated_missions() {
        let (mut s, ids) = session();
        s.quick_complete(ids[0]).unwrap();
        s.quick_complete(ids[1]).unwrap();

        let state = s.state().unwrap();
        assert!(state.evaluation.lock_reason(ids[2]).unwrap().is_rank_gated());

        let state = s.set_rank_mode(RankMode::Fixed(3)).unwrap();
        assert_eq!(state.evaluation.status(ids[2]), Some(MissionStatus::Available));
    }

    #[test]
    fn reset_clears_history() {
        let (mut s, ids) = session();
        s.quick_complete(ids[0]).unwrap();
        let state = s.reset().unwrap();
        assert_eq!(state.totals, RewardTotals::default());
        assert_eq!(state.evaluation.available(), vec![ids[0]]);
    }

    #[test]
    fn unknown_mission() {
        let (mut s, _) = session();
        let ghost = MissionId::new();
        assert_eq!(s.quick_complete(ghost), Err(SimulationError::UnknownMission(ghost)));
    }
}
