//! Progression service
//!
//! Request-scoped orchestration over a [`ProgressionStore`]: fetch a
//! consistent snapshot, run the pure engine, persist with compare-and-set
//! and apply reward grants idempotently.

use crate::store::{ProgressionStore, StoreError};
use mpe_core::aggregator::{aggregate, reconcile, RankLadder, RankProgress, ReconciliationReport, RewardTotals};
use mpe_core::config::EngineConfig;
use mpe_core::evaluator::{evaluate, Evaluation};
use mpe_core::graph::MissionGraph;
use mpe_core::moderation::{self, ModerationDecision};
use mpe_core::payload::SubmissionPayload;
use mpe_core::submission::{QuizScore, SubmissionPipeline};
use mpe_core::test_mode::{SimulationState, TestModeSession};
use mpe_core::types::{CampaignId, Mission, MissionId, RewardGrant, UserId, UserMission};
use mpe_core::{
    ConfigError, EngineError, EvaluationError, GraphError, ModerationError, SimulationError, SubmissionError,
    TransitionError, PROGRESSION_UNAVAILABLE,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Service errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("mission {mission} is not part of campaign {campaign}")]
    UnknownMission { campaign: CampaignId, mission: MissionId },
}

macro_rules! engine_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ServiceError {
                fn from(e: $ty) -> Self {
                    Self::Engine(e.into())
                }
            }
        )*
    };
}

engine_error!(
    GraphError,
    EvaluationError,
    SubmissionError,
    ModerationError,
    SimulationError,
    ConfigError,
);

impl From<TransitionError> for ServiceError {
    fn from(e: TransitionError) -> Self {
        Self::Engine(SubmissionError::from(e).into())
    }
}

impl ServiceError {
    /// Submission error behind this failure, if any
    #[must_use]
    pub fn submission(&self) -> Option<&SubmissionError> {
        match self {
            Self::Engine(EngineError::Submission(e)) => Some(e),
            _ => None,
        }
    }

    /// Text safe to show to the acting user
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Engine(e) => e.user_message(),
            Self::Store(StoreError::Conflict { .. }) => {
                "this mission was updated elsewhere, reload and try again".to_string()
            }
            Self::UnknownMission { .. } => "mission not found".to_string(),
            Self::Store(_) => PROGRESSION_UNAVAILABLE.to_string(),
        }
    }
}

/// Acting user as supplied by the identity collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub rank_level: u32,
}

impl Actor {
    #[inline]
    #[must_use]
    pub fn new(user_id: UserId, rank_level: u32) -> Self {
        Self { user_id, rank_level }
    }
}

/// Read model shared by every progression view
#[derive(Debug, Clone)]
pub struct ProgressionView {
    pub evaluation: Evaluation,
    pub totals: RewardTotals,
    /// Rank level earned by these totals under the configured ladder
    pub earned_rank: u32,
    pub next_rank: Option<RankProgress>,
}

/// Result of an accepted submission
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub record: UserMission,
    pub reward: Option<RewardGrant>,
    pub quiz: Option<QuizScore>,
    /// Progression after the submission was persisted
    pub view: ProgressionView,
}

struct Snapshot {
    graph: MissionGraph,
    records: Vec<UserMission>,
}

impl Snapshot {
    /// The most advanced record for a mission, if any
    fn existing(&self, mission_id: MissionId) -> Option<&UserMission> {
        self.records
            .iter()
            .filter(|r| r.mission_id == mission_id)
            .max_by_key(|r| r.status.progress_rank())
    }
}

/// Progression service
pub struct ProgressionService {
    store: Arc<dyn ProgressionStore>,
    config: EngineConfig,
    ladder: RankLadder,
    pipeline: SubmissionPipeline,
}

impl ProgressionService {
    /// Create a service over `store`
    ///
    /// # Errors
    /// `Config` if the rank ladder is invalid.
    pub fn new(store: Arc<dyn ProgressionStore>, config: EngineConfig) -> Result<Self, ServiceError> {
        let ladder = config.rank_ladder()?;
        let pipeline = SubmissionPipeline::new(&config);
        Ok(Self {
            store,
            config,
            ladder,
            pipeline,
        })
    }

    /// Rank ladder in use
    #[must_use]
    pub fn ladder(&self) -> &RankLadder {
        &self.ladder
    }

    /// Load and validate a campaign graph
    pub async fn load_graph(&self, campaign_id: CampaignId) -> Result<MissionGraph, ServiceError> {
        let (missions, dependencies) = tokio::try_join!(
            self.store.load_missions(campaign_id),
            self.store.load_dependencies(campaign_id),
        )?;
        MissionGraph::build(campaign_id, missions, dependencies).map_err(|e| {
            tracing::error!(campaign = %campaign_id, error = %e, "stored campaign graph is invalid");
            ServiceError::from(e)
        })
    }

    async fn snapshot(&self, user_id: UserId, campaign_id: CampaignId) -> Result<Snapshot, ServiceError> {
        let (graph, records) = tokio::try_join!(self.load_graph(campaign_id), async {
            self.store
                .load_user_missions(user_id, campaign_id)
                .await
                .map_err(ServiceError::from)
        })?;
        Ok(Snapshot { graph, records })
    }

    fn view_of(&self, snapshot: &Snapshot, actor: Actor) -> Result<ProgressionView, ServiceError> {
        let evaluation = evaluate(&snapshot.graph, &snapshot.records, actor.rank_level)?;
        for warning in evaluation.warnings() {
            tracing::warn!(user = %actor.user_id, %warning, "ignored user mission record");
        }
        let totals = aggregate(&snapshot.records, &snapshot.graph);
        Ok(ProgressionView {
            earned_rank: self.ladder.level_for(&totals),
            next_rank: self.ladder.next(&totals),
            evaluation,
            totals,
        })
    }

    /// Evaluate the actor's progression through a campaign
    pub async fn view(&self, actor: Actor, campaign_id: CampaignId) -> Result<ProgressionView, ServiceError> {
        let snapshot = self.snapshot(actor.user_id, campaign_id).await?;
        self.view_of(&snapshot, actor)
    }

    /// Mark an AVAILABLE mission as started
    pub async fn start(
        &self,
        actor: Actor,
        campaign_id: CampaignId,
        mission_id: MissionId,
    ) -> Result<UserMission, ServiceError> {
        let snapshot = self.snapshot(actor.user_id, campaign_id).await?;
        let view = self.view_of(&snapshot, actor)?;
        let existing = snapshot.existing(mission_id);
        let record = view
            .evaluation
            .record_for(actor.user_id, mission_id, existing)
            .ok_or(ServiceError::UnknownMission {
                campaign: campaign_id,
                mission: mission_id,
            })?;

        let mut started = self.pipeline.start(&record, chrono::Utc::now())?;
        if started != record || existing.is_none() {
            started.version = self
                .store
                .save_user_mission(&started, existing.map(|r| r.version))
                .await?;
        }
        Ok(started)
    }

    /// Run a submission through the pipeline and persist the outcome.
    ///
    /// A failed quiz attempt is persisted before the error is returned.
    pub async fn submit(
        &self,
        actor: Actor,
        campaign_id: CampaignId,
        mission_id: MissionId,
        payload: SubmissionPayload,
    ) -> Result<SubmissionReceipt, ServiceError> {
        let snapshot = self.snapshot(actor.user_id, campaign_id).await?;
        let view = self.view_of(&snapshot, actor)?;
        let mission = find_mission(&snapshot.graph, mission_id)?;
        let existing = snapshot.existing(mission_id);
        let expected = existing.map(|r| r.version);
        let record = view
            .evaluation
            .record_for(actor.user_id, mission_id, existing)
            .ok_or(ServiceError::UnknownMission {
                campaign: campaign_id,
                mission: mission_id,
            })?;

        let mut outcome = match self.pipeline.submit(mission, &record, payload, chrono::Utc::now()) {
            Ok(outcome) => outcome,
            Err(e) => {
                if let SubmissionError::QuizFailed { attempts_used, .. } = e {
                    let mut failed = record.clone();
                    failed.attempts = attempts_used;
                    self.store.save_user_mission(&failed, expected).await?;
                }
                tracing::info!(
                    user = %actor.user_id,
                    mission = %mission_id,
                    error = %e,
                    "submission rejected"
                );
                return Err(e.into());
            }
        };

        outcome.record.version = self.store.save_user_mission(&outcome.record, expected).await?;
        if let Some(grant) = &outcome.reward {
            self.apply_reward(grant).await?;
        }
        tracing::info!(
            user = %actor.user_id,
            mission = %mission_id,
            status = %outcome.status,
            "submission accepted"
        );

        let view = self.view(actor, campaign_id).await?;
        Ok(SubmissionReceipt {
            record: outcome.record,
            reward: outcome.reward,
            quiz: outcome.quiz,
            view,
        })
    }

    /// Apply a moderator's decision to a PENDING_REVIEW record
    pub async fn moderate(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        mission_id: MissionId,
        decision: ModerationDecision,
    ) -> Result<UserMission, ServiceError> {
        let snapshot = self.snapshot(user_id, campaign_id).await?;
        let mission = find_mission(&snapshot.graph, mission_id)?;
        let existing = snapshot.existing(mission_id);
        let record = existing
            .cloned()
            .unwrap_or_else(|| UserMission::new(user_id, mission_id));

        let mut outcome = moderation::moderate(mission, &record, decision, chrono::Utc::now(), self.config.moderation)?;
        outcome.record.version = self
            .store
            .save_user_mission(&outcome.record, existing.map(|r| r.version))
            .await?;
        if let Some(grant) = &outcome.reward {
            self.apply_reward(grant).await?;
        }
        tracing::info!(user = %user_id, mission = %mission_id, status = %outcome.status, "moderation applied");
        Ok(outcome.record)
    }

    async fn apply_reward(&self, grant: &RewardGrant) -> Result<(), ServiceError> {
        let fresh = self.store.apply_reward_counters(grant).await?;
        for competency in &grant.competencies {
            self.store
                .increment_user_competency(
                    grant.user_id,
                    competency.competency_id,
                    u64::from(competency.points),
                    grant.key(),
                )
                .await?;
        }
        if fresh {
            tracing::debug!(
                user = %grant.user_id,
                mission = %grant.mission_id,
                experience = grant.experience,
                mana = grant.mana,
                "reward applied"
            );
        } else {
            tracing::warn!(user = %grant.user_id, mission = %grant.mission_id, "reward already applied, skipped");
        }
        Ok(())
    }

    /// Recompute a user's totals from history across `campaigns` and
    /// compare them with the stored counters; optionally repair drift.
    pub async fn reconcile(
        &self,
        user_id: UserId,
        campaigns: &[CampaignId],
        repair: bool,
    ) -> Result<ReconciliationReport, ServiceError> {
        let mut catalog: HashMap<MissionId, Mission> = HashMap::new();
        let mut records = Vec::new();
        for &campaign_id in campaigns {
            let snapshot = self.snapshot(user_id, campaign_id).await?;
            catalog.extend(snapshot.graph.missions().map(|m| (m.id, m.clone())));
            records.extend(snapshot.records);
        }

        let stored = self.store.load_counters(user_id).await?;
        let report = reconcile(stored, &records, &catalog);
        if !report.is_consistent() {
            tracing::warn!(
                user = %user_id,
                experience_drift = report.drift.experience,
                mana_drift = report.drift.mana,
                repair,
                "reward counters drifted from history"
            );
            if repair {
                self.store.replace_counters(user_id, report.repaired()).await?;
            }
        }
        Ok(report)
    }

    /// Start a test-mode session over a campaign. Nothing is written back.
    pub async fn test_session(
        &self,
        campaign_id: CampaignId,
    ) -> Result<(TestModeSession, SimulationState), ServiceError> {
        let graph = self.load_graph(campaign_id).await?;
        let started = TestModeSession::initialize(Arc::new(graph), self.ladder.clone(), &self.config)?;
        Ok(started)
    }
}

fn find_mission(graph: &MissionGraph, mission_id: MissionId) -> Result<&Mission, ServiceError> {
    graph.mission(mission_id).ok_or(ServiceError::UnknownMission {
        campaign: graph.campaign_id(),
        mission: mission_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpe_core::types::{MissionStatus, MissionType, BASE_RANK_LEVEL};

    #[test]
    fn existing_prefers_most_advanced_duplicate() {
        let campaign = CampaignId::new();
        let mission = Mission::new(campaign, "Briefing", MissionType::Custom);
        let user = UserId::new();
        let mut stale = UserMission::new(user, mission.id).with_status(MissionStatus::Available);
        stale.version = 3;
        let mut pending = UserMission::new(user, mission.id).with_status(MissionStatus::PendingReview);
        pending.version = 7;

        let snapshot = Snapshot {
            graph: MissionGraph::build(campaign, vec![mission.clone()], vec![]).unwrap(),
            records: vec![stale, pending.clone()],
        };
        let evaluation = evaluate(&snapshot.graph, &snapshot.records, BASE_RANK_LEVEL).unwrap();

        let existing = snapshot.existing(mission.id).unwrap();
        assert_eq!(existing, &pending);
        assert_eq!(evaluation.status(mission.id), Some(existing.status));
        assert!(snapshot.existing(MissionId::new()).is_none());
    }
}
