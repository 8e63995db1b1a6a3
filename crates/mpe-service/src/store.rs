//! Persistence collaborator contract
//!
//! The engine never locks. Atomicity of a read-modify-write on one
//! `UserMission` row is the store's job, expressed here as a
//! compare-and-set on the row version. Reward writes are
//! idempotent increments keyed by [`GrantKey`].

use mpe_core::aggregator::StoredCounters;
use mpe_core::types::{
    CampaignId, CompetencyId, GrantKey, Mission, MissionDependency, MissionId, RewardGrant, UserId,
    UserMission,
};

/// Store failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("campaign {0} not found")]
    CampaignNotFound(CampaignId),

    /// Compare-and-set lost against a concurrent write
    #[error("mission {mission} changed concurrently (expected version {expected:?}, found {found:?})")]
    Conflict {
        user: UserId,
        mission: MissionId,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Data access used by the progression service
#[async_trait::async_trait]
pub trait ProgressionStore: Send + Sync {
    /// All missions of a campaign
    async fn load_missions(&self, campaign_id: CampaignId) -> Result<Vec<Mission>, StoreError>;

    /// All prerequisite edges of a campaign
    async fn load_dependencies(&self, campaign_id: CampaignId) -> Result<Vec<MissionDependency>, StoreError>;

    /// The user's records for missions of this campaign
    async fn load_user_missions(&self, user_id: UserId, campaign_id: CampaignId)
        -> Result<Vec<UserMission>, StoreError>;

    /// Upsert `record` if the stored row version still equals `expected`
    /// (`None` meaning no row yet). Fails with [`StoreError::Conflict`]
    /// otherwise.
    ///
    /// Returns the version now stored, which the store bumps on every
    /// successful save whatever `record.version` says.
    async fn save_user_mission(&self, record: &UserMission, expected: Option<u64>) -> Result<u64, StoreError>;

    /// Add competency points once per `(grant, competency)`.
    ///
    /// Returns `false` when this grant already applied them.
    async fn increment_user_competency(
        &self,
        user_id: UserId,
        competency_id: CompetencyId,
        points: u64,
        grant: GrantKey,
    ) -> Result<bool, StoreError>;

    /// Add experience and mana once per grant.
    ///
    /// Returns `false` when the grant was already applied.
    async fn apply_reward_counters(&self, grant: &RewardGrant) -> Result<bool, StoreError>;

    /// Running counters for a user
    async fn load_counters(&self, user_id: UserId) -> Result<StoredCounters, StoreError>;

    /// Overwrite running counters, used when repairing drift
    async fn replace_counters(&self, user_id: UserId, counters: StoredCounters) -> Result<(), StoreError>;
}
