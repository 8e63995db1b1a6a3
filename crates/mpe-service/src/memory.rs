//! In-memory store
//!
//! Concurrent maps stand in for database rows. Compare-and-set and the
//! grant ledgers make it safe to share one store across tasks.

use crate::store::{ProgressionStore, StoreError};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use mpe_core::aggregator::StoredCounters;
use mpe_core::types::{
    CampaignId, CompetencyId, GrantKey, Mission, MissionDependency, MissionId, RewardGrant, UserCompetency, UserId,
    UserMission,
};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
struct CampaignRows {
    missions: Vec<Mission>,
    dependencies: Vec<MissionDependency>,
}

impl CampaignRows {
    fn mission_ids(&self) -> BTreeSet<MissionId> {
        self.missions.iter().map(|m| m.id).collect()
    }
}

/// Store backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    campaigns: RwLock<HashMap<CampaignId, CampaignRows>>,
    records: DashMap<(UserId, MissionId), UserMission>,
    counters: DashMap<UserId, StoredCounters>,
    /// Grants whose experience and mana were applied
    applied_counters: DashSet<GrantKey>,
    /// Grants whose points for a competency were applied
    applied_competencies: DashSet<(GrantKey, CompetencyId)>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a campaign's missions and edges
    pub fn insert_campaign(
        &self,
        campaign_id: CampaignId,
        missions: Vec<Mission>,
        dependencies: Vec<MissionDependency>,
    ) {
        tracing::debug!(
            campaign = %campaign_id,
            missions = missions.len(),
            dependencies = dependencies.len(),
            "campaign stored"
        );
        self.campaigns.write().insert(
            campaign_id,
            CampaignRows {
                missions,
                dependencies,
            },
        );
    }

    /// Stored record, if any
    #[must_use]
    pub fn record(&self, user_id: UserId, mission_id: MissionId) -> Option<UserMission> {
        self.records.get(&(user_id, mission_id)).map(|r| r.value().clone())
    }

    /// Competency rows for a user, sorted by competency
    #[must_use]
    pub fn user_competencies(&self, user_id: UserId) -> Vec<UserCompetency> {
        self.counters
            .get(&user_id)
            .map(|c| {
                c.competencies
                    .iter()
                    .map(|(competency_id, points)| UserCompetency {
                        user_id,
                        competency_id: *competency_id,
                        points: *points,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn campaign<T>(&self, campaign_id: CampaignId, f: impl FnOnce(&CampaignRows) -> T) -> Result<T, StoreError> {
        self.campaigns
            .read()
            .get(&campaign_id)
            .map(f)
            .ok_or(StoreError::CampaignNotFound(campaign_id))
    }
}

#[async_trait::async_trait]
impl ProgressionStore for InMemoryStore {
    async fn load_missions(&self, campaign_id: CampaignId) -> Result<Vec<Mission>, StoreError> {
        self.campaign(campaign_id, |rows| rows.missions.clone())
    }

    async fn load_dependencies(&self, campaign_id: CampaignId) -> Result<Vec<MissionDependency>, StoreError> {
        self.campaign(campaign_id, |rows| rows.dependencies.clone())
    }

    async fn load_user_missions(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Vec<UserMission>, StoreError> {
        let ids = self.campaign(campaign_id, CampaignRows::mission_ids)?;
        let mut records: Vec<UserMission> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == user_id && ids.contains(&entry.key().1))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.mission_id);
        Ok(records)
    }

    async fn save_user_mission(&self, record: &UserMission, expected: Option<u64>) -> Result<u64, StoreError> {
        let conflict = |found| StoreError::Conflict {
            user: record.user_id,
            mission: record.mission_id,
            expected,
            found,
        };

        let version = match self.records.entry((record.user_id, record.mission_id)) {
            Entry::Occupied(mut entry) => {
                let found = entry.get().version;
                if expected != Some(found) {
                    return Err(conflict(Some(found)));
                }
                let version = found + 1;
                entry.insert(UserMission {
                    version,
                    ..record.clone()
                });
                version
            }
            Entry::Vacant(entry) => {
                if expected.is_some() {
                    return Err(conflict(None));
                }
                entry.insert(UserMission {
                    version: 1,
                    ..record.clone()
                });
                1
            }
        };
        Ok(version)
    }

    async fn increment_user_competency(
        &self,
        user_id: UserId,
        competency_id: CompetencyId,
        points: u64,
        grant: GrantKey,
    ) -> Result<bool, StoreError> {
        if !self.applied_competencies.insert((grant, competency_id)) {
            return Ok(false);
        }
        *self
            .counters
            .entry(user_id)
            .or_default()
            .competencies
            .entry(competency_id)
            .or_default() += points;
        Ok(true)
    }

    async fn apply_reward_counters(&self, grant: &RewardGrant) -> Result<bool, StoreError> {
        if !self.applied_counters.insert(grant.key()) {
            return Ok(false);
        }
        let mut counters = self.counters.entry(grant.user_id).or_default();
        counters.experience += u64::from(grant.experience);
        counters.mana += u64::from(grant.mana);
        Ok(true)
    }

    async fn load_counters(&self, user_id: UserId) -> Result<StoredCounters, StoreError> {
        Ok(self.counters.get(&user_id).map(|c| c.value().clone()).unwrap_or_default())
    }

    async fn replace_counters(&self, user_id: UserId, counters: StoredCounters) -> Result<(), StoreError> {
        self.counters.insert(user_id, counters);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpe_core::types::{MissionStatus, MissionType};

    fn store_with_mission() -> (InMemoryStore, CampaignId, Mission) {
        let store = InMemoryStore::new();
        let campaign = CampaignId::new();
        let mission = Mission::new(campaign, "Scan", MissionType::OfflineEvent).with_rewards(40, 5);
        store.insert_campaign(campaign, vec![mission.clone()], vec![]);
        (store, campaign, mission)
    }

    #[tokio::test]
    async fn save_is_compare_and_set() {
        let (store, campaign, mission) = store_with_mission();
        let user = UserId::new();
        let record = UserMission::new(user, mission.id).with_status(MissionStatus::Available);

        assert_eq!(store.save_user_mission(&record, None).await.unwrap(), 1);
        let err = store.save_user_mission(&record, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { found: Some(1), .. }));

        let done = record.clone().with_status(MissionStatus::Completed);
        assert_eq!(store.save_user_mission(&done, Some(1)).await.unwrap(), 2);
        let loaded = store.load_user_missions(user, campaign).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, MissionStatus::Completed);
        assert_eq!(loaded[0].version, 2);
    }

    #[tokio::test]
    async fn stale_write_with_same_status_conflicts() {
        let (store, _, mission) = store_with_mission();
        let user = UserId::new();
        let open = UserMission::new(user, mission.id).with_status(MissionStatus::Available);
        store.save_user_mission(&open, None).await.unwrap();

        // Two writers read version 1 and both record one failed attempt
        let mut first = open.clone();
        first.attempts = 1;
        let second = first.clone();
        store.save_user_mission(&first, Some(1)).await.unwrap();
        let err = store.save_user_mission(&second, Some(1)).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                user,
                mission: mission.id,
                expected: Some(1),
                found: Some(2),
            }
        );
        assert_eq!(store.record(user, mission.id).unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn grants_apply_once() {
        let (store, _, mission) = store_with_mission();
        let user = UserId::new();
        let grant = RewardGrant::for_mission(user, &mission);

        assert!(store.apply_reward_counters(&grant).await.unwrap());
        assert!(!store.apply_reward_counters(&grant).await.unwrap());

        let competency = CompetencyId::new();
        assert!(store
            .increment_user_competency(user, competency, 3, grant.key())
            .await
            .unwrap());
        assert!(!store
            .increment_user_competency(user, competency, 3, grant.key())
            .await
            .unwrap());

        let counters = store.load_counters(user).await.unwrap();
        assert_eq!(counters.experience, 40);
        assert_eq!(counters.mana, 5);
        assert_eq!(store.user_competencies(user)[0].points, 3);
    }

    #[tokio::test]
    async fn unknown_campaign() {
        let store = InMemoryStore::new();
        let campaign = CampaignId::new();
        assert_eq!(
            store.load_missions(campaign).await.unwrap_err(),
            StoreError::CampaignNotFound(campaign)
        );
    }
}
