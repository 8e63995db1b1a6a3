//! Reward & Competency Aggregator
//!
//! Totals are always recomputed from the full history of COMPLETED records.
//! Stored running counters are a cache; [`reconcile`] audits them against
//! [`aggregate`] and reports the drift.

use crate::error::ConfigError;
use crate::graph::MissionGraph;
use crate::types::{CompetencyId, Mission, MissionId, MissionStatus, RewardGrant, UserMission, BASE_RANK_LEVEL};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Lookup of missions by id
pub trait MissionCatalog {
    /// Mission with the given id
    fn mission(&self, id: MissionId) -> Option<&Mission>;
}

impl MissionCatalog for MissionGraph {
    fn mission(&self, id: MissionId) -> Option<&Mission> {
        MissionGraph::mission(self, id)
    }
}

impl MissionCatalog for HashMap<MissionId, Mission> {
    fn mission(&self, id: MissionId) -> Option<&Mission> {
        self.get(&id)
    }
}

impl MissionCatalog for BTreeMap<MissionId, Mission> {
    fn mission(&self, id: MissionId) -> Option<&Mission> {
        self.get(&id)
    }
}

/// Rewards earned by one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardTotals {
    pub total_experience: u64,
    pub total_mana: u64,
    pub completed_missions: u32,
    pub competency_totals: BTreeMap<CompetencyId, u64>,
}

impl RewardTotals {
    /// Points accumulated for one competency
    #[must_use]
    pub fn competency(&self, competency_id: CompetencyId) -> u64 {
        self.competency_totals.get(&competency_id).copied().unwrap_or(0)
    }

    fn add_mission(&mut self, mission: &Mission) {
        self.total_experience += u64::from(mission.experience_reward);
        self.total_mana += u64::from(mission.mana_reward);
        self.completed_missions += 1;
        for grant in &mission.competencies {
            *self.competency_totals.entry(grant.competency_id).or_default() += u64::from(grant.points);
        }
    }
}

/// Sum rewards over COMPLETED records.
///
/// Each mission counts once however many records reference it; records for
/// missions the catalog does not know are skipped. The result does not
/// depend on record order.
pub fn aggregate<C>(records: &[UserMission], missions: &C) -> RewardTotals
where
    C: MissionCatalog + ?Sized,
{
    let completed: BTreeSet<MissionId> = records
        .iter()
        .filter(|r| r.status == MissionStatus::Completed)
        .map(|r| r.mission_id)
        .collect();

    let mut totals = RewardTotals::default();
    for id in completed {
        match missions.mission(id) {
            Some(mission) => totals.add_mission(mission),
            None => tracing::debug!(mission = %id, "completed record for unknown mission skipped"),
        }
    }
    totals
}

/// One rung of the rank ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankThreshold {
    pub level: u32,
    pub name: String,
    #[serde(default)]
    pub min_experience: u64,
    #[serde(default)]
    pub min_missions: u32,
    #[serde(default)]
    pub competency_minimums: BTreeMap<CompetencyId, u64>,
}

impl RankThreshold {
    /// Create a threshold with no competency requirements
    #[must_use]
    pub fn new(level: u32, name: impl Into<String>, min_experience: u64, min_missions: u32) -> Self {
        Self {
            level,
            name: name.into(),
            min_experience,
            min_missions,
            competency_minimums: BTreeMap::new(),
        }
    }

    /// With a competency minimum
    #[must_use]
    pub fn with_competency_minimum(mut self, competency_id: CompetencyId, points: u64) -> Self {
        self.competency_minimums.insert(competency_id, points);
        self
    }

    /// Whether the totals satisfy this threshold on its own
    #[must_use]
    pub fn is_met_by(&self, totals: &RewardTotals) -> bool {
        totals.total_experience >= self.min_experience
            && totals.completed_missions >= self.min_missions
            && self
                .competency_minimums
                .iter()
                .all(|(id, min)| totals.competency(*id) >= *min)
    }
}

/// What is still needed for the next rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankProgress {
    pub next_level: u32,
    pub next_name: String,
    pub experience_needed: u64,
    pub missions_needed: u32,
    pub competency_needed: BTreeMap<CompetencyId, u64>,
}

/// Thresholds sorted by ascending level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RankLadder {
    thresholds: Vec<RankThreshold>,
}

impl RankLadder {
    /// Build a ladder, sorting by level.
    ///
    /// # Errors
    /// `DuplicateRankLevel` if two thresholds share a level.
    pub fn new(mut thresholds: Vec<RankThreshold>) -> Result<Self, ConfigError> {
        thresholds.sort_by_key(|t| t.level);
        if let Some(pair) = thresholds.windows(2).find(|w| w[0].level == w[1].level) {
            return Err(ConfigError::DuplicateRankLevel(pair[0].level));
        }
        Ok(Self { thresholds })
    }

    /// Thresholds in ascending order
    #[inline]
    #[must_use]
    pub fn thresholds(&self) -> &[RankThreshold] {
        &self.thresholds
    }

    /// Highest threshold reached. Thresholds are walked in ascending order
    /// and the walk stops at the first one not met, so a rank is never
    /// reached by skipping a lower one.
    #[must_use]
    pub fn current(&self, totals: &RewardTotals) -> Option<&RankThreshold> {
        self.thresholds
            .iter()
            .take_while(|t| t.is_met_by(totals))
            .last()
    }

    /// Level reached, or the base rank if none
    #[must_use]
    pub fn level_for(&self, totals: &RewardTotals) -> u32 {
        self.current(totals).map_or(BASE_RANK_LEVEL, |t| t.level)
    }

    /// Distance to the first threshold not yet met
    #[must_use]
    pub fn next(&self, totals: &RewardTotals) -> Option<RankProgress> {
        let next = self.thresholds.iter().find(|t| !t.is_met_by(totals))?;
        let competency_needed = next
            .competency_minimums
            .iter()
            .filter_map(|(id, min)| {
                let have = totals.competency(*id);
                (have < *min).then(|| (*id, min - have))
            })
            .collect();

        Some(RankProgress {
            next_level: next.level,
            next_name: next.name.clone(),
            experience_needed: next.min_experience.saturating_sub(totals.total_experience),
            missions_needed: next.min_missions.saturating_sub(totals.completed_missions),
            competency_needed,
        })
    }
}

/// Running counters as stored on the user row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCounters {
    pub experience: u64,
    pub mana: u64,
    pub competencies: BTreeMap<CompetencyId, u64>,
}

impl StoredCounters {
    /// Apply one reward grant incrementally
    pub fn apply(&mut self, grant: &RewardGrant) {
        self.experience += u64::from(grant.experience);
        self.mana += u64::from(grant.mana);
        for c in &grant.competencies {
            *self.competencies.entry(c.competency_id).or_default() += u64::from(c.points);
        }
    }
}

impl From<&RewardTotals> for StoredCounters {
    fn from(totals: &RewardTotals) -> Self {
        Self {
            experience: totals.total_experience,
            mana: totals.total_mana,
            competencies: totals.competency_totals.clone(),
        }
    }
}

/// Signed difference stored minus expected
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drift {
    pub experience: i64,
    pub mana: i64,
    pub competencies: BTreeMap<CompetencyId, i64>,
}

impl Drift {
    /// No drift at all
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.experience == 0 && self.mana == 0 && self.competencies.is_empty()
    }
}

/// Result of auditing stored counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub expected: RewardTotals,
    pub stored: StoredCounters,
    pub drift: Drift,
}

impl ReconciliationReport {
    /// Whether the stored counters match the history
    #[inline]
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.drift.is_zero()
    }

    /// Counters recomputed from the history
    #[must_use]
    pub fn repaired(&self) -> StoredCounters {
        StoredCounters::from(&self.expected)
    }
}

/// Compare stored counters with totals recomputed from history.
pub fn reconcile<C>(stored: StoredCounters, records: &[UserMission], missions: &C) -> ReconciliationReport
where
    C: MissionCatalog + ?Sized,
{
    let expected = aggregate(records, missions);

    let ids: BTreeSet<CompetencyId> = expected
        .competency_totals
        .keys()
        .chain(stored.competencies.keys())
        .copied()
        .collect();
    let competencies = ids
        .into_iter()
        .filter_map(|id| {
            let have = stored.competencies.get(&id).copied().unwrap_or(0);
            let diff = signed_diff(have, expected.competency(id));
            (diff != 0).then_some((id, diff))
        })
        .collect();

    let drift = Drift {
        experience: signed_diff(stored.experience, expected.total_experience),
        mana: signed_diff(stored.mana, expected.total_mana),
        competencies,
    };

    if drift.is_zero() {
        tracing::debug!(experience = expected.total_experience, "stored counters consistent");
    } else {
        tracing::warn!(
            experience_drift = drift.experience,
            mana_drift = drift.mana,
            competencies_drifted = drift.competencies.len(),
            "stored counters drifted from history"
        );
    }

    ReconciliationReport {
        expected,
        stored,
        drift,
    }
}

fn signed_diff(stored: u64, expected: u64) -> i64 {
    let to_i64 = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
    to_i64(stored).saturating_sub(to_i64(expected))
}
