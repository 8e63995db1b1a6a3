//! Progression Evaluator
//!
//! Derives a status for every mission of one campaign from the graph, the
//! user's persisted records and the user's rank. Every view (cadet map,
//! dashboard, test-mode panel) renders the [`Evaluation`] returned here and
//! never computes status on its own.

use crate::error::EvaluationError;
use crate::graph::MissionGraph;
use crate::types::{CampaignId, MissionId, MissionStatus, UserId, UserMission};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Why a mission is LOCKED
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum LockReason {
    /// Prerequisites not yet COMPLETED
    Prerequisites { missing: Vec<MissionId> },
    /// User rank below the mission's minimum
    Rank { required: u32, current: u32 },
    /// Both of the above
    PrerequisitesAndRank {
        missing: Vec<MissionId>,
        required: u32,
        current: u32,
    },
}

impl LockReason {
    fn from_checks(missing: Vec<MissionId>, required: u32, current: u32) -> Option<Self> {
        let rank_ok = current >= required;
        match (missing.is_empty(), rank_ok) {
            (true, true) => None,
            (false, true) => Some(Self::Prerequisites { missing }),
            (true, false) => Some(Self::Rank { required, current }),
            (false, false) => Some(Self::PrerequisitesAndRank {
                missing,
                required,
                current,
            }),
        }
    }

    /// Prerequisites still missing, if any
    #[must_use]
    pub fn missing_prerequisites(&self) -> &[MissionId] {
        match self {
            Self::Prerequisites { missing } | Self::PrerequisitesAndRank { missing, .. } => missing,
            Self::Rank { .. } => &[],
        }
    }

    /// Whether the rank gate is one of the causes
    #[must_use]
    pub fn is_rank_gated(&self) -> bool {
        matches!(self, Self::Rank { .. } | Self::PrerequisitesAndRank { .. })
    }
}

/// Number of missions per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub locked: usize,
    pub available: usize,
    pub in_progress: usize,
    pub pending_review: usize,
    pub completed: usize,
}

impl StatusCounts {
    fn record(&mut self, status: MissionStatus) {
        match status {
            MissionStatus::Locked => self.locked += 1,
            MissionStatus::Available => self.available += 1,
            MissionStatus::InProgress => self.in_progress += 1,
            MissionStatus::PendingReview => self.pending_review += 1,
            MissionStatus::Completed => self.completed += 1,
        }
    }

    /// Total missions counted
    #[must_use]
    pub fn total(&self) -> usize {
        self.locked + self.available + self.in_progress + self.pending_review + self.completed
    }

    /// Completed share in whole percent; 0 for an empty campaign
    #[must_use]
    pub fn completion_percent(&self) -> u8 {
        match self.total() {
            0 => 0,
            total => u8::try_from(self.completed * 100 / total).unwrap_or(100),
        }
    }
}

/// Result of one evaluation pass
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    campaign_id: CampaignId,
    user_rank: u32,
    statuses: BTreeMap<MissionId, MissionStatus>,
    lock_reasons: BTreeMap<MissionId, LockReason>,
    order: Vec<MissionId>,
    warnings: Vec<EvaluationError>,
    graph_fingerprint: String,
}

impl Evaluation {
    /// Campaign evaluated
    #[inline]
    #[must_use]
    pub fn campaign_id(&self) -> CampaignId {
        self.campaign_id
    }

    /// Rank the evaluation was computed for
    #[inline]
    #[must_use]
    pub fn user_rank(&self) -> u32 {
        self.user_rank
    }

    /// Status of one mission
    #[inline]
    #[must_use]
    pub fn status(&self, mission_id: MissionId) -> Option<MissionStatus> {
        self.statuses.get(&mission_id).copied()
    }

    /// All statuses
    #[inline]
    #[must_use]
    pub fn statuses(&self) -> &BTreeMap<MissionId, MissionStatus> {
        &self.statuses
    }

    /// Missions in the topological order they were resolved
    #[inline]
    #[must_use]
    pub fn order(&self) -> &[MissionId] {
        &self.order
    }

    /// Why a LOCKED mission is locked
    #[inline]
    #[must_use]
    pub fn lock_reason(&self, mission_id: MissionId) -> Option<&LockReason> {
        self.lock_reasons.get(&mission_id)
    }

    /// AVAILABLE missions, in topological order
    #[must_use]
    pub fn available(&self) -> Vec<MissionId> {
        self.with_status(MissionStatus::Available)
    }

    /// Missions with the given status, in topological order
    #[must_use]
    pub fn with_status(&self, status: MissionStatus) -> Vec<MissionId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.status(*id) == Some(status))
            .collect()
    }

    /// Per-status counts
    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for status in self.statuses.values() {
            counts.record(*status);
        }
        counts
    }

    /// Recovered problems with the input records
    #[inline]
    #[must_use]
    pub fn warnings(&self) -> &[EvaluationError] {
        &self.warnings
    }

    /// Fingerprint of the graph this evaluation was computed from
    #[inline]
    #[must_use]
    pub fn graph_fingerprint(&self) -> &str {
        &self.graph_fingerprint
    }

    /// Record reflecting this evaluation, for persisting or submitting.
    ///
    /// An existing record keeps its history; its status is replaced by the
    /// evaluated one unless the submission pipeline already advanced it.
    /// Without an existing record a fresh one is materialized. Returns
    /// `None` for missions outside the evaluated graph.
    #[must_use]
    pub fn record_for(
        &self,
        user_id: UserId,
        mission_id: MissionId,
        existing: Option<&UserMission>,
    ) -> Option<UserMission> {
        let status = self.status(mission_id)?;
        let record = match existing {
            Some(record) if record.status.is_advanced() => record.clone(),
            Some(record) => record.clone().with_status(status),
            None => UserMission::new(user_id, mission_id).with_status(status),
        };
        Some(record)
    }
}

/// Kahn's algorithm. Ready missions are drawn from an ordered set so the
/// order is deterministic for a given graph.
///
/// # Errors
/// `UnresolvedCycle` listing every mission that could not be placed.
pub fn topological_order(graph: &MissionGraph) -> Result<Vec<MissionId>, EvaluationError> {
    let mut indegree: HashMap<MissionId, usize> = graph
        .mission_ids()
        .map(|id| (id, graph.prerequisite_ids(id).count()))
        .collect();

    let mut ready: BTreeSet<MissionId> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(indegree.len());
    while let Some(id) = ready.pop_first() {
        order.push(id);
        for dependent in graph.dependent_ids(id) {
            if let Some(degree) = indegree.get_mut(&dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() < indegree.len() {
        let placed: BTreeSet<MissionId> = order.iter().copied().collect();
        let mut unresolved: Vec<MissionId> = indegree
            .into_keys()
            .filter(|id| !placed.contains(id))
            .collect();
        unresolved.sort();
        return Err(EvaluationError::UnresolvedCycle { unresolved });
    }
    Ok(order)
}

/// Evaluate every mission of `graph` for one user.
///
/// # Errors
/// `UnresolvedCycle` if the graph still contains a cycle. Records that
/// reference unknown missions are not errors; they are skipped and listed
/// in [`Evaluation::warnings`].
pub fn evaluate(
    graph: &MissionGraph,
    records: &[UserMission],
    user_rank: u32,
) -> Result<Evaluation, EvaluationError> {
    let mut warnings = Vec::new();
    let persisted = index_records(graph, records, &mut warnings);

    let order = topological_order(graph).map_err(|e| {
        tracing::error!(
            campaign = %graph.campaign_id(),
            error = %e,
            "campaign graph contains a cycle, refusing to evaluate"
        );
        e
    })?;

    let mut statuses = BTreeMap::new();
    let mut lock_reasons = BTreeMap::new();

    for id in &order {
        let id = *id;
        if let Some(status) = persisted.get(&id).copied().filter(|s| s.is_advanced()) {
            statuses.insert(id, status);
            continue;
        }

        let mut missing: Vec<MissionId> = graph
            .prerequisite_ids(id)
            .filter(|p| statuses.get(p) != Some(&MissionStatus::Completed))
            .collect();
        missing.sort();

        let required = graph.mission(id).map_or(0, |m| m.min_rank);
        match LockReason::from_checks(missing, required, user_rank) {
            None => {
                statuses.insert(id, MissionStatus::Available);
            }
            Some(reason) => {
                statuses.insert(id, MissionStatus::Locked);
                lock_reasons.insert(id, reason);
            }
        }
    }

    let evaluation = Evaluation {
        campaign_id: graph.campaign_id(),
        user_rank,
        statuses,
        lock_reasons,
        order,
        warnings,
        graph_fingerprint: graph.fingerprint().to_string(),
    };

    let counts = evaluation.counts();
    tracing::debug!(
        campaign = %evaluation.campaign_id,
        rank = user_rank,
        locked = counts.locked,
        available = counts.available,
        completed = counts.completed,
        warnings = evaluation.warnings.len(),
        "progression evaluated"
    );
    Ok(evaluation)
}

fn index_records(
    graph: &MissionGraph,
    records: &[UserMission],
    warnings: &mut Vec<EvaluationError>,
) -> HashMap<MissionId, MissionStatus> {
    let mut persisted: HashMap<MissionId, MissionStatus> = HashMap::with_capacity(records.len());

    for record in records {
        if !graph.contains(record.mission_id) {
            tracing::warn!(
                user = %record.user_id,
                mission = %record.mission_id,
                "ignoring record for unknown mission"
            );
            warnings.push(EvaluationError::UnknownMissionReference {
                user: record.user_id,
                mission: record.mission_id,
            });
            continue;
        }

        match persisted.get(&record.mission_id).copied() {
            None => {
                persisted.insert(record.mission_id, record.status);
            }
            Some(previous) => {
                tracing::warn!(
                    user = %record.user_id,
                    mission = %record.mission_id,
                    %previous,
                    duplicate = %record.status,
                    "duplicate records for one mission, keeping the most advanced"
                );
                if record.status.progress_rank() > previous.progress_rank() {
                    persisted.insert(record.mission_id, record.status);
                }
            }
        }
    }
    persisted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Mission, MissionDependency, MissionType};

    struct Chain {
        graph: MissionGraph,
        ids: Vec<MissionId>,
        user: UserId,
    }

    fn chain(len: usize) -> Chain {
        let campaign = CampaignId::new();
        let missions: Vec<Mission> = (0..len)
            .map(|i| Mission::new(campaign, format!("M{i}"), MissionType::Custom))
            .collect();
        let ids: Vec<MissionId> = missions.iter().map(|m| m.id).collect();
        let deps: Vec<MissionDependency> = ids
            .windows(2)
            .map(|w| MissionDependency::new(w[0], w[1]))
            .collect();
        Chain {
            graph: MissionGraph::build(campaign, missions, deps).unwrap(),
            ids,
            user: UserId::new(),
        }
    }

    #[test]
    fn fresh_user_sees_only_entry_available() {
        let c = chain(3);
        let eval = evaluate(&c.graph, &[], 1).unwrap();
        assert_eq!(eval.status(c.ids[0]), Some(MissionStatus::Available));
        assert_eq!(eval.status(c.ids[1]), Some(MissionStatus::Locked));
        assert_eq!(
            eval.lock_reason(c.ids[1]),
            Some(&LockReason::Prerequisites { missing: vec![c.ids[0]] })
        );
        assert_eq!(eval.order(), c.ids.as_slice());
        assert_eq!(eval.counts().total(), 3);
    }

    #[test]
    fn advanced_records_are_preserved() {
        let c = chain(3);
        let records = vec![
            UserMission::new(c.user, c.ids[0]).with_status(MissionStatus::Completed),
            UserMission::new(c.user, c.ids[1]).with_status(MissionStatus::PendingReview),
        ];
        let eval = evaluate(&c.graph, &records, 1).unwrap();
        assert_eq!(eval.status(c.ids[1]), Some(MissionStatus::PendingReview));
        assert_eq!(eval.status(c.ids[2]), Some(MissionStatus::Locked));
    }

    #[test]
    fn rank_gates_entry_missions() {
        let campaign = CampaignId::new();
        let gated = Mission::new(campaign, "Gated", MissionType::Custom).with_min_rank(3);
        let id = gated.id;
        let graph = MissionGraph::build(campaign, [gated], []).unwrap();

        let eval = evaluate(&graph, &[], 2).unwrap();
        assert_eq!(eval.status(id), Some(MissionStatus::Locked));
        assert_eq!(eval.lock_reason(id), Some(&LockReason::Rank { required: 3, current: 2 }));

        let eval = evaluate(&graph, &[], 3).unwrap();
        assert_eq!(eval.status(id), Some(MissionStatus::Available));
    }

    #[test]
    fn unknown_records_are_ignored_with_warning() {
        let c = chain(2);
        let stray = UserMission::new(c.user, MissionId::new()).with_status(MissionStatus::Completed);
        let eval = evaluate(&c.graph, &[stray], 1).unwrap();
        assert_eq!(eval.warnings().len(), 1);
        assert!(!eval.warnings()[0].is_fatal());
        assert_eq!(eval.counts().completed, 0);
    }

    #[test]
    fn duplicate_records_keep_most_advanced() {
        let c = chain(2);
        let records = vec![
            UserMission::new(c.user, c.ids[0]).with_status(MissionStatus::Completed),
            UserMission::new(c.user, c.ids[0]).with_status(MissionStatus::Available),
        ];
        let eval = evaluate(&c.graph, &records, 1).unwrap();
        assert_eq!(eval.status(c.ids[0]), Some(MissionStatus::Completed));
        assert_eq!(eval.status(c.ids[1]), Some(MissionStatus::Available));
    }

    #[test]
    fn cyclic_draft_is_fatal() {
        let campaign = CampaignId::new();
        let a = Mission::new(campaign, "A", MissionType::Custom);
        let b = Mission::new(campaign, "B", MissionType::Custom);
        let deps = [
            MissionDependency::new(a.id, b.id),
            MissionDependency::new(b.id, a.id),
        ];
        let draft = MissionGraph::build_draft(campaign, [a, b], deps).unwrap();
        let err = evaluate(&draft, &[], 1).unwrap_err();
        assert!(err.is_fatal());
        let EvaluationError::UnresolvedCycle { unresolved } = err else {
            panic!("expected unresolved cycle");
        };
        assert_eq!(unresolved.len(), 2);
    }

    #[test]
    fn record_for_materializes_lazily() {
        let c = chain(2);
        let eval = evaluate(&c.graph, &[], 1).unwrap();

        let fresh = eval.record_for(c.user, c.ids[0], None).unwrap();
        assert_eq!(fresh.status, MissionStatus::Available);

        let stale = UserMission::new(c.user, c.ids[1]).with_status(MissionStatus::Available);
        let refreshed = eval.record_for(c.user, c.ids[1], Some(&stale)).unwrap();
        assert_eq!(refreshed.status, MissionStatus::Locked);

        assert!(eval.record_for(c.user, MissionId::new(), None).is_none());
    }

    #[test]
    fn completion_percent() {
        let counts = StatusCounts {
            completed: 1,
            locked: 2,
            ..StatusCounts::default()
        };
        assert_eq!(counts.completion_percent(), 33);
        assert_eq!(StatusCounts::default().completion_percent(), 0);
    }
}
