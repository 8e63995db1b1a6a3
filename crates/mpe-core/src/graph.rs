//! Mission Graph Model
//!
//! An immutable adjacency structure over one campaign's missions and
//! prerequisite edges. A published graph is proven acyclic at construction;
//! edits never mutate a graph in place, they return a new instance, so an
//! evaluation can never observe a half-applied edit.
//!
//! # Example
//!
//! ```rust,ignore
//! let graph = MissionGraph::build(campaign_id, missions, dependencies)?;
//! let prerequisites = graph.prerequisites_of(mission_id);
//! let edited = graph.with_dependency(MissionDependency::new(a, b))?;
//! ```

use crate::error::GraphError;
use crate::types::{CampaignId, Mission, MissionDependency, MissionId, MissionRecord};
use petgraph::dot::{Config, Dot};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

/// Whether the graph has been proven acyclic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphKind {
    /// Acyclic; what cadets progress through
    Published,
    /// Editor work in progress; cycles are tolerated until publishing
    Draft,
}

/// Mission graph for one campaign
#[derive(Debug, Clone)]
pub struct MissionGraph {
    campaign_id: CampaignId,
    kind: GraphKind,
    missions: HashMap<MissionId, Mission>,
    adjacency: DiGraphMap<MissionId, ()>,
    fingerprint: String,
}

impl MissionGraph {
    /// Build a published graph.
    ///
    /// # Errors
    /// - `DuplicateMission` / `ForeignMission` for a bad mission set
    /// - `DanglingEdge` if an edge references an unknown mission
    /// - `CycleDetected` if the edges contain a cycle
    pub fn build(
        campaign_id: CampaignId,
        missions: impl IntoIterator<Item = Mission>,
        dependencies: impl IntoIterator<Item = MissionDependency>,
    ) -> Result<Self, GraphError> {
        Self::assemble(campaign_id, GraphKind::Published, missions, dependencies)
    }

    /// Build a draft graph; the cycle check is deferred to [`publish`](Self::publish).
    ///
    /// # Errors
    /// Same as [`build`](Self::build) except `CycleDetected`.
    pub fn build_draft(
        campaign_id: CampaignId,
        missions: impl IntoIterator<Item = Mission>,
        dependencies: impl IntoIterator<Item = MissionDependency>,
    ) -> Result<Self, GraphError> {
        Self::assemble(campaign_id, GraphKind::Draft, missions, dependencies)
    }

    fn assemble(
        campaign_id: CampaignId,
        kind: GraphKind,
        missions: impl IntoIterator<Item = Mission>,
        dependencies: impl IntoIterator<Item = MissionDependency>,
    ) -> Result<Self, GraphError> {
        let mut by_id = HashMap::new();
        let mut adjacency = DiGraphMap::new();

        for mission in missions {
            if mission.campaign_id != campaign_id {
                return Err(GraphError::ForeignMission {
                    mission: mission.id,
                    expected: campaign_id,
                    found: mission.campaign_id,
                });
            }
            let id = mission.id;
            if by_id.insert(id, mission).is_some() {
                return Err(GraphError::DuplicateMission(id));
            }
            adjacency.add_node(id);
        }

        for dependency in dependencies {
            ensure_endpoints(&by_id, dependency)?;
            // Repeated edges collapse into one
            adjacency.add_edge(dependency.source, dependency.target, ());
        }

        if kind == GraphKind::Published {
            if let Some(path) = find_cycle(&adjacency) {
                return Err(GraphError::CycleDetected { path });
            }
        }

        let mut graph = Self {
            campaign_id,
            kind,
            missions: by_id,
            adjacency,
            fingerprint: String::new(),
        };
        graph.fingerprint = graph.compute_fingerprint();

        tracing::debug!(
            campaign = %campaign_id,
            kind = ?kind,
            missions = graph.mission_count(),
            dependencies = graph.edge_count(),
            "mission graph built"
        );
        Ok(graph)
    }

    /// Re-validate a draft as a published graph
    ///
    /// # Errors
    /// `CycleDetected` if the draft still contains a cycle.
    pub fn publish(mut self) -> Result<Self, GraphError> {
        if let Some(path) = find_cycle(&self.adjacency) {
            return Err(GraphError::CycleDetected { path });
        }
        self.kind = GraphKind::Published;
        Ok(self)
    }

    /// Campaign this graph belongs to
    #[inline]
    #[must_use]
    pub fn campaign_id(&self) -> CampaignId {
        self.campaign_id
    }

    /// Graph kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> GraphKind {
        self.kind
    }

    /// Number of missions
    #[inline]
    #[must_use]
    pub fn mission_count(&self) -> usize {
        self.missions.len()
    }

    /// Number of distinct dependency edges
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.adjacency.edge_count()
    }

    /// Whether the mission belongs to this graph
    #[inline]
    #[must_use]
    pub fn contains(&self, mission_id: MissionId) -> bool {
        self.missions.contains_key(&mission_id)
    }

    /// Look up a mission
    #[inline]
    #[must_use]
    pub fn mission(&self, mission_id: MissionId) -> Option<&Mission> {
        self.missions.get(&mission_id)
    }

    /// All missions, in no particular order
    pub fn missions(&self) -> impl Iterator<Item = &Mission> + '_ {
        self.missions.values()
    }

    /// All mission ids, in no particular order
    pub fn mission_ids(&self) -> impl Iterator<Item = MissionId> + '_ {
        self.missions.keys().copied()
    }

    /// Missions that must be completed before `mission_id` opens
    #[must_use]
    pub fn prerequisites_of(&self, mission_id: MissionId) -> BTreeSet<MissionId> {
        self.prerequisite_ids(mission_id).collect()
    }

    /// Missions that list `mission_id` as a prerequisite
    #[must_use]
    pub fn dependents_of(&self, mission_id: MissionId) -> BTreeSet<MissionId> {
        self.dependent_ids(mission_id).collect()
    }

    pub(crate) fn prerequisite_ids(&self, mission_id: MissionId) -> impl Iterator<Item = MissionId> + '_ {
        self.adjacency
            .neighbors_directed(mission_id, Direction::Incoming)
    }

    pub(crate) fn dependent_ids(&self, mission_id: MissionId) -> impl Iterator<Item = MissionId> + '_ {
        self.adjacency
            .neighbors_directed(mission_id, Direction::Outgoing)
    }

    /// All edges, sorted
    #[must_use]
    pub fn dependencies(&self) -> Vec<MissionDependency> {
        let mut edges: Vec<MissionDependency> = self
            .adjacency
            .all_edges()
            .map(|(source, target, ())| MissionDependency::new(source, target))
            .collect();
        edges.sort();
        edges
    }

    /// Missions with no prerequisites
    #[must_use]
    pub fn entry_missions(&self) -> BTreeSet<MissionId> {
        self.mission_ids()
            .filter(|id| self.prerequisite_ids(*id).next().is_none())
            .collect()
    }

    /// Missions nothing depends on
    #[must_use]
    pub fn terminal_missions(&self) -> BTreeSet<MissionId> {
        self.mission_ids()
            .filter(|id| self.dependent_ids(*id).next().is_none())
            .collect()
    }

    /// Preview whether adding `source -> target` would close a cycle.
    ///
    /// This is a preview method that doesn't modify the graph.
    #[must_use]
    pub fn would_create_cycle(&self, source: MissionId, target: MissionId) -> bool {
        if source == target {
            return true;
        }
        if !self.contains(source) || !self.contains(target) {
            return false;
        }
        petgraph::algo::has_path_connecting(&self.adjacency, target, source, None)
    }

    /// New graph with one more edge
    ///
    /// # Errors
    /// `DanglingEdge` for unknown endpoints; `CycleDetected` if a published
    /// graph would become cyclic.
    pub fn with_dependency(&self, dependency: MissionDependency) -> Result<Self, GraphError> {
        ensure_endpoints(&self.missions, dependency)?;

        let mut next = self.clone();
        next.adjacency.add_edge(dependency.source, dependency.target, ());
        if next.kind == GraphKind::Published {
            if let Some(path) = find_cycle(&next.adjacency) {
                return Err(GraphError::CycleDetected { path });
            }
        }
        next.fingerprint = next.compute_fingerprint();
        Ok(next)
    }

    /// New graph without the given edge; absent edges are ignored
    #[must_use]
    pub fn without_dependency(&self, dependency: MissionDependency) -> Self {
        let mut next = self.clone();
        if next
            .adjacency
            .remove_edge(dependency.source, dependency.target)
            .is_some()
        {
            next.fingerprint = next.compute_fingerprint();
        }
        next
    }

    /// New graph with an added or replaced mission
    ///
    /// # Errors
    /// `ForeignMission` if the mission belongs to another campaign.
    pub fn with_mission(&self, mission: Mission) -> Result<Self, GraphError> {
        if mission.campaign_id != self.campaign_id {
            return Err(GraphError::ForeignMission {
                mission: mission.id,
                expected: self.campaign_id,
                found: mission.campaign_id,
            });
        }
        let mut next = self.clone();
        next.adjacency.add_node(mission.id);
        next.missions.insert(mission.id, mission);
        next.fingerprint = next.compute_fingerprint();
        Ok(next)
    }

    /// New graph without a mission. Every edge touching it is removed too;
    /// the removed edges are returned so the caller can delete them from
    /// the store in the same transaction.
    ///
    /// # Errors
    /// `MissionNotFound` if the mission is not in the graph.
    pub fn without_mission(&self, mission_id: MissionId) -> Result<(Self, Vec<MissionDependency>), GraphError> {
        if !self.contains(mission_id) {
            return Err(GraphError::MissionNotFound(mission_id));
        }
        let removed: Vec<MissionDependency> = self
            .dependencies()
            .into_iter()
            .filter(|d| d.source == mission_id || d.target == mission_id)
            .collect();

        let mut next = self.clone();
        next.adjacency.remove_node(mission_id);
        next.missions.remove(&mission_id);
        next.fingerprint = next.compute_fingerprint();
        Ok((next, removed))
    }

    /// Deterministic hash of everything that influences evaluation
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn compute_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.campaign_id.0.as_bytes());

        // Sorted for determinism
        let mut ids: Vec<&MissionId> = self.missions.keys().collect();
        ids.sort();
        for id in ids {
            let mission = &self.missions[id];
            hasher.update(id.0.as_bytes());
            hasher.update(mission.min_rank.to_le_bytes());
            hasher.update(mission.experience_reward.to_le_bytes());
            hasher.update(mission.mana_reward.to_le_bytes());
            hasher.update(mission.confirmation_type.as_str().as_bytes());
            hasher.update([0]);
            for grant in &mission.competencies {
                hasher.update(grant.competency_id.0.as_bytes());
                hasher.update(grant.points.to_le_bytes());
            }
        }

        for edge in self.dependencies() {
            hasher.update(edge.source.0.as_bytes());
            hasher.update(edge.target.0.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Graphviz rendering labelled with mission names
    #[must_use]
    pub fn to_dot(&self) -> String {
        let indexed = self.adjacency.clone().into_graph::<u32>();
        let labelled = indexed.map(
            |_, id| {
                self.missions
                    .get(id)
                    .map_or_else(|| id.to_string(), |m| m.name.clone())
            },
            |_, ()| "",
        );
        format!("{}", Dot::with_config(&labelled, &[Config::EdgeNoLabel]))
    }
}

fn ensure_endpoints(
    missions: &HashMap<MissionId, Mission>,
    dependency: MissionDependency,
) -> Result<(), GraphError> {
    for endpoint in [dependency.source, dependency.target] {
        if !missions.contains_key(&endpoint) {
            return Err(GraphError::DanglingEdge {
                from: dependency.source,
                to: dependency.target,
                missing: endpoint,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Depth-first search with white/gray/black coloring. Reaching a gray
/// node means it is on the current recursion stack, so the stack from
/// that node onwards is a cycle.
fn find_cycle(adjacency: &DiGraphMap<MissionId, ()>) -> Option<Vec<MissionId>> {
    fn visit(
        node: MissionId,
        adjacency: &DiGraphMap<MissionId, ()>,
        color: &mut HashMap<MissionId, Color>,
        stack: &mut Vec<MissionId>,
    ) -> Option<Vec<MissionId>> {
        color.insert(node, Color::Gray);
        stack.push(node);

        let mut successors: Vec<MissionId> =
            adjacency.neighbors_directed(node, Direction::Outgoing).collect();
        successors.sort();

        for next in successors {
            match color.get(&next).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    let start = stack.iter().position(|n| *n == next).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                Color::White => {
                    if let Some(cycle) = visit(next, adjacency, color, stack) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        stack.pop();
        color.insert(node, Color::Black);
        None
    }

    let mut roots: Vec<MissionId> = adjacency.nodes().collect();
    roots.sort();

    let mut color: HashMap<MissionId, Color> = HashMap::with_capacity(roots.len());
    let mut stack = Vec::new();

    for root in roots {
        if color.get(&root).copied().unwrap_or(Color::White) == Color::White {
            if let Some(cycle) = visit(root, adjacency, &mut color, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

/// Everything the persistence layer returns for one campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSnapshot {
    pub campaign_id: CampaignId,
    pub missions: Vec<MissionRecord>,
    #[serde(default)]
    pub dependencies: Vec<MissionDependency>,
}

impl CampaignSnapshot {
    /// Snapshot of typed missions
    #[must_use]
    pub fn from_missions(
        campaign_id: CampaignId,
        missions: &[Mission],
        dependencies: Vec<MissionDependency>,
    ) -> Self {
        Self {
            campaign_id,
            missions: missions.iter().map(Mission::to_record).collect(),
            dependencies,
        }
    }

    /// Resolve payloads and build the published graph
    ///
    /// # Errors
    /// Any [`GraphError`] from [`MissionGraph::build`].
    pub fn into_graph(self) -> Result<MissionGraph, GraphError> {
        MissionGraph::build(
            self.campaign_id,
            self.missions.into_iter().map(Mission::from_record),
            self.dependencies,
        )
    }
}
