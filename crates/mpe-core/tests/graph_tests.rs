use mpe_core::evaluator::topological_order;
use mpe_core::graph::{CampaignSnapshot, GraphKind, MissionGraph};
use mpe_core::types::{CampaignId, Mission, MissionDependency, MissionId, MissionType};
use mpe_core::GraphError;
use mpe_test_utils::{diamond, linear_chain};
use proptest::prelude::*;

fn missions(campaign: CampaignId, count: usize) -> Vec<Mission> {
    (0..count)
        .map(|i| Mission::new(campaign, format!("m{i}"), MissionType::Custom))
        .collect()
}

/// Edges always point from a lower to a higher index
fn forward_edges(ids: &[MissionId], pairs: &[(usize, usize)]) -> Vec<MissionDependency> {
    pairs
        .iter()
        .filter_map(|&(a, b)| {
            let (lo, hi) = (a.min(b), a.max(b));
            (lo != hi && hi < ids.len()).then(|| MissionDependency::new(ids[lo], ids[hi]))
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_random_dag_builds(
        count in 1..20usize,
        pairs in proptest::collection::vec((0..20usize, 0..20usize), 0..60)
    ) {
        let campaign = CampaignId::new();
        let missions = missions(campaign, count);
        let ids: Vec<MissionId> = missions.iter().map(|m| m.id).collect();
        let edges = forward_edges(&ids, &pairs);

        let graph = MissionGraph::build(campaign, missions, edges).unwrap();
        prop_assert_eq!(graph.mission_count(), count);

        let order = topological_order(&graph).unwrap();
        prop_assert_eq!(order.len(), count);
        let position = |id: MissionId| order.iter().position(|o| *o == id).unwrap();
        for dep in graph.dependencies() {
            prop_assert!(position(dep.source) < position(dep.target));
        }
    }

    #[test]
    fn prop_back_edge_is_rejected(
        count in 2..16usize,
        pairs in proptest::collection::vec((0..16usize, 0..16usize), 0..40)
    ) {
        let campaign = CampaignId::new();
        let missions = missions(campaign, count);
        let ids: Vec<MissionId> = missions.iter().map(|m| m.id).collect();

        // A guaranteed path first → last, then the edge closing it
        let mut edges = forward_edges(&ids, &pairs);
        edges.extend(ids.windows(2).map(|w| MissionDependency::new(w[0], w[1])));
        edges.push(MissionDependency::new(ids[count - 1], ids[0]));

        let err = MissionGraph::build(campaign, missions, edges).unwrap_err();
        match err {
            GraphError::CycleDetected { path } => {
                prop_assert!(path.len() >= 2);
                prop_assert_eq!(path.first(), path.last());
            }
            other => prop_assert!(false, "expected CycleDetected, got {other:?}"),
        }
    }
}

#[test]
fn test_rejects_simple_cycle() {
    let campaign = CampaignId::new();
    let ms = missions(campaign, 3);
    let ids: Vec<MissionId> = ms.iter().map(|m| m.id).collect();
    let edges = vec![
        MissionDependency::new(ids[0], ids[1]),
        MissionDependency::new(ids[1], ids[2]),
        MissionDependency::new(ids[2], ids[0]),
    ];

    assert!(matches!(
        MissionGraph::build(campaign, ms, edges),
        Err(GraphError::CycleDetected { .. })
    ));
}

#[test]
fn test_draft_allows_cycle_until_publish() {
    let campaign = CampaignId::new();
    let ms = missions(campaign, 2);
    let ids: Vec<MissionId> = ms.iter().map(|m| m.id).collect();
    let edges = vec![
        MissionDependency::new(ids[0], ids[1]),
        MissionDependency::new(ids[1], ids[0]),
    ];

    let draft = MissionGraph::build_draft(campaign, ms, edges).unwrap();
    assert_eq!(draft.kind(), GraphKind::Draft);
    assert!(matches!(draft.clone().publish(), Err(GraphError::CycleDetected { .. })));

    let fixed = draft.without_dependency(MissionDependency::new(ids[1], ids[0]));
    let published = fixed.publish().unwrap();
    assert_eq!(published.kind(), GraphKind::Published);
}

#[test]
fn test_dangling_edge() {
    let campaign = CampaignId::new();
    let ms = missions(campaign, 1);
    let ghost = MissionId::new();
    let edge = MissionDependency::new(ms[0].id, ghost);

    let err = MissionGraph::build(campaign, ms, vec![edge]).unwrap_err();
    assert!(matches!(err, GraphError::DanglingEdge { missing, .. } if missing == ghost));
}

#[test]
fn test_editor_refuses_closing_edge() {
    let chain = linear_chain();
    let graph = chain.graph();

    assert!(graph.would_create_cycle(chain.id("E"), chain.id("A")));
    assert!(!graph.would_create_cycle(chain.id("A"), chain.id("E")));
    assert!(graph
        .with_dependency(MissionDependency::new(chain.id("E"), chain.id("A")))
        .is_err());

    let shortcut = graph
        .with_dependency(MissionDependency::new(chain.id("A"), chain.id("E")))
        .unwrap();
    assert_eq!(shortcut.edge_count(), graph.edge_count() + 1);
}

#[test]
fn test_snapshot_json_rebuilds_same_graph() {
    let fixture = diamond();
    let graph = fixture.graph();

    let snapshot: CampaignSnapshot = serde_json::from_str(&fixture.snapshot_json()).unwrap();
    let reloaded = snapshot.into_graph().unwrap();

    assert_eq!(reloaded.fingerprint(), graph.fingerprint());
    assert_eq!(reloaded.entry_missions().len(), 1);
    assert_eq!(reloaded.terminal_missions().len(), 1);
}
