//! Testing utilities for MPE workspace
//!
//! Shared campaign fixtures, cadet histories and config helpers.

#![allow(missing_docs)]

use chrono::{DateTime, TimeZone, Utc};
use mpe_core::aggregator::{RankLadder, RankThreshold};
use mpe_core::graph::{CampaignSnapshot, MissionGraph};
use mpe_core::payload::{FileUploadPayload, MissionPayload, QuizOption, QuizPayload, QuizQuestion};
use mpe_core::types::{
    CampaignId, CompetencyId, ConfirmationType, Mission, MissionDependency, MissionId, MissionStatus, MissionType,
    UserId, UserMission,
};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A named set of missions and edges for one campaign
#[derive(Debug, Clone)]
pub struct Fixture {
    pub campaign_id: CampaignId,
    pub missions: Vec<Mission>,
    pub dependencies: Vec<MissionDependency>,
}

impl Fixture {
    pub fn new(campaign_id: CampaignId) -> Self {
        Self {
            campaign_id,
            missions: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Id of the mission called `name`; panics if absent
    pub fn id(&self, name: &str) -> MissionId {
        self.mission(name).id
    }

    pub fn mission(&self, name: &str) -> &Mission {
        self.missions
            .iter()
            .find(|m| m.name == name)
            .unwrap_or_else(|| panic!("fixture has no mission named {name}"))
    }

    pub fn push(&mut self, mission: Mission) -> MissionId {
        let id = mission.id;
        self.missions.push(mission);
        id
    }

    pub fn link(&mut self, source: &str, target: &str) {
        let dependency = MissionDependency::new(self.id(source), self.id(target));
        self.dependencies.push(dependency);
    }

    pub fn graph(&self) -> MissionGraph {
        MissionGraph::build(self.campaign_id, self.missions.clone(), self.dependencies.clone())
            .expect("fixture graph must be valid")
    }

    pub fn snapshot(&self) -> CampaignSnapshot {
        CampaignSnapshot::from_missions(self.campaign_id, &self.missions, self.dependencies.clone())
    }

    pub fn snapshot_json(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot()).expect("snapshot serializes")
    }
}

/// A→B→C→D→E, AUTO confirmation, growing rewards.
///
/// Every mission grants points in the [`piloting`] competency.
pub fn linear_chain() -> Fixture {
    let mut fixture = Fixture::new(CampaignId::new());
    let competency = piloting();
    for (i, name) in ["A", "B", "C", "D", "E"].into_iter().enumerate() {
        let step = u32::try_from(i).unwrap_or(0) + 1;
        let mission = Mission::new(fixture.campaign_id, name, MissionType::Custom)
            .with_rewards(step * 50, step * 10)
            .with_competency(competency, step)
            .at(f64::from(step) * 100.0, 0.0);
        fixture.push(mission);
    }
    for pair in ["A", "B", "C", "D", "E"].windows(2) {
        fixture.link(pair[0], pair[1]);
    }
    fixture
}

/// Start→{Pilot, Engineer}→Merge→Final
pub fn diamond() -> Fixture {
    let mut fixture = Fixture::new(CampaignId::new());
    for name in ["Start", "Pilot", "Engineer", "Merge", "Final"] {
        let mission = Mission::new(fixture.campaign_id, name, MissionType::Custom).with_rewards(100, 20);
        fixture.push(mission);
    }
    fixture.link("Start", "Pilot");
    fixture.link("Start", "Engineer");
    fixture.link("Pilot", "Merge");
    fixture.link("Engineer", "Merge");
    fixture.link("Merge", "Final");
    fixture
}

/// Stable competency id granted by every [`linear_chain`] mission
pub fn piloting() -> CompetencyId {
    CompetencyId(Uuid::from_u128(0x7069_6c6f_7400_0000_0000_0000_0000_0001))
}

/// Quiz with `questions` single-answer questions; option "a" is always correct
pub fn quiz_payload(questions: usize, passing_score: u8, allow_retries: bool, max_attempts: Option<u32>) -> QuizPayload {
    QuizPayload {
        questions: (1..=questions)
            .map(|i| QuizQuestion {
                id: format!("q{i}"),
                prompt: format!("Question {i}"),
                options: vec![
                    QuizOption {
                        id: "a".into(),
                        text: "Right".into(),
                    },
                    QuizOption {
                        id: "b".into(),
                        text: "Wrong".into(),
                    },
                ],
                correct_answer_ids: vec!["a".into()],
                required: true,
            })
            .collect(),
        passing_score: Some(passing_score),
        allow_retries,
        max_attempts,
    }
}

pub fn quiz_mission(campaign_id: CampaignId, payload: QuizPayload) -> Mission {
    Mission::new(campaign_id, "Quiz", MissionType::Quiz)
        .with_rewards(120, 30)
        .with_payload(MissionPayload::Quiz(payload))
}

/// Answers with the first `correct` questions right and the rest wrong
pub fn quiz_answers(questions: usize, correct: usize) -> BTreeMap<String, Vec<String>> {
    (1..=questions)
        .map(|i| {
            let pick = if i <= correct { "a" } else { "b" };
            (format!("q{i}"), vec![pick.to_string()])
        })
        .collect()
}

pub fn file_upload_mission(campaign_id: CampaignId, required_files: u32) -> Mission {
    Mission::new(campaign_id, "Upload", MissionType::FileUpload)
        .with_rewards(80, 15)
        .with_confirmation(ConfirmationType::FileCheck)
        .with_payload(MissionPayload::FileUpload(FileUploadPayload {
            instructions: "Attach your flight log".into(),
            required_files,
            ..FileUploadPayload::default()
        }))
}

/// A COMPLETED record for every named mission
pub fn completed(fixture: &Fixture, user_id: UserId, names: &[&str]) -> Vec<UserMission> {
    names
        .iter()
        .map(|name| {
            let mut record = UserMission::new(user_id, fixture.id(name)).with_status(MissionStatus::Completed);
            record.completed_at = Some(now());
            record
        })
        .collect()
}

/// Three ranks: 1 at zero, 2 at 100 XP / 1 mission, 3 at 300 XP / 3 missions
pub fn default_ladder() -> RankLadder {
    RankLadder::new(vec![
        RankThreshold::new(1, "Cadet", 0, 0),
        RankThreshold::new(2, "Navigator", 100, 1),
        RankThreshold::new(3, "Pilot", 300, 3),
    ])
    .expect("ladder levels are distinct")
}

/// Fixed instant so records compare equal across runs
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}
