use mpe_core::aggregator::aggregate;
use mpe_core::config::EngineConfig;
use mpe_core::evaluator::{evaluate, LockReason};
use mpe_core::payload::SubmissionPayload;
use mpe_core::submission::SubmissionPipeline;
use mpe_core::test_mode::TestModeSession;
use mpe_core::types::{MissionStatus, UserId, UserMission, BASE_RANK_LEVEL};
use mpe_core::{SimulationError, SubmissionError};
use mpe_test_utils::{
    completed, diamond, file_upload_mission, linear_chain, now, quiz_answers, quiz_mission, quiz_payload,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn fresh_chain_opens_only_the_root() {
    let chain = linear_chain();
    let graph = chain.graph();

    let evaluation = evaluate(&graph, &[], BASE_RANK_LEVEL).unwrap();

    assert_eq!(evaluation.status(chain.id("A")), Some(MissionStatus::Available));
    for name in ["B", "C", "D", "E"] {
        assert_eq!(evaluation.status(chain.id(name)), Some(MissionStatus::Locked), "{name}");
    }
    assert_eq!(
        evaluation.lock_reason(chain.id("B")),
        Some(&LockReason::Prerequisites {
            missing: vec![chain.id("A")]
        })
    );
}

#[test]
fn completing_root_opens_next_and_adds_its_experience() {
    let chain = linear_chain();
    let graph = chain.graph();
    let user = UserId::new();
    let pipeline = SubmissionPipeline::default();

    let before = evaluate(&graph, &[], BASE_RANK_LEVEL).unwrap();
    let totals_before = aggregate(&[], &graph);
    let record = before.record_for(user, chain.id("A"), None).unwrap();

    let outcome = pipeline
        .submit(
            chain.mission("A"),
            &record,
            SubmissionPayload::Custom {
                response: "done".into(),
            },
            now(),
        )
        .unwrap();
    assert_eq!(outcome.status, MissionStatus::Completed);
    assert!(outcome.reward.is_some());

    let records = vec![outcome.record];
    let after = evaluate(&graph, &records, BASE_RANK_LEVEL).unwrap();
    assert_eq!(after.status(chain.id("A")), Some(MissionStatus::Completed));
    assert_eq!(after.status(chain.id("B")), Some(MissionStatus::Available));
    for name in ["C", "D", "E"] {
        assert_eq!(after.status(chain.id(name)), Some(MissionStatus::Locked), "{name}");
    }

    let totals_after = aggregate(&records, &graph);
    assert_eq!(
        totals_after.total_experience - totals_before.total_experience,
        u64::from(chain.mission("A").experience_reward)
    );
}

#[test]
fn diamond_merge_waits_for_both_branches() {
    let diamond = diamond();
    let graph = diamond.graph();
    let user = UserId::new();
    let records = completed(&diamond, user, &["Start", "Pilot"]);

    let evaluation = evaluate(&graph, &records, BASE_RANK_LEVEL).unwrap();

    assert_eq!(evaluation.status(diamond.id("Engineer")), Some(MissionStatus::Available));
    assert_eq!(evaluation.status(diamond.id("Merge")), Some(MissionStatus::Locked));
    assert_eq!(evaluation.status(diamond.id("Final")), Some(MissionStatus::Locked));
    assert_eq!(
        evaluation.lock_reason(diamond.id("Merge")).map(LockReason::missing_prerequisites),
        Some(&[diamond.id("Engineer")][..])
    );
}

#[test]
fn failed_quiz_with_attempt_left_stays_available() {
    let campaign = linear_chain().campaign_id;
    let mission = quiz_mission(campaign, quiz_payload(5, 75, true, Some(2)));
    let record = UserMission::new(UserId::new(), mission.id).with_status(MissionStatus::Available);

    let err = SubmissionPipeline::default()
        .submit(
            &mission,
            &record,
            SubmissionPayload::Quiz {
                answers: quiz_answers(5, 3),
            },
            now(),
        )
        .unwrap_err();

    assert_eq!(
        err,
        SubmissionError::QuizFailed {
            score: 60,
            passing_score: 75,
            attempts_used: 1,
            retry_allowed: true,
        }
    );
    assert!(err.is_retryable());
    assert_eq!(record.status, MissionStatus::Available);
}

#[test]
fn empty_upload_is_rejected_without_state_change() {
    let campaign = linear_chain().campaign_id;
    let mission = file_upload_mission(campaign, 1);
    let record = UserMission::new(UserId::new(), mission.id).with_status(MissionStatus::InProgress);
    let snapshot = record.clone();

    let err = SubmissionPipeline::new(&EngineConfig::default())
        .submit(&mission, &record, SubmissionPayload::FileUpload { files: vec![] }, now())
        .unwrap_err();

    assert!(matches!(err, SubmissionError::InvalidPayload { ref field, .. } if field == "files"));
    assert_eq!(record, snapshot);
}

#[test]
fn quick_complete_refuses_locked_missions() {
    let chain = linear_chain();
    let (mut session, state) = TestModeSession::initialize(
        Arc::new(chain.graph()),
        mpe_test_utils::default_ladder(),
        &EngineConfig::default(),
    )
    .unwrap();
    assert_eq!(state.evaluation.status(chain.id("C")), Some(MissionStatus::Locked));

    let err = session.quick_complete(chain.id("C")).unwrap_err();
    assert!(matches!(err, SimulationError::MissionLocked { mission, .. } if mission == chain.id("C")));

    // Nothing was fabricated
    let state = session.state().unwrap();
    assert_eq!(state.evaluation.status(chain.id("C")), Some(MissionStatus::Locked));
    assert_eq!(state.totals.completed_missions, 0);

    // Walking the chain in order works
    for name in ["A", "B", "C"] {
        session.quick_complete(chain.id(name)).unwrap();
    }
    let state = session.state().unwrap();
    assert_eq!(state.evaluation.status(chain.id("C")), Some(MissionStatus::Completed));
    assert_eq!(state.evaluation.status(chain.id("D")), Some(MissionStatus::Available));
}

#[test]
fn test_mode_never_touches_real_records() {
    let chain = linear_chain();
    let real_user = UserId::new();
    let real_records = completed(&chain, real_user, &["A"]);
    let frozen = real_records.clone();

    let (mut session, _) = TestModeSession::initialize(
        Arc::new(chain.graph()),
        mpe_test_utils::default_ladder(),
        &EngineConfig::default(),
    )
    .unwrap();
    assert_ne!(session.user_id(), real_user);
    session.quick_complete(chain.id("A")).unwrap();
    let state = session.reset().unwrap();

    assert_eq!(state.totals.completed_missions, 0);
    assert_eq!(real_records, frozen);
}
