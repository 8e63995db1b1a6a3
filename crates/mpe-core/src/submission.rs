//! Submission Pipeline
//!
//! Validates a cadet's submission against the mission payload, scores
//! quizzes and decides between immediate completion and moderator review.
//! Nothing is persisted here: the caller receives the updated record and,
//! when the mission completed, the single [`RewardGrant`] to apply.

use crate::config::{EngineConfig, QuizDefaults, UploadLimits};
use crate::error::{SubmissionError, TransitionError};
use crate::payload::{
    CustomPayload, ExternalActionPayload, FileUploadPayload, FormFieldKind, FormPayload, MissionPayload,
    OfflineEventPayload, OnlineEventPayload, QuizPayload, SubmissionPayload, UploadedFile, VideoPayload,
};
use crate::state_machine::validate_transition;
use crate::types::{Mission, MissionStatus, MissionType, RewardGrant, UserMission};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Result of scoring a quiz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScore {
    /// Percentage of questions answered correctly
    pub score: u8,
    pub passing_score: u8,
    pub correct: u32,
    pub total: u32,
}

impl QuizScore {
    /// Whether the score reaches the passing score
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.score >= self.passing_score
    }
}

/// Accepted submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    /// Updated record to persist
    pub record: UserMission,
    /// New status (COMPLETED or PENDING_REVIEW)
    pub status: MissionStatus,
    /// Present exactly when the mission became COMPLETED
    pub reward: Option<RewardGrant>,
    /// Present for quiz missions
    pub quiz: Option<QuizScore>,
}

/// Validates and applies submissions
#[derive(Debug, Clone, Default)]
pub struct SubmissionPipeline {
    uploads: UploadLimits,
    quiz: QuizDefaults,
}

impl SubmissionPipeline {
    /// Create a pipeline using the engine limits
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            uploads: config.uploads.clone(),
            quiz: config.quiz,
        }
    }

    /// Submit `payload` for `mission`.
    ///
    /// # Errors
    /// - `AlreadyCompleted` for a COMPLETED record
    /// - `NotAvailable` unless the record is AVAILABLE or IN_PROGRESS
    /// - `InvalidPayload` if the payload does not fit the mission
    /// - `AttemptsExhausted` / `QuizFailed` for quizzes
    ///
    /// On error the record is unchanged, except that the caller should
    /// persist `attempts_used` of a `QuizFailed`.
    pub fn submit(
        &self,
        mission: &Mission,
        record: &UserMission,
        payload: SubmissionPayload,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        if record.status == MissionStatus::Completed {
            return Err(SubmissionError::AlreadyCompleted { mission: mission.id });
        }
        if !record.status.accepts_submission() {
            return Err(SubmissionError::NotAvailable {
                mission: mission.id,
                status: record.status,
            });
        }
        if record.mission_id != mission.id {
            return Err(SubmissionError::invalid(
                "missionId",
                format!("record belongs to mission {}", record.mission_id),
            ));
        }

        self.validate(&mission.payload, &payload)?;

        let quiz = match &mission.payload {
            MissionPayload::Quiz(quiz) => Some(self.grade(quiz, record, &payload)?),
            _ => None,
        };

        let target = if mission.confirmation_type.completes_immediately() {
            MissionStatus::Completed
        } else {
            MissionStatus::PendingReview
        };
        validate_transition(record.status, target)?;

        let mut next = record.clone();
        next.status = target;
        next.submission = Some(payload);
        next.review_note = None;
        next.started_at.get_or_insert(now);
        if quiz.is_some() {
            next.attempts += 1;
        }

        let reward = if target == MissionStatus::Completed {
            next.completed_at = Some(now);
            Some(RewardGrant::for_mission(record.user_id, mission))
        } else {
            None
        };

        tracing::info!(
            user = %record.user_id,
            mission = %mission.id,
            from = %record.status,
            to = %target,
            confirmation = mission.confirmation_type.as_str(),
            "submission accepted"
        );

        Ok(SubmissionOutcome {
            record: next,
            status: target,
            reward,
            quiz,
        })
    }

    /// Mark an AVAILABLE mission as started. Starting an IN_PROGRESS
    /// mission again returns it unchanged.
    ///
    /// # Errors
    /// `TransitionError` from any other status.
    pub fn start(&self, record: &UserMission, now: DateTime<Utc>) -> Result<UserMission, TransitionError> {
        if record.status == MissionStatus::InProgress {
            return Ok(record.clone());
        }
        validate_transition(record.status, MissionStatus::InProgress)?;
        let mut next = record.clone().with_status(MissionStatus::InProgress);
        next.started_at.get_or_insert(now);
        tracing::debug!(user = %record.user_id, mission = %record.mission_id, "mission started");
        Ok(next)
    }

    /// Score a quiz submission without changing anything
    ///
    /// # Errors
    /// `InvalidPayload` if the payload is not a valid answer sheet.
    pub fn score_quiz(&self, quiz: &QuizPayload, payload: &SubmissionPayload) -> Result<QuizScore, SubmissionError> {
        let SubmissionPayload::Quiz { answers } = payload else {
            return Err(type_mismatch(MissionType::Quiz, payload));
        };
        validate_quiz(quiz, answers)?;
        Ok(score(quiz, answers, self.passing_score(quiz)))
    }

    fn passing_score(&self, quiz: &QuizPayload) -> u8 {
        quiz.passing_score
            .unwrap_or(self.quiz.default_passing_score)
            .min(100)
    }

    fn grade(
        &self,
        quiz: &QuizPayload,
        record: &UserMission,
        payload: &SubmissionPayload,
    ) -> Result<QuizScore, SubmissionError> {
        if !quiz.allows_attempt_after(record.attempts) {
            return Err(SubmissionError::AttemptsExhausted {
                attempts_used: record.attempts,
            });
        }

        let result = self.score_quiz(quiz, payload)?;
        if result.passed() {
            return Ok(result);
        }

        let attempts_used = record.attempts + 1;
        tracing::info!(
            user = %record.user_id,
            mission = %record.mission_id,
            score = result.score,
            passing_score = result.passing_score,
            attempts_used,
            "quiz attempt failed"
        );
        Err(SubmissionError::QuizFailed {
            score: result.score,
            passing_score: result.passing_score,
            attempts_used,
            retry_allowed: quiz.allows_attempt_after(attempts_used),
        })
    }

    fn validate(&self, mission: &MissionPayload, submission: &SubmissionPayload) -> Result<(), SubmissionError> {
        match mission {
            MissionPayload::Quiz(quiz) => {
                let SubmissionPayload::Quiz { answers } = submission else {
                    return Err(type_mismatch(mission.mission_type(), submission));
                };
                validate_quiz(quiz, answers)
            }
            MissionPayload::Video(video) => {
                let SubmissionPayload::Video { watched_seconds } = submission else {
                    return Err(type_mismatch(mission.mission_type(), submission));
                };
                validate_video(video, *watched_seconds)
            }
            MissionPayload::FileUpload(upload) => {
                let SubmissionPayload::FileUpload { files } = submission else {
                    return Err(type_mismatch(mission.mission_type(), submission));
                };
                self.validate_files(upload, files)
            }
            MissionPayload::Form(form) => {
                let SubmissionPayload::Form { values } = submission else {
                    return Err(type_mismatch(mission.mission_type(), submission));
                };
                validate_form(form, values)
            }
            MissionPayload::OfflineEvent(event) => {
                let SubmissionPayload::OfflineEvent { scanned_code } = submission else {
                    return Err(type_mismatch(mission.mission_type(), submission));
                };
                validate_offline(event, scanned_code.as_deref())
            }
            MissionPayload::OnlineEvent(event) => {
                let SubmissionPayload::OnlineEvent { attendance_code } = submission else {
                    return Err(type_mismatch(mission.mission_type(), submission));
                };
                validate_online(event, attendance_code.as_deref())
            }
            MissionPayload::ExternalAction(action) => {
                let SubmissionPayload::ExternalAction { proof_url } = submission else {
                    return Err(type_mismatch(mission.mission_type(), submission));
                };
                validate_external(action, proof_url.as_deref())
            }
            MissionPayload::Custom(custom) => {
                let SubmissionPayload::Custom { response } = submission else {
                    return Err(type_mismatch(mission.mission_type(), submission));
                };
                validate_custom(custom, response)
            }
        }
    }

    fn validate_files(&self, upload: &FileUploadPayload, files: &[UploadedFile]) -> Result<(), SubmissionError> {
        let min = upload.required_files;
        let max = upload.max_files.unwrap_or(self.uploads.max_files).max(min);
        let count = u32::try_from(files.len()).unwrap_or(u32::MAX);

        if count < min {
            return Err(SubmissionError::invalid(
                "files",
                format!("at least {min} file(s) required, got {count}"),
            ));
        }
        if count > max {
            return Err(SubmissionError::invalid(
                "files",
                format!("at most {max} file(s) allowed, got {count}"),
            ));
        }

        let size_limit = upload
            .max_file_size_bytes
            .unwrap_or(self.uploads.max_file_size_bytes);
        let formats = if upload.allowed_formats.is_empty() {
            &self.uploads.allowed_formats
        } else {
            &upload.allowed_formats
        };

        for (i, file) in files.iter().enumerate() {
            let field = format!("files[{i}]");
            if file.size_bytes == 0 {
                return Err(SubmissionError::invalid(field, format!("{} is empty", file.name)));
            }
            if file.size_bytes > size_limit {
                return Err(SubmissionError::invalid(
                    field,
                    format!("{} exceeds {size_limit} bytes", file.name),
                ));
            }
            let accepted = file
                .extension()
                .is_some_and(|ext| formats.iter().any(|f| f.eq_ignore_ascii_case(&ext)));
            if !accepted {
                return Err(SubmissionError::invalid(
                    field,
                    format!("{} is not one of: {}", file.name, formats.join(", ")),
                ));
            }
        }
        Ok(())
    }
}

fn type_mismatch(expected: MissionType, submission: &SubmissionPayload) -> SubmissionError {
    SubmissionError::invalid(
        "type",
        format!(
            "{} submission for a {expected} mission",
            submission.mission_type()
        ),
    )
}

fn validate_quiz(quiz: &QuizPayload, answers: &BTreeMap<String, Vec<String>>) -> Result<(), SubmissionError> {
    for question_id in answers.keys() {
        if !quiz.questions.iter().any(|q| &q.id == question_id) {
            return Err(SubmissionError::invalid(
                format!("answers.{question_id}"),
                "unknown question",
            ));
        }
    }

    for question in &quiz.questions {
        let field = format!("answers.{}", question.id);
        let selected = answers.get(&question.id).map_or(&[][..], Vec::as_slice);
        if question.required && selected.is_empty() {
            return Err(SubmissionError::invalid(field, "an answer is required"));
        }
        if !question.options.is_empty() {
            if let Some(unknown) = selected
                .iter()
                .find(|id| !question.options.iter().any(|o| &o.id == *id))
            {
                return Err(SubmissionError::invalid(field, format!("unknown option {unknown}")));
            }
        }
    }
    Ok(())
}

fn score(quiz: &QuizPayload, answers: &BTreeMap<String, Vec<String>>, passing_score: u8) -> QuizScore {
    let total = u32::try_from(quiz.questions.len()).unwrap_or(u32::MAX);
    let correct = quiz
        .questions
        .iter()
        .filter(|q| {
            let expected: BTreeSet<&str> = q.correct_answer_ids.iter().map(String::as_str).collect();
            let selected: BTreeSet<&str> = answers
                .get(&q.id)
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect();
            expected == selected
        })
        .count();
    let correct = u32::try_from(correct).unwrap_or(u32::MAX);

    let score = if total == 0 {
        100
    } else {
        u8::try_from(u64::from(correct) * 100 / u64::from(total)).unwrap_or(100)
    };

    QuizScore {
        score,
        passing_score,
        correct,
        total,
    }
}

fn validate_video(video: &VideoPayload, watched_seconds: u32) -> Result<(), SubmissionError> {
    if !video.require_full_watch {
        return Ok(());
    }
    match video.duration_seconds {
        Some(duration) if watched_seconds < duration => Err(SubmissionError::invalid(
            "watchedSeconds",
            format!("watched {watched_seconds}s of {duration}s"),
        )),
        None if watched_seconds == 0 => Err(SubmissionError::invalid("watchedSeconds", "video not watched")),
        _ => Ok(()),
    }
}

fn validate_form(form: &FormPayload, values: &BTreeMap<String, String>) -> Result<(), SubmissionError> {
    if let Some(unknown) = values.keys().find(|id| !form.fields.iter().any(|f| &f.id == *id)) {
        return Err(SubmissionError::invalid(format!("values.{unknown}"), "unknown field"));
    }

    for field in &form.fields {
        let name = format!("values.{}", field.id);
        let value = values.get(&field.id).map_or("", |v| v.trim());
        if value.is_empty() {
            if field.required {
                return Err(SubmissionError::invalid(name, "this field is required"));
            }
            continue;
        }

        match &field.kind {
            FormFieldKind::Text | FormFieldKind::LongText => {}
            FormFieldKind::Number => {
                if !value.parse::<f64>().is_ok_and(f64::is_finite) {
                    return Err(SubmissionError::invalid(name, "must be a number"));
                }
            }
            FormFieldKind::Email => {
                if !is_email(value) {
                    return Err(SubmissionError::invalid(name, "must be an email address"));
                }
            }
            FormFieldKind::Url => {
                if !is_http_url(value) {
                    return Err(SubmissionError::invalid(name, "must be an http(s) URL"));
                }
            }
            FormFieldKind::Select(options) => {
                if !options.iter().any(|o| o == value) {
                    return Err(SubmissionError::invalid(
                        name,
                        format!("must be one of: {}", options.join(", ")),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn is_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

fn is_http_url(value: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.len() > scheme.len() && value.to_ascii_lowercase().starts_with(scheme))
}

fn validate_code(field: &str, expected: Option<&str>, given: Option<&str>) -> Result<(), SubmissionError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match given.map(str::trim) {
        Some(code) if code == expected.trim() => Ok(()),
        Some(_) => Err(SubmissionError::invalid(field, "code does not match")),
        None => Err(SubmissionError::invalid(field, "a code is required")),
    }
}

fn validate_offline(event: &OfflineEventPayload, scanned: Option<&str>) -> Result<(), SubmissionError> {
    validate_code("scannedCode", event.check_in_code.as_deref(), scanned)
}

fn validate_online(event: &OnlineEventPayload, code: Option<&str>) -> Result<(), SubmissionError> {
    validate_code("attendanceCode", event.attendance_code.as_deref(), code)
}

fn validate_external(action: &ExternalActionPayload, proof_url: Option<&str>) -> Result<(), SubmissionError> {
    if !action.requires_proof {
        return Ok(());
    }
    match proof_url.map(str::trim) {
        Some(url) if is_http_url(url) => Ok(()),
        Some(_) => Err(SubmissionError::invalid("proofUrl", "must be an http(s) URL")),
        None => Err(SubmissionError::invalid("proofUrl", "proof is required")),
    }
}

fn validate_custom(custom: &CustomPayload, response: &str) -> Result<(), SubmissionError> {
    if custom.requires_response && response.trim().is_empty() {
        return Err(SubmissionError::invalid("response", "a response is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{FormField, QuizOption, QuizQuestion};
    use crate::types::{CampaignId, ConfirmationType, UserId};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn open(mission: &Mission) -> UserMission {
        UserMission::new(UserId::new(), mission.id).with_status(MissionStatus::Available)
    }

    fn pipeline() -> SubmissionPipeline {
        SubmissionPipeline::new(&EngineConfig::default())
    }

    fn question(id: &str, correct: &str) -> QuizQuestion {
        QuizQuestion {
            id: id.to_string(),
            prompt: String::new(),
            options: ["a", "b", "c"]
                .iter()
                .map(|o| QuizOption {
                    id: (*o).to_string(),
                    text: String::new(),
                })
                .collect(),
            correct_answer_ids: vec![correct.to_string()],
            required: true,
        }
    }

    fn quiz_mission(questions: usize, passing: u8, max_attempts: Option<u32>) -> Mission {
        let payload = QuizPayload {
            questions: (0..questions).map(|i| question(&format!("q{i}"), "a")).collect(),
            passing_score: Some(passing),
            allow_retries: true,
            max_attempts,
        };
        Mission::new(CampaignId::new(), "Quiz", MissionType::Quiz)
            .with_payload(MissionPayload::Quiz(payload))
            .with_rewards(40, 4)
    }

    fn answers(correct: usize, total: usize) -> SubmissionPayload {
        let answers = (0..total)
            .map(|i| {
                let pick = if i < correct { "a" } else { "b" };
                (format!("q{i}"), vec![pick.to_string()])
            })
            .collect();
        SubmissionPayload::Quiz { answers }
    }

    #[test]
    fn auto_submission_completes_with_reward() {
        let mission = Mission::new(CampaignId::new(), "Hello", MissionType::Custom).with_rewards(10, 1);
        let record = open(&mission);
        let outcome = pipeline()
            .submit(&mission, &record, SubmissionPayload::Custom { response: "hi".into() }, now())
            .unwrap();
        assert_eq!(outcome.status, MissionStatus::Completed);
        assert_eq!(outcome.record.completed_at, Some(now()));
        assert_eq!(outcome.reward.unwrap().experience, 10);
    }

    #[test]
    fn manual_review_goes_pending_without_reward() {
        let mission = Mission::new(CampaignId::new(), "Essay", MissionType::Custom)
            .with_confirmation(ConfirmationType::ManualReview);
        let outcome = pipeline()
            .submit(&mission, &open(&mission), SubmissionPayload::Custom { response: String::new() }, now())
            .unwrap();
        assert_eq!(outcome.status, MissionStatus::PendingReview);
        assert!(outcome.reward.is_none());
        assert!(outcome.record.completed_at.is_none());
    }

    #[test]
    fn locked_and_completed_are_rejected() {
        let mission = Mission::new(CampaignId::new(), "X", MissionType::Custom);
        let payload = SubmissionPayload::Custom { response: String::new() };

        let locked = UserMission::new(UserId::new(), mission.id);
        assert!(matches!(
            pipeline().submit(&mission, &locked, payload.clone(), now()),
            Err(SubmissionError::NotAvailable { status: MissionStatus::Locked, .. })
        ));

        let done = locked.with_status(MissionStatus::Completed);
        assert_eq!(
            pipeline().submit(&mission, &done, payload, now()),
            Err(SubmissionError::AlreadyCompleted { mission: mission.id })
        );
    }

    #[test]
    fn wrong_submission_type_is_invalid() {
        let mission = Mission::new(CampaignId::new(), "Watch", MissionType::Video);
        let err = pipeline()
            .submit(&mission, &open(&mission), SubmissionPayload::Custom { response: "x".into() }, now())
            .unwrap_err();
        assert!(matches!(err, SubmissionError::InvalidPayload { ref field, .. } if field == "type"));
    }

    #[test]
    fn failed_quiz_on_last_attempt() {
        // 3 of 5 correct is 60% against 75%; this was the second of two attempts
        let mission = quiz_mission(5, 75, Some(2));
        let mut record = open(&mission);
        record.attempts = 1;

        let err = pipeline().submit(&mission, &record, answers(3, 5), now()).unwrap_err();
        assert_eq!(
            err,
            SubmissionError::QuizFailed {
                score: 60,
                passing_score: 75,
                attempts_used: 2,
                retry_allowed: false,
            }
        );
    }

    #[test]
    fn failed_quiz_first_attempt_can_retry() {
        let mission = quiz_mission(5, 75, Some(2));
        let err = pipeline()
            .submit(&mission, &open(&mission), answers(3, 5), now())
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn passing_quiz_counts_attempt() {
        let mission = quiz_mission(4, 75, None);
        let outcome = pipeline()
            .submit(&mission, &open(&mission), answers(3, 4), now())
            .unwrap();
        assert_eq!(outcome.quiz.unwrap().score, 75);
        assert_eq!(outcome.record.attempts, 1);
        assert_eq!(outcome.status, MissionStatus::Completed);
    }

    #[test]
    fn exhausted_attempts_are_not_scored() {
        let mission = quiz_mission(1, 50, Some(2));
        let mut record = open(&mission);
        record.attempts = 2;
        assert_eq!(
            pipeline().submit(&mission, &record, answers(1, 1), now()),
            Err(SubmissionError::AttemptsExhausted { attempts_used: 2 })
        );
    }

    #[test]
    fn quiz_requires_answers_for_required_questions() {
        let mission = quiz_mission(2, 50, None);
        let err = pipeline()
            .submit(&mission, &open(&mission), answers(1, 1), now())
            .unwrap_err();
        assert_eq!(err, SubmissionError::invalid("answers.q1", "an answer is required"));
    }

    #[test]
    fn file_upload_limits() {
        let mission = Mission::new(CampaignId::new(), "Upload", MissionType::FileUpload);
        let record = open(&mission);
        let submit = |files: Vec<UploadedFile>| {
            pipeline().submit(&mission, &record, SubmissionPayload::FileUpload { files }, now())
        };

        assert_eq!(
            submit(vec![]).unwrap_err(),
            SubmissionError::invalid("files", "at least 1 file(s) required, got 0")
        );
        assert!(matches!(
            submit(vec![UploadedFile::new("virus.exe", 10)]),
            Err(SubmissionError::InvalidPayload { ref field, .. }) if field == "files[0]"
        ));
        assert!(submit(vec![UploadedFile::new("huge.pdf", 11 * 1024 * 1024)]).is_err());
        assert!(submit(vec![UploadedFile::new("empty.pdf", 0)]).is_err());
        assert!(submit((0..6).map(|i| UploadedFile::new(format!("{i}.png"), 1)).collect()).is_err());
        assert!(submit(vec![UploadedFile::new("Report.PDF", 2048)]).is_ok());
    }

    #[test]
    fn form_field_kinds() {
        let field = |id: &str, kind: FormFieldKind, required: bool| FormField {
            id: id.to_string(),
            label: String::new(),
            kind,
            required,
        };
        let form = FormPayload {
            fields: vec![
                field("name", FormFieldKind::Text, true),
                field("age", FormFieldKind::Number, false),
                field("email", FormFieldKind::Email, false),
                field("site", FormFieldKind::Url, false),
                field("team", FormFieldKind::Select(vec!["red".into(), "blue".into()]), false),
            ],
        };
        let check = |pairs: &[(&str, &str)]| {
            let values = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
            validate_form(&form, &values)
        };

        assert!(check(&[("name", "Ada"), ("age", "36"), ("email", "ada@example.org")]).is_ok());
        assert!(check(&[("age", "36")]).is_err());
        assert!(check(&[("name", "Ada"), ("age", "old")]).is_err());
        assert!(check(&[("name", "Ada"), ("email", "ada@local")]).is_err());
        assert!(check(&[("name", "Ada"), ("site", "ftp://x")]).is_err());
        assert!(check(&[("name", "Ada"), ("team", "green")]).is_err());
        assert!(check(&[("name", "Ada"), ("extra", "1")]).is_err());
    }

    #[test]
    fn event_codes_must_match() {
        let event = OfflineEventPayload {
            check_in_code: Some("ORBIT-7".into()),
            ..OfflineEventPayload::default()
        };
        assert!(validate_offline(&event, Some(" ORBIT-7 ")).is_ok());
        assert!(validate_offline(&event, Some("ORBIT-8")).is_err());
        assert!(validate_offline(&event, None).is_err());
        assert!(validate_offline(&OfflineEventPayload::default(), None).is_ok());
    }

    #[test]
    fn start_moves_to_in_progress_once() {
        let mission = Mission::new(CampaignId::new(), "X", MissionType::Custom);
        let started = pipeline().start(&open(&mission), now()).unwrap();
        assert_eq!(started.status, MissionStatus::InProgress);
        assert_eq!(started.started_at, Some(now()));
        assert_eq!(pipeline().start(&started, now()).unwrap(), started);

        let locked = UserMission::new(UserId::new(), mission.id);
        assert!(pipeline().start(&locked, now()).is_err());
    }
}
