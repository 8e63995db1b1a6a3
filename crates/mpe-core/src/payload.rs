//! Typed mission payloads and submissions
//!
//! Every mission type has exactly one payload variant and one submission
//! variant. Consumers match on them exhaustively, so a new mission type
//! cannot be added without handling it everywhere.

use crate::types::MissionType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Content of a mission, tagged by mission type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionPayload {
    Quiz(QuizPayload),
    Video(VideoPayload),
    FileUpload(FileUploadPayload),
    Form(FormPayload),
    OfflineEvent(OfflineEventPayload),
    OnlineEvent(OnlineEventPayload),
    ExternalAction(ExternalActionPayload),
    Custom(CustomPayload),
}

/// Why a stored payload was replaced by the default
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadFallback {
    /// Nothing stored
    Missing,
    /// Stored value did not parse
    Malformed(String),
    /// Stored value is tagged with another mission type
    TypeMismatch {
        declared: MissionType,
        found: String,
    },
}

impl fmt::Display for PayloadFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadFallback::Missing => f.write_str("payload missing"),
            PayloadFallback::Malformed(reason) => write!(f, "payload malformed: {reason}"),
            PayloadFallback::TypeMismatch { declared, found } => {
                write!(f, "payload tagged {found} on a {declared} mission")
            }
        }
    }
}

impl MissionPayload {
    /// Mission type this payload belongs to
    #[must_use]
    pub fn mission_type(&self) -> MissionType {
        match self {
            MissionPayload::Quiz(_) => MissionType::Quiz,
            MissionPayload::Video(_) => MissionType::Video,
            MissionPayload::FileUpload(_) => MissionType::FileUpload,
            MissionPayload::Form(_) => MissionType::Form,
            MissionPayload::OfflineEvent(_) => MissionType::OfflineEvent,
            MissionPayload::OnlineEvent(_) => MissionType::OnlineEvent,
            MissionPayload::ExternalAction(_) => MissionType::ExternalAction,
            MissionPayload::Custom(_) => MissionType::Custom,
        }
    }

    /// Safe default payload for a mission type
    #[must_use]
    pub fn default_for(mission_type: MissionType) -> Self {
        match mission_type {
            MissionType::Quiz => MissionPayload::Quiz(QuizPayload::default()),
            MissionType::Video => MissionPayload::Video(VideoPayload::default()),
            MissionType::FileUpload => MissionPayload::FileUpload(FileUploadPayload::default()),
            MissionType::Form => MissionPayload::Form(FormPayload::default()),
            MissionType::OfflineEvent => {
                MissionPayload::OfflineEvent(OfflineEventPayload::default())
            }
            MissionType::OnlineEvent => MissionPayload::OnlineEvent(OnlineEventPayload::default()),
            MissionType::ExternalAction => {
                MissionPayload::ExternalAction(ExternalActionPayload::default())
            }
            MissionType::Custom => MissionPayload::Custom(CustomPayload::default()),
        }
    }

    /// Resolve a stored, untyped payload against the declared mission type.
    ///
    /// Untagged objects are read as the declared type. Anything that cannot
    /// be used yields the default payload together with the reason.
    #[must_use]
    pub fn resolve(mission_type: MissionType, raw: Option<&Value>) -> (Self, Option<PayloadFallback>) {
        let fallback = |reason| (Self::default_for(mission_type), Some(reason));

        let object = match raw {
            None | Some(Value::Null) => return fallback(PayloadFallback::Missing),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return fallback(PayloadFallback::Malformed(format!(
                    "expected an object, got {}",
                    json_kind(other)
                )))
            }
        };

        let mut tagged = object.clone();
        match tagged.get("type") {
            None => {
                tagged.insert("type".to_string(), Value::from(mission_type.as_str()));
            }
            Some(Value::String(tag)) if tag == mission_type.as_str() => {}
            Some(tag) => {
                return fallback(PayloadFallback::TypeMismatch {
                    declared: mission_type,
                    found: tag.as_str().map_or_else(|| tag.to_string(), str::to_string),
                })
            }
        }

        match serde_json::from_value::<MissionPayload>(Value::Object(tagged)) {
            Ok(payload) => (payload, None),
            Err(e) => fallback(PayloadFallback::Malformed(e.to_string())),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Multiple-choice quiz
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QuizPayload {
    pub questions: Vec<QuizQuestion>,
    /// Percentage needed to pass; engine default when absent
    pub passing_score: Option<u8>,
    pub allow_retries: bool,
    pub max_attempts: Option<u32>,
}

impl Default for QuizPayload {
    fn default() -> Self {
        Self {
            questions: Vec::new(),
            passing_score: None,
            allow_retries: true,
            max_attempts: None,
        }
    }
}

impl QuizPayload {
    /// Upper bound on attempts, if any
    #[inline]
    #[must_use]
    pub fn attempt_limit(&self) -> Option<u32> {
        if self.allow_retries {
            self.max_attempts
        } else {
            Some(1)
        }
    }

    /// Whether another attempt is allowed after `attempts_used`
    #[inline]
    #[must_use]
    pub fn allows_attempt_after(&self, attempts_used: u32) -> bool {
        self.attempt_limit().map_or(true, |limit| attempts_used < limit)
    }
}

/// A single quiz question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<QuizOption>,
    #[serde(default)]
    pub correct_answer_ids: Vec<String>,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// Answer option of a quiz question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: String,
    #[serde(default)]
    pub text: String,
}

/// Video to watch
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VideoPayload {
    pub url: String,
    pub duration_seconds: Option<u32>,
    pub require_full_watch: bool,
}

/// Files to upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileUploadPayload {
    pub instructions: String,
    pub required_files: u32,
    /// Engine limit when absent
    pub max_files: Option<u32>,
    /// Engine limit when absent
    pub max_file_size_bytes: Option<u64>,
    /// Lowercase extensions; engine allowlist when empty
    pub allowed_formats: Vec<String>,
}

impl Default for FileUploadPayload {
    fn default() -> Self {
        Self {
            instructions: String::new(),
            required_files: 1,
            max_files: None,
            max_file_size_bytes: None,
            allowed_formats: Vec::new(),
        }
    }
}

/// Free-form questionnaire
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormPayload {
    pub fields: Vec<FormField>,
}

/// Field of a form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub kind: FormFieldKind,
    #[serde(default)]
    pub required: bool,
}

/// Input kind of a form field
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormFieldKind {
    #[default]
    Text,
    LongText,
    Number,
    Email,
    Url,
    /// One of the listed options
    Select(Vec<String>),
}

/// On-site event
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OfflineEventPayload {
    pub location: String,
    pub starts_at: Option<DateTime<Utc>>,
    /// Code encoded in the venue QR; any scan is accepted when absent
    pub check_in_code: Option<String>,
}

/// Online event
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OnlineEventPayload {
    pub url: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub attendance_code: Option<String>,
}

/// Action performed on an external site
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExternalActionPayload {
    pub url: String,
    pub instructions: String,
    pub requires_proof: bool,
}

/// Architect-defined task
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomPayload {
    pub instructions: String,
    pub requires_response: bool,
}

/// A cadet's answer to a mission, tagged by mission type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum SubmissionPayload {
    Quiz {
        /// Selected option ids per question id
        answers: BTreeMap<String, Vec<String>>,
    },
    Video {
        watched_seconds: u32,
    },
    FileUpload {
        files: Vec<UploadedFile>,
    },
    Form {
        values: BTreeMap<String, String>,
    },
    OfflineEvent {
        scanned_code: Option<String>,
    },
    OnlineEvent {
        attendance_code: Option<String>,
    },
    ExternalAction {
        proof_url: Option<String>,
    },
    Custom {
        response: String,
    },
}

impl SubmissionPayload {
    /// Mission type this submission answers
    #[must_use]
    pub fn mission_type(&self) -> MissionType {
        match self {
            SubmissionPayload::Quiz { .. } => MissionType::Quiz,
            SubmissionPayload::Video { .. } => MissionType::Video,
            SubmissionPayload::FileUpload { .. } => MissionType::FileUpload,
            SubmissionPayload::Form { .. } => MissionType::Form,
            SubmissionPayload::OfflineEvent { .. } => MissionType::OfflineEvent,
            SubmissionPayload::OnlineEvent { .. } => MissionType::OnlineEvent,
            SubmissionPayload::ExternalAction { .. } => MissionType::ExternalAction,
            SubmissionPayload::Custom { .. } => MissionType::Custom,
        }
    }
}

/// Metadata of an uploaded file; contents live in external storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub name: String,
    pub size_bytes: u64,
}

impl UploadedFile {
    /// Create file metadata
    #[must_use]
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
        }
    }

    /// Lowercase extension, if the name has one
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.trim().to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}
