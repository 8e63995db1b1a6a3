//! Core types for the progression engine
//!
//! Defines the fundamental records:
//! - Identifiers for missions, campaigns, users and competencies
//! - Missions and the prerequisite edges between them
//! - Per-user mission records and the reward grants they produce

use crate::payload::{MissionPayload, PayloadFallback, SubmissionPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Rank every cadet holds before passing any threshold.
pub const BASE_RANK_LEVEL: u32 = 1;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique mission identifier
    MissionId
);
uuid_id!(
    /// Unique campaign identifier
    CampaignId
);
uuid_id!(
    /// Unique user (cadet or architect) identifier
    UserId
);
uuid_id!(
    /// Unique competency identifier
    CompetencyId
);

/// Kind of work a mission asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionType {
    Quiz,
    Video,
    FileUpload,
    Form,
    OfflineEvent,
    OnlineEvent,
    ExternalAction,
    Custom,
}

impl MissionType {
    /// Every mission type, in declaration order
    pub const ALL: [MissionType; 8] = [
        MissionType::Quiz,
        MissionType::Video,
        MissionType::FileUpload,
        MissionType::Form,
        MissionType::OfflineEvent,
        MissionType::OnlineEvent,
        MissionType::ExternalAction,
        MissionType::Custom,
    ];

    /// Wire name, as used for the payload tag
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MissionType::Quiz => "QUIZ",
            MissionType::Video => "VIDEO",
            MissionType::FileUpload => "FILE_UPLOAD",
            MissionType::Form => "FORM",
            MissionType::OfflineEvent => "OFFLINE_EVENT",
            MissionType::OnlineEvent => "ONLINE_EVENT",
            MissionType::ExternalAction => "EXTERNAL_ACTION",
            MissionType::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for MissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a submission is confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationType {
    /// Completes as soon as the submission validates
    #[default]
    Auto,
    /// A moderator reviews the submission
    ManualReview,
    /// Confirmed by scanning a code on site
    QrScan,
    /// Uploaded files are checked by a moderator
    FileCheck,
}

impl ConfirmationType {
    /// Whether a valid submission completes the mission immediately
    #[inline]
    #[must_use]
    pub fn completes_immediately(self) -> bool {
        matches!(self, ConfirmationType::Auto)
    }

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConfirmationType::Auto => "AUTO",
            ConfirmationType::ManualReview => "MANUAL_REVIEW",
            ConfirmationType::QrScan => "QR_SCAN",
            ConfirmationType::FileCheck => "FILE_CHECK",
        }
    }
}

/// Status of a mission for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    #[default]
    Locked,
    Available,
    InProgress,
    PendingReview,
    Completed,
}

impl MissionStatus {
    /// Every status, in forward order
    pub const ALL: [MissionStatus; 5] = [
        MissionStatus::Locked,
        MissionStatus::Available,
        MissionStatus::InProgress,
        MissionStatus::PendingReview,
        MissionStatus::Completed,
    ];

    /// Position along the forward progression
    #[inline]
    #[must_use]
    pub fn progress_rank(self) -> u8 {
        match self {
            MissionStatus::Locked => 0,
            MissionStatus::Available => 1,
            MissionStatus::InProgress => 2,
            MissionStatus::PendingReview => 3,
            MissionStatus::Completed => 4,
        }
    }

    /// Statuses the submission pipeline has already advanced; the
    /// evaluator preserves these verbatim.
    #[inline]
    #[must_use]
    pub fn is_advanced(self) -> bool {
        matches!(
            self,
            MissionStatus::InProgress | MissionStatus::PendingReview | MissionStatus::Completed
        )
    }

    /// Whether a submission may be made from this status
    #[inline]
    #[must_use]
    pub fn accepts_submission(self) -> bool {
        matches!(self, MissionStatus::Available | MissionStatus::InProgress)
    }

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MissionStatus::Locked => "LOCKED",
            MissionStatus::Available => "AVAILABLE",
            MissionStatus::InProgress => "IN_PROGRESS",
            MissionStatus::PendingReview => "PENDING_REVIEW",
            MissionStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canvas position; presentation only
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Competency points granted on completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetencyGrant {
    pub competency_id: CompetencyId,
    pub points: u32,
}

/// A mission with a typed payload, ready for evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: MissionId,
    pub campaign_id: CampaignId,
    pub name: String,
    pub description: String,
    pub mission_type: MissionType,
    pub payload: MissionPayload,
    pub confirmation_type: ConfirmationType,
    pub experience_reward: u32,
    pub mana_reward: u32,
    pub min_rank: u32,
    pub position: Position,
    pub competencies: Vec<CompetencyGrant>,
}

impl Mission {
    /// Create a mission with the default payload for its type
    #[must_use]
    pub fn new(campaign_id: CampaignId, name: impl Into<String>, mission_type: MissionType) -> Self {
        Self {
            id: MissionId::new(),
            campaign_id,
            name: name.into(),
            description: String::new(),
            mission_type,
            payload: MissionPayload::default_for(mission_type),
            confirmation_type: ConfirmationType::Auto,
            experience_reward: 0,
            mana_reward: 0,
            min_rank: BASE_RANK_LEVEL,
            position: Position::default(),
            competencies: Vec::new(),
        }
    }

    /// With description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With experience and mana rewards
    #[must_use]
    pub fn with_rewards(mut self, experience: u32, mana: u32) -> Self {
        self.experience_reward = experience;
        self.mana_reward = mana;
        self
    }

    /// With minimum rank (never below the base rank)
    #[must_use]
    pub fn with_min_rank(mut self, min_rank: u32) -> Self {
        self.min_rank = min_rank.max(BASE_RANK_LEVEL);
        self
    }

    /// With confirmation type
    #[must_use]
    pub fn with_confirmation(mut self, confirmation_type: ConfirmationType) -> Self {
        self.confirmation_type = confirmation_type;
        self
    }

    /// With payload; the mission type follows the payload
    #[must_use]
    pub fn with_payload(mut self, payload: MissionPayload) -> Self {
        self.mission_type = payload.mission_type();
        self.payload = payload;
        self
    }

    /// With a competency grant; zero points are ignored
    #[must_use]
    pub fn with_competency(mut self, competency_id: CompetencyId, points: u32) -> Self {
        if points > 0 {
            self.competencies.push(CompetencyGrant {
                competency_id,
                points,
            });
        }
        self
    }

    /// With canvas position
    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    /// Build a mission from its persisted shape.
    ///
    /// This is the one place where a missing or malformed payload is
    /// replaced by the default for the mission type, and where out of
    /// range numbers from the store are clamped.
    #[must_use]
    pub fn from_record(record: MissionRecord) -> Self {
        let (payload, fallback) =
            MissionPayload::resolve(record.mission_type, record.payload.as_ref());
        match fallback {
            Some(PayloadFallback::Missing) => {
                tracing::debug!(mission = %record.id, "no payload stored, using default");
            }
            Some(reason) => {
                tracing::warn!(
                    mission = %record.id,
                    mission_type = %record.mission_type,
                    %reason,
                    "unusable payload replaced by default"
                );
            }
            None => {}
        }

        let competencies = record
            .competencies
            .into_iter()
            .filter_map(|grant| match u32::try_from(grant.points) {
                Ok(points) if points > 0 => Some(CompetencyGrant {
                    competency_id: grant.competency_id,
                    points,
                }),
                _ => {
                    tracing::warn!(
                        mission = %record.id,
                        competency = %grant.competency_id,
                        points = grant.points,
                        "dropping non-positive competency grant"
                    );
                    None
                }
            })
            .collect();

        Self {
            id: record.id,
            campaign_id: record.campaign_id,
            name: record.name,
            description: record.description,
            mission_type: record.mission_type,
            payload,
            confirmation_type: record.confirmation_type,
            experience_reward: clamp_u32(record.experience_reward),
            mana_reward: clamp_u32(record.mana_reward),
            min_rank: clamp_u32(record.min_rank).max(BASE_RANK_LEVEL),
            position: record.position,
            competencies,
        }
    }

    /// Persisted shape of this mission
    #[must_use]
    pub fn to_record(&self) -> MissionRecord {
        MissionRecord {
            id: self.id,
            campaign_id: self.campaign_id,
            name: self.name.clone(),
            description: self.description.clone(),
            mission_type: self.mission_type,
            payload: serde_json::to_value(&self.payload).ok(),
            confirmation_type: self.confirmation_type,
            experience_reward: i64::from(self.experience_reward),
            mana_reward: i64::from(self.mana_reward),
            min_rank: i64::from(self.min_rank),
            position: self.position,
            competencies: self
                .competencies
                .iter()
                .map(|grant| CompetencyGrantRecord {
                    competency_id: grant.competency_id,
                    points: i64::from(grant.points),
                })
                .collect(),
        }
    }
}

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Mission as the persistence layer stores it, payload untyped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionRecord {
    pub id: MissionId,
    pub campaign_id: CampaignId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub mission_type: MissionType,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub confirmation_type: ConfirmationType,
    #[serde(default)]
    pub experience_reward: i64,
    #[serde(default)]
    pub mana_reward: i64,
    #[serde(default = "default_min_rank")]
    pub min_rank: i64,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub competencies: Vec<CompetencyGrantRecord>,
}

fn default_min_rank() -> i64 {
    i64::from(BASE_RANK_LEVEL)
}

/// Competency grant as stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetencyGrantRecord {
    pub competency_id: CompetencyId,
    pub points: i64,
}

/// Prerequisite edge: `source` must be completed before `target` opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionDependency {
    pub source: MissionId,
    pub target: MissionId,
}

impl MissionDependency {
    /// Create a new dependency edge
    #[inline]
    #[must_use]
    pub fn new(source: MissionId, target: MissionId) -> Self {
        Self { source, target }
    }
}

/// Per (user, mission) progress record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMission {
    pub user_id: UserId,
    pub mission_id: MissionId,
    #[serde(default)]
    pub status: MissionStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submission: Option<SubmissionPayload>,
    /// Quiz attempts used so far
    #[serde(default)]
    pub attempts: u32,
    /// Note left by the last moderator rejection
    #[serde(default)]
    pub review_note: Option<String>,
    /// Row version assigned by the store, bumped on every save
    #[serde(default)]
    pub version: u64,
}

impl UserMission {
    /// Fresh record; LOCKED until evaluated otherwise
    #[must_use]
    pub fn new(user_id: UserId, mission_id: MissionId) -> Self {
        Self {
            user_id,
            mission_id,
            status: MissionStatus::Locked,
            started_at: None,
            completed_at: None,
            submission: None,
            attempts: 0,
            review_note: None,
            version: 0,
        }
    }

    /// With status
    #[must_use]
    pub fn with_status(mut self, status: MissionStatus) -> Self {
        self.status = status;
        self
    }

    /// Idempotency key for rewards earned through this record
    #[inline]
    #[must_use]
    pub fn grant_key(&self) -> GrantKey {
        GrantKey {
            user_id: self.user_id,
            mission_id: self.mission_id,
        }
    }
}

/// Accumulated competency points for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCompetency {
    pub user_id: UserId,
    pub competency_id: CompetencyId,
    pub points: u64,
}

/// Rewards are written at most once per (user, mission)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantKey {
    pub user_id: UserId,
    pub mission_id: MissionId,
}

/// Reward emitted when a mission becomes COMPLETED
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardGrant {
    pub user_id: UserId,
    pub mission_id: MissionId,
    pub experience: u32,
    pub mana: u32,
    pub competencies: Vec<CompetencyGrant>,
}

impl RewardGrant {
    /// Grant carrying the mission's full reward
    #[must_use]
    pub fn for_mission(user_id: UserId, mission: &Mission) -> Self {
        Self {
            user_id,
            mission_id: mission.id,
            experience: mission.experience_reward,
            mana: mission.mana_reward,
            competencies: mission.competencies.clone(),
        }
    }

    /// Idempotency key
    #[inline]
    #[must_use]
    pub fn key(&self) -> GrantKey {
        GrantKey {
            user_id: self.user_id,
            mission_id: self.mission_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_ordering_is_forward() {
        let ranks: Vec<u8> = MissionStatus::ALL.iter().map(|s| s.progress_rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4]);
        assert!(MissionStatus::PendingReview.is_advanced());
        assert!(!MissionStatus::Available.is_advanced());
    }

    #[test]
    fn status_wire_names() {
        let value = serde_json::to_value(MissionStatus::PendingReview).unwrap();
        assert_eq!(value, json!("PENDING_REVIEW"));
        assert_eq!(MissionStatus::InProgress.to_string(), "IN_PROGRESS");
    }

    #[test]
    fn from_record_clamps_store_values() {
        let campaign = CampaignId::new();
        let competency = CompetencyId::new();
        let record = MissionRecord {
            id: MissionId::new(),
            campaign_id: campaign,
            name: "Orientation".to_string(),
            description: String::new(),
            mission_type: MissionType::Video,
            payload: None,
            confirmation_type: ConfirmationType::Auto,
            experience_reward: -10,
            mana_reward: 25,
            min_rank: 0,
            position: Position::default(),
            competencies: vec![
                CompetencyGrantRecord {
                    competency_id: competency,
                    points: 0,
                },
                CompetencyGrantRecord {
                    competency_id: competency,
                    points: 4,
                },
            ],
        };

        let mission = Mission::from_record(record);
        assert_eq!(mission.experience_reward, 0);
        assert_eq!(mission.mana_reward, 25);
        assert_eq!(mission.min_rank, BASE_RANK_LEVEL);
        assert_eq!(mission.competencies.len(), 1);
        assert_eq!(mission.payload, MissionPayload::default_for(MissionType::Video));
    }

    #[test]
    fn record_round_trip_keeps_typed_payload() {
        let mission = Mission::new(CampaignId::new(), "Upload", MissionType::FileUpload)
            .with_rewards(50, 10)
            .with_min_rank(2);
        let restored = Mission::from_record(mission.to_record());
        assert_eq!(restored, mission);
    }

    #[test]
    fn mission_record_deserializes_with_defaults() {
        let id = MissionId::new();
        let campaign = CampaignId::new();
        let value = json!({
            "id": id,
            "campaignId": campaign,
            "name": "Briefing",
            "missionType": "CUSTOM"
        });
        let record: MissionRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.min_rank, 1);
        assert_eq!(record.confirmation_type, ConfirmationType::Auto);
        assert!(record.payload.is_none());
    }
}
