//! Engine configuration
//!
//! Loaded from TOML; every section is optional and falls back to defaults.
//!
//! ```toml
//! [uploads]
//! max_files = 5
//! max_file_size_bytes = 10485760
//! allowed_formats = ["pdf", "png"]
//!
//! [quiz]
//! default_passing_score = 70
//!
//! [moderation]
//! reset_attempts_on_rejection = false
//!
//! [[ranks]]
//! level = 1
//! name = "Cadet"
//! ```

use crate::aggregator::{RankLadder, RankThreshold};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Limits applied to file uploads when the mission does not override them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadLimits {
    /// Maximum number of files per submission
    pub max_files: u32,
    /// Maximum size of one file
    pub max_file_size_bytes: u64,
    /// Lowercase extensions accepted when the mission lists none
    pub allowed_formats: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_file_size_bytes: 10 * 1024 * 1024,
            allowed_formats: ["pdf", "png", "jpg", "jpeg", "gif", "doc", "docx", "txt", "zip", "mp4"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Quiz defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizDefaults {
    /// Passing percentage for quizzes that do not set one
    pub default_passing_score: u8,
}

impl Default for QuizDefaults {
    fn default() -> Self {
        Self {
            default_passing_score: 70,
        }
    }
}

/// What a moderator rejection does besides reopening the mission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationPolicy {
    /// Give the cadet a fresh set of quiz attempts
    pub reset_attempts_on_rejection: bool,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub uploads: UploadLimits,
    pub quiz: QuizDefaults,
    pub moderation: ModerationPolicy,
    pub ranks: Vec<RankThreshold>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            uploads: UploadLimits::default(),
            quiz: QuizDefaults::default(),
            moderation: ModerationPolicy::default(),
            ranks: default_ranks(),
        }
    }
}

fn default_ranks() -> Vec<RankThreshold> {
    vec![
        RankThreshold::new(1, "Cadet", 0, 0),
        RankThreshold::new(2, "Navigator", 100, 1),
        RankThreshold::new(3, "Pilot", 300, 3),
        RankThreshold::new(4, "Commander", 700, 6),
        RankThreshold::new(5, "Admiral", 1500, 10),
    ]
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// `Parse` for bad TOML, otherwise any [`validate`](Self::validate) error.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// `Io` if the file cannot be read, otherwise as [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), ranks = config.ranks.len(), "configuration loaded");
        Ok(config)
    }

    /// Check value ranges and the rank ladder
    ///
    /// # Errors
    /// `Invalid` for out of range values, `DuplicateRankLevel` for the ladder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quiz.default_passing_score > 100 {
            return Err(ConfigError::Invalid(format!(
                "quiz.default_passing_score must be at most 100, got {}",
                self.quiz.default_passing_score
            )));
        }
        if self.uploads.max_files == 0 {
            return Err(ConfigError::Invalid("uploads.max_files must be at least 1".to_string()));
        }
        if self.uploads.max_file_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "uploads.max_file_size_bytes must be positive".to_string(),
            ));
        }
        self.rank_ladder().map(|_| ())
    }

    /// Rank ladder built from `ranks`
    ///
    /// # Errors
    /// `DuplicateRankLevel` if two ranks share a level.
    pub fn rank_ladder(&self) -> Result<RankLadder, ConfigError> {
        RankLadder::new(self.ranks.clone())
    }

    /// With upload file count limit
    #[inline]
    #[must_use]
    pub fn with_max_files(mut self, max_files: u32) -> Self {
        self.uploads.max_files = max_files;
        self
    }

    /// With upload size limit
    #[inline]
    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.uploads.max_file_size_bytes = bytes;
        self
    }

    /// With default quiz passing score
    #[inline]
    #[must_use]
    pub fn with_passing_score(mut self, score: u8) -> Self {
        self.quiz.default_passing_score = score;
        self
    }

    /// With moderation policy
    #[inline]
    #[must_use]
    pub fn with_moderation(mut self, policy: ModerationPolicy) -> Self {
        self.moderation = policy;
        self
    }

    /// With rank thresholds
    #[inline]
    #[must_use]
    pub fn with_ranks(mut self, ranks: Vec<RankThreshold>) -> Self {
        self.ranks = ranks;
        self
    }
}
